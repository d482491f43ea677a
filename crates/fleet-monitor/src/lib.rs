//! Monitors SQL Agent jobs and database backups across a fleet of SQL Server
//! instances: collects each instance's `msdb` history, reduces it to the
//! latest state per job and per database backup type, renders one workbook
//! per report and emails both.
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

pub mod backups;
pub mod collect;
pub mod config;
pub mod email;
pub mod jobs;
pub mod notify;
pub mod pipeline;
pub mod source;

pub use collect::{collect, CollectError, Collected, SkipReason, Skipped};
pub use config::{Credentials, Instance, RunContext, Settings};
pub use notify::{build_message, Dispatch, Envelope, SmtpDispatcher};
pub use pipeline::{generate_backup_report, generate_jobs_report, run, Artifact, ReportSummary};
pub use source::{HistorySession, HistorySource, SqlServerSource};

#[derive(Debug, Parser)]
#[clap(version)]
pub struct Cli {
    /// Path of the YAML settings file.
    #[clap(long, env = "MONITOR_CONFIG", default_value = "monitor.yaml")]
    pub config: PathBuf,
    /// Path of the environment file providing SQL_USER and SQL_PWD.
    /// Defaults to `.env` beside the settings file.
    #[clap(long, env = "MONITOR_ENV_FILE")]
    pub env_file: Option<PathBuf>,
    /// Render the reports without emailing them.
    #[clap(long)]
    pub skip_email: bool,

    #[clap(flatten)]
    pub log: cli_common::LogArgs,
}

impl Cli {
    pub fn run(&self) -> anyhow::Result<()> {
        let ctx = RunContext::load(&self.config, self.env_file.as_deref())
            .with_context(|| format!("loading configuration from {}", self.config.display()))?;

        let source = SqlServerSource::new(&ctx);
        let dispatcher = SmtpDispatcher::new(&ctx.settings.smtp);
        let dispatcher = (!self.skip_email).then_some(&dispatcher as &dyn Dispatch);

        let artifacts = pipeline::run(&ctx, &source, dispatcher)?;
        for artifact in &artifacts {
            tracing::info!(path = %artifact.path.display(), "report available");
        }
        Ok(())
    }
}
