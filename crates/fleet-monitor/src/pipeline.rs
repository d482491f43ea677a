use crate::collect::{collect, Skipped};
use crate::config::RunContext;
use crate::notify::{Dispatch, Envelope};
use crate::source::{HistorySession, HistorySource};
use crate::{backups, email, jobs};
use anyhow::Context;
use report::{render_workbook, Highlight, ReportRow};
use std::path::PathBuf;

/// What went into one rendered report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub title: &'static str,
    pub file_name: String,
    /// Instances which contributed rows.
    pub instances: usize,
    pub rows: usize,
    pub highlighted: usize,
    pub skipped: Vec<Skipped>,
}

/// A rendered report file.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub summary: ReportSummary,
}

struct ReportPlan {
    report: &'static str,
    title: &'static str,
    file_name: String,
    highlight: Highlight,
}

fn generate<R, F>(
    ctx: &RunContext,
    source: &dyn HistorySource,
    plan: ReportPlan,
    fetch: F,
) -> anyhow::Result<Artifact>
where
    R: ReportRow,
    F: Fn(&mut dyn HistorySession) -> anyhow::Result<Vec<R>>,
{
    let ReportPlan {
        report,
        title,
        file_name,
        highlight,
    } = plan;

    let collected = collect(report, &ctx.settings.instances, |instance| {
        // The session, and its connection, is dropped before the next instance.
        let mut session = source.connect(instance)?;
        fetch(session.as_mut())
    })?;

    let output_dir = &ctx.settings.output_dir;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;
    let path = output_dir.join(&file_name);

    let rendered = render_workbook(
        &path,
        &collected.table.global(),
        &collected.table.by_instance(),
        &highlight,
    )
    .with_context(|| format!("[{report}] writing {}", path.display()))?;

    tracing::info!(
        report,
        path = %path.display(),
        sheets = rendered.sheets.len(),
        rows = rendered.rows,
        highlighted = rendered.highlighted,
        "report written"
    );

    Ok(Artifact {
        path,
        summary: ReportSummary {
            title,
            file_name,
            instances: collected.reporting,
            rows: rendered.rows,
            highlighted: rendered.highlighted,
            skipped: collected.skipped,
        },
    })
}

/// Collects the failed steps of each job's latest run, and renders them.
pub fn generate_jobs_report(
    ctx: &RunContext,
    source: &dyn HistorySource,
) -> anyhow::Result<Artifact> {
    let window = ctx.settings.jobs.window();
    let plan = ReportPlan {
        report: jobs::REPORT,
        title: jobs::TITLE,
        file_name: jobs::artifact_name(&window, ctx.report_date),
        highlight: jobs::highlight(),
    };
    generate(ctx, source, plan, |session| {
        jobs::fetch_job_rows(session, &window)
    })
}

/// Collects the latest backup of each database and backup type, and renders them.
pub fn generate_backup_report(
    ctx: &RunContext,
    source: &dyn HistorySource,
) -> anyhow::Result<Artifact> {
    let lookback = ctx.settings.backups.lookback();
    let plan = ReportPlan {
        report: backups::REPORT,
        title: backups::TITLE,
        file_name: backups::artifact_name(ctx.settings.backups.lookback_hours, ctx.report_date),
        highlight: backups::highlight(),
    };
    generate(ctx, source, plan, |session| {
        backups::fetch_backup_rows(session, lookback)
    })
}

/// Renders the jobs report and then the backups report, and dispatches both
/// in one email. Without a `dispatcher`, reports are rendered but not sent.
/// A report with no data from any instance fails the run before anything is sent.
pub fn run(
    ctx: &RunContext,
    source: &dyn HistorySource,
    dispatcher: Option<&dyn Dispatch>,
) -> anyhow::Result<Vec<Artifact>> {
    tracing::info!(
        instances = ctx.settings.instances.len(),
        evaluated_at = %ctx.evaluated_at,
        date = %ctx.report_date,
        "monitor run started"
    );

    let artifacts = vec![
        generate_jobs_report(ctx, source)?,
        generate_backup_report(ctx, source)?,
    ];

    let Some(dispatcher) = dispatcher else {
        tracing::info!("email dispatch skipped");
        return Ok(artifacts);
    };

    let summaries = artifacts
        .iter()
        .map(|artifact| artifact.summary.clone())
        .collect::<Vec<_>>();
    let (subject, html_body) = email::compose(&ctx.settings, ctx.report_date, &summaries)?;

    let envelope = Envelope::new(
        &ctx.settings.email,
        subject,
        html_body,
        artifacts.iter().map(|artifact| artifact.path.clone()).collect(),
    );
    dispatcher.dispatch(&envelope).context("dispatching report email")?;

    tracing::info!("monitor run finished");
    Ok(artifacts)
}
