use anyhow::Context;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter, Layer, Registry};

/// Prefix of daily log files written under `--log-dir`.
pub const LOG_FILE_PREFIX: &str = "db_monitor";
/// Number of daily log files retained under `--log-dir`.
pub const LOG_FILES_RETAINED: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact, human readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Clone, clap::Args)]
pub struct LogArgs {
    /// The log verbosity. `RUST_LOG` directives, when set, refine it further.
    #[clap(long = "log-level", env = "MONITOR_LOG_LEVEL", value_enum, default_value = "info")]
    pub level: LogLevel,
    /// The format of console logs. Defaults to text.
    #[clap(long = "log-format", env = "MONITOR_LOG_FORMAT", value_enum)]
    pub format: Option<LogFormat>,
    /// Directory receiving daily rolled log files, in addition to console logs.
    #[clap(long = "log-dir", env = "MONITOR_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Default for LogArgs {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: None,
            log_dir: None,
        }
    }
}

/// Builds a dispatcher which logs to stderr and, if `log_dir` is set, to a
/// daily rolled file. The dispatcher isn't installed globally: callers scope
/// it to a run with `tracing::dispatcher::with_default`.
pub fn build_dispatch(args: &LogArgs) -> anyhow::Result<tracing::Dispatch> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    layers.push(match args.format.unwrap_or(LogFormat::Text) {
        LogFormat::Text => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            // Without this, the message and fields would be nested within a `"fields"` object.
            .flatten_event(true)
            .with_writer(std::io::stderr)
            .boxed(),
    });

    if let Some(dir) = &args.log_dir {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(LOG_FILES_RETAINED)
            .build(dir)
            .with_context(|| format!("opening log directory {}", dir.display()))?;

        layers.push(fmt::layer().with_ansi(false).with_writer(appender).boxed());
    }

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(args.level).into())
        .from_env_lossy();

    Ok(tracing_subscriber::registry().with(layers).with(filter).into())
}
