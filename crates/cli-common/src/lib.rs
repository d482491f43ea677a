//! Contains helpers shared by the monitoring executables: logging arguments,
//! construction of the log dispatcher, and the outer run / exit handling.
mod logging;

pub use logging::{build_dispatch, LogArgs, LogFormat, LogLevel, LOG_FILES_RETAINED, LOG_FILE_PREFIX};

/// A return type indicating that a function cannot return.
pub enum Never {}

/// Executes `run_fn` with logging configured from `log`, and exits the process.
/// This function will never return, so a typical `fn main` will have this as the last
/// line. Argument parsing is left up to the caller.
/// An `Ok` result exits with code `0`. Returning an `Err` will cause the error and its
/// chain of causes to be logged, and the application will exit with a code of `1`.
pub fn run_cli_main<F>(log: &LogArgs, run_fn: F) -> Never
where
    F: FnOnce() -> Result<(), anyhow::Error>,
{
    let dispatch = match build_dispatch(log) {
        Ok(dispatch) => dispatch,
        Err(error) => {
            // Nothing to log through yet.
            eprintln!("failed to initialize logging: {error:#}");
            std::process::exit(1);
        }
    };

    let code = tracing::dispatcher::with_default(&dispatch, || exit_code(run_fn()));
    std::process::exit(code);
}

fn exit_code(result: Result<(), anyhow::Error>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "execution failed");
            1
        }
    }
}
