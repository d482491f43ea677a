use crate::config::Instance;
use report::{ReportRow, ReportTable, Tagged};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("[{report}] no data collected from any instance")]
    NoData { report: &'static str },
}

/// Why an instance contributed no rows.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Connecting, querying or reducing failed, with the error chain.
    Failed(String),
    Empty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Failed(error) => write!(f, "failed: {error}"),
            SkipReason::Empty => f.write_str("no rows returned"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub label: String,
    pub server: String,
    pub reason: SkipReason,
}

/// Rows gathered across instances.
#[derive(Debug)]
pub struct Collected<R> {
    pub table: ReportTable<R>,
    /// Number of instances which contributed rows.
    pub reporting: usize,
    pub skipped: Vec<Skipped>,
}

/// Runs `fetch` for each instance in order, tagging returned rows with the
/// instance's label.
///
/// An instance whose fetch fails, or which returns no rows, is logged and
/// skipped without affecting the others. If every instance is skipped, the
/// result is `CollectError::NoData`.
pub fn collect<R, F>(
    report: &'static str,
    instances: &[Instance],
    mut fetch: F,
) -> Result<Collected<R>, CollectError>
where
    R: ReportRow,
    F: FnMut(&Instance) -> anyhow::Result<Vec<R>>,
{
    let mut table = ReportTable::new();
    let mut reporting = 0;
    let mut skipped = Vec::new();

    for instance in instances {
        let Instance { label, server } = instance;
        tracing::info!(report, instance = %label, %server, "querying instance");

        let reason = match fetch(instance) {
            Ok(rows) if rows.is_empty() => {
                tracing::warn!(report, instance = %label, %server, "no rows returned; skipping instance");
                SkipReason::Empty
            }
            Ok(rows) => {
                tracing::info!(report, instance = %label, rows = rows.len(), "retrieved rows");
                reporting += 1;
                for row in rows {
                    table.push(Tagged {
                        instance: label.clone(),
                        row,
                    });
                }
                continue;
            }
            Err(error) => {
                let error = format!("{error:#}");
                tracing::error!(report, instance = %label, %server, %error, "failed to query instance; skipping");
                SkipReason::Failed(error)
            }
        };

        skipped.push(Skipped {
            label: label.clone(),
            server: server.clone(),
            reason,
        });
    }

    if table.is_empty() {
        return Err(CollectError::NoData { report });
    }
    Ok(Collected {
        table,
        reporting,
        skipped,
    })
}
