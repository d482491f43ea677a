use crate::source::HistorySession;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use msdb_history::{convert, reduce_backups, BackupSnapshot, BackupStatus, BackupType};
use report::{Cell, Column, Highlight, ReportRow};

pub const REPORT: &str = "BACKUP";
pub const TITLE: &str = "Backup Status";

/// Latest backup of one database and backup type.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRow {
    pub database_name: String,
    pub backup_type: BackupType,
    pub backup_start_date: Option<NaiveDateTime>,
    pub backup_finish_date: Option<NaiveDateTime>,
    pub backup_status: BackupStatus,
    pub backup_size_mb: Option<f64>,
    pub backup_size_gb: Option<f64>,
    pub physical_device_name: Option<String>,
}

impl ReportRow for BackupRow {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("database_name"),
            Column::new("backup_type"),
            Column::new("backup_start_date"),
            Column::new("backup_finish_date"),
            Column::new("backup_status"),
            Column::new("backup_size_mb"),
            Column::new("backup_size_gb"),
            Column::wrapped("physical_device_name"),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.database_name.as_str().into(),
            self.backup_type.label().into(),
            self.backup_start_date.into(),
            self.backup_finish_date.into(),
            self.backup_status.as_str().into(),
            self.backup_size_mb.into(),
            self.backup_size_gb.into(),
            self.physical_device_name.clone().into(),
        ]
    }
}

impl From<BackupSnapshot> for BackupRow {
    fn from(snapshot: BackupSnapshot) -> Self {
        let BackupSnapshot {
            key,
            backup_type,
            status,
            latest,
        } = snapshot;

        Self {
            database_name: key.database_name,
            backup_type,
            backup_start_date: latest.backup_start_date,
            backup_finish_date: latest.backup_finish_date,
            backup_status: status,
            backup_size_mb: convert::bytes_to_mb(latest.backup_size),
            backup_size_gb: convert::bytes_to_gb(latest.backup_size),
            physical_device_name: latest.physical_device_name,
        }
    }
}

pub fn highlight() -> Highlight {
    Highlight::new("backup_status", BackupStatus::Failed.as_str())
}

/// Name of the backups workbook for a run on `date`.
pub fn artifact_name(lookback_hours: u32, date: NaiveDate) -> String {
    format!(
        "BackupStatus_Last{lookback_hours}H_{}.xlsx",
        date.format("%Y-%m-%d")
    )
}

/// Reads recent backup history from `session` and reduces it to report rows,
/// windowed against the instance's own clock.
pub fn fetch_backup_rows(
    session: &mut dyn HistorySession,
    lookback: Duration,
) -> anyhow::Result<Vec<BackupRow>> {
    let now = session.server_time()?;
    let events = session.backup_history(now - lookback)?;
    tracing::debug!(events = events.len(), %now, "reducing backup history");

    Ok(reduce_backups(events, now, lookback)
        .into_iter()
        .map(BackupRow::from)
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use msdb_history::BackupEvent;
    use pretty_assertions::assert_eq;

    #[test]
    fn unfinished_backup_is_failed_and_highlighted() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 20)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let events = vec![BackupEvent {
            database_name: "DB1".to_string(),
            type_code: "D".to_string(),
            backup_start_date: Some(now - Duration::hours(2)),
            backup_finish_date: None,
            backup_size: Some(3.5 * 1024.0 * 1024.0 * 1024.0),
            physical_device_name: Some(r"\\backup\DB1_full.bak".to_string()),
        }];

        let rows = reduce_backups(events, now, Duration::hours(24))
            .into_iter()
            .map(BackupRow::from)
            .collect::<Vec<_>>();
        assert_eq!(
            rows,
            vec![BackupRow {
                database_name: "DB1".to_string(),
                backup_type: BackupType::Full,
                backup_start_date: Some(now - Duration::hours(2)),
                backup_finish_date: None,
                backup_status: BackupStatus::Failed,
                backup_size_mb: Some(3584.0),
                backup_size_gb: Some(3.5),
                physical_device_name: Some(r"\\backup\DB1_full.bak".to_string()),
            }]
        );

        let cells = rows[0].cells();
        assert_eq!(cells[3], Cell::Empty);
        assert!(highlight().matches(&cells[4]));
    }

    #[test]
    fn artifact_names() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        assert_eq!(artifact_name(24, date), "BackupStatus_Last24H_2024-03-20.xlsx");
    }
}
