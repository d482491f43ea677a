use crate::{BackupStatus, BackupType};
use chrono::{Duration, NaiveDateTime};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One row of `msdb.dbo.backupset` joined with its media family.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupEvent {
    pub database_name: String,
    /// Raw `backupset.type` code.
    pub type_code: String,
    pub backup_start_date: Option<NaiveDateTime>,
    /// Null when the backup never completed.
    pub backup_finish_date: Option<NaiveDateTime>,
    /// Size in bytes.
    pub backup_size: Option<f64>,
    pub physical_device_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackupKey {
    pub database_name: String,
    pub type_code: String,
}

/// Latest backup of one database and backup type.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupSnapshot {
    pub key: BackupKey,
    pub backup_type: BackupType,
    pub status: BackupStatus,
    pub latest: BackupEvent,
}

/// Reduces an instance's backup history into the latest backup per
/// database and backup type, considering only backups started within
/// `lookback` of `now`.
///
/// Within a key, backups are ranked by finish time descending with unfinished
/// backups ranked last, so an unfinished backup is only reported when nothing
/// in the window completed. Ties keep history order. Snapshots are ordered by
/// database name and then backup type label.
pub fn reduce_backups(
    events: impl IntoIterator<Item = BackupEvent>,
    now: NaiveDateTime,
    lookback: Duration,
) -> Vec<BackupSnapshot> {
    let since = now - lookback;

    let mut partitions: BTreeMap<BackupKey, Vec<BackupEvent>> = BTreeMap::new();
    for event in events {
        if !event.backup_start_date.map_or(false, |start| start >= since) {
            continue;
        }
        let key = BackupKey {
            database_name: event.database_name.clone(),
            type_code: event.type_code.clone(),
        };
        partitions.entry(key).or_default().push(event);
    }

    partitions
        .into_iter()
        .filter_map(|(key, events)| {
            let latest = events
                .into_iter()
                .sorted_by(|lhs, rhs| finished_desc(lhs, rhs))
                .next()?;

            let status = match latest.backup_finish_date {
                Some(_) => BackupStatus::Success,
                None => BackupStatus::Failed,
            };
            Some(BackupSnapshot {
                backup_type: BackupType::from_code(&key.type_code),
                key,
                status,
                latest,
            })
        })
        .sorted_by(|lhs, rhs| {
            (&lhs.key.database_name, lhs.backup_type.label())
                .cmp(&(&rhs.key.database_name, rhs.backup_type.label()))
        })
        .collect()
}

fn finished_desc(lhs: &BackupEvent, rhs: &BackupEvent) -> Ordering {
    match (lhs.backup_finish_date, rhs.backup_finish_date) {
        (Some(l), Some(r)) => r.cmp(&l),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
