//! Raw SQL Agent job and backup history as recorded in `msdb`, and the
//! reduction of that history into the latest known state of each job and
//! each database backup type.
mod backups;
mod codes;
pub mod convert;
mod jobs;

pub use backups::{reduce_backups, BackupEvent, BackupKey, BackupSnapshot};
pub use codes::{BackupStatus, BackupType, RunStatus};
pub use jobs::{reduce_jobs, JobKey, JobSnapshot, JobStepEvent, JobWindow, JOB_OUTCOME_STEP};
