use crate::{convert, RunStatus};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use itertools::Itertools;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// `step_id` of the job-level outcome record that SQL Agent writes when a run completes.
pub const JOB_OUTCOME_STEP: i32 = 0;

/// One row of `msdb.dbo.sysjobhistory`, joined with the owning job's name.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStepEvent {
    pub job_id: String,
    pub job_name: String,
    /// `sysjobhistory.instance_id`: monotonically increasing within an instance.
    pub position: i64,
    pub step_id: i32,
    pub step_name: Option<String>,
    /// Packed `YYYYMMDD`.
    pub run_date: i32,
    /// Packed `HHMMSS`.
    pub run_time: i32,
    /// Packed `HHMMSS`.
    pub run_duration: i32,
    pub run_status: i32,
    pub sql_severity: i32,
    pub sql_message_id: i32,
    pub message: Option<String>,
}

impl JobStepEvent {
    pub fn is_outcome(&self) -> bool {
        self.step_id == JOB_OUTCOME_STEP
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::from_code(self.run_status)
    }

    pub fn run_date(&self) -> Option<NaiveDate> {
        convert::msdb_date(self.run_date)
    }

    /// Step name, substituting a placeholder when msdb recorded none.
    pub fn display_step_name(&self) -> Cow<'_, str> {
        match self.step_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Cow::Borrowed(name),
            _ if self.is_outcome() => Cow::Borrowed("(Job Outcome)"),
            _ => Cow::Borrowed("(No Step Name)"),
        }
    }
}

/// Identity of a job's "current state" lineage within one instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey {
    pub job_id: String,
}

/// Which detail rows of the latest run are surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct JobWindow {
    /// Only detail rows whose run date is within this many days of the evaluation time.
    pub lookback_days: u32,
    /// Only detail rows whose status is `Failed`.
    pub failures_only: bool,
}

impl Default for JobWindow {
    fn default() -> Self {
        Self {
            lookback_days: 15,
            failures_only: true,
        }
    }
}

impl JobWindow {
    fn cutoff(&self, now: NaiveDateTime) -> NaiveDate {
        (now - Duration::days(i64::from(self.lookback_days))).date()
    }

    fn admits(&self, event: &JobStepEvent, cutoff: NaiveDate) -> bool {
        let recent = event.run_date().map_or(false, |date| date >= cutoff);
        let status = !self.failures_only || event.status() == RunStatus::Failed;
        recent && status
    }
}

/// Latest known state of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub key: JobKey,
    pub job_name: String,
    /// The most recent job outcome record, if the job ever completed a run.
    pub outcome: Option<JobStepEvent>,
    /// Position of the outcome before `outcome`, bounding the run window from below.
    pub previous_position: Option<i64>,
    /// Rows in `(previous_position, outcome.position]` admitted by the `JobWindow`,
    /// ordered by step and then position.
    pub details: Vec<JobStepEvent>,
}

impl JobSnapshot {
    /// Whether `position` falls within this snapshot's run window.
    pub fn in_run(&self, position: i64) -> bool {
        let Some(outcome) = &self.outcome else {
            return false;
        };
        self.previous_position.map_or(true, |prev| position > prev) && position <= outcome.position
    }
}

/// Reduces an instance's job history into one snapshot per job.
///
/// Within each job, outcome records are ranked by position descending: the
/// first is the current outcome and the second (if any) bounds the run window.
/// A job with no outcome record yet still yields a snapshot, with no outcome
/// and no details. Snapshots are ordered by job name.
pub fn reduce_jobs(
    events: impl IntoIterator<Item = JobStepEvent>,
    now: NaiveDateTime,
    window: &JobWindow,
) -> Vec<JobSnapshot> {
    let mut partitions: BTreeMap<JobKey, Vec<JobStepEvent>> = BTreeMap::new();
    for event in events {
        let key = JobKey {
            job_id: event.job_id.clone(),
        };
        partitions.entry(key).or_default().push(event);
    }

    let cutoff = window.cutoff(now);

    partitions
        .into_iter()
        .map(|(key, events)| reduce_job(key, events, window, cutoff))
        .sorted_by(|lhs, rhs| {
            (&lhs.job_name, &lhs.key).cmp(&(&rhs.job_name, &rhs.key))
        })
        .collect()
}

fn reduce_job(
    key: JobKey,
    events: Vec<JobStepEvent>,
    window: &JobWindow,
    cutoff: NaiveDate,
) -> JobSnapshot {
    let (outcome, previous_position) = {
        let mut outcomes = events
            .iter()
            .filter(|e| e.is_outcome())
            .sorted_by(|lhs, rhs| rhs.position.cmp(&lhs.position));
        (outcomes.next().cloned(), outcomes.next().map(|e| e.position))
    };

    // Every row of a job carries the same name.
    let job_name = events
        .first()
        .map(|e| e.job_name.clone())
        .unwrap_or_default();

    let mut snapshot = JobSnapshot {
        key,
        job_name,
        outcome,
        previous_position,
        details: Vec::new(),
    };

    snapshot.details = events
        .into_iter()
        .filter(|e| snapshot.in_run(e.position) && window.admits(e, cutoff))
        .sorted_by_key(|e| (e.step_id, e.position))
        .collect();

    snapshot
}
