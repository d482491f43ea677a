use crate::source::HistorySession;
use chrono::{NaiveDate, NaiveTime};
use msdb_history::{convert, reduce_jobs, JobSnapshot, JobWindow, RunStatus};
use report::{Cell, Column, Highlight, ReportRow};

pub const REPORT: &str = "JOBS";
pub const TITLE: &str = "SQL Agent Jobs (Latest Run)";

/// One step of a job's latest run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub job_name: String,
    pub step_id: i32,
    pub step_name: String,
    pub run_date: Option<NaiveDate>,
    pub run_time: Option<NaiveTime>,
    pub step_duration: Option<String>,
    pub run_status: RunStatus,
    pub sql_severity: i32,
    pub sql_message_id: i32,
    pub message: Option<String>,
}

impl ReportRow for JobRow {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("JobName"),
            Column::new("step_id"),
            Column::new("step_name"),
            Column::new("RunDate"),
            Column::new("RunTime"),
            Column::new("StepDuration"),
            Column::new("RunStatus"),
            Column::new("sql_severity"),
            Column::new("sql_message_id"),
            Column::wrapped("message"),
        ]
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.job_name.as_str().into(),
            self.step_id.into(),
            self.step_name.as_str().into(),
            self.run_date.into(),
            self.run_time
                .map(|time| time.format("%H:%M:%S").to_string())
                .into(),
            self.step_duration.clone().into(),
            self.run_status.as_str().into(),
            self.sql_severity.into(),
            self.sql_message_id.into(),
            self.message.clone().into(),
        ]
    }
}

pub fn highlight() -> Highlight {
    Highlight::new("RunStatus", RunStatus::Failed.as_str())
}

/// Name of the jobs workbook for a run on `date`.
pub fn artifact_name(window: &JobWindow, date: NaiveDate) -> String {
    let scope = if window.failures_only { "Failed_" } else { "" };
    format!(
        "JobSteps_{scope}{}days_{}.xlsx",
        window.lookback_days,
        date.format("%Y-%m-%d")
    )
}

/// Flattens the detail rows of each snapshot, in snapshot order.
pub fn job_rows(snapshots: Vec<JobSnapshot>) -> Vec<JobRow> {
    snapshots
        .into_iter()
        .flat_map(|snapshot| {
            let job_name = snapshot.job_name;
            snapshot.details.into_iter().map(move |step| JobRow {
                job_name: job_name.clone(),
                step_id: step.step_id,
                step_name: step.display_step_name().into_owned(),
                run_date: step.run_date(),
                run_time: convert::msdb_time(step.run_time),
                step_duration: convert::msdb_duration(step.run_duration),
                run_status: step.status(),
                sql_severity: step.sql_severity,
                sql_message_id: step.sql_message_id,
                message: step.message,
            })
        })
        .collect()
}

/// Reads job history from `session` and reduces it to report rows, windowed
/// against the instance's own clock.
pub fn fetch_job_rows(
    session: &mut dyn HistorySession,
    window: &JobWindow,
) -> anyhow::Result<Vec<JobRow>> {
    let now = session.server_time()?;
    let events = session.job_history()?;
    tracing::debug!(events = events.len(), %now, "reducing job history");

    Ok(job_rows(reduce_jobs(events, now, window)))
}

#[cfg(test)]
mod test {
    use super::*;
    use msdb_history::JobStepEvent;
    use pretty_assertions::assert_eq;

    fn event(position: i64, step_id: i32, run_status: i32) -> JobStepEvent {
        JobStepEvent {
            job_id: "6d1f0b2c".to_string(),
            job_name: "Nightly ETL".to_string(),
            position,
            step_id,
            step_name: None,
            run_date: 20240318,
            run_time: 23015,
            run_duration: 1002003,
            run_status,
            sql_severity: 16,
            sql_message_id: 50000,
            message: Some("The step failed.".to_string()),
        }
    }

    #[test]
    fn rows_carry_derived_fields() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 20)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let events = vec![event(10, 1, 0), event(11, 2, 1), event(12, 0, 0)];

        let rows = job_rows(reduce_jobs(events, now, &JobWindow::default()));
        assert_eq!(
            rows,
            vec![
                JobRow {
                    job_name: "Nightly ETL".to_string(),
                    step_id: 0,
                    step_name: "(Job Outcome)".to_string(),
                    run_date: NaiveDate::from_ymd_opt(2024, 3, 18),
                    run_time: NaiveTime::from_hms_opt(2, 30, 15),
                    step_duration: Some("100:20:03".to_string()),
                    run_status: RunStatus::Failed,
                    sql_severity: 16,
                    sql_message_id: 50000,
                    message: Some("The step failed.".to_string()),
                },
                JobRow {
                    step_id: 1,
                    step_name: "(No Step Name)".to_string(),
                    ..rows[0].clone()
                },
            ]
        );

        let cells = rows[0].cells();
        assert_eq!(cells.len(), JobRow::columns().len());
        assert_eq!(cells[4], Cell::from("02:30:15"));
        assert_eq!(cells[6], Cell::from("Failed"));
        assert!(highlight().matches(&cells[6]));
    }

    #[test]
    fn artifact_names() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        assert_eq!(
            artifact_name(&JobWindow::default(), date),
            "JobSteps_Failed_15days_2024-03-20.xlsx"
        );
        assert_eq!(
            artifact_name(
                &JobWindow {
                    lookback_days: 3,
                    failures_only: false
                },
                date
            ),
            "JobSteps_3days_2024-03-20.xlsx"
        );
    }
}
