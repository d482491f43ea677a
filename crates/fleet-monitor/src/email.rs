use crate::config::Settings;
use crate::pipeline::ReportSummary;
use anyhow::Context;
use chrono::NaiveDate;
use handlebars::Handlebars;
use serde_json::json;

const SUBJECT_TEMPLATE: &str = "report-subject";
const BODY_TEMPLATE: &str = "report-body";

pub fn register_templates<'a>(registry: &mut Handlebars<'a>) -> anyhow::Result<()> {
    registry
        .register_template_string(
            SUBJECT_TEMPLATE,
            r#"DB Monitoring Report (Jobs + Backups) – {{date}}"#,
        )
        .context("registering report-subject template")?;

    registry
        .register_template_string(
            BODY_TEMPLATE,
            r#"<html>
  <body style="font-family: Arial, Helvetica, sans-serif; font-size: 13px; color:#000;">
    <p><b>Attached are today's automated DB monitoring reports ({{date}}).</b></p>

    <p>
      This report consolidates monitoring of <b>SQL Agent jobs</b> and <b>SQL Server backups</b>
      across all configured instances, so that issues are caught early without checking
      Job History and backup logs by hand.
    </p>

    <hr>

    <p><b>Report 1: SQL Agent Jobs (Latest Run)</b></p>
    <ul>
      <li>Latest run of each job, limited to the last {{jobs.lookback_days}} days{{#if jobs.failures_only}}, showing <b>failed</b> steps and job outcomes only{{/if}}.</li>
      <li>Key columns:
        <ul>
          <li><b>Instance</b>, <b>JobName</b>: where the job ran</li>
          <li><b>RunStatus</b>: Succeeded/Failed/Retry/Canceled</li>
          <li><b>StepDuration</b>: HH:MM:SS</li>
          <li><b>message</b>: SQL Agent message or error</li>
        </ul>
      </li>
    </ul>

    <p><b>Report 2: Backup Status (Last {{backups.lookback_hours}} Hours)</b></p>
    <ul>
      <li>Latest backup per database and type (<b>Full/Differential/Log</b>) started within the last {{backups.lookback_hours}} hours.</li>
      <li>Includes <b>backup size</b> and <b>backup path</b> for validation.</li>
      <li>Key columns: <b>backup_status</b>, <b>physical_device_name</b>, <b>backup_size_gb</b>.</li>
    </ul>

    <p><b>Collection summary</b></p>
    <ul>
    {{#each reports}}
      <li><b>{{title}}</b> ({{file_name}}): {{instances}} instance(s) reporting, {{rows}} row(s), {{highlighted}} highlighted.
      {{#if skipped}}
        <ul>
        {{#each skipped}}
          <li>Skipped {{label}} ({{server}}): {{reason}}</li>
        {{/each}}
        </ul>
      {{/if}}
      </li>
    {{/each}}
    </ul>

    <p><b>Color Legend</b></p>
    <ul>
      <li><span style="color:#9C0006;"><b>Red rows</b></span> require review:
        <ul>
          <li>a job failed at a step or at its outcome, or</li>
          <li>a backup failed or never finished within the window.</li>
        </ul>
      </li>
    </ul>

    <p><b>Recommended Actions (when you see red rows)</b></p>
    <ul>
      <li><b>Jobs:</b> open Job History for the job/step, review the message column, validate connectivity, credentials and disk space, and rerun if appropriate.</li>
      <li><b>Backups:</b> confirm the backup destination is available, check the SQL Agent backup jobs, verify disk space, and rerun backups if needed.</li>
      <li>When escalating, reply with <b>Instance + JobName</b> (jobs) or <b>Instance + Database + Backup Type</b> (backups).</li>
    </ul>
  </body>
</html>"#,
        )
        .context("registering report-body template")?;

    Ok(())
}

/// Renders the subject and HTML body announcing `reports`.
pub fn compose(
    settings: &Settings,
    date: NaiveDate,
    reports: &[ReportSummary],
) -> anyhow::Result<(String, String)> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    register_templates(&mut registry)?;

    let reports = reports
        .iter()
        .map(|report| {
            let skipped = report
                .skipped
                .iter()
                .map(|skipped| {
                    json!({
                        "label": skipped.label,
                        "server": skipped.server,
                        "reason": skipped.reason.to_string(),
                    })
                })
                .collect::<Vec<_>>();

            json!({
                "title": report.title,
                "file_name": report.file_name,
                "instances": report.instances,
                "rows": report.rows,
                "highlighted": report.highlighted,
                "skipped": skipped,
            })
        })
        .collect::<Vec<_>>();

    let data = json!({
        "date": date.format("%Y-%m-%d").to_string(),
        "jobs": {
            "lookback_days": settings.jobs.lookback_days,
            "failures_only": settings.jobs.failures_only,
        },
        "backups": {
            "lookback_hours": settings.backups.lookback_hours,
        },
        "reports": reports,
    });

    let subject = registry
        .render(SUBJECT_TEMPLATE, &data)
        .context("rendering email subject")?;
    let body = registry
        .render(BODY_TEMPLATE, &data)
        .context("rendering email body")?;

    Ok((subject, body))
}
