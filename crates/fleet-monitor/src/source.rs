use crate::config::{Credentials, Instance, RunContext};
use anyhow::Context;
use chrono::NaiveDateTime;
use msdb_history::{BackupEvent, JobStepEvent};
use tiberius::{AuthMethod, Client, Config, FromSql, Row, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// Opens sessions against monitored instances.
pub trait HistorySource {
    fn connect(&self, instance: &Instance) -> anyhow::Result<Box<dyn HistorySession>>;
}

/// An open connection to one instance's `msdb`.
/// Dropping the session releases its connection.
pub trait HistorySession {
    /// The instance's own current time, which anchors every reporting window.
    fn server_time(&mut self) -> anyhow::Result<NaiveDateTime>;
    /// Every job history row, joined with its job's name.
    fn job_history(&mut self) -> anyhow::Result<Vec<JobStepEvent>>;
    /// Backup rows started at or after `since`.
    fn backup_history(&mut self, since: NaiveDateTime) -> anyhow::Result<Vec<BackupEvent>>;
}

/// A parsed `host[\instance][,port]` server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub instance: Option<String>,
    pub port: Option<u16>,
}

impl ServerAddress {
    pub fn parse(server: &str) -> anyhow::Result<Self> {
        let (rest, port) = match server.rsplit_once(',') {
            Some((rest, port)) => {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("invalid port in server address {server:?}"))?;
                (rest, Some(port))
            }
            None => (server, None),
        };

        let (host, instance) = match rest.split_once('\\') {
            Some((host, instance)) if !instance.trim().is_empty() => {
                (host, Some(instance.trim().to_string()))
            }
            Some((host, _)) => (host, None),
            None => (rest, None),
        };

        let host = match host.trim() {
            "" => anyhow::bail!("server address {server:?} has no host"),
            "." | "(local)" => "localhost",
            host => host,
        };

        Ok(Self {
            host: host.to_string(),
            instance,
            port,
        })
    }

    /// Named instances without an explicit port are located through the SQL Browser.
    fn uses_browser(&self) -> bool {
        self.instance.is_some() && self.port.is_none()
    }
}

/// Reads job and backup history from SQL Server.
///
/// The history pipeline is synchronous: each session owns a current-thread
/// runtime and blocks on every call.
pub struct SqlServerSource {
    credentials: Credentials,
    trust_server_certificate: bool,
}

impl SqlServerSource {
    pub fn new(ctx: &RunContext) -> Self {
        Self {
            credentials: ctx.credentials.clone(),
            trust_server_certificate: ctx.settings.trust_server_certificate,
        }
    }

    fn config(&self, address: &ServerAddress) -> anyhow::Result<Config> {
        let mut config = Config::new();
        config.host(&address.host);
        if let Some(port) = address.port {
            config.port(port);
        }
        if let Some(instance) = &address.instance {
            config.instance_name(instance);
        }
        config.database("msdb");
        config.application_name("fleet-monitor");

        if self.trust_server_certificate {
            config.trust_cert();
        }

        match &self.credentials {
            Credentials::Sql { user, password } => {
                config.authentication(AuthMethod::sql_server(user, password));
            }
            #[cfg(windows)]
            Credentials::Trusted => {
                config.authentication(AuthMethod::Integrated);
            }
            #[cfg(not(windows))]
            Credentials::Trusted => {
                anyhow::bail!("trusted authentication is only supported on Windows")
            }
        }
        Ok(config)
    }
}

impl HistorySource for SqlServerSource {
    fn connect(&self, instance: &Instance) -> anyhow::Result<Box<dyn HistorySession>> {
        let address = ServerAddress::parse(&instance.server)?;
        let config = self.config(&address)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start runtime")?;

        let client = runtime
            .block_on(open(config, address.uses_browser()))
            .with_context(|| format!("connecting to {}", instance.server))?;

        tracing::debug!(instance = %instance.label, server = %instance.server, "acquired connection");

        Ok(Box::new(SqlServerSession {
            label: instance.label.clone(),
            runtime,
            client: Some(client),
        }))
    }
}

type SqlClient = Client<Compat<TcpStream>>;

async fn open(config: Config, uses_browser: bool) -> anyhow::Result<SqlClient> {
    let tcp = if uses_browser {
        TcpStream::connect_named(&config).await?
    } else {
        TcpStream::connect(config.get_addr()).await?
    };
    tcp.set_nodelay(true)?;

    Ok(Client::connect(config, tcp.compat_write()).await?)
}

struct SqlServerSession {
    label: String,
    runtime: tokio::runtime::Runtime,
    // Taken when the session is dropped.
    client: Option<SqlClient>,
}

const SERVER_TIME_SQL: &str = "SELECT GETDATE() AS now";

const JOB_HISTORY_SQL: &str = r#"
SELECT
    CONVERT(nvarchar(36), j.job_id) AS job_id,
    j.name AS job_name,
    h.instance_id,
    h.step_id,
    h.step_name,
    h.run_date,
    h.run_time,
    h.run_duration,
    h.run_status,
    h.sql_severity,
    h.sql_message_id,
    h.message
FROM msdb.dbo.sysjobs j
JOIN msdb.dbo.sysjobhistory h
  ON h.job_id = j.job_id
"#;

const BACKUP_HISTORY_SQL: &str = r#"
SELECT
    bs.database_name,
    bs.type AS type_code,
    bs.backup_start_date,
    bs.backup_finish_date,
    CAST(bs.backup_size AS float) AS backup_size,
    bmf.physical_device_name
FROM msdb.dbo.backupset bs
JOIN msdb.dbo.backupmediafamily bmf
  ON bs.media_set_id = bmf.media_set_id
WHERE bs.backup_start_date >= @P1
"#;

impl SqlServerSession {
    fn client(&mut self) -> anyhow::Result<(&tokio::runtime::Runtime, &mut SqlClient)> {
        let client = self.client.as_mut().context("connection already released")?;
        Ok((&self.runtime, client))
    }
}

impl HistorySession for SqlServerSession {
    fn server_time(&mut self) -> anyhow::Result<NaiveDateTime> {
        let (runtime, client) = self.client()?;
        let row = runtime
            .block_on(async { client.simple_query(SERVER_TIME_SQL).await?.into_row().await })
            .context("querying server time")?
            .context("server time query returned no row")?;

        required(&row, "now")
    }

    fn job_history(&mut self) -> anyhow::Result<Vec<JobStepEvent>> {
        let (runtime, client) = self.client()?;
        let rows = runtime
            .block_on(async { client.simple_query(JOB_HISTORY_SQL).await?.into_first_result().await })
            .context("querying job history")?;

        rows.iter().map(job_step_event).collect()
    }

    fn backup_history(&mut self, since: NaiveDateTime) -> anyhow::Result<Vec<BackupEvent>> {
        let (runtime, client) = self.client()?;
        let rows = runtime
            .block_on(async {
                client
                    .query(BACKUP_HISTORY_SQL, &[&since])
                    .await?
                    .into_first_result()
                    .await
            })
            .context("querying backup history")?;

        rows.iter().map(backup_event).collect()
    }
}

impl Drop for SqlServerSession {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        if let Err(error) = self.runtime.block_on(client.close()) {
            tracing::warn!(instance = %self.label, %error, "failed to close connection");
        }
        tracing::debug!(instance = %self.label, "released connection");
    }
}

fn required<'a, R: FromSql<'a>>(row: &'a Row, column: &str) -> anyhow::Result<R> {
    row.try_get::<R, _>(column)
        .with_context(|| format!("reading column {column}"))?
        .with_context(|| format!("column {column} is null"))
}

fn optional_text(row: &Row, column: &str) -> anyhow::Result<Option<String>> {
    let value: Option<&str> = row
        .try_get(column)
        .with_context(|| format!("reading column {column}"))?;
    Ok(value.map(str::to_string))
}

fn job_step_event(row: &Row) -> anyhow::Result<JobStepEvent> {
    Ok(JobStepEvent {
        job_id: required::<&str>(row, "job_id")?.to_string(),
        job_name: required::<&str>(row, "job_name")?.to_string(),
        position: required::<i32>(row, "instance_id")?.into(),
        step_id: required(row, "step_id")?,
        step_name: optional_text(row, "step_name")?,
        run_date: required(row, "run_date")?,
        run_time: required(row, "run_time")?,
        run_duration: required(row, "run_duration")?,
        run_status: required(row, "run_status")?,
        sql_severity: required(row, "sql_severity")?,
        sql_message_id: required(row, "sql_message_id")?,
        message: optional_text(row, "message")?,
    })
}

fn backup_event(row: &Row) -> anyhow::Result<BackupEvent> {
    Ok(BackupEvent {
        database_name: required::<&str>(row, "database_name")?.to_string(),
        type_code: required::<&str>(row, "type_code")?.to_string(),
        backup_start_date: row.try_get("backup_start_date")?,
        backup_finish_date: row.try_get("backup_finish_date")?,
        backup_size: row.try_get("backup_size")?,
        physical_device_name: optional_text(row, "physical_device_name")?,
    })
}
