use chrono::{NaiveDate, NaiveDateTime};
use msdb_history::JobWindow;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable holding the SQL login used with `authentication: sql`.
pub const SQL_USER_VAR: &str = "SQL_USER";
/// Environment variable holding the password of `SQL_USER_VAR`.
pub const SQL_PWD_VAR: &str = "SQL_PWD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file {}", path.display())]
    ReadSettings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {}", path.display())]
    ParseSettings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("settings must list at least one instance")]
    NoInstances,
    #[error("email settings must list at least one `to` recipient")]
    NoRecipients,
    #[error("environment file not found: {}", path.display())]
    MissingEnvFile { path: PathBuf },
    #[error("failed to load environment file {}", path.display())]
    LoadEnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("{SQL_USER_VAR}/{SQL_PWD_VAR} are required when authentication is `sql`")]
    MissingCredentials,
    #[error("trusted authentication is only supported on Windows")]
    TrustedUnsupported,
}

/// A monitored server, by display label and address (`host[\instance][,port]`).
/// Labels are free text and need not be unique.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Instance {
    pub label: String,
    pub server: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// SQL login from `SQL_USER` / `SQL_PWD`.
    Sql,
    /// Integrated authentication as the current Windows user.
    Trusted,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobsSettings {
    pub lookback_days: u32,
    pub failures_only: bool,
}

impl Default for JobsSettings {
    fn default() -> Self {
        let JobWindow {
            lookback_days,
            failures_only,
        } = JobWindow::default();
        Self {
            lookback_days,
            failures_only,
        }
    }
}

impl JobsSettings {
    pub fn window(&self) -> JobWindow {
        JobWindow {
            lookback_days: self.lookback_days,
            failures_only: self.failures_only,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupsSettings {
    pub lookback_hours: u32,
}

impl Default for BackupsSettings {
    fn default() -> Self {
        Self { lookback_hours: 24 }
    }
}

impl BackupsSettings {
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lookback_hours))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpSettings {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
}

fn default_smtp_port() -> u16 {
    25
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailSettings {
    pub from: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Instances in reporting order.
    pub instances: Vec<Instance>,
    pub authentication: AuthMode,
    /// Accept the server's certificate without validating it.
    #[serde(default)]
    pub trust_server_certificate: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub jobs: JobsSettings,
    #[serde(default)]
    pub backups: BackupsSettings,
    pub smtp: SmtpSettings,
    pub email: EmailSettings,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Settings {
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            serde_yaml::from_str(content).map_err(|source| ConfigError::ParseSettings {
                path: path.to_owned(),
                source,
            })?;

        if settings.instances.is_empty() {
            return Err(ConfigError::NoInstances);
        }
        if settings.email.to.is_empty() {
            return Err(ConfigError::NoRecipients);
        }
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadSettings {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(path, &content)
    }
}

/// How each instance is logged into.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Trusted,
    Sql { user: String, password: String },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Trusted => f.write_str("Trusted"),
            Credentials::Sql { user, .. } => f
                .debug_struct("Sql")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

impl Credentials {
    /// Loads `env_file` into the process environment, overriding variables
    /// already set, and resolves credentials for `mode` from it.
    /// The file must exist even when `mode` doesn't need it.
    pub fn load(mode: AuthMode, env_file: &Path) -> Result<Self, ConfigError> {
        if !env_file.is_file() {
            return Err(ConfigError::MissingEnvFile {
                path: env_file.to_owned(),
            });
        }
        dotenvy::from_path_override(env_file).map_err(|source| ConfigError::LoadEnvFile {
            path: env_file.to_owned(),
            source,
        })?;

        Self::resolve(mode, |name| std::env::var(name).ok())
    }

    /// Resolves credentials for `mode` from variables returned by `lookup`.
    pub fn resolve(
        mode: AuthMode,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        match mode {
            AuthMode::Trusted if cfg!(windows) => Ok(Credentials::Trusted),
            AuthMode::Trusted => Err(ConfigError::TrustedUnsupported),
            AuthMode::Sql => {
                let non_empty = |name| lookup(name).filter(|value| !value.is_empty());
                match (non_empty(SQL_USER_VAR), non_empty(SQL_PWD_VAR)) {
                    (Some(user), Some(password)) => Ok(Credentials::Sql { user, password }),
                    _ => Err(ConfigError::MissingCredentials),
                }
            }
        }
    }
}

/// Everything one run of the monitor works from.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub settings: Settings,
    pub credentials: Credentials,
    /// Local time the run started.
    pub evaluated_at: NaiveDateTime,
    /// Date stamped into artifact names and the email.
    pub report_date: NaiveDate,
}

impl RunContext {
    pub fn new(settings: Settings, credentials: Credentials, evaluated_at: NaiveDateTime) -> Self {
        Self {
            settings,
            credentials,
            evaluated_at,
            report_date: evaluated_at.date(),
        }
    }

    /// Loads settings from `config`, then credentials from `env_file`, which
    /// defaults to `.env` beside `config`.
    pub fn load(config: &Path, env_file: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = Settings::load(config)?;

        let env_file = match env_file {
            Some(path) => path.to_owned(),
            None => config
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(".env"),
        };
        let credentials = Credentials::load(settings.authentication, &env_file)?;

        tracing::debug!(
            config = %config.display(),
            env_file = %env_file.display(),
            instances = settings.instances.len(),
            "loaded configuration"
        );
        Ok(Self::new(
            settings,
            credentials,
            chrono::Local::now().naive_local(),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const SETTINGS: &str = r#"
instances:
  - label: Primary
    server: 'sqlhost\INST1'
  - label: Reporting
    server: 'sqlhost2,1533'
authentication: sql
trust_server_certificate: true
output_dir: ./out
jobs:
  lookback_days: 7
smtp:
  server: mail.local
email:
  from: monitor@example.com
  to: [dba@example.com]
  bcc: [audit@example.com]
"#;

    #[test]
    fn parses_settings_with_defaults() {
        let settings = Settings::parse(Path::new("monitor.yaml"), SETTINGS).unwrap();

        assert_eq!(
            settings.instances,
            vec![
                Instance {
                    label: "Primary".to_string(),
                    server: r"sqlhost\INST1".to_string(),
                },
                Instance {
                    label: "Reporting".to_string(),
                    server: "sqlhost2,1533".to_string(),
                },
            ]
        );
        assert_eq!(settings.authentication, AuthMode::Sql);
        assert!(settings.trust_server_certificate);
        assert_eq!(settings.output_dir, PathBuf::from("./out"));
        assert_eq!(
            settings.jobs.window(),
            JobWindow {
                lookback_days: 7,
                failures_only: true
            }
        );
        assert_eq!(settings.backups.lookback(), chrono::Duration::hours(24));
        assert_eq!(settings.smtp.port, 25);
        assert!(settings.email.cc.is_empty());
        assert_eq!(settings.email.bcc, vec!["audit@example.com"]);
    }

    #[test]
    fn rejects_invalid_settings() {
        let path = Path::new("monitor.yaml");

        let unknown = SETTINGS.replace("trust_server_certificate", "trust_server_cert");
        assert!(matches!(
            Settings::parse(path, &unknown),
            Err(ConfigError::ParseSettings { .. })
        ));

        let no_instances = r#"
instances: []
authentication: trusted
smtp: { server: mail.local }
email: { from: a@example.com, to: [b@example.com] }
"#;
        assert!(matches!(
            Settings::parse(path, no_instances),
            Err(ConfigError::NoInstances)
        ));

        let no_recipients = SETTINGS.replace("[dba@example.com]", "[]");
        assert!(matches!(
            Settings::parse(path, &no_recipients),
            Err(ConfigError::NoRecipients)
        ));
    }

    #[test]
    fn sql_credentials_must_be_present() {
        let env = |user: &'static str, pwd: &'static str| {
            move |name: &str| match name {
                SQL_USER_VAR => Some(user.to_string()),
                SQL_PWD_VAR => Some(pwd.to_string()),
                _ => None,
            }
        };

        let credentials = Credentials::resolve(AuthMode::Sql, env("monitor", "s3cret")).unwrap();
        assert_eq!(
            credentials,
            Credentials::Sql {
                user: "monitor".to_string(),
                password: "s3cret".to_string(),
            }
        );
        assert!(!format!("{credentials:?}").contains("s3cret"));

        assert!(matches!(
            Credentials::resolve(AuthMode::Sql, env("monitor", "")),
            Err(ConfigError::MissingCredentials)
        ));
        assert!(matches!(
            Credentials::resolve(AuthMode::Sql, |_| None),
            Err(ConfigError::MissingCredentials)
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn trusted_requires_windows() {
        assert!(matches!(
            Credentials::resolve(AuthMode::Trusted, |_| None),
            Err(ConfigError::TrustedUnsupported)
        ));
    }

    #[test]
    fn missing_env_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("monitor.yaml");
        std::fs::write(&config, SETTINGS).unwrap();

        let err = RunContext::load(&config, None).unwrap_err();
        assert!(
            matches!(&err, ConfigError::MissingEnvFile { path } if path == &dir.path().join(".env")),
            "{err:?}"
        );
    }

    #[test]
    fn loads_context_from_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("monitor.yaml");
        let env_file = dir.path().join("monitor.env");
        std::fs::write(&config, SETTINGS).unwrap();
        std::fs::write(&env_file, "SQL_USER=monitor\nSQL_PWD=from-file\n").unwrap();

        let ctx = RunContext::load(&config, Some(&env_file)).unwrap();
        assert_eq!(
            ctx.credentials,
            Credentials::Sql {
                user: "monitor".to_string(),
                password: "from-file".to_string(),
            }
        );
        assert_eq!(ctx.report_date, ctx.evaluated_at.date());
    }
}
