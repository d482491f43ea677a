use serde::Serialize;
use std::fmt;

/// Outcome of a SQL Agent job step, as recorded in `sysjobhistory.run_status`.
///
/// Mapping from the raw code is total: any code msdb may add in the future
/// becomes `Unknown` rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RunStatus {
    Failed,
    Succeeded,
    Retry,
    Canceled,
    InProgress,
    Unknown,
}

impl RunStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => RunStatus::Failed,
            1 => RunStatus::Succeeded,
            2 => RunStatus::Retry,
            3 => RunStatus::Canceled,
            4 => RunStatus::InProgress,
            _ => RunStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Failed => "Failed",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Retry => "Retry",
            RunStatus::Canceled => "Canceled",
            RunStatus::InProgress => "In Progress",
            RunStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of backup, as recorded in `backupset.type`.
///
/// Codes other than D, I and L (file, partial, ...) are kept verbatim in
/// `Other` so that distinct backup kinds remain distinguishable in reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum BackupType {
    Full,
    Differential,
    Log,
    Other(String),
}

impl BackupType {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "D" => BackupType::Full,
            "I" => BackupType::Differential,
            "L" => BackupType::Log,
            other => BackupType::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            BackupType::Full => "Full",
            BackupType::Differential => "Differential",
            BackupType::Log => "Log",
            BackupType::Other(code) => code,
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BackupStatus {
    Success,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Success => "SUCCESS",
            BackupStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
