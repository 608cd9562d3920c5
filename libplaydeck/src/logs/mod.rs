//! Live execution logs: entries, filtering, the ingest engine, and the
//! console state (autoscroll, selection, export) built on top of it.

use std::fmt;
use std::str::FromStr;

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

pub mod console;
pub mod engine;
pub mod export;
pub mod filter;

pub use console::{Autoscroll, LogConsole, ScrollPosition, Selection};
pub use engine::{FilterStats, IngestReport, LogEngine, View};
pub use export::{ExportArtifact, ExportError};
pub use filter::{DisplayOptions, LogFilter};

pub type EntryId = u64;

/// Severity levels and structural markers share one flat set; filtering and
/// rendering treat them alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "WARN")]
    Warning,
    Error,
    Critical,
    Task,
    Play,
    Recap,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Task,
        LogLevel::Play,
        LogLevel::Recap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Task => "TASK",
            LogLevel::Play => "PLAY",
            LogLevel::Recap => "RECAP",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level `{0}`")]
pub struct UnknownLevel(String);

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        if upper == "WARN" {
            return Ok(LogLevel::Warning);
        }
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == upper)
            .ok_or_else(|| UnknownLevel(s.to_string()))
    }
}

/// One structured line of execution output. Immutable once built.
#[derive(Getters, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    id: EntryId,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    level: LogLevel,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<Value>,
}

impl LogEntry {
    pub fn new<S: Into<String>>(
        id: EntryId,
        timestamp: OffsetDateTime,
        level: LogLevel,
        message: S,
    ) -> Self {
        Self {
            id,
            timestamp,
            level,
            message: message.into(),
            host: None,
            task: None,
            module: None,
            raw: None,
        }
    }

    pub fn on_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn in_task<S: Into<String>>(mut self, task: S) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn from_module<S: Into<String>>(mut self, module: S) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// A stream anomaly. Only the offending entry is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("duplicate log entry id {0}")]
    DuplicateId(EntryId),
    #[error("malformed log entry: {reason}")]
    Malformed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(Ok(LogLevel::Warning), "warn".parse());
        assert_eq!(Ok(LogLevel::Warning), "WARNING".parse());
        assert_eq!(Ok(LogLevel::Recap), " recap ".parse());
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_entry_decoding() {
        let entry: LogEntry = serde_json::from_value(serde_json::json!({
            "id": 3,
            "timestamp": "2024-03-01T12:00:05Z",
            "level": "WARN",
            "message": "retrying",
            "host": "web-1",
        }))
        .unwrap();
        assert_eq!(LogLevel::Warning, *entry.level());
        assert_eq!(Some("web-1"), entry.host().as_deref());
        assert_eq!(&None, entry.task());
    }
}
