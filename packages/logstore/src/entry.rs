//! Log entry shapes.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Severity levels recorded by the store, mirroring `tracing`'s five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            LogLevel::Error
        } else if *level == tracing::Level::WARN {
            LogLevel::Warn
        } else if *level == tracing::Level::INFO {
            LogLevel::Info
        } else if *level == tracing::Level::DEBUG {
            LogLevel::Debug
        } else {
            LogLevel::Trace
        }
    }
}

/// A log event before insertion, not yet carrying an identifier.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Source tag, usually the `tracing` target (module path).
    pub target: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<i64>,
}

/// One persisted log row.
///
/// Rows are append-only: ordered by timestamp then identifier, mutated
/// only by insertion, removed only by retention.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<i64>,
}
