//! Typed errors for the log store.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Callers running
//! retention on a schedule are expected to log and swallow these:
//! housekeeping is best-effort and must never take the scheduler down.

use thiserror::Error;

/// Errors from the SQLite-backed log store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connecting to the database failed
    #[error("failed to open log store at {url}: {source}")]
    Open {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    /// Insert, count, measure, or eviction query failed
    #[error("log store query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Stored row holds a timestamp this build cannot parse
    #[error("log row {id} has an unreadable timestamp: {value:?}")]
    CorruptTimestamp { id: i64, value: String },
}

/// Errors from wiring the retention cron job.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("retention scheduler failed: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
