//! Typed errors for the downloader library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Each seam has its own enum;
//! `JobError` is the umbrella the job state machine catches at its
//! boundary and converts into a `failed` status. Limiter admission has no
//! error type at all: acquiring a slot can only suspend, never fail.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from launching or supervising the external worker process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Executable missing or unspawnable
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Process ran to completion but reported failure
    #[error("process exited with code {code}")]
    Exit { code: i32 },

    /// Capturing the merged output stream or writing the transcript failed
    #[error("output capture failed: {source}")]
    Stream {
        #[source]
        source: io::Error,
    },
}

/// Errors reported by upload backends or the dispatcher itself.
#[derive(Debug, Error)]
pub enum UploadError {
    /// No backend registered under the requested name
    #[error("no upload backend registered under {name:?}")]
    UnknownBackend { name: String },

    /// Backend-reported failure, already human-readable
    #[error("{backend} upload failed: {message}")]
    Backend { backend: String, message: String },
}

/// Errors from the status sink.
#[derive(Debug, Error)]
pub enum StatusError {
    /// Snapshot read or write failed
    #[error("status I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Snapshot could not be serialized
    #[error("status snapshot at {path} could not be encoded: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Invalid configuration value read from the environment.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Umbrella error for one job's prepare/execute/upload phases.
///
/// Never escapes the runtime: `JobRuntime::run` converts it into a
/// `failed` status snapshot plus an `[ERROR]` line in the job transcript.
#[derive(Debug, Error)]
pub enum JobError {
    /// Workspace or credential-file I/O failed
    #[error("workspace I/O failed at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// External process launch or execution failed
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Upload dispatch failed
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Status sink write failed
    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Result type alias for job operations.
pub type Result<T> = std::result::Result<T, JobError>;
