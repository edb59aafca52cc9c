//! Download job orchestration engine.
//!
//! Coordinates long-running, externally-executed content-fetch jobs:
//! bounded concurrent admission, subprocess supervision with a streamed
//! transcript, live status snapshots, a single upload dispatch on
//! success, and unconditional cleanup of per-job scratch resources.
//!
//! # Architecture
//!
//! ```text
//! JobRequest ──► JobRuntime::submit (detached task)
//!                     │
//!                     ▼  limiter slot (at most N concurrent)
//!                JobPaths: workspace dir + cookie jar
//!                     │
//!                     ▼
//!                run_supervised ──► transcript file + progress hints
//!                     │ exit 0
//!                     ▼
//!                UploaderRegistry::dispatch (once per success)
//!                     │
//!                     ▼
//!                StatusSink: pending / running / uploading / terminal
//! ```
//!
//! The web layer, persistent configuration, and concrete upload backends
//! live outside this crate; they talk to it through [`JobRuntime`],
//! [`StatusSink`] and [`Uploader`].

pub mod config;
pub mod error;
pub mod job;
pub mod process;
pub mod runtime;
pub mod status;
pub mod testing;
pub mod upload;
pub mod workspace;

pub use config::Config;
pub use error::{ConfigError, JobError, ProcessError, Result, StatusError, UploadError};
pub use job::{Credentials, FetchTarget, JobRequest, JobStatus, UploadTarget};
pub use process::{
    progress_hint, run_supervised, JobLogFile, NoProgress, ProcessInvocation, ProgressListener,
};
pub use runtime::JobRuntime;
pub use status::{FileStatusSink, MemoryStatusSink, StatusEvent, StatusSink, StatusUpdate};
pub use upload::{UploadInfo, Uploader, UploaderRegistry};
pub use workspace::{netscape_cookie_jar, JobPaths};
