//! Job request model and status vocabulary.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// What a job should fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTarget {
    /// A creator page on a supported site, resolved against the configured
    /// base URL.
    Creator { service: String, creator_id: String },

    /// A fully-formed URL passed to the tool unchanged.
    Url(String),
}

impl FetchTarget {
    /// Human-readable descriptor pushed to the status sink.
    pub fn describe(&self) -> String {
        match self {
            FetchTarget::Creator {
                service,
                creator_id,
            } => format!("{service}/{creator_id}"),
            FetchTarget::Url(url) => url.clone(),
        }
    }

    /// URL handed to the external tool.
    pub fn to_url(&self, base_url: &str) -> String {
        match self {
            FetchTarget::Creator {
                service,
                creator_id,
            } => format!(
                "{}/{service}/user/{creator_id}",
                base_url.trim_end_matches('/')
            ),
            FetchTarget::Url(url) => url.clone(),
        }
    }
}

/// Session credentials forwarded to the external tool.
///
/// A raw cookie string is materialized as a Netscape cookie-jar file for
/// the duration of the job; a login pair is passed on the command line and
/// never touches disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Raw `name=value; name2=value2` session cookie string
    Cookies(String),

    /// Site login pair
    Login { username: String, password: String },
}

/// Where the fetched artifacts go after a clean exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct UploadTarget {
    /// Registry name of the backend to dispatch to.
    pub backend: String,

    /// Destination path in the backend's namespace.
    pub path: String,

    /// Backend-specific parameters, passed through opaquely.
    #[builder(default)]
    pub params: HashMap<String, String>,
}

/// One fetch request, as submitted to the runtime.
///
/// The identifier is caller-supplied and must be unique per in-flight
/// job: it names the workspace directory, the transcript file, and the
/// status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct JobRequest {
    pub id: String,

    pub target: FetchTarget,

    pub upload: UploadTarget,

    #[builder(default, setter(strip_option))]
    pub credentials: Option<Credentials>,
}

/// Lifecycle states in wire form (lowercase) for the status sink.
///
/// Transitions are monotonic: `pending → running → {uploading →
/// completed | failed}` or `running → failed`. There are no backward
/// transitions and `running` is never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Uploading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// True once the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
