//! Per-job scratch resources.
//!
//! Each job exclusively owns a workspace directory the external tool
//! writes artifacts into, an optional cookie-jar credential file, and a
//! transcript file. Workspace and cookie jar are removed on every exit
//! path before the job's limiter slot is released; the transcript and
//! status snapshot survive for observers.

use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::Config;
use crate::error::JobError;

/// Sites the cookie jar rows are written for.
const COOKIE_DOMAINS: [&str; 2] = [".kemono.cr", ".coomer.su"];

/// Paths owned by exactly one job for the duration of `run`.
#[derive(Debug, Clone)]
pub struct JobPaths {
    job_id: String,
    workspace: PathBuf,
    cookie_jar: PathBuf,
    transcript: PathBuf,
}

impl JobPaths {
    pub fn new(config: &Config, job_id: &str) -> Self {
        JobPaths {
            job_id: job_id.to_string(),
            workspace: config.downloads_dir.join(job_id),
            cookie_jar: config.downloads_dir.join(format!("{job_id}.cookies")),
            transcript: config.status_dir.join(format!("{job_id}.log")),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn cookie_jar(&self) -> &Path {
        &self.cookie_jar
    }

    pub fn transcript(&self) -> &Path {
        &self.transcript
    }

    /// Creates the workspace directory tree, parents included.
    pub async fn create_workspace(&self) -> Result<(), JobError> {
        tokio::fs::create_dir_all(&self.workspace)
            .await
            .map_err(|source| JobError::Workspace {
                path: self.workspace.clone(),
                source,
            })
    }

    /// Materializes the credential artifact from a raw session string.
    pub async fn write_cookie_jar(&self, raw_cookies: &str) -> Result<(), JobError> {
        tokio::fs::write(&self.cookie_jar, netscape_cookie_jar(raw_cookies))
            .await
            .map_err(|source| JobError::Workspace {
                path: self.cookie_jar.clone(),
                source,
            })
    }

    /// Removes the cookie jar and the workspace directory.
    ///
    /// Runs on every exit path. Failures are logged and swallowed so they
    /// cannot mask the job's terminal status; an already-absent path is
    /// not a failure.
    pub async fn cleanup(&self) {
        match tokio::fs::remove_file(&self.cookie_jar).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                job_id = %self.job_id,
                path = %self.cookie_jar.display(),
                error = %err,
                "failed to remove cookie jar"
            ),
        }
        match tokio::fs::remove_dir_all(&self.workspace).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                job_id = %self.job_id,
                path = %self.workspace.display(),
                error = %err,
                "failed to remove workspace"
            ),
        }
    }
}

/// Renders a raw `name=value; name2=value2` session string as a Netscape
/// cookie-jar file body, one row per supported site domain.
pub fn netscape_cookie_jar(raw_cookies: &str) -> String {
    let mut jar = String::new();
    jar.push_str("# Netscape HTTP Cookie File\n");
    jar.push_str("# This is a generated file! Do not edit.\n\n");
    for pair in raw_cookies.split(';') {
        let pair = pair.trim();
        if let Some((name, value)) = pair.split_once('=') {
            for domain in COOKIE_DOMAINS {
                jar.push_str(&format!("{domain}\tTRUE\t/\tFALSE\t0\t{name}\t{value}\n"));
            }
        }
    }
    jar
}
