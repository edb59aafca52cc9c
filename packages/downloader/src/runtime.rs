//! Job runtime: admission control plus the per-job state machine.
//!
//! One `JobRuntime` owns the limiter semaphore, the status sink, and the
//! upload registry. `submit` spawns a detached task per job; everything a
//! job does afterwards is observable only through the status sink and its
//! transcript file, never through a return value.
//!
//! # Lifecycle
//!
//! ```text
//! submit ─► pending ─► [slot] ─► running ─► uploading ─► completed
//!                                   │            │
//!                                   └────────────┴──────► failed
//! ```
//!
//! Whatever path a job takes, its cookie jar and workspace are removed
//! and its limiter slot is released before the task finishes.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use downloader::{Config, FileStatusSink, JobRequest, JobRuntime, UploaderRegistry};
//!
//! let config = Config::from_env()?;
//! let sink = Arc::new(FileStatusSink::new(&config.status_dir));
//! let registry = UploaderRegistry::new().register("mega", mega_backend);
//! let runtime = Arc::new(JobRuntime::new(config, sink, registry));
//!
//! runtime.submit(job); // returns immediately; poll the sink for status
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{JobError, Result};
use crate::job::{Credentials, JobRequest, JobStatus};
use crate::process::{run_supervised, JobLogFile, ProcessInvocation, ProgressListener};
use crate::status::{StatusSink, StatusUpdate};
use crate::upload::UploaderRegistry;
use crate::workspace::JobPaths;

/// Orchestrates admitted jobs against a fixed concurrency budget.
pub struct JobRuntime {
    config: Config,
    limiter: Arc<Semaphore>,
    sink: Arc<dyn StatusSink>,
    uploaders: UploaderRegistry,
}

impl JobRuntime {
    pub fn new(config: Config, sink: Arc<dyn StatusSink>, uploaders: UploaderRegistry) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        JobRuntime {
            config,
            limiter,
            sink,
            uploaders,
        }
    }

    /// Limiter slots currently free.
    pub fn available_slots(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Fire-and-forget submission.
    ///
    /// Spawns a detached task and returns immediately; the handle may be
    /// dropped. Status must be polled through the sink.
    pub fn submit(self: &Arc<Self>, job: JobRequest) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        tokio::spawn(async move { runtime.run(job).await })
    }

    /// Runs one job to a terminal status.
    ///
    /// Never returns an error: every failure is converted into a `failed`
    /// snapshot plus an `[ERROR]` transcript line. Cleanup of the cookie
    /// jar and workspace runs unconditionally, and the limiter slot is
    /// released only after cleanup finishes.
    pub async fn run(&self, job: JobRequest) {
        let job_id = job.id.clone();
        if let Err(err) = self
            .sink
            .set_status(
                &job_id,
                StatusUpdate::status(JobStatus::Pending)
                    .target(job.target.describe())
                    .into_fields(),
            )
            .await
        {
            warn!(job_id = %job_id, error = %err, "failed to record pending status");
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("limiter semaphore is never closed");
        info!(job_id = %job_id, target = %job.target.describe(), "job admitted");

        let paths = JobPaths::new(&self.config, &job_id);
        match self.execute(&job, &paths).await {
            Ok(()) => info!(job_id = %job_id, "job completed"),
            Err(err) => {
                error!(job_id = %job_id, error = %err, "job failed");
                self.record_failure(&job_id, &paths, &err).await;
            }
        }

        paths.cleanup().await;
    }

    /// Prepare → execute → upload. Any error unwinds to `run`, which owns
    /// failure recording and cleanup.
    async fn execute(&self, job: &JobRequest, paths: &JobPaths) -> Result<()> {
        paths.create_workspace().await?;
        self.sink
            .set_status(
                &job.id,
                StatusUpdate::status(JobStatus::Running)
                    .target(job.target.describe())
                    .into_fields(),
            )
            .await?;

        if let Some(Credentials::Cookies(raw)) = &job.credentials {
            paths.write_cookie_jar(raw).await?;
        }

        let mut log = JobLogFile::open(paths.transcript())
            .await
            .map_err(|source| JobError::Workspace {
                path: paths.transcript().to_path_buf(),
                source,
            })?;

        let invocation = self.build_invocation(job, paths);
        let listener = SinkProgress {
            sink: self.sink.as_ref(),
            job_id: &job.id,
        };
        run_supervised(&invocation, &mut log, &listener).await?;

        self.sink
            .set_status(&job.id, StatusUpdate::status(JobStatus::Uploading).into_fields())
            .await?;
        if let Err(err) = log.append_line("\nDownload complete. Starting upload...").await {
            warn!(job_id = %job.id, error = %err, "failed to append transcript marker");
        }

        let upload = &job.upload;
        let info = self
            .uploaders
            .dispatch(&upload.backend, paths.workspace(), &upload.path, &upload.params)
            .await?;

        let note = match &info.link {
            Some(link) => format!("Upload complete: {link}"),
            None => "Upload complete.".to_string(),
        };
        if let Err(err) = log.append_line(&note).await {
            warn!(job_id = %job.id, error = %err, "failed to append transcript marker");
        }

        self.sink
            .set_status(&job.id, StatusUpdate::status(JobStatus::Completed).into_fields())
            .await?;
        Ok(())
    }

    /// Converts an error into the `failed` snapshot and transcript marker.
    /// Both writes are best-effort; a sink or file failure here is logged
    /// and cannot mask the original error.
    async fn record_failure(&self, job_id: &str, paths: &JobPaths, err: &JobError) {
        let message = err.to_string();
        if let Err(sink_err) = self
            .sink
            .set_status(
                job_id,
                StatusUpdate::status(JobStatus::Failed)
                    .error(&message)
                    .into_fields(),
            )
            .await
        {
            warn!(job_id = %job_id, error = %sink_err, "failed to record failed status");
        }

        match JobLogFile::open(paths.transcript()).await {
            Ok(mut log) => {
                if let Err(io_err) = log.append_line(&format!("\n[ERROR] {message}")).await {
                    warn!(job_id = %job_id, error = %io_err, "failed to append error marker");
                }
            }
            Err(io_err) => {
                warn!(job_id = %job_id, error = %io_err, "failed to open transcript for error marker");
            }
        }
    }

    /// Tool command line: configured tool, workspace path, resolved URL,
    /// output template, then credential flags.
    fn build_invocation(&self, job: &JobRequest, paths: &JobPaths) -> ProcessInvocation {
        let mut tool = self.config.tool_command.iter();
        let program = tool
            .next()
            .cloned()
            .unwrap_or_else(|| "kemono-dl".to_string());

        let mut invocation = ProcessInvocation::new(program, paths.workspace())
            .args(tool.cloned())
            .arg("--path")
            .arg(paths.workspace().display().to_string())
            .arg(job.target.to_url(&self.config.base_url))
            .arg("--output")
            .arg(self.config.output_template.as_str());

        match &job.credentials {
            Some(Credentials::Cookies(_)) => {
                invocation = invocation
                    .arg("--cookies")
                    .arg(paths.cookie_jar().display().to_string());
            }
            Some(Credentials::Login { username, password }) => {
                invocation = invocation
                    .arg("--kemono-login")
                    .arg(username.as_str())
                    .arg(password.as_str());
            }
            None => {}
        }
        invocation
    }
}

/// Forwards supervisor progress hints into the status sink.
struct SinkProgress<'a> {
    sink: &'a dyn StatusSink,
    job_id: &'a str,
}

#[async_trait]
impl ProgressListener for SinkProgress<'_> {
    async fn on_progress(&self, text: &str) {
        if let Err(err) = self
            .sink
            .set_status(self.job_id, StatusUpdate::progress(text).into_fields())
            .await
        {
            warn!(job_id = %self.job_id, error = %err, "failed to record progress");
        }
    }
}
