//! Per-job status snapshots.
//!
//! The status sink is the only externally observable surface of a running
//! job besides its transcript: the runtime pushes partial field updates at
//! every phase transition and observers poll `get_status`. Implementations
//! must merge partial updates over the existing snapshot rather than
//! replacing it, so a later `progress` push does not erase the `status`
//! field written earlier.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use crate::error::StatusError;
use crate::job::JobStatus;

/// Snapshot field names shared between writers and observers.
pub mod fields {
    pub const ID: &str = "id";
    pub const STATUS: &str = "status";
    pub const TARGET: &str = "target";
    pub const PROGRESS: &str = "progress";
    pub const ERROR: &str = "error";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

/// A partial field update, built fluently and pushed to a sink.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate(HashMap<String, String>);

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update carrying a lifecycle state.
    pub fn status(status: JobStatus) -> Self {
        Self::new().with(fields::STATUS, status.as_str())
    }

    /// Update carrying only progress text.
    pub fn progress(text: impl Into<String>) -> Self {
        Self::new().with(fields::PROGRESS, text)
    }

    /// Attach a human-readable target descriptor.
    pub fn target(self, descriptor: impl Into<String>) -> Self {
        self.with(fields::TARGET, descriptor)
    }

    /// Attach an error message.
    pub fn error(self, message: impl Into<String>) -> Self {
        self.with(fields::ERROR, message)
    }

    /// Attach an arbitrary field.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn into_fields(self) -> HashMap<String, String> {
        self.0
    }
}

/// Key-value store of per-job status snapshots.
///
/// `set_status` merges the given fields over the job's existing snapshot;
/// unknown jobs are created on first write. Updates pushed by one job are
/// observable in the order they were issued.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_status(
        &self,
        job_id: &str,
        update: HashMap<String, String>,
    ) -> Result<(), StatusError>;

    /// Current snapshot, or `None` for unknown jobs.
    async fn get_status(&self, job_id: &str)
        -> Result<Option<HashMap<String, String>>, StatusError>;
}

// ============================================================================
// File-backed sink
// ============================================================================

/// Status sink storing one JSON object per job under a directory.
///
/// Besides the caller's fields the snapshot carries managed `id`,
/// `created_at` (first write) and `updated_at` (every write) fields. A
/// corrupt snapshot file is treated as absent rather than an error, so a
/// bad write can never wedge a job's status updates.
pub struct FileStatusSink {
    dir: PathBuf,
}

impl FileStatusSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStatusSink { dir: dir.into() }
    }

    fn snapshot_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }

    /// Every stored snapshot, most recently updated first.
    pub async fn all_statuses(&self) -> Result<Vec<HashMap<String, String>>, StatusError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StatusError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| StatusError::Io {
            path: self.dir.clone(),
            source,
        })? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Ok(bytes) = tokio::fs::read(&path).await {
                if let Ok(snapshot) = serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                    snapshots.push(snapshot);
                }
            }
        }

        snapshots.sort_by(|a, b| {
            let a_key = a.get(fields::UPDATED_AT).cloned().unwrap_or_default();
            let b_key = b.get(fields::UPDATED_AT).cloned().unwrap_or_default();
            b_key.cmp(&a_key)
        });
        Ok(snapshots)
    }
}

#[async_trait]
impl StatusSink for FileStatusSink {
    async fn set_status(
        &self,
        job_id: &str,
        update: HashMap<String, String>,
    ) -> Result<(), StatusError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StatusError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.snapshot_path(job_id);
        let mut snapshot: HashMap<String, String> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        };

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        snapshot.insert(fields::ID.to_string(), job_id.to_string());
        snapshot
            .entry(fields::CREATED_AT.to_string())
            .or_insert_with(|| now.clone());
        snapshot.extend(update);
        snapshot.insert(fields::UPDATED_AT.to_string(), now);

        let body =
            serde_json::to_vec_pretty(&snapshot).map_err(|source| StatusError::Encode {
                path: path.clone(),
                source,
            })?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| StatusError::Io { path, source })
    }

    async fn get_status(
        &self,
        job_id: &str,
    ) -> Result<Option<HashMap<String, String>>, StatusError> {
        let path = self.snapshot_path(job_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StatusError::Io { path, source }),
        }
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

/// One recorded `set_status` call, in global arrival order.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub job_id: String,
    pub fields: HashMap<String, String>,
}

#[derive(Default)]
struct SinkState {
    snapshots: HashMap<String, HashMap<String, String>>,
    events: Vec<StatusEvent>,
}

/// In-memory status sink for testing and development.
///
/// Keeps merged snapshots plus the full ordered sequence of updates, so
/// tests can assert both the final state and the transition history. Not
/// suitable for production as data is lost on restart.
#[derive(Default)]
pub struct MemoryStatusSink {
    state: RwLock<SinkState>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every update recorded so far, across all jobs, in arrival order.
    pub fn events(&self) -> Vec<StatusEvent> {
        self.state.read().unwrap().events.clone()
    }

    /// The `status` field values one job pushed, in order.
    pub fn status_sequence(&self, job_id: &str) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .events
            .iter()
            .filter(|event| event.job_id == job_id)
            .filter_map(|event| event.fields.get(fields::STATUS).cloned())
            .collect()
    }
}

#[async_trait]
impl StatusSink for MemoryStatusSink {
    async fn set_status(
        &self,
        job_id: &str,
        update: HashMap<String, String>,
    ) -> Result<(), StatusError> {
        let mut state = self.state.write().unwrap();
        state.events.push(StatusEvent {
            job_id: job_id.to_string(),
            fields: update.clone(),
        });
        state
            .snapshots
            .entry(job_id.to_string())
            .or_default()
            .extend(update);
        Ok(())
    }

    async fn get_status(
        &self,
        job_id: &str,
    ) -> Result<Option<HashMap<String, String>>, StatusError> {
        Ok(self.state.read().unwrap().snapshots.get(job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sink_in(dir: &Path) -> FileStatusSink {
        FileStatusSink::new(dir)
    }

    #[test]
    fn update_builder_collects_fields() {
        let update = StatusUpdate::status(JobStatus::Running)
            .target("patreon/12345")
            .into_fields();
        assert_eq!(update.get(fields::STATUS).unwrap(), "running");
        assert_eq!(update.get(fields::TARGET).unwrap(), "patreon/12345");
    }

    #[tokio::test]
    async fn file_sink_merges_partial_updates() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(tmp.path());

        sink.set_status(
            "t1",
            StatusUpdate::status(JobStatus::Running)
                .target("patreon/1")
                .into_fields(),
        )
        .await
        .unwrap();
        sink.set_status("t1", StatusUpdate::progress("Downloading...").into_fields())
            .await
            .unwrap();

        let snapshot = sink.get_status("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.get(fields::STATUS).unwrap(), "running");
        assert_eq!(snapshot.get(fields::TARGET).unwrap(), "patreon/1");
        assert_eq!(snapshot.get(fields::PROGRESS).unwrap(), "Downloading...");
        assert_eq!(snapshot.get(fields::ID).unwrap(), "t1");
        assert!(snapshot.contains_key(fields::CREATED_AT));
        assert!(snapshot.contains_key(fields::UPDATED_AT));
    }

    #[tokio::test]
    async fn file_sink_treats_corrupt_snapshot_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(tmp.path());
        tokio::fs::write(tmp.path().join("t1.json"), b"{not json")
            .await
            .unwrap();

        assert!(sink.get_status("t1").await.unwrap().is_none());

        // A write over the corrupt file starts a fresh snapshot.
        sink.set_status("t1", StatusUpdate::status(JobStatus::Pending).into_fields())
            .await
            .unwrap();
        let snapshot = sink.get_status("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.get(fields::STATUS).unwrap(), "pending");
    }

    #[tokio::test]
    async fn file_sink_reports_unknown_jobs_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(tmp.path());
        assert!(sink.get_status("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_sink_lists_snapshots_most_recent_first() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = sink_in(tmp.path());

        sink.set_status("a", StatusUpdate::status(JobStatus::Completed).into_fields())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        sink.set_status("b", StatusUpdate::status(JobStatus::Running).into_fields())
            .await
            .unwrap();

        let all = sink.all_statuses().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].get(fields::ID).unwrap(), "b");
        assert_eq!(all[1].get(fields::ID).unwrap(), "a");
    }

    #[tokio::test]
    async fn memory_sink_records_update_order() {
        let sink = MemoryStatusSink::new();
        sink.set_status("t1", StatusUpdate::status(JobStatus::Pending).into_fields())
            .await
            .unwrap();
        sink.set_status("t1", StatusUpdate::status(JobStatus::Running).into_fields())
            .await
            .unwrap();
        sink.set_status("t1", StatusUpdate::status(JobStatus::Failed).into_fields())
            .await
            .unwrap();

        assert_eq!(sink.status_sequence("t1"), vec!["pending", "running", "failed"]);
        let snapshot = sink.get_status("t1").await.unwrap().unwrap();
        assert_eq!(snapshot.get(fields::STATUS).unwrap(), "failed");
    }
}
