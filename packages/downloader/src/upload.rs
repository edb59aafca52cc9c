//! Upload dispatch.
//!
//! Concrete cloud backends live outside this crate; each one plugs in
//! behind the [`Uploader`] trait and is selected by name through the
//! [`UploaderRegistry`]. The runtime dispatches exactly once per
//! successful job. Backends report every outcome as a typed success or
//! failure; panicking through this seam is a bug.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Success descriptor returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    /// Backend that performed the upload.
    pub backend: String,

    /// Public or backend-internal link to the uploaded artifacts, when the
    /// backend produces one.
    pub link: Option<String>,
}

/// One upload backend.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Uploads the artifact directory to `destination`.
    async fn upload(
        &self,
        artifact_dir: &Path,
        destination: &str,
        params: &HashMap<String, String>,
    ) -> Result<UploadInfo, UploadError>;
}

/// Name → backend table consulted once per successful job.
#[derive(Clone, Default)]
pub struct UploaderRegistry {
    backends: HashMap<String, Arc<dyn Uploader>>,
}

impl UploaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under `name`, replacing any previous entry.
    pub fn register(mut self, name: impl Into<String>, uploader: Arc<dyn Uploader>) -> Self {
        self.backends.insert(name.into(), uploader);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered backend names, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Dispatches to the named backend.
    pub async fn dispatch(
        &self,
        name: &str,
        artifact_dir: &Path,
        destination: &str,
        params: &HashMap<String, String>,
    ) -> Result<UploadInfo, UploadError> {
        let backend = self
            .backends
            .get(name)
            .ok_or_else(|| UploadError::UnknownBackend {
                name: name.to_string(),
            })?;
        backend.upload(artifact_dir, destination, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockUploader;

    #[tokio::test]
    async fn dispatch_reaches_the_named_backend() {
        let mega = Arc::new(MockUploader::new("mega"));
        let registry = UploaderRegistry::new().register("mega", mega.clone());

        let info = registry
            .dispatch("mega", Path::new("/tmp/ws"), "archives/t1", &HashMap::new())
            .await
            .unwrap();

        assert_eq!(info.backend, "mega");
        assert_eq!(mega.calls().len(), 1);
        assert_eq!(mega.calls()[0].destination, "archives/t1");
    }

    #[test]
    fn registry_reports_registered_backends() {
        let registry = UploaderRegistry::new()
            .register("mega", Arc::new(MockUploader::new("mega")))
            .register("gdrive", Arc::new(MockUploader::new("gdrive")));

        assert!(registry.contains("mega"));
        assert!(!registry.contains("s3"));

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["gdrive", "mega"]);
    }

    #[tokio::test]
    async fn unknown_backend_is_a_typed_error() {
        let registry = UploaderRegistry::new();
        let outcome = registry
            .dispatch("gdrive", Path::new("/tmp/ws"), "x", &HashMap::new())
            .await;

        match outcome {
            Err(UploadError::UnknownBackend { name }) => assert_eq!(name, "gdrive"),
            other => panic!("expected unknown backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn backend_failures_pass_through_typed() {
        let failing = Arc::new(MockUploader::new("mega").with_failure("quota exceeded"));
        let registry = UploaderRegistry::new().register("mega", failing);

        let outcome = registry
            .dispatch("mega", Path::new("/tmp/ws"), "x", &HashMap::new())
            .await;

        match outcome {
            Err(UploadError::Backend { backend, message }) => {
                assert_eq!(backend, "mega");
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }
}
