//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that drive the job runtime
//! without real upload backends or external tools. The in-memory status
//! sink lives in [`crate::status`] since it doubles as a development
//! implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::UploadError;
use crate::upload::{UploadInfo, Uploader};

/// Record of a call made to the mock uploader.
#[derive(Debug, Clone)]
pub struct UploadCall {
    pub artifact_dir: PathBuf,
    pub destination: String,
    pub params: HashMap<String, String>,
}

/// A mock upload backend for testing.
///
/// Succeeds by default; can be scripted to fail with a fixed message or
/// return a link. Records every call for assertions.
pub struct MockUploader {
    name: String,
    failure: Option<String>,
    link: Option<String>,
    calls: Arc<RwLock<Vec<UploadCall>>>,
}

impl MockUploader {
    /// Create a mock backend answering to `name`.
    pub fn new(name: impl Into<String>) -> Self {
        MockUploader {
            name: name.into(),
            failure: None,
            link: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Make every upload fail with `message`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Make every upload return `link` in its success descriptor.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.read().unwrap().clone()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(
        &self,
        artifact_dir: &Path,
        destination: &str,
        params: &HashMap<String, String>,
    ) -> Result<UploadInfo, UploadError> {
        self.calls.write().unwrap().push(UploadCall {
            artifact_dir: artifact_dir.to_path_buf(),
            destination: destination.to_string(),
            params: params.clone(),
        });

        if let Some(message) = &self.failure {
            return Err(UploadError::Backend {
                backend: self.name.clone(),
                message: message.clone(),
            });
        }

        Ok(UploadInfo {
            backend: self.name.clone(),
            link: self.link.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_uploader_records_calls() {
        let uploader = MockUploader::new("mega").with_link("https://mega.nz/f/abc");
        let mut params = HashMap::new();
        params.insert("folder".to_string(), "2026".to_string());

        let info = uploader
            .upload(Path::new("/tmp/ws"), "archives/t1", &params)
            .await
            .unwrap();

        assert_eq!(info.link.as_deref(), Some("https://mega.nz/f/abc"));
        let calls = uploader.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].artifact_dir, Path::new("/tmp/ws"));
        assert_eq!(calls[0].params.get("folder").unwrap(), "2026");
    }

    #[tokio::test]
    async fn scripted_failure_is_returned() {
        let uploader = MockUploader::new("mega").with_failure("login rejected");
        let outcome = uploader
            .upload(Path::new("/tmp/ws"), "x", &HashMap::new())
            .await;
        assert!(matches!(outcome, Err(UploadError::Backend { .. })));
        assert_eq!(uploader.calls().len(), 1);
    }
}
