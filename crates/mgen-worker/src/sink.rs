//! Final artifact storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info};

use mgen_models::{ContentRef, JobId};

use crate::error::{PipelineError, PipelineResult};

/// Object key for a job artifact: `{prefix}/YYYY/MM/DD/{job_id}.{ext}`.
pub fn artifact_key(prefix: &str, job_id: &JobId, ext: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/{}.{}",
        prefix,
        at.year(),
        at.month(),
        at.day(),
        job_id,
        ext
    )
}

/// Destination for finished artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store `content` under `key` and return its public URL.
    async fn put(&self, key: &str, content: &ContentRef) -> PipelineResult<String>;
}

/// Sink writing artifacts below a local directory.
///
/// Remote URLs are already hosted and are returned unchanged.
pub struct LocalArtifactSink {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalArtifactSink {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn public_url(&self, key: &str, path: &Path) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => format!("file://{}", path.display()),
        }
    }
}

#[async_trait]
impl ArtifactSink for LocalArtifactSink {
    async fn put(&self, key: &str, content: &ContentRef) -> PipelineResult<String> {
        if let ContentRef::Url { url } = content {
            if !url.starts_with("data:") {
                debug!(key, "Artifact already hosted");
                return Ok(url.clone());
            }
        }

        let target = self.root.join(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::sink(format!("{}: {}", parent.display(), e)))?;
        }

        match content {
            ContentRef::File { path } => {
                // Rename fails across filesystems; fall back to copy.
                if tokio::fs::rename(path, &target).await.is_err() {
                    tokio::fs::copy(path, &target).await.map_err(|e| {
                        PipelineError::sink(format!("copy {}: {}", path.display(), e))
                    })?;
                }
            }
            ContentRef::Bytes { data, .. } => {
                tokio::fs::write(&target, data)
                    .await
                    .map_err(|e| PipelineError::sink(format!("{}: {}", target.display(), e)))?;
            }
            ContentRef::Url { url } => {
                let data = mgen_media::decode_data_url(url)
                    .map_err(|e| PipelineError::sink(e.to_string()))?;
                tokio::fs::write(&target, data)
                    .await
                    .map_err(|e| PipelineError::sink(format!("{}: {}", target.display(), e)))?;
            }
        }

        info!(key, path = %target.display(), "Artifact stored");
        Ok(self.public_url(key, &target))
    }
}
