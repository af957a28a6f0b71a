use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::traits::{ObjectSink, StorageError, StorageResult};

/// Local filesystem object sink
///
/// Objects are written as files under `base_path`; metadata is ignored.
#[derive(Clone)]
pub struct LocalObjectSink {
    base_path: PathBuf,
    name: String,
}

impl LocalObjectSink {
    /// Create a new LocalObjectSink, creating `base_path` when needed.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create report directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let name = format!("local://{}", base_path.display());
        Ok(LocalObjectSink { base_path, name })
    }

    /// Convert an object key to a path inside the base directory.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.contains('\\') {
            return Err(StorageError::InvalidKey(format!(
                "key '{}' contains invalid characters",
                key
            )));
        }

        let path = self.base_path.join(key);
        if !path.starts_with(&self.base_path) {
            return Err(StorageError::InvalidKey(
                "key resolves outside the report directory".to_string(),
            ));
        }
        Ok(path)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectSink for LocalObjectSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: &str,
        _metadata: &BTreeMap<String, String>,
    ) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        self.ensure_parent_dir(&path).await?;

        // Write to a sibling temp file first so readers never see a partial object.
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), size_bytes = data.len(), "Object written");
        Ok(())
    }
}
