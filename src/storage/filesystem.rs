use crate::error::{ArchiverError, Result};
use crate::storage::ObjectSink;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Writes artifacts under a local directory tree.
pub struct FilesystemSink {
    root: PathBuf,
}

impl FilesystemSink {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns path to an artifact: {root}/{channel}/{channel}.json
    pub fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(ArchiverError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid artifact key: {:?}", key),
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Ensure the destination directory exists
    pub async fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }
}

impl ObjectSink for FilesystemSink {
    async fn put(&self, key: &str, body: String) -> Result<()> {
        let path = self.object_path(key)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = parent.join(format!(".{}.partial", file_name));

        fs::create_dir_all(&parent)
            .await
            .map_err(|e| ArchiverError::storage(key, e))?;

        // rename keeps readers from ever seeing a half-written file
        fs::write(&partial, body.as_bytes())
            .await
            .map_err(|e| ArchiverError::storage(key, e))?;
        fs::rename(&partial, &path)
            .await
            .map_err(|e| ArchiverError::storage(key, e))?;

        tracing::debug!(key = %key, bytes = body.len(), path = ?path, "Wrote artifact");
        Ok(())
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}
