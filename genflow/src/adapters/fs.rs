//! Filesystem document delivery.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::GenflowError;
use crate::ports::{DocumentSink, RenderedDocument};

/// Writes delivered documents into a directory, replacing same-named files.
#[derive(Debug, Clone)]
pub struct FileSystemSink {
    dir: PathBuf,
}

impl FileSystemSink {
    /// Creates a sink writing into `dir`; the directory is created on demand.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DocumentSink for FileSystemSink {
    async fn deliver(&self, filename: &str, document: &RenderedDocument) -> Result<(), GenflowError> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(GenflowError::Delivery(format!("invalid file name '{filename}'")));
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, &document.bytes).await?;
        debug!(path = %path.display(), bytes = document.len(), "Wrote document");
        Ok(())
    }
}
