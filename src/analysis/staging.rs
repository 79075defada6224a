use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use uuid::Uuid;

use crate::media::MediaUpload;

/// Temporary on-disk copy of an upload.
///
/// Removed by [`StagedFile::close`], or on drop if the owner unwinds first.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
}

impl StagedFile {
    /// Write the upload into a uniquely named file under `dir`, keeping the
    /// original extension
    pub async fn create(dir: &Path, upload: &MediaUpload) -> io::Result<Self> {
        let suffix = Path::new(&upload.filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let prefix = format!("media_{}_", &Uuid::new_v4().simple().to_string()[..8]);

        let path = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(dir)?
            .into_temp_path();

        // A failed write drops `path`, which removes the partial file
        tokio::fs::write(&path, &upload.bytes).await?;

        tracing::debug!("Staged {} bytes at {}", upload.bytes.len(), path.display());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file, reporting failure instead of swallowing it
    pub fn close(self) -> Result<(), (PathBuf, io::Error)> {
        let path = self.path.to_path_buf();
        self.path.close().map_err(|err| (path, err))
    }
}
