//! Export results and how they land on disk.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::{DxError, Result};

/// One finished export: a file name, its media type, and the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifact {
    pub file_name: String,
    pub media_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Write the artifact.
    ///
    /// When `target` is an existing directory the artifact's own file name
    /// is used inside it; otherwise `target` is the file path. Parent
    /// directories are created as needed.
    pub fn write_to(&self, target: impl AsRef<Path>) -> Result<PathBuf> {
        let target = target.as_ref();
        let path = if target.is_dir() {
            target.join(&self.file_name)
        } else {
            target.to_path_buf()
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DxError::Other(format!(
                    "failed to create output directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }
        std::fs::write(&path, &self.bytes)?;
        info!(path = %path.display(), size = self.bytes.len(), "Export written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_into_directory_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ExportArtifact::new("canvas.png", "image/png", vec![1, 2, 3]);
        let path = artifact.write_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("canvas.png"));
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_write_to_explicit_path_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out/file.zip");
        let artifact = ExportArtifact::new("ignored.zip", "application/zip", vec![9]);
        assert_eq!(artifact.write_to(&target).unwrap(), target);
        assert!(target.exists());
    }
}
