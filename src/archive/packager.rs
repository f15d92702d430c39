//! ZIP packaging for project archives and multi-file exports.

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

use tracing::{debug, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{DxError, Result};

/// Fixed deflate level: a middle ground between size and speed.
const COMPRESSION_LEVEL: i64 = 6;

/// One named file inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PackEntry {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Entry holding pretty-printed JSON.
    pub fn json<T: serde::Serialize>(name: impl Into<String>, value: &T) -> Result<Self> {
        let name = name.into();
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| DxError::Other(format!("Failed to serialize {name}: {e}")))?;
        Ok(Self { name, bytes })
    }
}

/// Bundle `files` into one compressed ZIP.
///
/// An empty list is a caller error, as are blank or duplicate names.
#[instrument(skip_all, fields(files = files.len()))]
pub fn pack(files: &[PackEntry]) -> Result<Vec<u8>> {
    if files.is_empty() {
        return Err(DxError::EmptyPackage);
    }

    let mut seen = HashSet::new();
    for entry in files {
        if entry.name.trim().is_empty() {
            return Err(DxError::Other("Package entry with empty name".to_string()));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(DxError::DuplicateEntry {
                name: entry.name.clone(),
            });
        }
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in files {
        zip.start_file(entry.name.as_str(), options)
            .map_err(|e| DxError::Other(format!("Failed to add {}: {e}", entry.name)))?;
        zip.write_all(&entry.bytes)?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| DxError::Other(format!("Failed to finish package: {e}")))?;
    let bytes = cursor.into_inner();

    debug!(size = bytes.len(), "Package written");
    Ok(bytes)
}

/// Read every file entry of a package, in archive order.
pub fn unpack(bytes: &[u8]) -> Result<Vec<PackEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DxError::CorruptArchive(format!("Invalid ZIP archive: {e}")))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| DxError::CorruptArchive(format!("Failed to read archive entry: {e}")))?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| DxError::CorruptArchive(format!("Failed to read {}: {e}", file.name())))?;
        entries.push(PackEntry::new(file.name(), data));
    }
    Ok(entries)
}
