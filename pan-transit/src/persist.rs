//! JSON files on disk.
//!
//! Writes are atomic: data goes to a temporary file in the target directory,
//! which is flushed to disk and then renamed over the target. A crash leaves
//! either the old or the new file, never a truncated one.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

/// Errors reading or writing a JSON file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File content is not valid JSON of the expected shape
    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl PersistError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the error is just a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PersistError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Read and deserialize the JSON file at `path`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let contents = std::fs::read_to_string(path).map_err(|e| PersistError::io(path, e))?;
    serde_json::from_str(&contents).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize `data` as pretty JSON and atomically replace the file at `path`.
///
/// Creates parent directories if they don't exist. An existing file keeps its
/// permissions.
pub fn write_json<T: Serialize + ?Sized>(data: &T, path: &Path) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(data).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| PersistError::io(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| PersistError::io(parent, e))?;
    if let Ok(existing) = std::fs::metadata(path) {
        std::fs::set_permissions(temp.path(), existing.permissions())
            .map_err(|e| PersistError::io(temp.path(), e))?;
    }
    temp.write_all(json.as_bytes())
        .and_then(|()| temp.write_all(b"\n"))
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| PersistError::io(path, e))?;
    temp.persist(path).map_err(|e| PersistError::io(path, e.error))?;
    Ok(())
}
