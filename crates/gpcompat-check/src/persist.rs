//! Whole-file YAML rewrites

use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Failure to write a rules or stats file
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Failed to serialize {what}: {message}")]
    Serialize { what: &'static str, message: String },

    #[error("Failed to write {path}: {message}")]
    Io { path: String, message: String },
}

impl PersistError {
    fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Serialize `value` and replace `path` with it in one rename
pub fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T, what: &'static str) -> Result<(), PersistError> {
    let yaml = serde_yaml::to_string(value).map_err(|e| PersistError::Serialize {
        what,
        message: e.to_string(),
    })?;
    write_atomic(path, yaml.as_bytes())
}

/// Readers see either the old file or the new one, never a partial write
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PersistError::io(path, e))?;
    tmp.write_all(contents).map_err(|e| PersistError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| PersistError::io(path, e))?;
    tmp.persist(path).map_err(|e| PersistError::io(path, e.error))?;
    Ok(())
}
