//! File-backed local cache for the single progress slot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use study_core::model::ProgressSnapshot;

use crate::repository::{ProgressCache, StorageError};

/// Fixed key of the one cache slot. Also the default file stem.
pub const CACHE_KEY: &str = "study-progress";

#[derive(Serialize, Deserialize)]
struct CacheRecord {
    key: String,
    snapshot: ProgressSnapshot,
}

/// Keeps the latest snapshot in a JSON file.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot readable.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache stored as `<dir>/study-progress.json`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{CACHE_KEY}.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CACHE_KEY.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_err(e: std::io::Error) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

impl ProgressCache for JsonFileCache {
    fn read(&self) -> Result<Option<ProgressSnapshot>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };
        let record: CacheRecord = serde_json::from_str(&raw)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if record.key != CACHE_KEY {
            log::warn!("ignoring cache file with unexpected key {:?}", record.key);
            return Ok(None);
        }
        Ok(Some(record.snapshot))
    }

    fn write(&self, snapshot: &ProgressSnapshot) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let record = CacheRecord {
            key: CACHE_KEY.to_owned(),
            snapshot: snapshot.clone(),
        };
        let body = serde_json::to_vec_pretty(&record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp = self.temp_path();
        fs::write(&tmp, body).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }
}
