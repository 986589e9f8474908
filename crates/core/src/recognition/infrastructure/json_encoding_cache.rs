use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::recognition::domain::encoding_cache::{CacheError, EncodingCache};
use crate::recognition::domain::gallery::GalleryEntry;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    identities: Vec<GalleryEntry>,
}

/// Encoding cache kept as a single JSON file.
///
/// Writes go to a sibling temp file that is renamed over the cache, so a
/// crash mid-write leaves the previous gallery intact.
pub struct JsonEncodingCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonEncodingCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl EncodingCache for JsonEncodingCache {
    fn load_gallery(&self) -> Result<Vec<GalleryEntry>, CacheError> {
        if !self.path.exists() {
            log::debug!("No encoding cache at {}", self.path.display());
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let file: CacheFile = serde_json::from_str(&json).map_err(|source| CacheError::Format {
            path: self.path.clone(),
            source,
        })?;
        log::info!(
            "Loaded {} identities from {}",
            file.identities.len(),
            self.path.display()
        );
        Ok(file.identities)
    }

    fn store(&self, entries: &[GalleryEntry]) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string(&CacheFile {
            identities: entries.to_vec(),
        })
        .map_err(|source| CacheError::Format {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}
