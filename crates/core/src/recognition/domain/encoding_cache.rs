use std::path::PathBuf;

use thiserror::Error;

use crate::recognition::domain::gallery::GalleryEntry;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("encoding cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("encoding cache at {path} is corrupt: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Persistent store of known identity embeddings.
pub trait EncodingCache: Send + Sync {
    /// Every stored entry; an absent cache is an empty gallery.
    fn load_gallery(&self) -> Result<Vec<GalleryEntry>, CacheError>;

    /// Replaces the stored gallery with `entries`.
    fn store(&self, entries: &[GalleryEntry]) -> Result<(), CacheError>;
}
