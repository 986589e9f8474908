use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recognition::domain::vp_tree_index::VpTreeIndex;
use crate::shared::embedding::Embedding;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GalleryError {
    #[error("identity name must not be empty")]
    EmptyName,
    #[error("embedding for {name} is empty or not finite")]
    MalformedEmbedding { name: String },
    #[error("embedding for {name} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// One known person and every embedding registered for them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub name: String,
    pub embeddings: Vec<Embedding>,
}

impl GalleryEntry {
    pub fn new(name: impl Into<String>, embeddings: Vec<Embedding>) -> Self {
        Self {
            name: name.into(),
            embeddings,
        }
    }
}

/// Immutable view of the gallery at one version.
///
/// Large galleries carry a metric index built once at construction.
#[derive(Debug)]
pub struct GallerySnapshot {
    version: u64,
    entries: Vec<GalleryEntry>,
    /// Owning entry of each flattened embedding, in flattening order.
    owners: Vec<usize>,
    points: Vec<Embedding>,
    index: Option<VpTreeIndex>,
}

impl GallerySnapshot {
    fn build(version: u64, entries: Vec<GalleryEntry>, index_min_gallery_size: usize) -> Self {
        let mut owners = Vec::new();
        let mut points = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            for embedding in &entry.embeddings {
                owners.push(i);
                points.push(embedding.clone());
            }
        }
        let index = (points.len() > index_min_gallery_size).then(|| {
            log::debug!("Indexing {} gallery embeddings", points.len());
            VpTreeIndex::build(points.clone())
        });
        Self {
            version,
            entries,
            owners,
            points,
            index,
        }
    }

    pub fn empty() -> Self {
        Self::build(0, Vec::new(), usize::MAX)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Total number of embeddings across all identities.
    pub fn embedding_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Name and distance of the closest embedding, or `None` when no
    /// embedding of the query's dimension exists.
    pub fn nearest(&self, query: &Embedding) -> Option<(&str, f32)> {
        let (point, distance) = match &self.index {
            Some(index) => index.nearest(query)?,
            None => self.brute_force(query)?,
        };
        let owner = *self.owners.get(point)?;
        Some((self.entries[owner].name.as_str(), distance))
    }

    fn brute_force(&self, query: &Embedding) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, p) in self.points.iter().enumerate() {
            let d = query.distance(p);
            if d.is_finite() && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        best
    }
}

/// Versioned copy-on-write gallery shared between the frame loop and
/// registration.
///
/// Readers take the current snapshot and keep it for as long as they
/// like; `register` builds a new snapshot and swaps it in.
#[derive(Debug)]
pub struct Gallery {
    current: RwLock<Arc<GallerySnapshot>>,
    registering: Mutex<()>,
    embedding_dim: usize,
    index_min_gallery_size: usize,
}

impl Gallery {
    /// Builds a gallery from loaded entries; duplicate names are merged.
    pub fn new(
        entries: Vec<GalleryEntry>,
        embedding_dim: usize,
        index_min_gallery_size: usize,
    ) -> Result<Self, GalleryError> {
        let mut merged: Vec<GalleryEntry> = Vec::new();
        for entry in entries {
            for embedding in &entry.embeddings {
                validate(&entry.name, embedding, embedding_dim)?;
            }
            if entry.name.trim().is_empty() {
                return Err(GalleryError::EmptyName);
            }
            match merged.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => existing.embeddings.extend(entry.embeddings),
                None => merged.push(entry),
            }
        }
        merged.retain(|e| !e.embeddings.is_empty());
        Ok(Self {
            current: RwLock::new(Arc::new(GallerySnapshot::build(
                0,
                merged,
                index_min_gallery_size,
            ))),
            registering: Mutex::new(()),
            embedding_dim,
            index_min_gallery_size,
        })
    }

    pub fn empty(embedding_dim: usize, index_min_gallery_size: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(GallerySnapshot::empty())),
            registering: Mutex::new(()),
            embedding_dim,
            index_min_gallery_size,
        }
    }

    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    /// Adds `embedding` to `name`, creating the identity if needed, and
    /// returns the new snapshot.
    pub fn register(
        &self,
        name: &str,
        embedding: Embedding,
    ) -> Result<Arc<GallerySnapshot>, GalleryError> {
        self.register_with(name, embedding, |_| Ok(()))
    }

    /// Like [`Gallery::register`], but runs `commit` on the new snapshot
    /// before it becomes visible. Registrations are serialized through
    /// `commit`, and a failed commit leaves the gallery unchanged.
    pub fn register_with<E, F>(
        &self,
        name: &str,
        embedding: Embedding,
        commit: F,
    ) -> Result<Arc<GallerySnapshot>, E>
    where
        E: From<GalleryError>,
        F: FnOnce(&GallerySnapshot) -> Result<(), E>,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(GalleryError::EmptyName.into());
        }
        validate(name, &embedding, self.embedding_dim)?;

        let _registering = self.registering.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let mut entries = current.entries.clone();
        match entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.embeddings.push(embedding),
            None => entries.push(GalleryEntry::new(name, vec![embedding])),
        }
        let next = Arc::new(GallerySnapshot::build(
            current.version + 1,
            entries,
            self.index_min_gallery_size,
        ));
        commit(&next)?;

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        log::info!("Registered face for {name} (gallery version {})", next.version);
        Ok(next)
    }

    /// Names with their embedding counts, in registration order.
    pub fn identities(&self) -> Vec<(String, usize)> {
        self.snapshot()
            .entries()
            .iter()
            .map(|e| (e.name.clone(), e.embeddings.len()))
            .collect()
    }
}

fn validate(name: &str, embedding: &Embedding, expected: usize) -> Result<(), GalleryError> {
    if !embedding.is_well_formed() {
        return Err(GalleryError::MalformedEmbedding {
            name: name.to_string(),
        });
    }
    if embedding.dim() != expected {
        return Err(GalleryError::DimensionMismatch {
            name: name.to_string(),
            expected,
            actual: embedding.dim(),
        });
    }
    Ok(())
}
