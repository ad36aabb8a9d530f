//! Object catalog
//!
//! Maps the public object ids used in URLs to remote object handles. The
//! catalog is loaded once at startup from a JSON manifest:
//!
//! ```json
//! { "objects": [ { "id": "42", "location": "doc-42", "size": 1048576,
//!                  "mime_type": "video/mp4", "name": "clip.mp4" } ] }
//! ```
//!
//! Entries without a `mime_type` get one guessed from their name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use undertow_core::{ObjectLocation, RemoteObjectHandle};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot read catalog {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("object id {id} appears more than once")]
    DuplicateId { id: String },

    #[error("catalog entry for {location} has an empty id")]
    EmptyId { location: String },
}

#[derive(Debug, Deserialize)]
struct Manifest {
    objects: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    location: String,
    size: u64,
    #[serde(default)]
    mime_type: Option<String>,
    name: String,
}

/// In-memory id to object lookup.
#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
    objects: HashMap<String, RemoteObjectHandle>,
}

impl ObjectCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a catalog manifest from disk.
    ///
    /// # Errors
    /// - `CatalogError::Read` - File cannot be read
    /// - `CatalogError::Parse` - File is not a valid manifest
    /// - `CatalogError::DuplicateId` / `CatalogError::EmptyId` - Bad entries
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let catalog = Self::from_manifest(&raw)?;
        tracing::info!(path = %path.display(), objects = catalog.len(), "Loaded object catalog");
        Ok(catalog)
    }

    /// Parses a catalog manifest.
    ///
    /// # Errors
    /// - `CatalogError::Parse` - Not a valid manifest
    /// - `CatalogError::DuplicateId` - Two entries share an id
    /// - `CatalogError::EmptyId` - An entry has a blank id
    pub fn from_manifest(raw: &str) -> Result<Self, CatalogError> {
        let manifest: Manifest = serde_json::from_str(raw)?;
        let mut catalog = Self::new();

        for entry in manifest.objects {
            let id = entry.id.trim().to_string();
            if id.is_empty() {
                return Err(CatalogError::EmptyId {
                    location: entry.location,
                });
            }
            if catalog.objects.contains_key(&id) {
                return Err(CatalogError::DuplicateId { id });
            }

            let mime_type = entry
                .mime_type
                .or_else(|| guess_mime_type(&entry.name));
            let handle = RemoteObjectHandle::new(
                ObjectLocation::new(entry.location),
                entry.size,
                mime_type,
                entry.name,
            );
            catalog.objects.insert(id, handle);
        }

        Ok(catalog)
    }

    /// Adds or replaces an object.
    pub fn insert(&mut self, id: impl Into<String>, handle: RemoteObjectHandle) {
        self.objects.insert(id.into(), handle);
    }

    pub fn get(&self, id: &str) -> Option<&RemoteObjectHandle> {
        self.objects.get(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Sorted object ids.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.objects.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl FromIterator<(String, RemoteObjectHandle)> for ObjectCatalog {
    fn from_iter<I: IntoIterator<Item = (String, RemoteObjectHandle)>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}

fn guess_mime_type(name: &str) -> Option<String> {
    mime_guess::from_path(name)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
