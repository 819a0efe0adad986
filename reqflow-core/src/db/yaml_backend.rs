//! YAML file storage backend
//!
//! This backend stores the project store in a single YAML file, using the
//! existing Storage implementation with file locking support.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::traits::{BackendType, DatabaseBackend};
use crate::models::ProjectStore;
use crate::reconcile::ReconcileError;
use crate::storage::Storage;

/// YAML file backend implementation
///
/// This wraps the Storage class to implement the DatabaseBackend trait, so
/// the per-project file lock also guards commits that go through the
/// abstraction layer.
pub struct YamlBackend {
    storage: Storage,
    path: PathBuf,
}

impl YamlBackend {
    /// Creates a new YAML backend for the given file path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            storage: Storage::new(&path),
            path,
        }
    }

    /// Gets a reference to the underlying Storage
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

impl DatabaseBackend for YamlBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Yaml
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<ProjectStore> {
        self.storage.load()
    }

    fn save(&self, store: &ProjectStore) -> Result<()> {
        self.storage.save(store)
    }

    fn update_atomically<T, F>(&self, update_fn: F) -> Result<(ProjectStore, T)>
    where
        F: FnOnce(&mut ProjectStore) -> std::result::Result<T, ReconcileError>,
    {
        // Delegate to Storage so the whole update runs under the file lock
        self.storage.update_atomically(update_fn)
    }
}
