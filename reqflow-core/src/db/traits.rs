//! Database abstraction traits
//!
//! This module defines the core trait that all storage backends must implement.

use anyhow::Result;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::{ProjectStore, RequirementItem, Section};

/// Types of database backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// YAML file storage (single file)
    Yaml,
    /// SQLite database storage
    Sqlite,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Yaml => write!(f, "YAML"),
            BackendType::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Core trait for database backends
///
/// This trait provides a unified interface for storing and retrieving the
/// canonical requirement set, regardless of the underlying storage mechanism.
///
/// The design philosophy is:
/// - `load()` and `save()` work with the full `ProjectStore`
/// - Individual read operations are provided for cheaper access
/// - Backends can choose to implement efficient versions or delegate to load/save
pub trait DatabaseBackend: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Returns the path to the database file
    fn path(&self) -> &std::path::Path;

    /// Loads the entire project store from the database
    fn load(&self) -> Result<ProjectStore>;

    /// Saves the entire project store to the database
    fn save(&self, store: &ProjectStore) -> Result<()>;

    /// Performs an atomic update operation: the store is saved only when the
    /// update succeeds, so a failed commit leaves the database untouched.
    /// Default implementation loads, applies changes, and saves.
    fn update_atomically<T, F>(&self, update_fn: F) -> Result<(ProjectStore, T)>
    where
        F: FnOnce(&mut ProjectStore) -> std::result::Result<T, crate::reconcile::ReconcileError>,
        Self: Sized,
    {
        let mut store = self.load()?;
        let value = update_fn(&mut store)?;
        self.save(&store)?;
        Ok((store, value))
    }

    /// Gets a requirement item by its UUID
    fn get_item(&self, id: Uuid) -> Result<Option<RequirementItem>> {
        let store = self.load()?;
        Ok(store.find_item(id).cloned())
    }

    /// Lists items, optionally restricted to one section, in display order
    fn list_items(&self, section: Option<Section>) -> Result<Vec<RequirementItem>> {
        let store = self.load()?;
        let mut items: Vec<RequirementItem> = store
            .items
            .iter()
            .filter(|i| section.map_or(true, |s| i.section == s))
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.section, i.order));
        Ok(items)
    }

    /// Returns true if the database file exists
    fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Creates the database with default/empty data if it doesn't exist
    fn create_if_not_exists(&self) -> Result<()> {
        if !self.exists() {
            self.save(&ProjectStore::new())?;
        }
        Ok(())
    }

    /// Returns statistics about the database
    fn stats(&self) -> Result<DatabaseStats> {
        let store = self.load()?;
        let mut per_section = Vec::new();
        for section in Section::all() {
            let count = store.items.iter().filter(|i| i.section == *section).count();
            if count > 0 {
                per_section.push((*section, count));
            }
        }
        Ok(DatabaseStats {
            item_count: store.items.len(),
            per_section,
            backend_type: self.backend_type(),
        })
    }
}

/// Statistics about a database
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub item_count: usize,
    pub per_section: Vec<(Section, usize)>,
    pub backend_type: BackendType,
}

/// Configuration for database backends
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database file
    pub path: PathBuf,
    /// Backend type
    pub backend_type: BackendType,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("reqflow.yaml"),
            backend_type: BackendType::Yaml,
        }
    }
}
