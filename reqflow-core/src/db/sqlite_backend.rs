//! SQLite database storage backend
//!
//! This backend stores the project store in a SQLite database file,
//! providing better concurrent access for larger projects.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use super::traits::{BackendType, DatabaseBackend};
use crate::models::{HistoryEntry, ProjectStore, RequirementItem, Section, SourceRef};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Creates a new SQLite backend
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let backend = Self {
            path,
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        Ok(backend)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection poisoned"))?;

        // Check current schema version
        let current_version: i32 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if current_version == 0 {
            // Create initial schema
            conn.execute_batch(include_str!("schema.sql"))?;
        } else if current_version < SCHEMA_VERSION {
            // Future: handle migrations
            // For now, we just fail if the schema is outdated
            anyhow::bail!(
                "Database schema version {} is outdated, expected {}",
                current_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Serializes complex types to JSON for storage
    fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
        serde_json::to_string(value).context("Failed to serialize to JSON")
    }

    /// Deserializes complex types from JSON storage
    fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
        serde_json::from_str(json).context("Failed to deserialize from JSON")
    }

    /// Load items from the database, in section/order sequence
    fn load_items(&self, conn: &Connection) -> Result<Vec<RequirementItem>> {
        let mut stmt = conn.prepare(
            "SELECT id, section, content, item_order, source_refs, history_count, history,
                    created_at, updated_at
             FROM items ORDER BY section, item_order",
        )?;

        let rows = stmt.query_map([], |row| {
            let id_str: String = row.get(0)?;
            let section_str: String = row.get(1)?;
            let content: String = row.get(2)?;
            let item_order: u32 = row.get(3)?;
            let source_refs_json: String = row.get(4)?;
            let history_count: u32 = row.get(5)?;
            let history_json: String = row.get(6)?;
            let created_at_str: String = row.get(7)?;
            let updated_at_str: String = row.get(8)?;
            Ok((
                id_str,
                section_str,
                content,
                item_order,
                source_refs_json,
                history_count,
                history_json,
                created_at_str,
                updated_at_str,
            ))
        })?;

        let mut items = Vec::new();
        for row_result in rows {
            let (
                id_str,
                section_str,
                content,
                item_order,
                source_refs_json,
                history_count,
                history_json,
                created_at_str,
                updated_at_str,
            ) = row_result?;

            let id = Uuid::parse_str(&id_str)
                .with_context(|| format!("Invalid item id in database: {}", id_str))?;
            let section = Section::from_str(&section_str)
                .with_context(|| format!("Unknown section in database: {}", section_str))?;
            let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now());
            let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now());
            let source_refs: Vec<SourceRef> =
                Self::from_json(&source_refs_json).unwrap_or_default();
            let history: Vec<HistoryEntry> = Self::from_json(&history_json).unwrap_or_default();

            items.push(RequirementItem {
                id,
                section,
                content,
                order: item_order,
                source_refs,
                history_count,
                history,
                created_at,
                updated_at,
            });
        }

        Ok(items)
    }

    /// Load project metadata from the database
    fn load_metadata(&self, conn: &Connection) -> Result<(String, String)> {
        let row = conn
            .query_row(
                "SELECT name, description FROM metadata WHERE id = 1",
                [],
                |row| {
                    let name: String = row.get(0)?;
                    let description: String = row.get(1)?;
                    Ok((name, description))
                },
            )
            .optional()?;

        Ok(row.unwrap_or_default())
    }
}

impl DatabaseBackend for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<ProjectStore> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection poisoned"))?;

        let items = self.load_items(&conn)?;
        let (name, description) = self.load_metadata(&conn)?;

        Ok(ProjectStore {
            name,
            description,
            items,
        })
    }

    fn save(&self, store: &ProjectStore) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection poisoned"))?;

        // Full rewrite inside one transaction
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE metadata SET name = ?1, description = ?2 WHERE id = 1",
            params![store.name, store.description],
        )?;

        tx.execute("DELETE FROM items", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO items (id, section, content, item_order, source_refs,
                                    history_count, history, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for item in &store.items {
                stmt.execute(params![
                    item.id.to_string(),
                    item.section.to_string(),
                    item.content,
                    item.order,
                    Self::to_json(&item.source_refs)?,
                    item.history_count,
                    Self::to_json(&item.history)?,
                    item.created_at.to_rfc3339(),
                    item.updated_at.to_rfc3339(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryAction;
    use tempfile::tempdir;

    #[test]
    fn test_sqlite_roundtrip() {
        let dir = tempdir().unwrap();
        let backend = SqliteBackend::new(dir.path().join("project.db")).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Sqlite);

        let mut store = ProjectStore::new();
        store.name = "demo".to_string();
        let mut item = RequirementItem::new(
            Section::FunctionalRequirements,
            "Support CSV import".to_string(),
            1,
        );
        item.supersede(
            "Support CSV and XLSX import".to_string(),
            HistoryAction::Replaced,
        );
        item.source_refs.push(SourceRef {
            meeting_id: Uuid::new_v4(),
            quote: Some("we need spreadsheets in".to_string()),
            speaker: Some("dana".to_string()),
        });
        let id = item.id;
        store.items.push(item);

        backend.save(&store).unwrap();
        let loaded = backend.load().unwrap();
        assert_eq!(loaded.name, "demo");
        let loaded_item = loaded.find_item(id).unwrap();
        assert_eq!(loaded_item.history_count, 1);
        assert_eq!(loaded_item.history.len(), 1);
        assert_eq!(loaded_item.source_refs.len(), 1);
        assert_eq!(loaded_item.content, "Support CSV and XLSX import");
    }

    #[test]
    fn test_sqlite_save_is_full_rewrite() {
        let dir = tempdir().unwrap();
        let backend = SqliteBackend::new(dir.path().join("project.db")).unwrap();

        let mut store = ProjectStore::new();
        let id = store.push_item(RequirementItem::new(
            Section::Problems,
            "flaky deploys".to_string(),
            0,
        ));
        backend.save(&store).unwrap();

        store.delete_item(id);
        backend.save(&store).unwrap();
        assert!(backend.load().unwrap().items.is_empty());
    }
}
