use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ProjectStore;
use crate::reconcile::ReconcileError;

/// Error type for storage operations
#[derive(Debug)]
pub enum StorageError {
    /// File is locked by another process
    FileLocked,
    /// Other IO error
    IoError(std::io::Error),
    /// Parse error
    ParseError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileLocked => write!(f, "File is locked by another user/process"),
            StorageError::IoError(e) => write!(f, "IO error: {}", e),
            StorageError::ParseError(s) => write!(f, "Parse error: {}", s),
        }
    }
}

impl std::error::Error for StorageError {}

/// Handles saving and loading a project store from disk with file locking.
/// The exclusive lock doubles as the per-project commit lock: only one apply
/// per project can be in flight at a time.
pub struct Storage {
    file_path: PathBuf,
    lock_file_path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let lock_file_path = file_path.with_extension("yaml.lock");
        Self {
            file_path,
            lock_file_path,
        }
    }

    /// Returns the path to the storage file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Acquire an exclusive lock on the file for writing
    /// Returns the lock file handle which must be held during the operation
    fn acquire_write_lock(&self) -> Result<File> {
        // Create parent directories if needed
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        // Try to acquire exclusive lock with timeout
        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(5);

        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout {
                        anyhow::bail!(
                            "Timeout waiting for file lock - another apply may be in flight: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    /// Acquire a shared lock on the file for reading
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        // Try to acquire shared lock with timeout
        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(5);

        loop {
            match FileExt::try_lock_shared(&lock_file) {
                Ok(()) => return Ok(Some(lock_file)),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout {
                        anyhow::bail!(
                            "Timeout waiting for file lock - another apply may be in flight: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    /// Loads the project store from the YAML file with file locking
    pub fn load(&self) -> Result<ProjectStore> {
        // Create the file if it doesn't exist
        if !self.file_path.exists() {
            let parent = self
                .file_path
                .parent()
                .context("Failed to get parent directory")?;
            fs::create_dir_all(parent)?;
            let default_store = ProjectStore::new();
            self.save(&default_store)?;
            return Ok(default_store);
        }

        // Acquire shared lock for reading
        let _lock = self.acquire_read_lock()?;

        // Open and read the file
        let file = File::open(&self.file_path)
            .with_context(|| format!("Failed to open file: {:?}", self.file_path))?;
        let reader = BufReader::new(file);

        // Parse the YAML content
        let store: ProjectStore = serde_yaml::from_reader(reader)
            .with_context(|| format!("Failed to parse YAML from {:?}", self.file_path))?;

        Ok(store)
    }

    /// Saves the project store to the YAML file with file locking
    pub fn save(&self, store: &ProjectStore) -> Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Acquire exclusive lock for writing
        let mut lock_file = self.acquire_write_lock()?;

        // Write lock holder info (optional, for debugging)
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        // Serialize and write to file
        let yaml = serde_yaml::to_string(store)?;
        fs::write(&self.file_path, yaml)?;

        // Lock is automatically released when lock_file is dropped
        Ok(())
    }

    /// Perform an atomic commit under the per-project lock.
    ///
    /// Reloads the latest store from disk, applies `update_fn`, and saves
    /// only if it succeeds. A failing update (incomplete resolution, stale
    /// plan, validation error) leaves the file exactly as it was - partial
    /// writes are not a failure mode commits are allowed to have.
    pub fn update_atomically<T, F>(&self, update_fn: F) -> Result<(ProjectStore, T)>
    where
        F: FnOnce(&mut ProjectStore) -> std::result::Result<T, ReconcileError>,
    {
        // Acquire exclusive lock
        let mut lock_file = self.acquire_write_lock()?;

        // Write lock holder info
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        // Load latest version from disk
        let mut store = if self.file_path.exists() {
            let file = File::open(&self.file_path)
                .with_context(|| format!("Failed to open file: {:?}", self.file_path))?;
            let reader = BufReader::new(file);
            serde_yaml::from_reader(reader)
                .with_context(|| format!("Failed to parse YAML from {:?}", self.file_path))?
        } else {
            ProjectStore::new()
        };

        // Apply the update; save only on success
        let value = update_fn(&mut store)?;

        let yaml = serde_yaml::to_string(&store)?;
        fs::write(&self.file_path, yaml)?;

        // Lock is released when lock_file is dropped
        Ok((store, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RequirementItem, Section};
    use tempfile::tempdir;

    #[test]
    fn test_load_creates_empty_store() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("project.yaml"));
        let store = storage.load().unwrap();
        assert!(store.items.is_empty());
        assert!(storage.path().exists());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("project.yaml"));

        let mut store = ProjectStore::new();
        store.name = "demo".to_string();
        store.push_item(RequirementItem::new(
            Section::Problems,
            "exports fail for large projects".to_string(),
            0,
        ));
        storage.save(&store).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_update_atomically_commits_on_ok() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("project.yaml"));
        storage.save(&ProjectStore::new()).unwrap();

        let (store, id) = storage
            .update_atomically(|store| {
                Ok(store.push_item(RequirementItem::new(
                    Section::ActionItems,
                    "ship it".to_string(),
                    0,
                )))
            })
            .unwrap();
        assert!(store.find_item(id).is_some());
        assert!(storage.load().unwrap().find_item(id).is_some());
    }

    #[test]
    fn test_update_atomically_rolls_back_on_err() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("project.yaml"));
        let mut initial = ProjectStore::new();
        initial.name = "untouched".to_string();
        storage.save(&initial).unwrap();

        let result = storage.update_atomically(|store| {
            store.name = "scribbled".to_string();
            Err::<(), _>(ReconcileError::Validation("nope".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(storage.load().unwrap().name, "untouched");
    }
}
