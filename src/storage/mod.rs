use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const SNAPSHOT_KEY: &str = "decks_v3";

const APP_DIR: &str = "cardloft";
const SNAPSHOT_EXTENSION: &str = "json";
const PARTIAL_WRITE_SUFFIX: &str = ".partial";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("missing HOME environment variable")]
    MissingHomeDirectory,
    #[error("invalid storage key: {key:?}")]
    InvalidKey { key: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Default, Clone)]
pub struct PruneReport {
    pub removed_files: usize,
}

/// Durable key/value storage holding whole serialized snapshots.
pub trait SnapshotStore {
    fn load(&self, key: &str) -> StorageResult<Option<String>>;
    fn save(&self, key: &str, body: &str) -> StorageResult<()>;
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for Box<S> {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, body: &str) -> StorageResult<()> {
        (**self).save(key, body)
    }
}

/// Stores each key as `<data_dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct StorageService {
    data_dir: PathBuf,
}

impl StorageService {
    pub const fn with_path(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn with_default_paths() -> StorageResult<Self> {
        let data_dir = default_data_dir()?;
        fs::create_dir_all(&data_dir)?;
        Ok(Self::with_path(data_dir))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn validate_key(key: &str) -> StorageResult<()> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    pub fn path_for_key(&self, key: &str) -> StorageResult<PathBuf> {
        Self::validate_key(key)?;
        let mut path = self.data_dir.clone();
        path.push(format!("{key}.{SNAPSHOT_EXTENSION}"));
        Ok(path)
    }

    /// Removes partial writes left behind by an interrupted save.
    pub fn prune_partial_writes(&self) -> StorageResult<PruneReport> {
        let mut report = PruneReport::default();

        if !self.data_dir.exists() {
            return Ok(report);
        }

        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_none_or(|name| !name.ends_with(PARTIAL_WRITE_SUFFIX))
            {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    report.removed_files += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        ?err,
                        "failed to remove partial snapshot file"
                    );
                }
            }
        }

        Ok(report)
    }
}

impl SnapshotStore for StorageService {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for_key(key)?;
        match fs::read_to_string(&path) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn save(&self, key: &str, body: &str) -> StorageResult<()> {
        let target = self.path_for_key(key)?;
        save_replace(body.as_bytes(), &target)
    }
}

/// Volatile store used when no data directory is available, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, body: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .entries
            .borrow_mut()
            .insert(key.to_string(), body.into());
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, body: &str) -> StorageResult<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), body.to_string());
        Ok(())
    }
}

fn save_replace(body: &[u8], destination: &Path) -> StorageResult<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut partial = destination.as_os_str().to_owned();
    partial.push(PARTIAL_WRITE_SUFFIX);
    let partial = PathBuf::from(partial);

    fs::write(&partial, body)?;
    if let Err(err) = fs::rename(&partial, destination) {
        let _ = fs::remove_file(&partial);
        return Err(StorageError::Io(err));
    }
    Ok(())
}

pub fn default_data_dir() -> StorageResult<PathBuf> {
    data_dir_from(
        std::env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn data_dir_from(xdg_data_home: Option<PathBuf>, home: Option<PathBuf>) -> StorageResult<PathBuf> {
    let root = match xdg_data_home.filter(|path| !path.as_os_str().is_empty()) {
        Some(xdg) => xdg,
        None => home
            .ok_or(StorageError::MissingHomeDirectory)?
            .join(".local/share"),
    };
    Ok(root.join(APP_DIR))
}
