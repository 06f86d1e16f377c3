//! Persistent State Store
//!
//! A string-keyed, string-valued store that survives navigation and process
//! restarts. Missing keys are never an error: readers fall back to defaults.

use crate::models::{Item, SessionState};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::RwLock;
use thiserror::Error;

/// Keys written by the reader
pub mod keys {
    /// First-run sentinel; present once defaults have been seeded
    pub const INITIALIZED: &str = "autoread.initialized";
    pub const SCHEMA_VERSION: &str = "autoread.schema_version";
    pub const READING: &str = "autoread.reading";
    pub const LIKING: &str = "autoread.liking";
    pub const REACTION_COUNT: &str = "autoread.reaction_count";
    pub const QUEUE: &str = "autoread.queue";
}

/// Current layout of the persisted session
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write state file {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable key-value backend.
///
/// `set` is write-through: when it returns `Ok`, the value is durable.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// The whole map is rewritten on every `set` (temp file + rename), which is
/// cheap at this size and keeps the file consistent if the process dies
/// mid-write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: Utf8PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`.
    ///
    /// A corrupt file is logged and treated as empty rather than failing.
    pub fn open<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create state directory: {}", parent))?;
            }
        }

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state file: {}", path))?;
            match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("State file {} is corrupt ({}), starting empty", path, e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        tracing::info!("Opened state store at {} ({} keys)", path, entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp_path = Utf8PathBuf::from(format!("{}.tmp", self.path));

        fs::write(&tmp_path, json).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }
}

/// Seed default-off flags and a zero counter exactly once.
///
/// Guarded by the [`keys::INITIALIZED`] sentinel so later loads never reset
/// what the user has turned on. Returns `true` if this call seeded defaults.
pub fn initialize_first_run(store: &dyn KvStore) -> Result<bool, StoreError> {
    if store.get(keys::INITIALIZED).is_some() {
        return Ok(false);
    }

    store.set(keys::READING, "false")?;
    store.set(keys::LIKING, "false")?;
    store.set(keys::REACTION_COUNT, "0")?;
    store.set(keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
    store.set(keys::INITIALIZED, "true")?;

    tracing::info!("First run: seeded default session state");
    Ok(true)
}

pub fn get_flag(store: &dyn KvStore, key: &str) -> bool {
    match store.get(key).as_deref() {
        Some("true") => true,
        Some("false") | None => false,
        Some(other) => {
            tracing::warn!("Ignoring unreadable flag {}={:?}", key, other);
            false
        }
    }
}

pub fn get_count(store: &dyn KvStore, key: &str) -> u32 {
    match store.get(key) {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unreadable counter {}={:?}", key, value);
            0
        }),
        None => 0,
    }
}

/// Read the persisted queue, dropping duplicate ids (first occurrence wins)
pub fn get_queue(store: &dyn KvStore) -> Vec<Item> {
    let Some(json) = store.get(keys::QUEUE) else {
        return Vec::new();
    };

    let items: Vec<Item> = match serde_json::from_str(&json) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!("Ignoring unreadable queue: {}", e);
            return Vec::new();
        }
    };

    let total = items.len();
    let mut unique: IndexMap<u64, Item> = IndexMap::with_capacity(total);
    for item in items {
        unique.entry(item.id).or_insert(item);
    }

    if unique.len() != total {
        tracing::info!("Dropped {} duplicate queue entries", total - unique.len());
    }

    unique.into_values().collect()
}

pub fn put_queue(store: &dyn KvStore, queue: &[Item]) -> Result<(), StoreError> {
    let json = serde_json::to_string(queue)?;
    store.set(keys::QUEUE, &json)
}

/// Load the whole session from the store
pub fn load_session(store: &dyn KvStore) -> SessionState {
    let version = get_count(store, keys::SCHEMA_VERSION);
    if version > SCHEMA_VERSION {
        tracing::warn!(
            "State was written by a newer schema (v{}), reading it as v{}",
            version,
            SCHEMA_VERSION
        );
    }

    SessionState {
        reading_enabled: get_flag(store, keys::READING),
        liking_enabled: get_flag(store, keys::LIKING),
        reaction_count: get_count(store, keys::REACTION_COUNT),
        pending_queue: get_queue(store),
    }
}
