//! Durable collections on top of a whole-value key-value store.
//!
//! Every mutation reads the full collection, changes it in memory and writes
//! it back. Last writer wins.

mod fridge;
mod recipes;
mod settings;

pub use fridge::Fridge;
pub use recipes::RecipeBook;
pub use settings::{SettingsStore, UserSettings};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

pub const RECIPES_KEY: &str = "@fridge_chef:recipes";
pub const SETTINGS_KEY: &str = "@fridge_chef:settings";
pub const FRIDGE_ITEMS_KEY: &str = "@fridge_chef:fridge_items";

/// Get/set of whole string values under fixed keys
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store, used by tests and as the default collaborator
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file.trim_matches('_')))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // write-then-rename: readers never observe a partial collection
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Load a stored value for a read-modify-write. Missing data yields the
/// default and a corrupt value is logged and treated as absent, but a failed
/// read is returned so the caller never overwrites data it could not see.
pub(crate) fn load<T>(store: &dyn KeyValueStore, key: &str) -> Result<T, StorageError>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = store.get(key)? else {
        return Ok(T::default());
    };

    Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
        error!("Discarding corrupt data under {}: {}", key, e);
        T::default()
    }))
}

/// Read-only variant of [`load`]: a failed read is logged and yields the
/// default.
pub(crate) fn load_or_default<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    load(store, key).unwrap_or_else(|e| {
        error!("Failed to read {}: {}", key, e);
        T::default()
    })
}

pub(crate) fn save<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    debug!("Writing {} ({} bytes)", key, raw.len());
    store.set(key, &raw)
}

/// Store whose reads always fail, for exercising error paths
#[cfg(test)]
pub(crate) struct FailingReads(pub(crate) MemoryStore);

#[cfg(test)]
impl KeyValueStore for FailingReads {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(std::io::Error::other("disk unreadable").into())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.0.remove(key)
    }
}
