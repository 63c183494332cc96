//! Cart slot implementations.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use valfinds_core::UserId;

use super::{CartStorage, PersistenceError, slot_key};
use crate::models::CartItem;

/// JSON files under `{data_dir}/carts/`.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    dir: PathBuf,
}

impl FileCartStorage {
    /// Store carts under `data_dir/carts`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Io` if the directory cannot be created.
    pub fn new(data_dir: &Path) -> Result<Self, PersistenceError> {
        let dir = data_dir.join("carts");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, owner: &UserId) -> PathBuf {
        self.dir.join(format!("{}.json", slot_key(owner)))
    }
}

impl CartStorage for FileCartStorage {
    fn load(&self, owner: &UserId) -> Result<Option<Vec<CartItem>>, PersistenceError> {
        let raw = match fs::read_to_string(self.path(owner)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, owner: &UserId, items: &[CartItem]) -> Result<(), PersistenceError> {
        let path = self.path(owner);
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_vec(items)?)?;
        fs::rename(&tmp, &path)?;
        debug!(slot = %slot_key(owner), items = items.len(), "Saved cart");
        Ok(())
    }

    fn remove(&self, owner: &UserId) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path(owner)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Slots held in memory; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryCartStorage {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a slot exists for the user.
    #[must_use]
    pub fn contains(&self, owner: &UserId) -> bool {
        self.slots().contains_key(&slot_key(owner))
    }

    /// Write raw slot contents, bypassing serialization.
    pub fn put_raw(&self, owner: &UserId, raw: impl Into<String>) {
        self.slots().insert(slot_key(owner), raw.into());
    }
}

impl CartStorage for MemoryCartStorage {
    fn load(&self, owner: &UserId) -> Result<Option<Vec<CartItem>>, PersistenceError> {
        let raw = self.slots().get(&slot_key(owner)).cloned();
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(PersistenceError::from)
    }

    fn save(&self, owner: &UserId, items: &[CartItem]) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(items)?;
        self.slots().insert(slot_key(owner), raw);
        Ok(())
    }

    fn remove(&self, owner: &UserId) -> Result<(), PersistenceError> {
        self.slots().remove(&slot_key(owner));
        Ok(())
    }
}
