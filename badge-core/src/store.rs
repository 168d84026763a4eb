//! Generic mutex-guarded, dirty-flag-gated persistent record store.
//!
//! Grounded on `firmware/src/storage.rs`'s `Storage<T>` NVS wrapper, the
//! battery-gated flush behavior from `original_source/main/inc/DiskDefines.h`
//! (`MOUNT_PATH`) and `original_source/main/src/SystemManager.c`'s periodic
//! "only write to flash on sufficient battery" settings flush. Works over
//! the [`crate::hal::Storage`] trait so this module stays hardware-agnostic.

use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};

use crate::hal::Storage;

/// Mount path the original firmware's flash filesystem is rooted at; kept
/// here purely as a key-namespacing convention for [`Store`] callers.
pub const MOUNT_PATH: &str = "/data";

/// Minimum battery voltage, in millivolts, below which a flush is deferred
/// to avoid a brown-out mid-write corrupting the record.
pub const MIN_FLUSH_VOLTAGE_MV: u16 = 3300;

/// A single persisted record of type `T`, with a dirty flag and battery-gated
/// flush. `T` must be `Serialize + DeserializeOwned` (plain JSON on disk,
/// matching the rest of this core's wire format).
pub struct Store<T> {
    key: &'static str,
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    value: T,
    dirty: bool,
}

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    /// Loads `key` from `storage`, falling back to `T::default()` if the key
    /// is absent or its stored bytes fail to deserialize (a corrupt or
    /// stale-schema record is treated as "never written" rather than a hard
    /// error, matching the original firmware's reset-on-corruption stance).
    pub fn load(storage: &dyn Storage, key: &'static str) -> Self {
        let value = storage
            .get_blob(key)
            .ok()
            .flatten()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        Self {
            key,
            inner: Mutex::new(Inner {
                value,
                dirty: false,
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.lock().unwrap().value.clone()
    }

    /// Applies `f` to the current value and marks the record dirty if it
    /// returns `true`. The closure runs under the lock, so keep it short.
    pub fn update(&self, f: impl FnOnce(&mut T) -> bool) {
        let mut guard = self.inner.lock().unwrap();
        if f(&mut guard.value) {
            guard.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().unwrap().dirty
    }

    /// Writes the record to `storage` if dirty and `battery_mv` clears
    /// [`MIN_FLUSH_VOLTAGE_MV`]. Returns `true` if a write happened.
    pub fn flush(&self, storage: &mut dyn Storage, battery_mv: u16) -> anyhow::Result<bool> {
        let mut guard = self.inner.lock().unwrap();
        if !guard.dirty {
            return Ok(false);
        }
        if battery_mv < MIN_FLUSH_VOLTAGE_MV {
            return Ok(false);
        }
        let bytes = serde_json::to_vec(&guard.value)?;
        storage.set_blob(self.key, &bytes)?;
        guard.dirty = false;
        Ok(true)
    }

    /// Forces a write regardless of the dirty flag or battery level, for
    /// shutdown/power-loss-imminent paths.
    pub fn force_flush(&self, storage: &mut dyn Storage) -> anyhow::Result<()> {
        let mut guard = self.inner.lock().unwrap();
        let bytes = serde_json::to_vec(&guard.value)?;
        storage.set_blob(self.key, &bytes)?;
        guard.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemStorage {
        map: HashMap<String, Vec<u8>>,
    }

    impl Storage for MemStorage {
        fn get_blob(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(self.map.get(key).cloned())
        }
        fn set_blob(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()> {
            self.map.insert(key.to_string(), value.to_vec());
            Ok(())
        }
        fn remove(&mut self, key: &str) -> anyhow::Result<()> {
            self.map.remove(key);
            Ok(())
        }
    }

    #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Counter {
        n: u32,
    }

    #[test]
    fn load_missing_key_falls_back_to_default() {
        let storage = MemStorage::default();
        let store: Store<Counter> = Store::load(&storage, "counter");
        assert_eq!(store.get(), Counter::default());
        assert!(!store.is_dirty());
    }

    #[test]
    fn update_marks_dirty_only_when_requested() {
        let storage = MemStorage::default();
        let store: Store<Counter> = Store::load(&storage, "counter");
        store.update(|c| {
            c.n = 1;
            false
        });
        assert!(!store.is_dirty());
        store.update(|c| {
            c.n = 2;
            true
        });
        assert!(store.is_dirty());
    }

    #[test]
    fn flush_is_skipped_below_min_voltage() {
        let mut storage = MemStorage::default();
        let store: Store<Counter> = Store::load(&storage, "counter");
        store.update(|c| {
            c.n = 5;
            true
        });
        let wrote = store.flush(&mut storage, 3000).unwrap();
        assert!(!wrote);
        assert!(store.is_dirty());
    }

    #[test]
    fn flush_writes_and_clears_dirty_above_min_voltage() {
        let mut storage = MemStorage::default();
        let store: Store<Counter> = Store::load(&storage, "counter");
        store.update(|c| {
            c.n = 5;
            true
        });
        let wrote = store.flush(&mut storage, 3700).unwrap();
        assert!(wrote);
        assert!(!store.is_dirty());

        let reloaded: Store<Counter> = Store::load(&storage, "counter");
        assert_eq!(reloaded.get(), Counter { n: 5 });
    }

    #[test]
    fn corrupt_bytes_fall_back_to_default_instead_of_erroring() {
        let mut storage = MemStorage::default();
        storage.set_blob("counter", b"not json").unwrap();
        let store: Store<Counter> = Store::load(&storage, "counter");
        assert_eq!(store.get(), Counter::default());
    }
}
