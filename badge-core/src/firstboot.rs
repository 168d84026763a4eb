//! First-boot detection.
//!
//! Grounded on `original_source/main/src/DiskUtilities.c`'s `fb` flag file
//! handling (`SPEC_FULL.md` §3 supplement; `spec.md` §6 names the `fb` file
//! but §4 doesn't otherwise define it). A single byte: `0xFF` means the
//! device has booted before; anything else (including an absent file) means
//! this is the first boot, and the caller should emit
//! `crate::event::Event::FirstTimePowerOn` exactly once.

use crate::hal::Storage;

pub const FIRST_BOOT_KEY: &str = "fb";
const NOT_FIRST_BOOT_BYTE: u8 = 0xFF;

/// Reads the flag, returning `true` iff this is the first boot, and writes
/// back the "not first boot" marker so every later boot reads `false`.
/// Mirrors the original's read-then-immediately-rewrite sequence so a crash
/// between read and any use of the result still leaves the flag consumed.
pub fn check_and_consume(storage: &mut dyn Storage) -> anyhow::Result<bool> {
    let is_first_boot = match storage.get_blob(FIRST_BOOT_KEY)? {
        Some(bytes) => bytes.first().copied() != Some(NOT_FIRST_BOOT_BYTE),
        None => true,
    };
    storage.set_blob(FIRST_BOOT_KEY, &[NOT_FIRST_BOOT_BYTE])?;
    Ok(is_first_boot)
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

    #[test]
    fn absent_flag_file_is_first_boot() {
        let mut storage = MemStorage::default();
        assert!(check_and_consume(&mut storage).unwrap());
    }

    #[test]
    fn second_check_reports_not_first_boot() {
        let mut storage = MemStorage::default();
        assert!(check_and_consume(&mut storage).unwrap());
        assert!(!check_and_consume(&mut storage).unwrap());
    }

    #[test]
    fn corrupt_non_0xff_byte_is_treated_as_first_boot() {
        let mut storage = MemStorage::default();
        storage.set_blob(FIRST_BOOT_KEY, &[0x00]).unwrap();
        assert!(check_and_consume(&mut storage).unwrap());
    }
}
