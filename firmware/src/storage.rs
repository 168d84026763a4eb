//! NVS-backed byte-blob storage, wired to [`badge_core::hal::Storage`].
//!
//! Grounded on the teacher's `storage.rs` (`EspNvs<T>` wrapped in a thin
//! `Storage<T>` struct under one namespace), generalized from its
//! string-only `get_str`/`set_str` pair to the raw blob API `badge-core`
//! needs for settings/stats/game records and the BLE-transferred custom
//! LED sequence slot.

use badge_core::hal::Storage as StorageTrait;
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsPartitionId};

const NAMESPACE: &str = "badge";

pub struct EspNvsStorage<T: NvsPartitionId> {
    nvs: EspNvs<T>,
}

impl<T: NvsPartitionId> EspNvsStorage<T> {
    pub fn new(nvs_partition: EspNvsPartition<T>) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(nvs_partition, NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl<T: NvsPartitionId + Send> StorageTrait for EspNvsStorage<T> {
    fn get_blob(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        // `EspNvs::get_raw` needs a caller-provided buffer; badge-core's
        // largest record (the 128 KiB custom sequence slot) bounds it.
        let mut buf = vec![0u8; 128 * 1024];
        Ok(self.nvs.get_raw(key, &mut buf)?.map(|slice| slice.to_vec()))
    }

    fn set_blob(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.nvs.set_raw(key, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.nvs.remove(key)?;
        Ok(())
    }
}
