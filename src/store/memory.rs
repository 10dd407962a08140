use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::store::{
    ContentStore, Metadata, NormalizedRecord, RecordId, StoreError, StoredRecord,
};
use crate::upgrade::OptionStore;

/// Keeps everything in process memory. Records are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<StoredRecord>>,
    options: Mutex<HashMap<String, i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Snapshot of every stored record, in creation order.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.lock_records()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    fn lock_records(&self) -> Result<MutexGuard<'_, Vec<StoredRecord>>, StoreError> {
        self.records.lock().map_err(|_| StoreError::Poisoned)
    }

    fn lock_options(&self) -> Result<MutexGuard<'_, HashMap<String, i64>>, StoreError> {
        self.options.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl ContentStore for MemoryStore {
    fn create(&self, record: NormalizedRecord) -> Result<RecordId, StoreError> {
        let mut records = self.lock_records()?;
        let id = RecordId(records.len() as u64 + 1);
        records.push(StoredRecord {
            id,
            record,
            metadata: Vec::new(),
        });
        Ok(id)
    }

    fn attach_metadata(&self, id: RecordId, key: &str, value: Value) -> Result<(), StoreError> {
        let mut records = self.lock_records()?;
        let stored = records
            .iter_mut()
            .find(|stored| stored.id == id)
            .ok_or(StoreError::NotFound(id))?;
        stored.metadata.push(Metadata {
            key: key.to_owned(),
            value,
        });
        Ok(())
    }

    fn metadata(&self, id: RecordId, key: &str) -> Result<Option<Value>, StoreError> {
        let records = self.lock_records()?;
        Ok(records
            .iter()
            .find(|stored| stored.id == id)
            .and_then(|stored| stored.metadata(key).cloned()))
    }
}

impl OptionStore for MemoryStore {
    fn get_option(&self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.lock_options()?.get(name).copied())
    }

    fn set_option(&self, name: &str, value: i64) -> Result<(), StoreError> {
        self.lock_options()?.insert(name.to_owned(), value);
        Ok(())
    }

    fn delete_option(&self, name: &str) -> Result<(), StoreError> {
        self.lock_options()?.remove(name);
        Ok(())
    }
}
