//! In-memory backend for tests and ephemeral runs

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{PersistenceError, StateBackend};

#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for MemoryBackend {
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.records.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.records.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.records.write().remove(key);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<(String, Vec<u8>)>, PersistenceError> {
        Ok(self
            .records
            .read()
            .iter()
            .map(|(key, data)| (key.clone(), data.clone()))
            .collect())
    }

    fn sync(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}
