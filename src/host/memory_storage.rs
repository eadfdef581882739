//! In-memory key-value storage.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use tabpilot_core_types::{HostError, Storage};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value outside the trait, for test setup.
    pub async fn seed(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, HostError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), HostError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
