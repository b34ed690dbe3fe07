//! In-process key-value store.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::GenflowError;
use crate::ports::KeyValueStore;

/// A concurrent in-memory [`KeyValueStore`].
///
/// Writes touch only their own key, so the cached experience text never
/// clobbers a separately stored profile.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads a key without going through the async trait.
    #[must_use]
    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), GenflowError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, GenflowError> {
        Ok(self.get_sync(key))
    }
}
