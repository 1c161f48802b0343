use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::state::{Entry, StateError, StateResult};

/// The storage half of the state abstraction: fetch and swap entries.
/// Implementations provide varying replication guarantees; swap must be
/// atomic per entry name.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    async fn fetch(&self, name: &str) -> StateResult<Option<Entry>>;

    /// Store `entry` if the current entry still carries `token` (or if no
    /// entry exists yet). Returns false when the version check fails.
    async fn swap(&self, entry: Entry, token: Uuid) -> StateResult<bool>;
}

/// A non-replicated, in-process storage backend.
#[derive(Default)]
pub struct InMemoryStorage {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StorageBackend for InMemoryStorage {
    async fn fetch(&self, name: &str) -> StateResult<Option<Entry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StateError::Storage(e.to_string()))?;
        Ok(entries.get(name).cloned())
    }

    async fn swap(&self, entry: Entry, token: Uuid) -> StateResult<bool> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StateError::Storage(e.to_string()))?;
        match entries.get(&entry.name) {
            Some(existing) if existing.uuid != token => Ok(false),
            _ => {
                entries.insert(entry.name.clone(), entry);
                Ok(true)
            }
        }
    }
}
