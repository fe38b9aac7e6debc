// src/storage/mod.rs — Key-value persistence capability

pub mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::infra::errors::EchoError;

pub use sqlite::SqliteStorage;

/// Synchronous, best-effort key-value store for serialized engine state.
///
/// Callers are expected to catch and log failures; nothing in the engine
/// treats a storage error as fatal.
pub trait Storage: Send + Sync {
    fn save(&self, key: &str, blob: &str) -> Result<(), EchoError>;
    fn load(&self, key: &str) -> Result<Option<String>, EchoError>;
}

/// Process-local storage. Used by tests and `backend = "memory"`.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn save(&self, key: &str, blob: &str) -> Result<(), EchoError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| EchoError::Storage("memory storage lock poisoned".into()))?;
        entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, EchoError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| EchoError::Storage("memory storage lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_save_load() {
        let s = MemoryStorage::new();
        assert!(s.load("k").unwrap().is_none());
        s.save("k", "{\"a\":1}").unwrap();
        assert_eq!(s.load("k").unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_memory_storage_overwrite() {
        let s = MemoryStorage::new();
        assert!(s.is_empty());
        s.save("k", "one").unwrap();
        s.save("k", "two").unwrap();
        assert_eq!(s.load("k").unwrap().as_deref(), Some("two"));
        assert_eq!(s.len(), 1);
    }
}
