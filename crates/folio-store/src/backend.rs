//! Key/value persistence seam.

use std::collections::HashMap;

use parking_lot::RwLock;

use folio_core::{Error, Result};

/// Durable string storage. Implementations report failures; degrading them to
/// absence is the job of [`crate::ConsentStore`].
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local backend.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Backend standing in for disabled persistence: every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl KeyValueBackend for UnavailableBackend {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::StorageUnavailable("persistence disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::StorageUnavailable("persistence disabled".into()))
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Err(Error::StorageUnavailable("persistence disabled".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_crud() {
        let backend = MemoryBackend::new();
        assert!(backend.get("k").unwrap().is_none());
        backend.set("k", "v1").unwrap();
        backend.set("k", "v2").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("v2"));
        backend.remove("k").unwrap();
        backend.remove("k").unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn test_unavailable_backend_fails() {
        let backend = UnavailableBackend;
        assert!(matches!(backend.get("k"), Err(Error::StorageUnavailable(_))));
        assert!(backend.set("k", "v").is_err());
        assert!(backend.remove("k").is_err());
    }
}
