//! In-memory storage implementation.
//!
//! Backs the default persistence context and the test suite.
//! Records are kept per namespace in a `BTreeMap` so `keys` is ordered.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{PersistStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

type Namespace = BTreeMap<String, Vec<u8>>;

/// Thread-safe in-memory record store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistStore for InMemoryStore {
    fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| lock_err("memory store write"))?;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| lock_err("memory store read"))?;
        Ok(namespaces
            .get(namespace)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| lock_err("memory store write"))?;
        Ok(namespaces
            .get_mut(namespace)
            .is_some_and(|records| records.remove(key).is_some()))
    }

    fn clear(&self, namespace: &str) -> Result<(), StorageError> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| lock_err("memory store write"))?;
        namespaces.remove(namespace);
        Ok(())
    }

    fn len(&self, namespace: &str) -> Result<usize, StorageError> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| lock_err("memory store read"))?;
        Ok(namespaces.get(namespace).map_or(0, BTreeMap::len))
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| lock_err("memory store read"))?;
        Ok(namespaces
            .get(namespace)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_replace() {
        let store = InMemoryStore::new();
        assert!(store.get("experiments", "a").unwrap().is_none());

        store.put("experiments", "a", b"one".to_vec()).unwrap();
        store.put("experiments", "a", b"two".to_vec()).unwrap();
        assert_eq!(store.get("experiments", "a").unwrap().unwrap(), b"two");
        assert_eq!(store.len("experiments").unwrap(), 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = InMemoryStore::new();
        store.put("experiments", "k", b"e".to_vec()).unwrap();
        store.put("platforms", "k", b"p".to_vec()).unwrap();

        store.clear("experiments").unwrap();
        assert!(store.is_empty("experiments").unwrap());
        assert_eq!(store.get("platforms", "k").unwrap().unwrap(), b"p");
    }

    #[test]
    fn test_remove_and_keys() {
        let store = InMemoryStore::new();
        store.put("ns", "b", Vec::new()).unwrap();
        store.put("ns", "a", Vec::new()).unwrap();
        assert_eq!(store.keys("ns").unwrap(), vec!["a", "b"]);

        assert!(store.remove("ns", "a").unwrap());
        assert!(!store.remove("ns", "a").unwrap());
        assert!(!store.remove("missing", "a").unwrap());
        assert_eq!(store.keys("ns").unwrap(), vec!["b"]);
    }
}
