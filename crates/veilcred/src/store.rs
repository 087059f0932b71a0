//! content-addressed payload storage seam
//!
//! encrypted identity payloads live here, keyed by the sha256 of their
//! bytes. the locator is stable, so a payload can never be swapped without
//! changing its address.

use crate::{Error, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

/// compute the content address for a blob
pub fn locator_for(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
pub trait PayloadStore: Send + Sync {
    /// store a blob, returning its content address
    async fn put(&self, bytes: &[u8]) -> Result<String>;

    /// fetch a blob by content address
    async fn get(&self, locator: &str) -> Result<Vec<u8>>;
}

/// in-process store for tests and dev deployments
#[derive(Default)]
pub struct MemoryPayloadStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayloadStore for MemoryPayloadStore {
    async fn put(&self, bytes: &[u8]) -> Result<String> {
        let locator = locator_for(bytes);
        self.blobs
            .lock()
            .expect("lock poisoned")
            .insert(locator.clone(), bytes.to_vec());
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .expect("lock poisoned")
            .get(locator)
            .cloned()
            .ok_or_else(|| Error::Payload(format!("no payload at {}", locator)))
    }
}

/// sled-backed store for single-node deployments
pub struct SledPayloadStore {
    tree: sled::Tree,
}

impl SledPayloadStore {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(SledPayloadStore {
            tree: db.open_tree("payloads")?,
        })
    }
}

#[async_trait]
impl PayloadStore for SledPayloadStore {
    async fn put(&self, bytes: &[u8]) -> Result<String> {
        let locator = locator_for(bytes);
        self.tree.insert(locator.as_bytes(), bytes)?;
        Ok(locator)
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        self.tree
            .get(locator.as_bytes())?
            .map(|v| v.to_vec())
            .ok_or_else(|| Error::Payload(format!("no payload at {}", locator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let store = MemoryPayloadStore::new();
        let locator = store.put(b"ciphertext bytes").await.unwrap();
        assert_eq!(locator, locator_for(b"ciphertext bytes"));
        assert_eq!(store.get(&locator).await.unwrap(), b"ciphertext bytes");
        assert!(store.get("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_sled_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = SledPayloadStore::open(&db).unwrap();

        let locator = store.put(b"blob").await.unwrap();
        assert_eq!(store.get(&locator).await.unwrap(), b"blob");
    }
}
