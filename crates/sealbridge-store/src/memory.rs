//! In-memory implementation of the BlobStore trait.
//!
//! Content ids are the unpadded URL-safe base64 of the BLAKE3 hash of the
//! bytes, so storing the same blob twice yields the same id. Availability can
//! be toggled to simulate a storage outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::traits::{BlobStore, ContentId};

/// In-memory blob store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentId, Bytes>>,
    available: AtomicBool,
    store_calls: AtomicUsize,
}

impl MemoryBlobStore {
    /// Create a new empty, available store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            store_calls: AtomicUsize::new(0),
        }
    }

    /// The id a blob would be stored under.
    pub fn content_id_for(data: &[u8]) -> ContentId {
        ContentId(URL_SAFE_NO_PAD.encode(blake3::hash(data).as_bytes()))
    }

    /// Toggle availability; while unavailable every call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of distinct blobs held.
    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a blob is stored under `id`.
    pub fn contains(&self, id: &ContentId) -> bool {
        self.read_guard().contains_key(id)
    }

    /// Number of `store` calls attempted, successful or not.
    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    /// Overwrite the blob under `id`; used to simulate tampering.
    pub fn replace(&self, id: &ContentId, data: Bytes) {
        self.write_guard().insert(id.clone(), data);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<ContentId, Bytes>> {
        self.blobs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<ContentId, Bytes>> {
        self.blobs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, data: Bytes) -> Result<ContentId> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let id = Self::content_id_for(&data);
        self.write_guard().entry(id.clone()).or_insert(data);
        Ok(id)
    }

    async fn read(&self, id: &ContentId) -> Result<Bytes> {
        self.check_available()?;
        self.read_guard()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_read() {
        let store = MemoryBlobStore::new();
        let id = store.store(Bytes::from_static(b"blob")).await.unwrap();
        assert_eq!(store.read(&id).await.unwrap(), Bytes::from_static(b"blob"));
        assert_eq!(id, MemoryBlobStore::content_id_for(b"blob"));
    }

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let store = MemoryBlobStore::new();
        let a = store.store(Bytes::from_static(b"same")).await.unwrap();
        let b = store.store(Bytes::from_static(b"same")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.store_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = MemoryBlobStore::new();
        let id = ContentId::new("missing").unwrap();
        assert!(matches!(
            store.read(&id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_outage() {
        let store = MemoryBlobStore::new();
        let id = store.store(Bytes::from_static(b"x")).await.unwrap();

        store.set_available(false);
        let err = store.read(&id).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.store(Bytes::from_static(b"y")).await.is_err());

        store.set_available(true);
        assert!(store.read(&id).await.is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_content_id_is_url_safe() {
        let id = MemoryBlobStore::content_id_for(&[0xff; 100]);
        assert_eq!(id.as_str().len(), 43);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
