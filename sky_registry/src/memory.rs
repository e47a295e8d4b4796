//! In-memory backends.
//!
//! Useful for tests and as local stand-ins for a portal. [`MemoryRegistry`]
//! enforces what a portal enforces: valid signatures and strictly increasing
//! revisions. Rejections use the status codes a portal would answer with.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use sky_core::{
    BlobStore, Hash, PublicKeyEd25519, RegistryApi, SignedRegistryEntry, Skylink, TransportError,
};
use tracing::debug;

/// Status a portal answers with for rejected entries.
pub const STATUS_BAD_REQUEST: u16 = 400;

type EntryKey = (PublicKeyEd25519, Hash);

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<EntryKey, SignedRegistryEntry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores an entry without any checks, e.g. to simulate a corrupt portal.
    pub fn insert_unchecked(&self, entry: SignedRegistryEntry) {
        let key = (entry.public_key, entry.entry.data_key.hashed());
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }
}

#[async_trait]
impl RegistryApi for MemoryRegistry {
    async fn get(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &Hash,
    ) -> Result<Option<SignedRegistryEntry>, TransportError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&(*public_key, *data_key)).cloned())
    }

    async fn set(&self, entry: SignedRegistryEntry) -> Result<(), TransportError> {
        if entry.verify().is_err() {
            return Err(TransportError::status(
                STATUS_BAD_REQUEST,
                "invalid registry entry signature",
            ));
        }

        let key = (entry.public_key, entry.entry.data_key.hashed());
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&key)
            && existing.entry.revision >= entry.entry.revision
        {
            return Err(TransportError::status(
                STATUS_BAD_REQUEST,
                format!(
                    "revision {} is not higher than the stored revision {}",
                    entry.entry.revision, existing.entry.revision
                ),
            ));
        }
        debug!(
            data_key = %key.1.fmt_short(),
            revision = entry.entry.revision,
            "stored registry entry"
        );
        entries.insert(key, entry);
        Ok(())
    }
}

/// Blobs keyed by the hash of their content, addressed with v1 skylinks.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<Skylink, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<Skylink, TransportError> {
        let skylink = Skylink::new(0, *Hash::new(&bytes).as_bytes());
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(skylink, bytes);
        Ok(skylink)
    }

    async fn get(&self, skylink: &Skylink) -> Result<Option<Bytes>, TransportError> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(skylink)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sky_core::{KeyPair, RegistryEntry};

    fn keys() -> KeyPair {
        KeyPair::from_seed("memory registry").unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let registry = MemoryRegistry::new();
        let keys = keys();
        let signed = SignedRegistryEntry::sign(&keys, RegistryEntry::new("k", vec![1], 0));
        registry.set(signed.clone()).await.unwrap();

        let fetched = registry
            .get(&keys.public_key(), &signed.entry.data_key.hashed())
            .await
            .unwrap();
        assert_eq!(fetched, Some(signed));
        assert!(
            registry
                .get(&keys.public_key(), &Hash::new(b"missing"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_rejects_stale_revision() {
        let registry = MemoryRegistry::new();
        let keys = keys();
        registry
            .set(SignedRegistryEntry::sign(&keys, RegistryEntry::new("k", vec![], 3)))
            .await
            .unwrap();

        for revision in [2, 3] {
            let err = registry
                .set(SignedRegistryEntry::sign(
                    &keys,
                    RegistryEntry::new("k", vec![], revision),
                ))
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), Some(STATUS_BAD_REQUEST));
        }

        registry
            .set(SignedRegistryEntry::sign(&keys, RegistryEntry::new("k", vec![], 4)))
            .await
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_signature() {
        let registry = MemoryRegistry::new();
        let mut signed = SignedRegistryEntry::sign(&keys(), RegistryEntry::new("k", vec![], 0));
        signed.entry.data = Bytes::from_static(b"tampered");
        let err = registry.set(signed).await.unwrap_err();
        assert_eq!(err.status_code(), Some(STATUS_BAD_REQUEST));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_blob_store() {
        let store = MemoryBlobStore::new();
        let data = Bytes::from_static(b"some content");
        let skylink = store.put(data.clone()).await.unwrap();
        assert!(skylink.is_v1());
        assert_eq!(skylink.merkle_root, *Hash::new(&data).as_bytes());
        assert_eq!(store.get(&skylink).await.unwrap(), Some(data.clone()));
        assert_eq!(store.put(data).await.unwrap(), skylink);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store
                .get(&Skylink::new(0, [0u8; 32]))
                .await
                .unwrap(),
            None
        );
    }
}
