//! SkyDB: a key-value store on top of the registry.
//!
//! Each value lives behind one registry entry of the owner. Depending on the
//! method, the entry data is
//!
//! - a raw v1 skylink pointing at a JSON document or raw bytes in the blob
//!   store (`*_json`, `*_raw_bytes`, [`SkyDb::set_data_link`]),
//! - up to [`MAX_ENTRY_LENGTH`] bytes of raw data (`*_entry_data`),
//! - a skylink pointing at an encrypted, padded JSON envelope, stored under
//!   the tweak of a file path seed (`*_json_encrypted`).
//!
//! An all-zero skylink marks a deleted value.
//!
//! Every write runs inside [`RevisionNumberCache::with_cached_entry_lock`].
//! When the cached revision is unknown the current entry is fetched first,
//! inside the lock, so the new revision always follows the remote one.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Value, json};
use sky_core::encryption::{
    EncryptedFileMetadata, PathSeed, decrypt_json_file, derive_file_key_entropy,
    derive_file_tweak, encrypt_json_file,
};
use sky_core::registry::{
    MAX_ENTRY_LENGTH, RegistryEntry, Signature, SignedRegistryEntry, sign_registry_entry,
};
use sky_core::skylink::EMPTY_SKYLINK;
use sky_core::{BlobStore, DataKey, KeyPair, PublicKeyEd25519, RegistryApi, Skylink};
use tracing::debug;

use crate::client::RegistryClient;
use crate::error::{Error, Result};
use crate::revision_cache::{RevisionNumberCache, increment_revision};

/// Version tag of the JSON wrapper written by [`SkyDb::set_json`].
pub const JSON_RESPONSE_VERSION: u64 = 2;

/// Signs registry entries on behalf of an owner.
///
/// [`KeyPair`] signs locally; other implementations may forward the entry to
/// an external signer.
#[async_trait]
pub trait EntrySigner: Send + Sync {
    fn public_key(&self) -> PublicKeyEd25519;

    async fn sign_entry(&self, entry: &RegistryEntry) -> Result<Signature>;
}

#[async_trait]
impl EntrySigner for KeyPair {
    fn public_key(&self) -> PublicKeyEd25519 {
        KeyPair::public_key(self)
    }

    async fn sign_entry(&self, entry: &RegistryEntry) -> Result<Signature> {
        Ok(sign_registry_entry(self, entry))
    }
}

/// A JSON value and the skylink of the document it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    pub data: Option<Value>,
    pub data_link: Option<Skylink>,
}

impl JsonResponse {
    fn empty() -> Self {
        Self {
            data: None,
            data_link: None,
        }
    }
}

/// Raw bytes and the skylink they were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBytesResponse {
    pub data: Option<Bytes>,
    pub data_link: Option<Skylink>,
}

#[derive(Debug)]
pub struct SkyDb<R, B> {
    client: RegistryClient<R>,
    blobs: B,
    cache: Arc<RevisionNumberCache>,
}

impl<R: RegistryApi, B: BlobStore> SkyDb<R, B> {
    pub fn new(client: RegistryClient<R>, blobs: B) -> Self {
        Self {
            client,
            blobs,
            cache: Arc::new(RevisionNumberCache::new()),
        }
    }

    /// Shares a revision cache with other handles writing the same entries.
    pub fn with_cache(mut self, cache: Arc<RevisionNumberCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<RevisionNumberCache> {
        &self.cache
    }

    pub fn client(&self) -> &RegistryClient<R> {
        &self.client
    }

    // --- JSON ---

    /// Reads the JSON value at `data_key`. Deleted and missing values both
    /// read as empty.
    pub async fn get_json(&self, public_key: &PublicKeyEd25519, data_key: &str) -> Result<JsonResponse> {
        let Some(skylink) = self.get_data_link(public_key, &DataKey::from(data_key)).await? else {
            return Ok(JsonResponse::empty());
        };
        let bytes = self.download(&skylink).await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(JsonResponse {
            data: Some(unwrap_json(value)),
            data_link: Some(skylink),
        })
    }

    /// Uploads `json` and points the entry at it.
    pub async fn set_json<S, T>(&self, signer: &S, data_key: &str, json: &T) -> Result<JsonResponse>
    where
        S: EntrySigner + ?Sized,
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(json)?;
        let wrapped = json!({ "_data": value, "_v": JSON_RESPONSE_VERSION });
        let skylink = self.blobs.put(Bytes::from(serde_json::to_vec(&wrapped)?)).await?;
        self.write_entry(signer, DataKey::from(data_key), Bytes::copy_from_slice(&skylink.to_bytes()))
            .await?;
        Ok(JsonResponse {
            data: Some(value),
            data_link: Some(skylink),
        })
    }

    /// Marks the value at `data_key` as deleted.
    pub async fn delete_json<S: EntrySigner + ?Sized>(&self, signer: &S, data_key: &str) -> Result<()> {
        self.write_entry(signer, DataKey::from(data_key), Bytes::from_static(&EMPTY_SKYLINK))
            .await
            .map(drop)
    }

    // --- raw bytes and data links ---

    pub async fn get_raw_bytes(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &str,
    ) -> Result<RawBytesResponse> {
        let Some(skylink) = self.get_data_link(public_key, &DataKey::from(data_key)).await? else {
            return Ok(RawBytesResponse {
                data: None,
                data_link: None,
            });
        };
        let bytes = self.download(&skylink).await?;
        Ok(RawBytesResponse {
            data: Some(bytes),
            data_link: Some(skylink),
        })
    }

    /// Points the entry at an already uploaded skylink.
    pub async fn set_data_link<S: EntrySigner + ?Sized>(
        &self,
        signer: &S,
        data_key: &str,
        data_link: &Skylink,
    ) -> Result<()> {
        self.write_entry(signer, DataKey::from(data_key), Bytes::copy_from_slice(&data_link.to_bytes()))
            .await
            .map(drop)
    }

    // --- raw entry data ---

    /// Reads the raw entry data. Deleted and missing entries read as `None`.
    pub async fn get_entry_data(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &str,
    ) -> Result<Option<Bytes>> {
        let entry = self.read_entry(public_key, &DataKey::from(data_key)).await?;
        Ok(entry
            .map(|signed| signed.entry.data)
            .filter(|data| data[..] != EMPTY_SKYLINK))
    }

    /// Stores up to [`MAX_ENTRY_LENGTH`] bytes directly in the entry.
    pub async fn set_entry_data<S: EntrySigner + ?Sized>(
        &self,
        signer: &S,
        data_key: &str,
        data: &[u8],
    ) -> Result<()> {
        if data == EMPTY_SKYLINK {
            return Err(Error::InvalidEntryData(
                "data matches the deletion marker, use delete_entry_data instead".into(),
            ));
        }
        RegistryEntry::new(data_key, Bytes::copy_from_slice(data), 0).validate(Some(MAX_ENTRY_LENGTH))?;
        self.write_entry(signer, DataKey::from(data_key), Bytes::copy_from_slice(data))
            .await
            .map(drop)
    }

    pub async fn delete_entry_data<S: EntrySigner + ?Sized>(
        &self,
        signer: &S,
        data_key: &str,
    ) -> Result<()> {
        self.write_entry(signer, DataKey::from(data_key), Bytes::from_static(&EMPTY_SKYLINK))
            .await
            .map(drop)
    }

    // --- encrypted JSON ---

    /// Reads and decrypts the JSON file with the given file path seed.
    pub async fn get_json_encrypted(
        &self,
        public_key: &PublicKeyEd25519,
        path_seed: &PathSeed,
    ) -> Result<Option<Value>> {
        let tweak = derive_file_tweak(path_seed)?;
        let key = derive_file_key_entropy(path_seed)?;
        let Some(skylink) = self.get_data_link(public_key, &DataKey::Hashed(tweak)).await? else {
            return Ok(None);
        };
        let envelope = self.download(&skylink).await?;
        Ok(Some(decrypt_json_file(&envelope, &key)?))
    }

    /// Encrypts `json` for the file with the given path seed and stores it.
    pub async fn set_json_encrypted<S, T>(&self, signer: &S, path_seed: &PathSeed, json: &T) -> Result<Skylink>
    where
        S: EntrySigner + ?Sized,
        T: Serialize + ?Sized,
    {
        let tweak = derive_file_tweak(path_seed)?;
        let key = derive_file_key_entropy(path_seed)?;
        let envelope = encrypt_json_file(json, EncryptedFileMetadata::default(), &key)?;
        let skylink = self.blobs.put(Bytes::from(envelope)).await?;
        self.write_entry(signer, DataKey::Hashed(tweak), Bytes::copy_from_slice(&skylink.to_bytes()))
            .await?;
        Ok(skylink)
    }

    // --- internals ---

    /// Reads an entry and records its revision in the cache.
    async fn read_entry(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &DataKey,
    ) -> Result<Option<SignedRegistryEntry>> {
        let entry = self.client.get_entry(public_key, data_key).await?;
        if let Some(signed) = &entry {
            self.cache
                .observe(public_key, &data_key.hashed(), signed.entry.revision);
        }
        Ok(entry)
    }

    /// The skylink stored in the entry, `None` if missing or deleted.
    async fn get_data_link(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &DataKey,
    ) -> Result<Option<Skylink>> {
        let Some(signed) = self.read_entry(public_key, data_key).await? else {
            return Ok(None);
        };
        let skylink = Skylink::from_bytes(&signed.entry.data).map_err(|e| {
            Error::InvalidEntryData(format!("entry data is not a skylink: {e}"))
        })?;
        if skylink.is_empty() {
            debug!(%data_key, "entry is deleted");
            return Ok(None);
        }
        Ok(Some(skylink))
    }

    async fn download(&self, skylink: &Skylink) -> Result<Bytes> {
        self.blobs
            .get(skylink)
            .await?
            .ok_or_else(|| Error::BlobNotFound(skylink.to_string()))
    }

    /// Writes `data` at the next revision. Returns the revision written.
    async fn write_entry<S: EntrySigner + ?Sized>(
        &self,
        signer: &S,
        data_key: DataKey,
        data: Bytes,
    ) -> Result<u64> {
        data_key.validate()?;
        let public_key = signer.public_key();
        let hashed = data_key.hashed();

        self.cache
            .with_cached_entry_lock(&public_key, &hashed, |cached| async move {
                let current = match cached {
                    Some(revision) => Some(revision),
                    None => {
                        debug!(%data_key, "revision unknown, fetching entry");
                        self.client
                            .get_entry(&public_key, &data_key)
                            .await?
                            .map(|signed| signed.entry.revision)
                    }
                };
                let revision = increment_revision(current)?;
                let entry = RegistryEntry::new(data_key, data, revision);
                let signature = signer.sign_entry(&entry).await?;
                self.client
                    .post_signed_entry(&public_key, entry, signature)
                    .await?;
                Ok((revision, revision))
            })
            .await
    }
}

/// Strips the `{"_data": .., "_v": ..}` wrapper. Documents without it are
/// returned as they are.
fn unwrap_json(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("_data") && map.contains_key("_v") => {
            map.remove("_data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{MemoryBlobStore, MemoryRegistry};
    use sky_core::encryption::EncryptionError;

    type Db = SkyDb<Arc<MemoryRegistry>, Arc<MemoryBlobStore>>;

    fn setup() -> (Db, Arc<MemoryRegistry>, Arc<MemoryBlobStore>, KeyPair) {
        let registry = Arc::new(MemoryRegistry::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let db = SkyDb::new(RegistryClient::new(registry.clone()), blobs.clone());
        (db, registry, blobs, KeyPair::from_seed("skydb test").unwrap())
    }

    #[tokio::test]
    async fn test_json_roundtrip() {
        let (db, _, blobs, keys) = setup();
        let value = json!({"message": "hello", "count": 3});
        let set = db.set_json(&keys, "app/data.json", &value).await.unwrap();

        let got = db.get_json(&keys.public_key(), "app/data.json").await.unwrap();
        assert_eq!(got.data, Some(value));
        assert_eq!(got.data_link, set.data_link);

        let stored = blobs.get(&set.data_link.unwrap()).await.unwrap().unwrap();
        let stored: Value = serde_json::from_slice(&stored).unwrap();
        assert_eq!(stored["_v"], json!(2));
    }

    #[tokio::test]
    async fn test_revisions_increase() {
        let (db, registry, _, keys) = setup();
        for i in 0..3 {
            db.set_json(&keys, "counter", &json!({ "i": i })).await.unwrap();
        }
        let hashed = DataKey::from("counter").hashed();
        let entry = registry.get(&keys.public_key(), &hashed).await.unwrap().unwrap();
        assert_eq!(entry.entry.revision, 2);
        assert_eq!(db.cache().cached_revision(&keys.public_key(), &hashed), Some(2));
    }

    #[tokio::test]
    async fn test_first_write_follows_remote_revision() {
        let (db, registry, _, keys) = setup();
        registry
            .set(SignedRegistryEntry::sign(
                &keys,
                RegistryEntry::new("shared", vec![1], 5),
            ))
            .await
            .unwrap();

        db.set_entry_data(&keys, "shared", &[2]).await.unwrap();
        let hashed = DataKey::from("shared").hashed();
        let entry = registry.get(&keys.public_key(), &hashed).await.unwrap().unwrap();
        assert_eq!(entry.entry.revision, 6);
    }

    #[tokio::test]
    async fn test_delete_json() {
        let (db, _, _, keys) = setup();
        db.set_json(&keys, "gone", &json!([1, 2])).await.unwrap();
        db.delete_json(&keys, "gone").await.unwrap();
        let got = db.get_json(&keys.public_key(), "gone").await.unwrap();
        assert_eq!(got, JsonResponse::empty());
    }

    #[tokio::test]
    async fn test_missing_json_is_empty() {
        let (db, _, _, keys) = setup();
        let got = db.get_json(&keys.public_key(), "never written").await.unwrap();
        assert_eq!(got.data, None);
        assert_eq!(got.data_link, None);
    }

    #[tokio::test]
    async fn test_unwrapped_documents_are_returned_as_is() {
        let (db, _, blobs, keys) = setup();
        let legacy = json!({"plain": true});
        let skylink = blobs
            .put(Bytes::from(serde_json::to_vec(&legacy).unwrap()))
            .await
            .unwrap();
        db.set_data_link(&keys, "legacy", &skylink).await.unwrap();
        let got = db.get_json(&keys.public_key(), "legacy").await.unwrap();
        assert_eq!(got.data, Some(legacy));
    }

    #[tokio::test]
    async fn test_raw_bytes() {
        let (db, _, blobs, keys) = setup();
        let skylink = blobs.put(Bytes::from_static(b"\x00\x01raw")).await.unwrap();
        db.set_data_link(&keys, "raw", &skylink).await.unwrap();
        let got = db.get_raw_bytes(&keys.public_key(), "raw").await.unwrap();
        assert_eq!(got.data.as_deref(), Some(&b"\x00\x01raw"[..]));
        assert_eq!(got.data_link, Some(skylink));
    }

    #[tokio::test]
    async fn test_entry_data() {
        let (db, _, _, keys) = setup();
        db.set_entry_data(&keys, "small", b"tiny value").await.unwrap();
        assert_eq!(
            db.get_entry_data(&keys.public_key(), "small").await.unwrap().as_deref(),
            Some(&b"tiny value"[..])
        );

        db.delete_entry_data(&keys, "small").await.unwrap();
        assert_eq!(db.get_entry_data(&keys.public_key(), "small").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_data_limits() {
        let (db, registry, _, keys) = setup();
        let err = db
            .set_entry_data(&keys, "big", &[1u8; MAX_ENTRY_LENGTH + 1])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = db.set_entry_data(&keys, "marker", &EMPTY_SKYLINK).await.unwrap_err();
        assert!(matches!(err, Error::InvalidEntryData(_)));
        assert!(registry.is_empty());

        db.set_entry_data(&keys, "max", &[1u8; MAX_ENTRY_LENGTH]).await.unwrap();
    }

    #[tokio::test]
    async fn test_encrypted_json() {
        let (db, registry, blobs, keys) = setup();
        let root = PathSeed::Directory([3u8; 64]);
        let file = sky_core::derive_path_seed(&root, "app.hns/secret.json", false).unwrap();
        let value = json!({"secret": "value"});

        let skylink = db.set_json_encrypted(&keys, &file, &value).await.unwrap();
        assert_eq!(
            db.get_json_encrypted(&keys.public_key(), &file).await.unwrap(),
            Some(value)
        );

        // Stored under the tweak, padded to a full block.
        let tweak = derive_file_tweak(&file).unwrap();
        assert!(registry.get(&keys.public_key(), &tweak).await.unwrap().is_some());
        let envelope = blobs.get(&skylink).await.unwrap().unwrap();
        assert_eq!(envelope.len() % 4096, 0);

        let other = sky_core::derive_path_seed(&root, "app.hns/other.json", false).unwrap();
        assert_eq!(db.get_json_encrypted(&keys.public_key(), &other).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_encrypted_file_with_non_json_plaintext() {
        let (db, _, blobs, keys) = setup();
        let root = PathSeed::Directory([4u8; 64]);
        let file = sky_core::derive_path_seed(&root, "app.hns/broken.json", false).unwrap();
        let key = derive_file_key_entropy(&file).unwrap();

        let envelope = sky_core::encryption::encrypt_padded_bytes(
            b"not json",
            EncryptedFileMetadata::default(),
            &key,
            &[9u8; 24],
        )
        .unwrap();
        let skylink = blobs.put(Bytes::from(envelope)).await.unwrap();
        let entry = RegistryEntry::new(
            DataKey::Hashed(derive_file_tweak(&file).unwrap()),
            Bytes::copy_from_slice(&skylink.to_bytes()),
            0,
        );
        db.client().set_entry(&keys, entry).await.unwrap();

        let err = db.get_json_encrypted(&keys.public_key(), &file).await.unwrap_err();
        assert!(matches!(err, Error::Encryption(EncryptionError::Json(_))));
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[tokio::test]
    async fn test_encrypted_json_requires_file_seed() {
        let (db, _, _, keys) = setup();
        let root = PathSeed::Directory([3u8; 64]);
        let err = db
            .set_json_encrypted(&keys, &root, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_failed_post_keeps_cached_revision() {
        let (db, registry, _, keys) = setup();
        db.set_entry_data(&keys, "k", b"one").await.unwrap();
        let hashed = DataKey::from("k").hashed();

        // Someone else moves the entry ahead; our cached revision is stale.
        registry
            .set(SignedRegistryEntry::sign(&keys, RegistryEntry::new("k", vec![0], 1)))
            .await
            .unwrap();
        let err = db.set_entry_data(&keys, "k", b"two").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(db.cache().cached_revision(&keys.public_key(), &hashed), Some(0));

        // A read refreshes the cache and the next write succeeds.
        db.get_entry_data(&keys.public_key(), "k").await.unwrap();
        db.set_entry_data(&keys, "k", b"three").await.unwrap();
        let entry = registry.get(&keys.public_key(), &hashed).await.unwrap().unwrap();
        assert_eq!(entry.entry.revision, 2);
    }

    #[test]
    fn test_unwrap_json() {
        assert_eq!(unwrap_json(json!({"_data": 5, "_v": 2})), json!(5));
        assert_eq!(unwrap_json(json!({"_data": 5})), json!({"_data": 5}));
        assert_eq!(unwrap_json(json!([1])), json!([1]));
    }
}
