//! Validated, optionally verified access to a registry.

use sky_core::registry::{RegistryEntry, Signature, SignedRegistryEntry, sign_registry_entry};
use sky_core::{DataKey, KeyPair, PublicKeyEd25519, RegistryApi, Skylink};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Wraps a [`RegistryApi`] with input validation and signature checks.
#[derive(Debug, Clone)]
pub struct RegistryClient<R> {
    registry: R,
    verify_signatures: bool,
}

impl<R: RegistryApi> RegistryClient<R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            verify_signatures: true,
        }
    }

    /// Whether entries read from the registry must carry a valid signature.
    pub fn with_signature_verification(mut self, verify: bool) -> Self {
        self.verify_signatures = verify;
        self
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Reads the entry at `(public_key, data_key)`. `Ok(None)` if it does not
    /// exist.
    pub async fn get_entry(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &DataKey,
    ) -> Result<Option<SignedRegistryEntry>> {
        data_key.validate()?;
        let hashed = data_key.hashed();
        let Some(signed) = self.registry.get(public_key, &hashed).await? else {
            debug!(data_key = %hashed.fmt_short(), "registry entry not found");
            return Ok(None);
        };

        if signed.public_key != *public_key || signed.entry.data_key.hashed() != hashed {
            return Err(Error::InvalidEntryData(format!(
                "registry returned an entry for a different key than {}/{}",
                hex::encode(public_key),
                hashed
            )));
        }
        if self.verify_signatures && signed.verify().is_err() {
            warn!(data_key = %hashed.fmt_short(), "registry entry has an invalid signature");
            return Err(Error::InvalidSignature {
                public_key: hex::encode(public_key),
                data_key: hashed.to_hex(),
            });
        }
        Ok(Some(signed))
    }

    /// Signs `entry` with `key_pair` and posts it.
    pub async fn set_entry(&self, key_pair: &KeyPair, entry: RegistryEntry) -> Result<()> {
        entry.validate(None)?;
        let signature = sign_registry_entry(key_pair, &entry);
        self.post_signed_entry(&key_pair.public_key(), entry, signature)
            .await
    }

    /// Posts an entry that was signed elsewhere.
    pub async fn post_signed_entry(
        &self,
        public_key: &PublicKeyEd25519,
        entry: RegistryEntry,
        signature: Signature,
    ) -> Result<()> {
        entry.validate(None)?;
        let revision = entry.revision;
        self.registry
            .set(SignedRegistryEntry::new(*public_key, entry, signature))
            .await?;
        debug!(revision, "posted registry entry");
        Ok(())
    }

    /// The v2 skylink resolving to the entry at `(public_key, data_key)`.
    pub fn get_entry_link(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &DataKey,
    ) -> Result<Skylink> {
        get_entry_link(public_key, data_key)
    }
}

/// The v2 skylink resolving to the entry at `(public_key, data_key)`.
pub fn get_entry_link(public_key: &PublicKeyEd25519, data_key: &DataKey) -> Result<Skylink> {
    data_key.validate()?;
    Ok(Skylink::new_v2(public_key, &data_key.hashed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn keys() -> KeyPair {
        KeyPair::from_seed("client test").unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let client = RegistryClient::new(MemoryRegistry::new());
        let keys = keys();
        client
            .set_entry(&keys, RegistryEntry::new("app/key", vec![1, 2], 0))
            .await
            .unwrap();

        let signed = client
            .get_entry(&keys.public_key(), &DataKey::from("app/key"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signed.entry.revision, 0);
        assert_eq!(&signed.entry.data[..], &[1, 2]);
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let client = RegistryClient::new(MemoryRegistry::new());
        let entry = client
            .get_entry(&keys().public_key(), &DataKey::from("nothing"))
            .await
            .unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_empty_data_key_rejected_before_io() {
        let client = RegistryClient::new(MemoryRegistry::new());
        let err = client
            .get_entry(&keys().public_key(), &DataKey::from(""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = client
            .set_entry(&keys(), RegistryEntry::new("", vec![], 0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(client.registry().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_signature_is_integrity_error() {
        let registry = Arc::new(MemoryRegistry::new());
        let keys = keys();
        let mut signed = SignedRegistryEntry::sign(&keys, RegistryEntry::new("k", vec![1], 0));
        signed.entry.data = bytes::Bytes::from_static(b"forged");
        registry.insert_unchecked(signed);

        let client = RegistryClient::new(registry.clone());
        let err = client
            .get_entry(&keys.public_key(), &DataKey::from("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSignature { .. }));
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let lenient = RegistryClient::new(registry).with_signature_verification(false);
        let entry = lenient
            .get_entry(&keys.public_key(), &DataKey::from("k"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&entry.entry.data[..], b"forged");
    }

    #[tokio::test]
    async fn test_post_signed_entry() {
        let client = RegistryClient::new(MemoryRegistry::new());
        let keys = keys();
        let entry = RegistryEntry::new("delegated", vec![9], 0);
        let signature = sign_registry_entry(&keys, &entry);
        client
            .post_signed_entry(&keys.public_key(), entry, signature)
            .await
            .unwrap();
        assert_eq!(client.registry().len(), 1);

        // Reusing the signature for another revision is rejected by the registry.
        let replay = RegistryEntry::new("delegated", vec![9], 1);
        let err = client
            .post_signed_entry(&keys.public_key(), replay, signature)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_entry_link_is_v2() {
        let keys = keys();
        let link = get_entry_link(&keys.public_key(), &DataKey::from("k")).unwrap();
        assert!(link.is_v2());
        assert_eq!(
            link,
            Skylink::new_v2(&keys.public_key(), &DataKey::from("k").hashed())
        );
    }
}
