//! Registry entries: signed, revisioned key-value records.
//!
//! An entry lives at `(public key, hashed data key)`. Only the owner of the
//! public key can produce a valid entry, and portals keep the entry with the
//! highest revision.
//!
//! ## Signed hash
//!
//! ```text
//! BLAKE2b-256(
//!     hashed data key (32 bytes)
//!     || u64le(len(data)) || data
//!     || u64be(revision)
//! )
//! ```
//!
//! The signature is a detached Ed25519 signature over this digest.

use std::fmt;

use bytes::Bytes;

use crate::Hash;
use crate::hash::{hash_all, hash_data_key};
use crate::keys::{KeyPair, PublicKeyEd25519, SIGNATURE_SIZE, verify_signature};

/// Maximum length of the data of an entry written as raw entry data.
pub const MAX_ENTRY_LENGTH: usize = 70;

/// Largest revision an entry can carry. Incrementing past it is an error.
pub const MAX_REVISION: u64 = u64::MAX;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EntryError {
    #[error("data key must be a non-empty string")]
    EmptyDataKey,

    #[error("invalid hashed data key: {0}")]
    InvalidHashedDataKey(String),

    #[error("entry data too large: {size} bytes (max: {max})")]
    DataTooLarge { size: usize, max: usize },

    #[error("invalid signature length: expected {SIGNATURE_SIZE}, got {0}")]
    InvalidSignatureLength(usize),

    #[error("signature verification failed")]
    InvalidSignature,
}

/// Identifies an entry within an owner's namespace.
///
/// Portals only ever see the hashed form. `Raw` keys are hashed with
/// [`hash_data_key`] before use.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum DataKey {
    Raw(String),
    Hashed(Hash),
}

impl DataKey {
    /// Parses a hex encoded, already hashed data key.
    pub fn parse_hashed_hex(s: &str) -> Result<Self, EntryError> {
        Hash::from_hex(s)
            .map(DataKey::Hashed)
            .map_err(|e| EntryError::InvalidHashedDataKey(e.to_string()))
    }

    /// The 32-byte key portals index entries by.
    pub fn hashed(&self) -> Hash {
        match self {
            DataKey::Raw(key) => hash_data_key(key),
            DataKey::Hashed(hash) => *hash,
        }
    }

    pub fn validate(&self) -> Result<(), EntryError> {
        match self {
            DataKey::Raw(key) if key.is_empty() => Err(EntryError::EmptyDataKey),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKey::Raw(key) => f.debug_tuple("Raw").field(key).finish(),
            DataKey::Hashed(hash) => f.debug_tuple("Hashed").field(&hash.to_hex()).finish(),
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKey::Raw(key) => f.write_str(key),
            DataKey::Hashed(hash) => write!(f, "{hash}"),
        }
    }
}

impl From<&str> for DataKey {
    fn from(value: &str) -> Self {
        DataKey::Raw(value.to_owned())
    }
}

impl From<String> for DataKey {
    fn from(value: String) -> Self {
        DataKey::Raw(value)
    }
}

impl From<Hash> for DataKey {
    fn from(value: Hash) -> Self {
        DataKey::Hashed(value)
    }
}

/// An unsigned registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub data_key: DataKey,
    pub data: Bytes,
    pub revision: u64,
}

impl RegistryEntry {
    pub fn new(data_key: impl Into<DataKey>, data: impl Into<Bytes>, revision: u64) -> Self {
        Self {
            data_key: data_key.into(),
            data: data.into(),
            revision,
        }
    }

    /// Checks the data key and, if given, the maximum data length.
    pub fn validate(&self, max_data_len: Option<usize>) -> Result<(), EntryError> {
        self.data_key.validate()?;
        if let Some(max) = max_data_len
            && self.data.len() > max
        {
            return Err(EntryError::DataTooLarge {
                size: self.data.len(),
                max,
            });
        }
        Ok(())
    }

    /// The digest that gets signed, see [`hash_registry_entry`].
    pub fn hash(&self) -> Hash {
        hash_registry_entry(self)
    }
}

/// `u64le(len) || bytes`, the Sia encoding of a byte slice.
pub fn encode_prefixed_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + bytes.len());
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
    out
}

/// Hashes an entry for signing. A [`DataKey::Raw`] key is hashed first, a
/// [`DataKey::Hashed`] key is used as is.
pub fn hash_registry_entry(entry: &RegistryEntry) -> Hash {
    let data_key = entry.data_key.hashed();
    hash_all(&[
        data_key.as_bytes(),
        &encode_prefixed_bytes(&entry.data),
        &entry.revision.to_be_bytes(),
    ])
}

/// A detached Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EntryError> {
        let bytes: [u8; SIGNATURE_SIZE] = bytes
            .try_into()
            .map_err(|_| EntryError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, EntryError> {
        let bytes = hex::decode(s).map_err(|_| EntryError::InvalidSignatureLength(s.len() / 2))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature").field(&self.to_hex()).finish()
    }
}

/// Signs `hash_registry_entry(entry)` with `key_pair`.
pub fn sign_registry_entry(key_pair: &KeyPair, entry: &RegistryEntry) -> Signature {
    Signature(key_pair.sign(entry.hash().as_bytes()))
}

/// Checks `signature` against the entry hash and `public_key`.
pub fn verify_registry_entry(
    public_key: &PublicKeyEd25519,
    entry: &RegistryEntry,
    signature: &Signature,
) -> bool {
    verify_signature(public_key, entry.hash().as_bytes(), signature.as_bytes())
}

/// An entry together with its owner and signature, as stored by portals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRegistryEntry {
    pub public_key: PublicKeyEd25519,
    pub entry: RegistryEntry,
    pub signature: Signature,
}

impl SignedRegistryEntry {
    pub fn new(public_key: PublicKeyEd25519, entry: RegistryEntry, signature: Signature) -> Self {
        Self {
            public_key,
            entry,
            signature,
        }
    }

    /// Signs `entry` with the given key pair.
    pub fn sign(key_pair: &KeyPair, entry: RegistryEntry) -> Self {
        let signature = sign_registry_entry(key_pair, &entry);
        Self::new(key_pair.public_key(), entry, signature)
    }

    pub fn verify(&self) -> Result<(), EntryError> {
        if verify_registry_entry(&self.public_key, &self.entry, &self.signature) {
            Ok(())
        } else {
            Err(EntryError::InvalidSignature)
        }
    }
}
