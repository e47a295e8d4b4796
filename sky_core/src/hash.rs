//! The hash type used by Sia and Skynet (BLAKE2b, 32 bytes)
//!
//! Registry entry hashes, data key hashes and v2 skylink entry ids are all
//! BLAKE2b-256 digests over concatenated inputs. Path seeds use SHA-512, see
//! [`sha512`].

use std::{borrow::Borrow, fmt, str::FromStr};

use blake2::{Blake2b, Digest, digest::consts::U32};
use sha2::Sha512;

/// BLAKE2b with a 256 bit output, `NewHash` in Sia.
pub type Blake2b256 = Blake2b<U32>;

/// Hash type used for registry entries and skylinks (BLAKE2b-256, 32 bytes)
#[derive(Clone, Copy, Hash, PartialEq, Eq)]
pub struct Hash([u8; 32]);

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hash").field(&self.to_hex()).finish()
    }
}

impl Hash {
    /// The hash for the empty byte range (`b""`).
    pub const EMPTY: Hash = Hash::from_bytes([
        14, 87, 81, 192, 38, 229, 67, 178, 232, 171, 46, 176, 96, 153, 218, 161, 209, 229, 223,
        71, 119, 143, 119, 135, 250, 171, 69, 205, 241, 47, 227, 168,
    ]);

    /// The size of the hash in bytes.
    pub const SIZE: usize = 32;

    /// Calculate the hash of the provided bytes.
    pub fn new(buf: impl AsRef<[u8]>) -> Self {
        hash_all(&[buf.as_ref()])
    }

    /// Bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create a `Hash` from its raw bytes representation.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Convert the hash to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Convert to a hex string limited to the first 5bytes for a friendly string
    /// representation of the hash.
    pub fn fmt_short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

/// Streams every part into a single BLAKE2b-256 hasher, in order.
///
/// `hash_all(&[a, b])` equals `Hash::new([a, b].concat())`; the parts are not
/// delimited, so callers that need unambiguous framing must length-prefix
/// their inputs themselves.
pub fn hash_all(parts: &[&[u8]]) -> Hash {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    Hash(out)
}

/// Hash of the UTF-8 encoding of a data key.
pub fn hash_data_key(data_key: &str) -> Hash {
    Hash::new(data_key.as_bytes())
}

/// SHA-512 over `bytes`.
pub fn sha512(bytes: impl AsRef<[u8]>) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Sha512::digest(bytes.as_ref()));
    out
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for Hash {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8; 32]> for Hash {
    fn borrow(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash {
    fn from(value: [u8; 32]) -> Self {
        Hash(value)
    }
}

impl From<Hash> for [u8; 32] {
    fn from(value: Hash) -> Self {
        value.0
    }
}

impl From<&[u8; 32]> for Hash {
    fn from(value: &[u8; 32]) -> Self {
        Hash(*value)
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::from_hex(s)
    }
}
