//! Seed handling and Ed25519 key derivation.
//!
//! ## Key Derivation Chain
//!
//! ```text
//! seed (UTF-8 string, usually 128 hex chars)
//!     |
//!     v
//! PBKDF2-HMAC-SHA256(seed, salt = "", 1000 rounds) -> 32 bytes
//!     |
//!     v
//! ed25519 keypair-from-seed -> (public key, private key = seed || public key)
//! ```
//!
//! Child seeds are derived with [`derive_child_seed`], which hashes the master
//! seed together with a sub seed.

use ed25519_dalek::{Signer, SigningKey as Ed25519SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use thiserror::Error;

use crate::hash::hash_all;

/// Size of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 private key (seed followed by public key) in bytes.
pub const PRIVATE_KEY_SIZE: usize = 64;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Number of PBKDF2 rounds applied to a seed.
pub const SEED_PBKDF2_ROUNDS: u32 = 1000;

/// Default number of random bytes in a generated seed, before hex encoding.
pub const DEFAULT_SEED_LENGTH: usize = 64;

/// A type alias for a 32-byte Ed25519 public key.
pub type PublicKeyEd25519 = [u8; PUBLIC_KEY_SIZE];

/// Errors that can occur during key operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid seed: must be a non-empty string")]
    EmptySeed,
    #[error("invalid seed length: must generate at least 1 byte")]
    InvalidSeedLength,
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid private key: expected {PRIVATE_KEY_SIZE} bytes of hex, got {0} bytes")]
    InvalidPrivateKey(usize),
    #[error("private key does not match its embedded public key")]
    MismatchedPrivateKey,
}

/// An Ed25519 key pair derived from a seed.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: Ed25519SigningKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Deterministically derives a key pair from a secure seed.
    pub fn from_seed(seed: &str) -> Result<Self, KeyError> {
        if seed.is_empty() {
            return Err(KeyError::EmptySeed);
        }
        let mut derived = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<sha2::Sha256>(
            seed.as_bytes(),
            b"",
            SEED_PBKDF2_ROUNDS,
            &mut derived,
        );
        Ok(Self {
            signing_key: Ed25519SigningKey::from_bytes(&derived),
        })
    }

    /// Restores a key pair from its 64-byte hex private key (`seed || public key`).
    pub fn from_private_key_hex(private_key: &str) -> Result<Self, KeyError> {
        let bytes =
            hex::decode(private_key).map_err(|_| KeyError::InvalidPrivateKey(private_key.len() / 2))?;
        let bytes: [u8; PRIVATE_KEY_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidPrivateKey(bytes.len()))?;
        let signing_key = Ed25519SigningKey::from_keypair_bytes(&bytes)
            .map_err(|_| KeyError::MismatchedPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Generates a random seed of `length` bytes (hex encoded) and its key pair.
    pub fn generate(length: usize) -> Result<(Self, String), KeyError> {
        let seed = gen_random_seed(length)?;
        let key_pair = Self::from_seed(&seed)?;
        Ok((key_pair, seed))
    }

    pub fn public_key(&self) -> PublicKeyEd25519 {
        *self.signing_key.verifying_key().as_bytes()
    }

    /// Get the public key as hex string (this is the user's identity).
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    /// The 64-byte private key (`seed || public key`) as hex.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_keypair_bytes())
    }

    /// Signs `message` and returns the detached 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verifies a detached Ed25519 signature.
pub fn verify_signature(
    public_key: &PublicKeyEd25519,
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key.verify(message, &signature).is_ok()
}

/// Parses a hex public key, accepting an optional `ed25519:` prefix.
pub fn parse_public_key(s: &str) -> Result<PublicKeyEd25519, KeyError> {
    let s = s.strip_prefix("ed25519:").unwrap_or(s);
    let mut key = [0u8; PUBLIC_KEY_SIZE];
    hex::decode_to_slice(s, &mut key).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
    Ok(key)
}

/// Derives a child seed from the given master seed and sub seed.
pub fn derive_child_seed(master_seed: &str, seed: &str) -> String {
    hash_all(&[master_seed.as_bytes(), seed.as_bytes()]).to_hex()
}

/// Generates `length` random bytes and returns them hex encoded.
pub fn gen_random_seed(length: usize) -> Result<String, KeyError> {
    if length == 0 {
        return Err(KeyError::InvalidSeedLength);
    }
    let mut bytes = vec![0u8; length];
    rand::rng().fill_bytes(&mut bytes);
    Ok(hex::encode(bytes))
}
