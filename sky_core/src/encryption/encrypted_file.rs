//! Padded, encrypted JSON files.
//!
//! ## Envelope
//!
//! ```text
//! nonce (24 bytes) || metadata (16 bytes, plain) || tag (16 bytes) || ciphertext
//! ```
//!
//! `tag || ciphertext` is a NaCl secretbox (XSalsa20-Poly1305), so envelopes
//! are interchangeable with other Skynet clients. The plaintext is the JSON
//! text followed by zero bytes, sized so that the whole envelope is a padded
//! block (see [`pad_file_size`]). Trailing zeros are stripped again after
//! decryption; valid JSON never ends in a zero byte.

use crypto_secretbox::{
    XSalsa20Poly1305,
    aead::{AeadInPlace, KeyInit},
};
use rand::RngCore;
use serde::{Serialize, de::DeserializeOwned};

use super::padding::{PaddingError, check_padded_block, pad_file_size};
use super::path_seed::ENCRYPTION_KEY_LENGTH;

/// Version written into the metadata of new files.
pub const ENCRYPTED_JSON_RESPONSE_VERSION: u8 = 1;

/// Length of the plaintext metadata between nonce and ciphertext.
pub const ENCRYPTION_HIDDEN_FIELD_METADATA_LENGTH: usize = 16;

/// Length of the random nonce at the start of the envelope.
pub const ENCRYPTION_NONCE_LENGTH: usize = 24;

/// Poly1305 tag that precedes the ciphertext.
pub const ENCRYPTION_OVERHEAD_LENGTH: usize = 16;

const TOTAL_OVERHEAD: usize =
    ENCRYPTION_OVERHEAD_LENGTH + ENCRYPTION_NONCE_LENGTH + ENCRYPTION_HIDDEN_FIELD_METADATA_LENGTH;

#[derive(thiserror::Error, Debug)]
pub enum EncryptionError {
    #[error("expected padded encrypted data, length was {len}, nearest padded block is {nearest:?}")]
    NotPadded { len: usize, nearest: Option<u64> },
    #[error("received unrecognized JSON response version {0} in metadata, expected {ENCRYPTED_JSON_RESPONSE_VERSION}")]
    UnsupportedVersion(u8),
    #[error("could not decrypt given encrypted JSON file")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Padding(#[from] PaddingError),
}

/// Plaintext header of an encrypted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptedFileMetadata {
    pub version: u8,
}

impl Default for EncryptedFileMetadata {
    fn default() -> Self {
        Self {
            version: ENCRYPTED_JSON_RESPONSE_VERSION,
        }
    }
}

impl EncryptedFileMetadata {
    pub fn encode(&self) -> [u8; ENCRYPTION_HIDDEN_FIELD_METADATA_LENGTH] {
        let mut bytes = [0u8; ENCRYPTION_HIDDEN_FIELD_METADATA_LENGTH];
        bytes[0] = self.version;
        bytes
    }

    pub fn decode(bytes: &[u8; ENCRYPTION_HIDDEN_FIELD_METADATA_LENGTH]) -> Self {
        Self { version: bytes[0] }
    }
}

/// Serializes `json`, pads it and encrypts it into an envelope under a random
/// nonce.
pub fn encrypt_json_file<T: Serialize + ?Sized>(
    json: &T,
    metadata: EncryptedFileMetadata,
    key: &[u8; ENCRYPTION_KEY_LENGTH],
) -> Result<Vec<u8>, EncryptionError> {
    let data = serde_json::to_vec(json)?;
    let mut nonce = [0u8; ENCRYPTION_NONCE_LENGTH];
    rand::rng().fill_bytes(&mut nonce);
    encrypt_padded_bytes(&data, metadata, key, &nonce)
}

/// Zero-pads `plaintext` to a padded block and seals it with `nonce`.
///
/// The bytes are not checked to be JSON; [`encrypt_json_file`] is the usual
/// entry point.
pub fn encrypt_padded_bytes(
    plaintext: &[u8],
    metadata: EncryptedFileMetadata,
    key: &[u8; ENCRYPTION_KEY_LENGTH],
    nonce: &[u8; ENCRYPTION_NONCE_LENGTH],
) -> Result<Vec<u8>, EncryptionError> {
    let final_size = pad_file_size((plaintext.len() + TOTAL_OVERHEAD) as u64)? as usize;

    let mut out = Vec::with_capacity(final_size);
    out.extend_from_slice(nonce);
    out.extend_from_slice(&metadata.encode());
    out.extend_from_slice(&[0u8; ENCRYPTION_OVERHEAD_LENGTH]);
    out.extend_from_slice(plaintext);
    out.resize(final_size, 0);

    let (header, body) = out.split_at_mut(TOTAL_OVERHEAD);
    let cipher = XSalsa20Poly1305::new(&(*key).into());
    let tag = cipher
        .encrypt_in_place_detached(&(*nonce).into(), b"", body)
        .map_err(|_| EncryptionError::EncryptionFailed)?;
    header[TOTAL_OVERHEAD - ENCRYPTION_OVERHEAD_LENGTH..].copy_from_slice(&tag);
    Ok(out)
}

/// Reverses [`encrypt_json_file`].
pub fn decrypt_json_file<T: DeserializeOwned>(
    data: &[u8],
    key: &[u8; ENCRYPTION_KEY_LENGTH],
) -> Result<T, EncryptionError> {
    if data.len() < TOTAL_OVERHEAD || !check_padded_block(data.len() as u64) {
        return Err(EncryptionError::NotPadded {
            len: data.len(),
            nearest: pad_file_size(data.len() as u64).ok(),
        });
    }

    let (nonce, rest) = data.split_at(ENCRYPTION_NONCE_LENGTH);
    let (metadata, rest) = rest.split_at(ENCRYPTION_HIDDEN_FIELD_METADATA_LENGTH);
    let (tag, ciphertext) = rest.split_at(ENCRYPTION_OVERHEAD_LENGTH);

    let mut metadata_bytes = [0u8; ENCRYPTION_HIDDEN_FIELD_METADATA_LENGTH];
    metadata_bytes.copy_from_slice(metadata);
    let metadata = EncryptedFileMetadata::decode(&metadata_bytes);
    if metadata.version != ENCRYPTED_JSON_RESPONSE_VERSION {
        return Err(EncryptionError::UnsupportedVersion(metadata.version));
    }

    let mut nonce_bytes = [0u8; ENCRYPTION_NONCE_LENGTH];
    nonce_bytes.copy_from_slice(nonce);
    let mut tag_bytes = [0u8; ENCRYPTION_OVERHEAD_LENGTH];
    tag_bytes.copy_from_slice(tag);

    let mut plaintext = ciphertext.to_vec();
    let cipher = XSalsa20Poly1305::new(&(*key).into());
    cipher
        .decrypt_in_place_detached(&nonce_bytes.into(), b"", &mut plaintext, &tag_bytes.into())
        .map_err(|_| EncryptionError::DecryptionFailed)?;

    let end = plaintext
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |idx| idx + 1);
    Ok(serde_json::from_slice(&plaintext[..end])?)
}
