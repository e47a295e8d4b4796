//! Core protocol types and traits for the Skynet registry client.
//!
//! This crate defines the shared types used by all `sky` crates.
//!
//! ## Protocol types (wire-stable)
//!
//! The following modules define formats that must match what portals and
//! other clients produce byte for byte:
//!
//! - Content hashes (`hash::Hash`, BLAKE2b-256) and the registry entry hash
//! - Skylinks (`skylink::Skylink`) and their base32/base64 text forms
//! - Registry entries (`registry::RegistryEntry`, `registry::SignedRegistryEntry`)
//! - The padded, encrypted JSON envelope and path-seed derivation
//!   (`encryption`)
//!
//! Changing any of these is a protocol change.
//!
//! ## Convenience APIs (non-wire)
//!
//! - Key pairs derived from seeds (`keys::KeyPair`)
//! - Transport abstractions (`RegistryApi`, `BlobStore`); implementations live
//!   in `sky_registry`

pub mod api;
pub mod encryption;
pub mod hash;
pub mod keys;
pub mod registry;
pub mod skylink;

// --- Core Public Surface ---

pub use hash::Hash;
pub use keys::{KeyPair, PublicKeyEd25519};
pub use skylink::Skylink;

pub use registry::{DataKey, RegistryEntry, Signature, SignedRegistryEntry};

pub use api::{BlobStore, RegistryApi, TransportError};

pub use encryption::{
    PathSeed, check_padded_block, decrypt_json_file, derive_file_key_entropy, derive_file_tweak,
    derive_path_seed, encrypt_json_file, pad_file_size,
};
