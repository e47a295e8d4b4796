//! Encrypted files stored behind registry entries: size padding, path seed
//! derivation and the encrypted JSON envelope.

pub mod encrypted_file;
pub mod padding;
pub mod path_seed;

pub use encrypted_file::{
    EncryptedFileMetadata, EncryptionError, decrypt_json_file, encrypt_json_file,
    encrypt_padded_bytes,
};
pub use padding::{PaddingError, check_padded_block, pad_file_size};
pub use path_seed::{
    PathSeed, PathSeedError, derive_file_key_entropy, derive_file_tweak, derive_path_seed,
    sanitize_path,
};
