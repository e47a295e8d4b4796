//! Hierarchical path seeds for encrypted files.
//!
//! ## Derivation
//!
//! ```text
//! root directory seed (64 bytes)
//!     |  for every path component, in order:
//!     |  seed = SHA-512(SHA-512(SALT_CHILD) || SHA-512(seed || dir_flag || name))
//!     v
//! directory seed (64 bytes)    or    file seed (first 32 bytes)
//!     |
//!     +--> key entropy: SHA-512(SHA-512(SALT_ENCRYPTION) || SHA-512(hex(seed)))[..32]
//!     +--> tweak:       SHA-512(SHA-512(SALT_TWEAK) || SHA-512(hex(seed)))[..32]
//! ```
//!
//! Intermediate components always use the directory flag; only the last one
//! uses the caller's choice. Key entropy and tweak hash the UTF-8 bytes of the
//! hex encoded file seed, not the raw seed bytes. Existing tweaks depend on
//! this, so it must stay.

use std::fmt;

use crate::Hash;
use crate::hash::sha512;

/// Length of a hex encoded directory path seed.
pub const PATH_SEED_DIRECTORY_LENGTH: usize = 128;

/// Length of a hex encoded file path seed.
pub const PATH_SEED_FILE_LENGTH: usize = 64;

/// Length of the symmetric key derived for a file.
pub const ENCRYPTION_KEY_LENGTH: usize = 32;

const SALT_ENCRYPTED_CHILD: &str = "encrypted filesystem child";
const SALT_ENCRYPTED_TWEAK: &str = "encrypted filesystem tweak";
const SALT_ENCRYPTION: &str = "encryption";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PathSeedError {
    #[error("path seed must be {PATH_SEED_DIRECTORY_LENGTH} (directory) or {PATH_SEED_FILE_LENGTH} (file) hex characters, got {0}")]
    InvalidLength(usize),
    #[error("path seed is not valid hex: {0}")]
    InvalidHex(String),
    #[error("expected a directory path seed")]
    NotADirectory,
    #[error("expected a file path seed")]
    NotAFile,
    #[error("input path {0:?} is not a valid path")]
    InvalidPath(String),
}

/// Secret seed for a directory or a file, from which child seeds, encryption
/// keys and registry tweaks are derived.
#[derive(Clone, PartialEq, Eq)]
pub enum PathSeed {
    Directory([u8; 64]),
    File([u8; 32]),
}

impl PathSeed {
    /// Parses a hex seed. The length decides the kind.
    pub fn from_hex(s: &str) -> Result<Self, PathSeedError> {
        let invalid_hex = |e: hex::FromHexError| PathSeedError::InvalidHex(e.to_string());
        match s.len() {
            PATH_SEED_DIRECTORY_LENGTH => {
                let mut bytes = [0u8; 64];
                hex::decode_to_slice(s, &mut bytes).map_err(invalid_hex)?;
                Ok(PathSeed::Directory(bytes))
            }
            PATH_SEED_FILE_LENGTH => {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes).map_err(invalid_hex)?;
                Ok(PathSeed::File(bytes))
            }
            other => Err(PathSeedError::InvalidLength(other)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PathSeed::Directory(bytes) => bytes,
            PathSeed::File(bytes) => bytes,
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, PathSeed::Directory(_))
    }
}

impl fmt::Debug for PathSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Seeds are secret.
        match self {
            PathSeed::Directory(_) => f.write_str("PathSeed::Directory(..)"),
            PathSeed::File(_) => f.write_str("PathSeed::File(..)"),
        }
    }
}

/// Normalizes a logical path such as `Example.hns//dir/file.json/`.
///
/// Returns `None` for empty or absolute paths. Repeated slashes collapse, a
/// trailing slash is dropped and the first (domain) component is lower-cased.
pub fn sanitize_path(path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() || path.starts_with('/') {
        return None;
    }
    let mut components = path.split('/').filter(|c| !c.is_empty());
    let domain = components.next()?.to_lowercase();
    let mut sanitized = domain;
    for component in components {
        sanitized.push('/');
        sanitized.push_str(component);
    }
    Some(sanitized)
}

fn child_seed(seed: &[u8], is_directory: bool, name: &str) -> [u8; 64] {
    let mut derivation_path = Vec::with_capacity(seed.len() + 1 + name.len());
    derivation_path.extend_from_slice(seed);
    derivation_path.push(u8::from(is_directory));
    derivation_path.extend_from_slice(name.as_bytes());

    let mut bytes = Vec::with_capacity(128);
    bytes.extend_from_slice(&sha512(SALT_ENCRYPTED_CHILD));
    bytes.extend_from_slice(&sha512(&derivation_path));
    sha512(&bytes)
}

/// Derives the seed of `sub_path` below the directory seed `start`.
pub fn derive_path_seed(
    start: &PathSeed,
    sub_path: &str,
    is_directory: bool,
) -> Result<PathSeed, PathSeedError> {
    let PathSeed::Directory(start) = start else {
        return Err(PathSeedError::NotADirectory);
    };
    let path =
        sanitize_path(sub_path).ok_or_else(|| PathSeedError::InvalidPath(sub_path.to_owned()))?;

    let names: Vec<&str> = path.split('/').collect();
    let last = names.len() - 1;
    let mut seed = *start;
    for (index, name) in names.into_iter().enumerate() {
        let directory = if index == last { is_directory } else { true };
        seed = child_seed(&seed, directory, name);
    }

    if is_directory {
        Ok(PathSeed::Directory(seed))
    } else {
        let mut file = [0u8; 32];
        file.copy_from_slice(&seed[..32]);
        Ok(PathSeed::File(file))
    }
}

fn salted_file_hash(salt: &str, seed: &PathSeed) -> Result<[u8; 32], PathSeedError> {
    if seed.is_directory() {
        return Err(PathSeedError::NotAFile);
    }
    let mut bytes = Vec::with_capacity(128);
    bytes.extend_from_slice(&sha512(salt));
    bytes.extend_from_slice(&sha512(seed.to_hex()));
    let mut out = [0u8; 32];
    out.copy_from_slice(&sha512(&bytes)[..32]);
    Ok(out)
}

/// Symmetric key material for the file with this seed.
pub fn derive_file_key_entropy(
    seed: &PathSeed,
) -> Result<[u8; ENCRYPTION_KEY_LENGTH], PathSeedError> {
    salted_file_hash(SALT_ENCRYPTION, seed)
}

/// Tweak (hashed data key) of the registry entry holding the file.
pub fn derive_file_tweak(seed: &PathSeed) -> Result<Hash, PathSeedError> {
    salted_file_hash(SALT_ENCRYPTED_TWEAK, seed).map(Hash::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathSeed {
        PathSeed::Directory([7u8; 64])
    }

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("app.hns/a").as_deref(), Some("app.hns/a"));
        assert_eq!(
            sanitize_path("  App.HNS//Dir///File.json/ ").as_deref(),
            Some("app.hns/Dir/File.json")
        );
        assert_eq!(sanitize_path(""), None);
        assert_eq!(sanitize_path("   "), None);
        assert_eq!(sanitize_path("/absolute"), None);
        assert_eq!(sanitize_path("a/").as_deref(), Some("a"));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_path_seed(&root(), "app.hns/file.json", false).unwrap();
        let b = derive_path_seed(&root(), "app.hns/file.json", false).unwrap();
        assert_eq!(a, b);
        let c = derive_path_seed(&root(), "app.hns/other.json", false).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_seed_lengths() {
        let dir = derive_path_seed(&root(), "app.hns/dir", true).unwrap();
        assert!(dir.is_directory());
        assert_eq!(dir.to_hex().len(), PATH_SEED_DIRECTORY_LENGTH);

        let file = derive_path_seed(&root(), "app.hns/dir/file", false).unwrap();
        assert!(!file.is_directory());
        assert_eq!(file.to_hex().len(), PATH_SEED_FILE_LENGTH);
    }

    #[test]
    fn test_stepwise_derivation_matches() {
        let dir = derive_path_seed(&root(), "app.hns/dir", true).unwrap();
        let stepwise = derive_path_seed(&dir, "file", false).unwrap();
        let direct = derive_path_seed(&root(), "app.hns/dir/file", false).unwrap();
        assert_eq!(stepwise, direct);
    }

    #[test]
    fn test_file_is_truncated_directory_derivation() {
        // Same components, last flag differs: the flag byte is hashed, so the
        // file seed is not a prefix of the directory seed.
        let dir = derive_path_seed(&root(), "app.hns/x", true).unwrap();
        let file = derive_path_seed(&root(), "app.hns/x", false).unwrap();
        assert_ne!(&dir.as_bytes()[..32], file.as_bytes());
    }

    #[test]
    fn test_sanitized_paths_derive_equally() {
        let a = derive_path_seed(&root(), "APP.hns//file", false).unwrap();
        let b = derive_path_seed(&root(), "app.hns/file", false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_requires_directory_seed() {
        let file = PathSeed::File([1u8; 32]);
        assert_eq!(
            derive_path_seed(&file, "x", false),
            Err(PathSeedError::NotADirectory)
        );
        assert_eq!(
            derive_path_seed(&root(), "/x", false),
            Err(PathSeedError::InvalidPath("/x".into()))
        );
    }

    #[test]
    fn test_hex_roundtrip() {
        let file = derive_path_seed(&root(), "app.hns/f", false).unwrap();
        assert_eq!(PathSeed::from_hex(&file.to_hex()).unwrap(), file);
        assert_eq!(
            PathSeed::from_hex(&root().to_hex()).unwrap(),
            root()
        );
        assert_eq!(
            PathSeed::from_hex("abcd"),
            Err(PathSeedError::InvalidLength(4))
        );
        assert!(matches!(
            PathSeed::from_hex(&"zz".repeat(32)),
            Err(PathSeedError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_key_entropy_and_tweak() {
        let file = derive_path_seed(&root(), "app.hns/f", false).unwrap();
        let key = derive_file_key_entropy(&file).unwrap();
        let tweak = derive_file_tweak(&file).unwrap();
        assert_ne!(&key, tweak.as_bytes());
        assert_eq!(key, derive_file_key_entropy(&file).unwrap());

        let expected = {
            let mut bytes = sha512(SALT_ENCRYPTION).to_vec();
            bytes.extend_from_slice(&sha512(file.to_hex().as_bytes()));
            sha512(&bytes)
        };
        assert_eq!(&key[..], &expected[..32]);

        assert_eq!(
            derive_file_key_entropy(&root()),
            Err(PathSeedError::NotAFile)
        );
        assert_eq!(derive_file_tweak(&root()), Err(PathSeedError::NotAFile));
    }
}
