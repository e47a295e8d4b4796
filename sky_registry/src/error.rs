use sky_core::TransportError;
use sky_core::encryption::{EncryptionError, PaddingError, PathSeedError};
use sky_core::keys::KeyError;
use sky_core::registry::{EntryError, MAX_REVISION};
use sky_core::skylink::SkylinkError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of an [`Error`], used to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, detected before any I/O.
    Validation,
    /// The entry is locked by another writer; retry the whole cycle.
    Concurrency,
    /// A received or decoded value failed a sanity check.
    Integrity,
    /// The remote could not be reached or answered with a failure.
    Transport,
    /// A padded size or a revision number ran out of range.
    Exhausted,
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Entry(#[from] EntryError),

    #[error(transparent)]
    Skylink(#[from] SkylinkError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    PathSeed(#[from] PathSeedError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Concurrent access prevented in SkyDB for entry {{ publicKey: {public_key}, dataKey: {data_key} }}")]
    ConcurrentAccess { public_key: String, data_key: String },

    #[error("revision number exhausted: cannot increment past {MAX_REVISION}")]
    RevisionExhausted,

    #[error("signature verification failed for entry {data_key} of {public_key}")]
    InvalidSignature { public_key: String, data_key: String },

    #[error("invalid entry data: {0}")]
    InvalidEntryData(String),

    #[error("blob {0} referenced by the entry was not found")]
    BlobNotFound(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Entry(EntryError::InvalidSignature) => ErrorKind::Integrity,
            Error::Entry(_) | Error::Skylink(_) | Error::Key(_) | Error::PathSeed(_) => {
                ErrorKind::Validation
            }
            Error::Encryption(EncryptionError::Padding(PaddingError::Overflow(_))) => {
                ErrorKind::Exhausted
            }
            Error::Encryption(_) => ErrorKind::Integrity,
            Error::Transport(_) => ErrorKind::Transport,
            Error::ConcurrentAccess { .. } => ErrorKind::Concurrency,
            Error::RevisionExhausted => ErrorKind::Exhausted,
            Error::InvalidSignature { .. }
            | Error::InvalidEntryData(_)
            | Error::BlobNotFound(_)
            | Error::Json(_) => ErrorKind::Integrity,
            Error::Config(_) => ErrorKind::Validation,
        }
    }

    /// HTTP status of a transport failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Transport(err) => err.status_code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrent_access_message() {
        let err = Error::ConcurrentAccess {
            public_key: "ab".into(),
            data_key: "cd".into(),
        };
        assert_eq!(
            err.to_string(),
            "Concurrent access prevented in SkyDB for entry { publicKey: ab, dataKey: cd }"
        );
        assert_eq!(err.kind(), ErrorKind::Concurrency);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            Error::from(EntryError::EmptyDataKey).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::from(EntryError::InvalidSignature).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(Error::RevisionExhausted.kind(), ErrorKind::Exhausted);
        assert_eq!(
            Error::from(EncryptionError::from(PaddingError::Overflow(1))).kind(),
            ErrorKind::Exhausted
        );
        let transport = Error::from(TransportError::status(503, "busy"));
        assert_eq!(transport.kind(), ErrorKind::Transport);
        assert_eq!(transport.status_code(), Some(503));
        assert_eq!(
            transport.to_string(),
            "Request failed with status code 503: busy"
        );
    }
}
