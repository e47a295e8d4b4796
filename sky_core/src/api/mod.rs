//! Transport traits. Implementations live in `sky_registry`: in-memory ones for
//! tests and local use, and an HTTP client for Skynet portals.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{Hash, PublicKeyEd25519, SignedRegistryEntry, Skylink};

/// Failure talking to a remote endpoint.
///
/// "Entry not found" is not an error; registry reads return `Ok(None)`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    #[error("Request failed with status code {status}{}", message_suffix(.message))]
    Status {
        status: u16,
        message: Option<String>,
    },

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl TransportError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            message: Some(message.into()),
        }
    }

    /// A failure status for which the remote gave no message.
    pub fn bare_status(status: u16) -> Self {
        TransportError::Status {
            status,
            message: None,
        }
    }

    /// The HTTP status, if the remote answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

/// Read and write access to a mutable registry.
#[async_trait]
pub trait RegistryApi: std::fmt::Debug + Send + Sync {
    /// Retrieves the latest entry stored under `(public_key, data_key)`.
    ///
    /// * `Ok(None)` if no entry exists.
    /// * `Err` only for transport failures or unusable responses.
    async fn get(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &Hash,
    ) -> Result<Option<SignedRegistryEntry>, TransportError>;

    /// Publishes a signed entry. The data key of the entry may be raw or
    /// hashed; implementations index by its hashed form.
    async fn set(&self, entry: SignedRegistryEntry) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: RegistryApi + ?Sized + Send + Sync> RegistryApi for std::sync::Arc<T> {
    async fn get(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &Hash,
    ) -> Result<Option<SignedRegistryEntry>, TransportError> {
        (**self).get(public_key, data_key).await
    }

    async fn set(&self, entry: SignedRegistryEntry) -> Result<(), TransportError> {
        (**self).set(entry).await
    }
}

#[async_trait]
impl<T: RegistryApi + ?Sized + Send + Sync> RegistryApi for Box<T> {
    async fn get(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &Hash,
    ) -> Result<Option<SignedRegistryEntry>, TransportError> {
        (**self).get(public_key, data_key).await
    }

    async fn set(&self, entry: SignedRegistryEntry) -> Result<(), TransportError> {
        (**self).set(entry).await
    }
}

/// Immutable, content-addressed blob storage.
#[async_trait]
pub trait BlobStore: std::fmt::Debug + Send + Sync {
    /// Uploads `bytes` and returns the skylink they can be fetched by.
    async fn put(&self, bytes: Bytes) -> Result<Skylink, TransportError>;

    /// Downloads the blob behind `skylink`, `Ok(None)` if unknown.
    async fn get(&self, skylink: &Skylink) -> Result<Option<Bytes>, TransportError>;
}

#[async_trait]
impl<T: BlobStore + ?Sized + Send + Sync> BlobStore for std::sync::Arc<T> {
    async fn put(&self, bytes: Bytes) -> Result<Skylink, TransportError> {
        (**self).put(bytes).await
    }

    async fn get(&self, skylink: &Skylink) -> Result<Option<Bytes>, TransportError> {
        (**self).get(skylink).await
    }
}
