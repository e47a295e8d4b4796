//! Registry and blob store backed by a Skynet portal's HTTP API.
//!
//! Requests go through [`run_with_policy`], so the retry policy and the
//! optional re-authentication hook from the config apply to every call.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use sky_core::registry::{RegistryEntry, Signature, SignedRegistryEntry};
use sky_core::{BlobStore, DataKey, Hash, PublicKeyEd25519, RegistryApi, Skylink, TransportError};
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::retry::{Reauthenticate, run_with_policy};

pub const REGISTRY_PATH: &str = "skynet/registry";
pub const SKYFILE_PATH: &str = "skynet/skyfile";
pub const API_KEY_HEADER: &str = "Skynet-Api-Key";
pub const DEFAULT_USER_AGENT: &str = concat!("sky/", env!("CARGO_PKG_VERSION"));

/// Credentials sent with every request. Shared, so a [`Reauthenticate`] hook
/// can swap the session cookie while the client is in use.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub cookie: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Connection to one portal. Cheap to clone.
#[derive(Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    portal_url: Url,
    user_agent: String,
    credentials: Arc<RwLock<Credentials>>,
    retry: RetryPolicy,
    registry_read_timeout_secs: u64,
    reauth: Option<Arc<dyn Reauthenticate>>,
}

impl fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalClient")
            .field("portal_url", &self.portal_url.as_str())
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .field("reauth", &self.reauth.is_some())
            .finish_non_exhaustive()
    }
}

impl PortalClient {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut portal_url = config.portal_url()?;
        // `Url::join` replaces the last segment unless the path ends in `/`.
        if !portal_url.path().ends_with('/') {
            let path = format!("{}/", portal_url.path());
            portal_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            portal_url,
            user_agent: config
                .custom_user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            credentials: Arc::new(RwLock::new(Credentials {
                api_key: config.api_key.clone(),
                cookie: config.custom_cookie.clone(),
            })),
            retry: config.retry.clone(),
            registry_read_timeout_secs: config.registry_read_timeout_secs,
            reauth: None,
        })
    }

    /// Called once when the portal answers `401`, before the request is
    /// repeated.
    pub fn with_reauth(mut self, reauth: Arc<dyn Reauthenticate>) -> Self {
        self.reauth = Some(reauth);
        self
    }

    /// Handle to the credentials sent with each request.
    pub fn credentials(&self) -> Arc<RwLock<Credentials>> {
        self.credentials.clone()
    }

    pub fn portal_url(&self) -> &Url {
        &self.portal_url
    }

    pub fn registry(&self) -> HttpRegistry {
        HttpRegistry {
            portal: self.clone(),
        }
    }

    pub fn blob_store(&self) -> HttpBlobStore {
        HttpBlobStore {
            portal: self.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, TransportError> {
        self.portal_url
            .join(path)
            .map_err(|e| TransportError::Unreachable(format!("invalid endpoint {path:?}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let credentials = self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut builder = self
            .http
            .request(method, url)
            .header(USER_AGENT, &self.user_agent);
        if let Some(api_key) = credentials.api_key {
            builder = builder.header(API_KEY_HEADER, api_key);
        }
        if let Some(cookie) = credentials.cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder
    }

    /// Sends the request built by `build` under the retry policy.
    ///
    /// `Ok(None)` for `404`. Every other non-success status is an error
    /// carrying the portal's message.
    async fn execute<F>(&self, build: F) -> std::result::Result<Option<Response>, TransportError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        run_with_policy(&self.retry, self.reauth.as_deref(), || {
            // Built per attempt so refreshed credentials are picked up.
            let request = build();
            async move {
                let response = request.send().await.map_err(map_reqwest_error)?;
                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !status.is_success() {
                    return Err(status_error(response).await);
                }
                Ok(Some(response))
            }
        })
        .await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_decode() {
        TransportError::MalformedResponse(err.to_string())
    } else {
        TransportError::Unreachable(err.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Bodies that are not JSON or carry an empty `message` yield a bare status.
async fn status_error(response: Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.bytes().await.unwrap_or_default();
    match serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
    {
        Some(message) => TransportError::status(status, message),
        None => TransportError::bare_status(status),
    }
}

fn malformed(err: impl fmt::Display) -> TransportError {
    TransportError::MalformedResponse(err.to_string())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryGetResponse {
    /// Hex encoded entry data.
    pub data: String,
    pub revision: u64,
    /// Hex encoded signature.
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyJson {
    pub algorithm: String,
    pub key: Vec<u8>,
}

/// Body of a registry write. Byte fields are JSON arrays of numbers.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryPostBody {
    pub publickey: PublicKeyJson,
    /// Hex encoded hashed data key.
    pub datakey: String,
    pub revision: u64,
    pub data: Vec<u8>,
    pub signature: Vec<u8>,
}

impl RegistryPostBody {
    pub fn from_entry(signed: &SignedRegistryEntry) -> Self {
        Self {
            publickey: PublicKeyJson {
                algorithm: "ed25519".to_owned(),
                key: signed.public_key.to_vec(),
            },
            datakey: signed.entry.data_key.hashed().to_hex(),
            revision: signed.entry.revision,
            data: signed.entry.data.to_vec(),
            signature: signed.signature.as_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    skylink: String,
}

/// [`RegistryApi`] over `/skynet/registry`.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    portal: PortalClient,
}

impl HttpRegistry {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(PortalClient::from_config(config)?.registry())
    }

    pub fn portal(&self) -> &PortalClient {
        &self.portal
    }
}

#[async_trait]
impl RegistryApi for HttpRegistry {
    async fn get(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &Hash,
    ) -> std::result::Result<Option<SignedRegistryEntry>, TransportError> {
        let mut url = self.portal.endpoint(REGISTRY_PATH)?;
        url.query_pairs_mut()
            .append_pair("publickey", &format!("ed25519:{}", hex::encode(public_key)))
            .append_pair("datakey", &data_key.to_hex())
            .append_pair("timeout", &self.portal.registry_read_timeout_secs.to_string());

        let Some(response) = self
            .portal
            .execute(|| self.portal.request(Method::GET, url.clone()))
            .await?
        else {
            debug!(data_key = %data_key.fmt_short(), "portal has no entry");
            return Ok(None);
        };

        let body: RegistryGetResponse = response.json().await.map_err(map_reqwest_error)?;
        let data = hex::decode(&body.data).map_err(malformed)?;
        let signature = Signature::from_hex(&body.signature).map_err(malformed)?;
        Ok(Some(SignedRegistryEntry::new(
            *public_key,
            RegistryEntry::new(DataKey::Hashed(*data_key), data, body.revision),
            signature,
        )))
    }

    async fn set(&self, entry: SignedRegistryEntry) -> std::result::Result<(), TransportError> {
        let url = self.portal.endpoint(REGISTRY_PATH)?;
        let body = RegistryPostBody::from_entry(&entry);
        self.portal
            .execute(|| self.portal.request(Method::POST, url.clone()).json(&body))
            .await?
            .ok_or_else(|| TransportError::status(404, "registry endpoint not found"))?;
        debug!(revision = entry.entry.revision, "portal accepted registry entry");
        Ok(())
    }
}

/// [`BlobStore`] over `/skynet/skyfile` uploads and skylink downloads.
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    portal: PortalClient,
}

impl HttpBlobStore {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(PortalClient::from_config(config)?.blob_store())
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, bytes: Bytes) -> std::result::Result<Skylink, TransportError> {
        let mut url = self.portal.endpoint(SKYFILE_PATH)?;
        url.query_pairs_mut().append_pair("filename", "blob");
        let response = self
            .portal
            .execute(|| {
                self.portal
                    .request(Method::POST, url.clone())
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.clone())
            })
            .await?
            .ok_or_else(|| TransportError::status(404, "upload endpoint not found"))?;
        let body: UploadResponse = response.json().await.map_err(map_reqwest_error)?;
        Skylink::parse(&body.skylink).map_err(malformed)
    }

    async fn get(&self, skylink: &Skylink) -> std::result::Result<Option<Bytes>, TransportError> {
        let url = self.portal.endpoint(&skylink.to_base64())?;
        let Some(response) = self
            .portal
            .execute(|| self.portal.request(Method::GET, url.clone()))
            .await?
        else {
            return Ok(None);
        };
        response.bytes().await.map(Some).map_err(map_reqwest_error)
    }
}
