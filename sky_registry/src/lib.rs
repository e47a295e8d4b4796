//! Registry client for Skynet portals.
//!
//! - [`RegistryClient`] validates, signs and verifies entries on top of any
//!   [`sky_core::RegistryApi`].
//! - [`SkyDb`] stores JSON, raw bytes and encrypted JSON behind registry
//!   entries. Writes are serialized per entry by the [`RevisionNumberCache`].
//! - [`MemoryRegistry`] / [`MemoryBlobStore`] are in-process backends,
//!   [`HttpRegistry`] / [`HttpBlobStore`] talk to a portal.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod memory;
pub mod retry;
pub mod revision_cache;

pub use client::{RegistryClient, get_entry_link};
pub use config::{ClientConfig, RetryPolicy};
pub use db::{EntrySigner, JsonResponse, RawBytesResponse, SkyDb};
pub use error::{Error, ErrorKind, Result};
pub use http::{Credentials, HttpBlobStore, HttpRegistry, PortalClient};
pub use memory::{MemoryBlobStore, MemoryRegistry};
pub use retry::{Reauthenticate, run_with_policy};
pub use revision_cache::{RevisionNumberCache, increment_revision};
