//! Revision numbers of registry entries written by this process.
//!
//! Every `(public key, data key)` pair gets a lazily created slot holding the
//! last known revision behind its own async mutex. Writers take that mutex
//! with a *try*-lock for the whole read-modify-write cycle, including the
//! network round trip. A second writer for the same entry fails right away
//! with [`Error::ConcurrentAccess`] instead of queueing, so the local order of
//! writes can never disagree with the order the portal commits them in.
//!
//! The map itself sits behind a plain mutex that is only held to get or
//! create a slot, never across an await.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use sky_core::{Hash, PublicKeyEd25519};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::error::{Error, Result};
use sky_core::registry::MAX_REVISION;

/// Last known revision of an entry. `None` means unknown or absent.
type Slot = Arc<AsyncMutex<Option<u64>>>;

/// Computes the revision of the next write.
///
/// `None` (nothing known, or the entry does not exist) gives `0`. The caller
/// must have asked the remote first, otherwise two fresh clients would both
/// write revision `0` to an existing entry.
pub fn increment_revision(current: Option<u64>) -> Result<u64> {
    match current {
        None => Ok(0),
        Some(MAX_REVISION) => Err(Error::RevisionExhausted),
        Some(revision) => Ok(revision + 1),
    }
}

#[derive(Debug, Default)]
pub struct RevisionNumberCache {
    entries: Mutex<HashMap<String, Slot>>,
}

impl RevisionNumberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `"{public key hex}/{hashed data key hex}"`.
    pub fn cache_key(public_key: &PublicKeyEd25519, data_key: &Hash) -> String {
        format!("{}/{}", hex::encode(public_key), data_key.to_hex())
    }

    fn slot(&self, key: &str) -> Slot {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.entry(key.to_owned()).or_default().clone()
    }

    fn existing_slot(&self, key: &str) -> Option<Slot> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Runs `f` while holding the entry's lock.
    ///
    /// `f` receives the cached revision and returns the revision it
    /// successfully wrote together with its result. The cache is only updated
    /// when `f` succeeds; on error the previous revision stays.
    pub async fn with_cached_entry_lock<F, Fut, T>(
        &self,
        public_key: &PublicKeyEd25519,
        data_key: &Hash,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(Option<u64>) -> Fut,
        Fut: Future<Output = Result<(u64, T)>>,
    {
        let key = Self::cache_key(public_key, data_key);
        let slot = self.slot(&key);
        let mut revision = slot
            .try_lock_owned()
            .map_err(|_| Error::ConcurrentAccess {
                public_key: hex::encode(public_key),
                data_key: data_key.to_hex(),
            })?;

        let (written, value) = f(*revision).await?;
        debug!(%key, written, previous = ?*revision, "cached revision updated");
        *revision = Some(written);
        Ok(value)
    }

    /// Records a revision seen on a read, if it is newer than the cached one.
    ///
    /// Never waits: if a writer currently holds the entry, the observation is
    /// dropped since the writer will store its own, newer revision.
    pub fn observe(&self, public_key: &PublicKeyEd25519, data_key: &Hash, revision: u64) {
        let key = Self::cache_key(public_key, data_key);
        let slot = self.slot(&key);
        if let Ok(mut cached) = slot.try_lock() {
            if cached.is_none_or(|known| known < revision) {
                *cached = Some(revision);
            }
        } else {
            debug!(%key, revision, "entry locked, skipping cache refresh");
        }
    }

    /// The cached revision, `None` if unknown or if a writer holds the entry.
    pub fn cached_revision(&self, public_key: &PublicKeyEd25519, data_key: &Hash) -> Option<u64> {
        let slot = self.existing_slot(&Self::cache_key(public_key, data_key))?;
        let revision = slot.try_lock().ok()?;
        *revision
    }
}
