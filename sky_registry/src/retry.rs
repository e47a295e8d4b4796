//! Retrying transport calls.

use std::future::Future;

use async_trait::async_trait;
use sky_core::TransportError;
use tracing::{debug, warn};

use crate::config::RetryPolicy;

/// Status portals answer with when the session has expired.
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// Logs in again after the portal rejected a request with `401`.
#[async_trait]
pub trait Reauthenticate: Send + Sync {
    async fn reauthenticate(&self) -> Result<(), TransportError>;
}

impl RetryPolicy {
    /// Whether a failed attempt may be repeated under this policy.
    pub fn is_retryable(&self, err: &TransportError) -> bool {
        match err {
            TransportError::Unreachable(_) => true,
            TransportError::Status { status, .. } => self.retryable_statuses.contains(status),
            _ => false,
        }
    }
}

/// Runs `op` until it succeeds or the policy gives up.
///
/// Unreachable endpoints and retryable statuses are repeated with exponential
/// backoff, capped at `max_backoff`, for at most `max_attempts` attempts. A
/// `401` calls `reauth` once and repeats the request; a second `401` is
/// returned. The repeat after re-authenticating does not count as an attempt.
pub async fn run_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    reauth: Option<&dyn Reauthenticate>,
    mut op: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let mut attempt = 1;
    let mut backoff = policy.initial_backoff();
    let mut reauthenticated = false;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.status_code() == Some(STATUS_UNAUTHORIZED) {
            match reauth {
                Some(reauth) if !reauthenticated => {
                    debug!("request unauthorized, logging in again");
                    reauthenticated = true;
                    reauth.reauthenticate().await?;
                    continue;
                }
                _ => return Err(err),
            }
        }

        if attempt >= policy.max_attempts || !policy.is_retryable(&err) {
            return Err(err);
        }

        warn!(attempt, ?backoff, "request failed, retrying: {err}");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(policy.max_backoff());
        attempt += 1;
    }
}
