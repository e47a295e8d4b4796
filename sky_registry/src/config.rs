use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_PORTAL_URL: &str = "https://siasky.net";

/// Settings for talking to a portal. Every field has a default, so an empty
/// TOML document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the portal, e.g. `https://siasky.net`.
    pub portal_url: String,
    /// Sent as `Skynet-Api-Key`.
    pub api_key: Option<String>,
    /// Replaces the `User-Agent` header.
    pub custom_user_agent: Option<String>,
    /// Sent as `Cookie`, e.g. a portal login session.
    pub custom_cookie: Option<String>,
    pub request_timeout_secs: u64,
    /// How long the portal may search the network for an entry.
    pub registry_read_timeout_secs: u64,
    /// Verify signatures of entries read from the portal.
    pub verify_signatures: bool,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_owned(),
            api_key: None,
            custom_user_agent: None,
            custom_cookie: None,
            request_timeout_secs: 30,
            registry_read_timeout_secs: 5,
            verify_signatures: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Portals reject registry read timeouts outside of this range.
    pub const MAX_REGISTRY_READ_TIMEOUT_SECS: u64 = 300;

    pub fn validate(&self) -> Result<()> {
        self.portal_url()?;
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".into()));
        }
        if !(1..=Self::MAX_REGISTRY_READ_TIMEOUT_SECS).contains(&self.registry_read_timeout_secs) {
            return Err(Error::Config(format!(
                "registry_read_timeout_secs must be between 1 and {}",
                Self::MAX_REGISTRY_READ_TIMEOUT_SECS
            )));
        }
        self.retry.validate()
    }

    /// The portal URL with a scheme. A bare host gets `https://`.
    pub fn portal_url(&self) -> Result<Url> {
        let raw = self.portal_url.trim();
        if raw.is_empty() {
            return Err(Error::Config("portal_url must not be empty".into()));
        }
        let with_scheme = if raw.contains("://") {
            raw.to_owned()
        } else {
            format!("https://{raw}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| Error::Config(format!("invalid portal_url {raw:?}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "portal_url must use http or https, got {:?}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// When and how often failed requests are repeated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// HTTP statuses worth retrying. Unreachable endpoints are always retried.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
            retryable_statuses: vec![429, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(Error::Config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }
        if let Some(status) = self
            .retryable_statuses
            .iter()
            .find(|s| !(100..=599).contains(*s))
        {
            return Err(Error::Config(format!(
                "retry.retryable_statuses contains invalid status {status}"
            )));
        }
        Ok(())
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.portal_url().unwrap().as_str(), "https://siasky.net/");
        assert_eq!(config.retry.retryable_statuses, vec![429, 502, 503, 504]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"api_key": "secret", "retry": {"max_attempts": 5}}"#).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.portal_url, DEFAULT_PORTAL_URL);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 250);
    }

    #[test]
    fn test_bare_host_gets_https() {
        let config = ClientConfig {
            portal_url: "skynetfree.net".into(),
            ..Default::default()
        };
        assert_eq!(config.portal_url().unwrap().as_str(), "https://skynetfree.net/");
    }

    #[test]
    fn test_invalid_configs() {
        let bad_url = ClientConfig {
            portal_url: "ftp://portal".into(),
            ..Default::default()
        };
        assert!(matches!(bad_url.validate(), Err(Error::Config(_))));

        let empty_url = ClientConfig {
            portal_url: "  ".into(),
            ..Default::default()
        };
        assert!(empty_url.validate().is_err());

        let bad_timeout = ClientConfig {
            registry_read_timeout_secs: 0,
            ..Default::default()
        };
        assert!(bad_timeout.validate().is_err());

        let bad_retry = ClientConfig {
            retry: RetryPolicy {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(bad_retry.validate().is_err());

        let inverted_backoff = RetryPolicy {
            initial_backoff_ms: 10_000,
            ..Default::default()
        };
        assert!(inverted_backoff.validate().is_err());

        let bad_status = RetryPolicy {
            retryable_statuses: vec![1000],
            ..Default::default()
        };
        assert!(bad_status.validate().is_err());
    }
}
