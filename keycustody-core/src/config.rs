use serde::{Deserialize, Serialize};

use crate::{CustodyError, CustodyResult};

const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_RETRIES: u32 = 3;
const LOOPBACK_PREFIXES: [&str; 2] = ["http://127.0.0.1", "http://localhost"];

/// Connection settings for the wallet-provider service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct WalletProviderConfig {
    /// Base URL of the service, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient failures (total attempts = `max_retries + 1`).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl WalletProviderConfig {
    /// Configuration with default timeout and retry settings.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidInput`] if the document does not parse
    /// or the base URL is not usable.
    pub fn from_json(json: &str) -> CustodyResult<Self> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| CustodyError::InvalidInput {
                attribute: "config".to_string(),
                reason: e.to_string(),
            })?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    /// Checks that the base URL is an HTTPS URL. Plain HTTP is accepted for
    /// loopback hosts only.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidInput`] for any other base URL.
    pub fn validate(&self) -> CustodyResult<()> {
        let allowed = std::iter::once("https://")
            .chain(LOOPBACK_PREFIXES)
            .any(|prefix| self.base_url.starts_with(prefix));
        if allowed {
            Ok(())
        } else {
            Err(CustodyError::InvalidInput {
                attribute: "base_url".to_string(),
                reason: format!("{} is not an https URL", self.base_url),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_missing_fields() {
        let config =
            WalletProviderConfig::from_json(r#"{"base_url": "https://wp.example/"}"#).unwrap();
        assert_eq!(config, WalletProviderConfig::new("https://wp.example"));
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_explicit_fields_are_kept() {
        let config = WalletProviderConfig::from_json(
            r#"{"base_url": "https://wp.example", "timeout_secs": 30, "max_retries": 0}"#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_non_https_url_is_rejected() {
        let err = WalletProviderConfig::from_json(r#"{"base_url": "ftp://wp.example"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            CustodyError::InvalidInput { ref attribute, .. } if attribute == "base_url"
        ));
    }

    #[test]
    fn test_plain_http_only_for_loopback() {
        assert!(WalletProviderConfig::new("http://127.0.0.1:8080").validate().is_ok());
        assert!(WalletProviderConfig::new("http://localhost:8080").validate().is_ok());
        assert!(WalletProviderConfig::new("http://wp.example").validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(WalletProviderConfig::from_json("{").is_err());
    }
}
