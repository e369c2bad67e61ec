//! Remote client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Settings for talking to the Graph API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Base URL all API paths are appended to.
    pub api_base_url: String,

    /// Identity provider host for the client-credentials grant.
    pub authority_host: String,

    /// OAuth2 scope requested for the access token.
    pub scope: String,

    /// Retries for transient failures (throttling, 5xx, network).
    pub max_retries: u32,

    /// Delay before the first retry; doubles with each attempt.
    pub retry_base_delay_ms: u64,

    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://graph.microsoft.com/v1.0".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
            scope: "https://graph.microsoft.com/.default".to_string(),
            max_retries: 3,
            retry_base_delay_ms: 1000,
            request_timeout_secs: 60,
        }
    }
}

impl GraphConfig {
    /// Retry policy derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
