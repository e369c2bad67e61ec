//! Access token providers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use spdedupe_core::RemoteError;

use crate::config::GraphConfig;

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Supplies bearer tokens for remote calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A currently valid access token.
    async fn access_token(&self, cancel: &CancellationToken) -> Result<String, RemoteError>;

    /// Drop any cached token, e.g. after the remote rejected it.
    async fn invalidate(&self) {}
}

/// A fixed bearer token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self, _cancel: &CancellationToken) -> Result<String, RemoteError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// OAuth2 client-credentials grant against the identity provider.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientSecretCredential {
    pub fn new(
        config: &GraphConfig,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::unexpected(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token_url: token_url(&config.authority_host, tenant_id),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: config.scope.clone(),
            cached: Mutex::new(None),
        })
    }

    async fn request_token(&self) -> Result<CachedToken, RemoteError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| RemoteError::transport(format!("Token request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(RemoteError::Transport {
                message: format!("Token endpoint returned {status}"),
                status: Some(status.as_u16()),
                retry_after: None,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| format!("{}: {}", e.error, e.error_description))
                .unwrap_or_else(|_| format!("Token endpoint returned {status}"));
            return Err(RemoteError::Unauthorized { message });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::unexpected(format!("Invalid token response: {e}")))?;

        debug!(expires_in = token.expires_in, "Acquired access token");
        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for ClientSecretCredential {
    /// The cache lock is released while the token request is in flight, so
    /// concurrent callers may each fetch a token; the one expiring last wins.
    async fn access_token(&self, cancel: &CancellationToken) -> Result<String, RemoteError> {
        let cached = self
            .cached
            .lock()
            .await
            .as_ref()
            .filter(|t| t.is_fresh())
            .map(|t| t.token.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        let fresh = tokio::select! {
            _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
            result = self.request_token() => result?,
        };
        Ok(store_latest(&mut *self.cached.lock().await, fresh))
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// Cache `fresh` unless a fresher token was stored meanwhile. Returns the
/// token now in the cache.
fn store_latest(cached: &mut Option<CachedToken>, fresh: CachedToken) -> String {
    match cached {
        Some(current) if current.is_fresh() && current.expires_at >= fresh.expires_at => {
            current.token.clone()
        }
        _ => {
            let token = fresh.token.clone();
            *cached = Some(fresh);
            token
        }
    }
}

fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}
