//! HTTP implementation of [`RemoteStore`] against Microsoft Graph.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use spdedupe_core::RemoteError;

use crate::auth::CredentialProvider;
use crate::config::GraphConfig;
use crate::retry::RetryPolicy;
use crate::store::RemoteStore;
use crate::types::{ChildrenPage, DriveItem, DriveRef, PageToken, SiteAddress};

/// A page of a collection response.
#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default, rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct SiteResource {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Deserialize, Default)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Graph API client.
pub struct GraphClient {
    http: Client,
    base: Url,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base", &self.base.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    pub fn new(
        config: &GraphConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, RemoteError> {
        let base = Url::parse(config.api_base_url.trim_end_matches('/')).map_err(|e| {
            RemoteError::unexpected(format!("Invalid API base URL '{}': {e}", config.api_base_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::unexpected(format!(
                "Invalid API base URL '{}'",
                config.api_base_url
            )));
        }

        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::unexpected(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            credentials,
            retry: config.retry_policy(),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build an API URL by appending percent-encoded path segments to the base.
    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RemoteError::unexpected("API base URL cannot carry a path"))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment.as_ref());
            }
        }
        Ok(url)
    }

    /// Validate a continuation link before following it with our credentials.
    fn next_link(&self, link: &str) -> Result<Url, RemoteError> {
        let url = Url::parse(link)
            .map_err(|e| RemoteError::unexpected(format!("Invalid continuation link: {e}")))?;
        if url.origin() != self.base.origin() {
            return Err(RemoteError::unexpected(format!(
                "Continuation link points to a foreign origin: {}",
                url.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }

    /// Send a request with retries. `build` is invoked once per attempt.
    async fn execute<F>(
        &self,
        what: &str,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<Response, RemoteError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        self.retry
            .run(what, cancel, || self.attempt(what, &build, cancel))
            .await
    }

    async fn attempt<F>(
        &self,
        what: &str,
        build: &F,
        cancel: &CancellationToken,
    ) -> Result<Response, RemoteError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let mut refreshed = false;
        loop {
            let token = self.credentials.access_token(cancel).await?;
            let request = build(&self.http).bearer_auth(token);

            trace!(request = what, "Sending request");
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                result = request.send() => result.map_err(map_send_error)?,
            };

            // A rejected token may just be stale; refresh once before giving up.
            if response.status() == StatusCode::UNAUTHORIZED && !refreshed {
                debug!(request = what, "Access token rejected, refreshing");
                self.credentials.invalidate().await;
                refreshed = true;
                continue;
            }

            return error_for_status(response).await;
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        url: Url,
        cancel: &CancellationToken,
    ) -> Result<T, RemoteError> {
        let response = self.execute(what, cancel, |http| http.get(url.clone())).await?;
        read_json(response).await
    }
}

/// Map a non-success response to a [`RemoteError`].
async fn error_for_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let resource = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_default();
    let message = if detail.message.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        detail.message
    };

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized { message },
        StatusCode::NOT_FOUND => RemoteError::NotFound { resource },
        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => RemoteError::Transport {
            message: format!("{} {message}", s.as_u16()),
            status: Some(s.as_u16()),
            retry_after,
        },
        s => RemoteError::RemoteApi {
            status: s.as_u16(),
            code: detail.code,
            message,
        },
    })
}

fn map_send_error(err: reqwest::Error) -> RemoteError {
    if err.is_builder() {
        RemoteError::unexpected(err.to_string())
    } else {
        RemoteError::transport(err.to_string())
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::unexpected(format!("Invalid response body: {e}")))
}

/// Segments addressing `path` relative to a drive root, e.g.
/// `["drives", id, "root:", "dir", "file.url:"]`.
fn drive_path_segments(drive_id: &str, path: &str, suffix: &[&str]) -> Result<Vec<String>, RemoteError> {
    let mut parts: Vec<&str> = path.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
    let last = parts
        .pop()
        .ok_or_else(|| RemoteError::unexpected("Empty item path"))?;

    let mut segments = vec!["drives".to_string(), drive_id.to_string(), "root:".to_string()];
    segments.extend(parts.into_iter().map(str::to_string));
    segments.push(format!("{last}:"));
    segments.extend(suffix.iter().map(|s| s.to_string()));
    Ok(segments)
}

fn site_segments(site: &SiteAddress) -> Vec<String> {
    let mut segments = vec!["sites".to_string()];
    if site.segments.is_empty() {
        segments.push(site.host.clone());
    } else {
        segments.push(format!("{}:", site.host));
        segments.extend(site.segments.iter().cloned());
    }
    segments
}

#[async_trait]
impl RemoteStore for GraphClient {
    async fn resolve_site(
        &self,
        site: &SiteAddress,
        cancel: &CancellationToken,
    ) -> Result<String, RemoteError> {
        let url = self.endpoint(&site_segments(site))?;
        let resource: SiteResource = self.get_json("resolve site", url, cancel).await?;
        match resource.id {
            Some(id) if !id.is_empty() => {
                debug!(site = %site, site_id = %id, "Resolved site");
                Ok(id)
            }
            _ => Err(RemoteError::NotFound {
                resource: site.to_string(),
            }),
        }
    }

    async fn list_drives(
        &self,
        site_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DriveRef>, RemoteError> {
        let mut url = self.endpoint(&["sites", site_id, "drives"])?;
        let mut drives = Vec::new();
        loop {
            let page: Collection<DriveRef> = self.get_json("list drives", url, cancel).await?;
            drives.extend(page.value.into_iter().filter(|d| !d.id.is_empty()));
            match page.next_link {
                Some(link) => url = self.next_link(&link)?,
                None => break,
            }
        }
        Ok(drives)
    }

    async fn list_children(
        &self,
        drive_id: &str,
        item_id: &str,
        page: Option<&PageToken>,
        cancel: &CancellationToken,
    ) -> Result<ChildrenPage, RemoteError> {
        let url = match page {
            Some(token) => self.next_link(token.as_str())?,
            None => self.endpoint(&["drives", drive_id, "items", item_id, "children"])?,
        };
        let page: Collection<DriveItem> = self.get_json("list children", url, cancel).await?;
        Ok(ChildrenPage {
            items: page.value,
            next_page: page.next_link.map(PageToken),
        })
    }

    async fn upload_content(
        &self,
        drive_id: &str,
        path: &str,
        content: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&drive_path_segments(drive_id, path, &["content"])?)?;
        self.execute("upload content", cancel, |http| {
            http.put(url.clone())
                .header(CONTENT_TYPE, "text/plain")
                .body(content.clone())
        })
        .await?;
        Ok(())
    }

    async fn delete_item(
        &self,
        drive_id: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["drives", drive_id, "items", item_id])?;
        self.execute("delete item", cancel, |http| http.delete(url.clone()))
            .await?;
        Ok(())
    }

    async fn get_item_by_path(
        &self,
        drive_id: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<DriveItem>, RemoteError> {
        let url = self.endpoint(&drive_path_segments(drive_id, path, &[])?)?;
        match self.get_json("get item by path", url, cancel).await {
            Ok(item) => Ok(Some(item)),
            Err(RemoteError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    fn client(base: &str) -> GraphClient {
        let config = GraphConfig {
            api_base_url: base.to_string(),
            ..Default::default()
        };
        GraphClient::new(&config, Arc::new(StaticToken::new("t"))).unwrap()
    }

    #[test]
    fn test_site_endpoint() {
        let client = client("https://graph.microsoft.com/v1.0");
        let site = SiteAddress::parse("https://contoso.sharepoint.com/sites/My Team").unwrap();
        let url = client.endpoint(&site_segments(&site)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/sites/contoso.sharepoint.com:/sites/My%20Team"
        );

        let root = SiteAddress::parse("https://contoso.sharepoint.com/").unwrap();
        let url = client.endpoint(&site_segments(&root)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/sites/contoso.sharepoint.com"
        );
    }

    #[test]
    fn test_upload_endpoint() {
        let client = client("https://graph.microsoft.com/v1.0/");
        let segments = drive_path_segments("b!1", "dir/sub/a.url", &["content"]).unwrap();
        let url = client.endpoint(&segments).unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/drives/b!1/root:/dir/sub/a.url:/content"
        );

        let segments = drive_path_segments("b!1", "a.url", &[]).unwrap();
        let url = client.endpoint(&segments).unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/drives/b!1/root:/a.url:"
        );

        assert!(drive_path_segments("b!1", "/", &[]).is_err());
    }

    #[test]
    fn test_next_link_must_share_origin() {
        let client = client("https://graph.microsoft.com/v1.0");
        assert!(
            client
                .next_link("https://graph.microsoft.com/v1.0/drives/x/items/root/children?$skiptoken=abc")
                .is_ok()
        );
        assert!(client.next_link("https://evil.example.com/steal").is_err());
        assert!(client.next_link("not a url").is_err());
    }

    #[test]
    fn test_invalid_base_url() {
        let config = GraphConfig {
            api_base_url: "mailto:someone".to_string(),
            ..Default::default()
        };
        assert!(GraphClient::new(&config, Arc::new(StaticToken::new("t"))).is_err());
    }
}
