//! HTTP boundary to the licensing service.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde_json::Value;
use url::Url;

use crate::error::{FetchError, FetchResult};

const USER_AGENT: &str = concat!("openwp-licence/", env!("CARGO_PKG_VERSION"));

/// A single GET returning decoded JSON.
///
/// Implementations must not retry; the caller decides what a failure means.
pub trait RemoteClient: Send + Sync {
    fn fetch(&self, url: &Url) -> impl Future<Output = FetchResult<Value>> + Send;
}

impl<R: RemoteClient> RemoteClient for Arc<R> {
    fn fetch(&self, url: &Url) -> impl Future<Output = FetchResult<Value>> + Send {
        (**self).fetch(url)
    }
}

/// `RemoteClient` over reqwest with a bounded timeout.
#[derive(Clone)]
pub struct HttpRemoteClient {
    http: HttpClient,
}

impl HttpRemoteClient {
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { http })
    }
}

impl RemoteClient for HttpRemoteClient {
    async fn fetch(&self, url: &Url) -> FetchResult<Value> {
        // Query strings carry API credentials; only the path is logged.
        let path = url.path().to_string();

        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("GET {} failed: {}", path, e);
                FetchError::Network(e.without_url().to_string())
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!("GET {} returned {}", path, status);
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.without_url().to_string()))?;

        serde_json::from_slice(&body).map_err(|e| {
            tracing::debug!("GET {} returned undecodable body: {}", path, e);
            FetchError::Decode(e.to_string())
        })
    }
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteClient").finish_non_exhaustive()
    }
}
