//! Plain-HTTP page fetcher using reqwest — the fallback step used when a
//! browser render isn't available or isn't needed.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};

use crate::fetcher::PageFetcher;
use crate::{FetchError, Result};

/// A page fetcher that issues a single GET request through reqwest,
/// honoring a session's configured headers, timeout, and (optionally) an
/// upstream proxy.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher for one session, with the proxy and headers that
    /// session's fallback step should use. `proxy` is `None` for the
    /// direct-fetch steps.
    pub fn build(
        proxy: Option<&str>,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| FetchError::Other(format!("invalid header name '{}': {}", key, e)))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| FetchError::Other(format!("invalid header value for '{}': {}", key, e)))?;
            header_map.insert(name, value);
        }

        let mut builder = Client::builder()
            .default_headers(header_map)
            .timeout(timeout);

        if let Some(proxy) = proxy {
            let proxy = ReqwestProxy::all(proxy)
                .map_err(|e| FetchError::Other(format!("invalid proxy url '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Creates a fetcher with default settings and no proxy, for general use
    /// outside the per-session dispatcher (e.g. source-list scraping).
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent("Mozilla/5.0 (compatible; fetchproxy/1.0)")
                .build()
                .expect("failed to create HTTP client"),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let html = response.text().await?;
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fetcher_new() {
        let _fetcher = HttpFetcher::new();
    }

    #[test]
    fn test_http_fetcher_build_with_headers() {
        let mut headers = HashMap::new();
        headers.insert("Accept-Language".to_string(), "es-ES".to_string());
        let fetcher = HttpFetcher::build(None, &headers, Duration::from_millis(1500));
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_http_fetcher_build_with_proxy() {
        let headers = HashMap::new();
        let fetcher = HttpFetcher::build(Some("http://127.0.0.1:8080"), &headers, Duration::from_secs(1));
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_http_fetcher_build_rejects_invalid_proxy() {
        let headers = HashMap::new();
        let fetcher = HttpFetcher::build(Some("not a url"), &headers, Duration::from_secs(1));
        assert!(fetcher.is_err());
    }
}
