//! Fetch dispatcher: serves one `FetchContent` call by walking a four-step
//! fallback ladder, stopping at the first strategy that succeeds.
//!
//! Ladder order, mirroring the original `_fetch_with_selenium`/
//! `_fetch_with_requests` call sequence in `FetchContent`:
//!   A. proxy + browser render
//!   B. proxy + plain HTTP GET
//!   C. direct (no proxy) + browser render
//!   D. direct (no proxy) + plain HTTP GET
//!
//! Every internal step failure (a dead proxy, a browser tab crash, a 5xx
//! response) is absorbed here and only logged — the caller sees either the
//! fetched bytes or [`FetchError::AllStrategiesFailed`].

use std::sync::Arc;

use rand::seq::IndexedRandom;
use tracing::{debug, warn};

use crate::fetcher::PageFetcher;
use crate::pool::PooledFetcher;
use crate::sessions::Session;
use crate::sources::Endpoint;
use crate::validator::ValidProxyMap;
use crate::{FetchError, Result};

/// Supplies the randomised desktop user agents scraped at startup.
pub struct UserAgents {
    pool: Vec<String>,
}

impl UserAgents {
    pub fn new(pool: Vec<String>) -> Self {
        Self { pool }
    }

    pub fn pick(&self) -> Option<&str> {
        self.pool.choose(&mut rand::rng()).map(String::as_str)
    }
}

/// Dispatches `FetchContent` calls through the fallback ladder.
pub struct Dispatcher {
    pool: Arc<crate::pool::Pool>,
    valid_proxies: Arc<ValidProxyMap>,
    user_agents: Arc<UserAgents>,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<crate::pool::Pool>,
        valid_proxies: Arc<ValidProxyMap>,
        user_agents: Arc<UserAgents>,
    ) -> Self {
        Self {
            pool,
            valid_proxies,
            user_agents,
        }
    }

    /// Fetches `url` (or the session's own configured target when `url` is
    /// empty) on behalf of `session`, validating the session name and
    /// walking the fallback ladder. `want_proxy` gates steps A/B (spec.md
    /// §4.6 step 3.A): when false, or when the session has no known-good
    /// proxies, the ladder starts directly at step C.
    pub async fn fetch_content(&self, session_name: &str, url: &str, want_proxy: bool) -> Result<Vec<u8>> {
        if session_name.trim().is_empty() {
            return Err(FetchError::EmptySession);
        }
        let session = crate::sessions::get(session_name)
            .ok_or_else(|| FetchError::UnknownSession(session_name.to_string()))?;

        let target = if url.trim().is_empty() {
            session.url.as_str()
        } else {
            url
        };

        let user_agent = self.user_agents.pick().map(str::to_string);

        if want_proxy {
            if let Some(proxy) = self.random_proxy(session_name).await {
                if let Some(html) = self.try_browser(target, Some(proxy.url()), user_agent.as_deref()).await {
                    return Ok(html.into_bytes());
                }
                if let Some(body) = self.try_http(target, session, Some(proxy.url())).await {
                    return Ok(body);
                }
            }
        }

        if let Some(html) = self.try_browser(target, None, user_agent.as_deref()).await {
            return Ok(html.into_bytes());
        }
        if let Some(body) = self.try_http(target, session, None).await {
            return Ok(body);
        }

        Err(FetchError::AllStrategiesFailed(session_name.to_string()))
    }

    /// Returns a uniformly random proxy from the session's trusted list, or
    /// `None` if the session has no validated proxies yet.
    pub async fn random_proxy(&self, session_name: &str) -> Option<Endpoint> {
        let proxies = self.valid_proxies.get(session_name).await?;
        proxies.choose(&mut rand::rng()).cloned()
    }

    async fn try_browser(&self, url: &str, proxy: Option<String>, user_agent: Option<&str>) -> Option<String> {
        let mut fetcher = PooledFetcher::new(Arc::clone(&self.pool), proxy.clone());
        if let Some(ua) = user_agent {
            fetcher = fetcher.with_user_agent(ua);
        }
        match fetcher.fetch(url).await {
            Ok(html) => Some(html),
            Err(e) => {
                debug!(proxy = proxy.as_deref().unwrap_or("<none>"), "browser fetch failed: {}", e);
                None
            }
        }
    }

    async fn try_http(&self, url: &str, session: &Session, proxy: Option<String>) -> Option<Vec<u8>> {
        let fetcher = match crate::fetcher_http::HttpFetcher::build(proxy.as_deref(), &session.headers, session.timeout) {
            Ok(f) => f,
            Err(e) => {
                warn!("failed to build HTTP fetcher: {}", e);
                return None;
            }
        };
        match fetcher.fetch(url).await {
            Ok(html) => Some(html.into_bytes()),
            Err(e) => {
                debug!(proxy = proxy.as_deref().unwrap_or("<none>"), "HTTP fetch failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agents_pick_from_pool() {
        let agents = UserAgents::new(vec!["UA/1".to_string()]);
        assert_eq!(agents.pick(), Some("UA/1"));
    }

    #[test]
    fn test_user_agents_pick_empty_pool() {
        let agents = UserAgents::new(vec![]);
        assert_eq!(agents.pick(), None);
    }

    #[tokio::test]
    async fn test_fetch_content_rejects_empty_session() {
        let pool = Arc::new(crate::pool::Pool::new(crate::pool::PoolConfig::default()));
        let dispatcher = Dispatcher::new(
            pool,
            Arc::new(ValidProxyMap::new()),
            Arc::new(UserAgents::new(vec![])),
        );
        let err = dispatcher.fetch_content("", "https://example.com", true).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptySession));
    }

    #[tokio::test]
    async fn test_fetch_content_rejects_unknown_session() {
        let pool = Arc::new(crate::pool::Pool::new(crate::pool::PoolConfig::default()));
        let dispatcher = Dispatcher::new(
            pool,
            Arc::new(ValidProxyMap::new()),
            Arc::new(UserAgents::new(vec![])),
        );
        let err = dispatcher
            .fetch_content("DoesNotExist", "https://example.com", true)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn test_random_proxy_empty_session_list() {
        let pool = Arc::new(crate::pool::Pool::new(crate::pool::PoolConfig::default()));
        let valid = Arc::new(ValidProxyMap::new());
        valid.replace("CoinMarketCap", vec![]).await;
        let dispatcher = Dispatcher::new(pool, valid, Arc::new(UserAgents::new(vec![])));
        assert!(dispatcher.random_proxy("CoinMarketCap").await.is_none());
    }

    #[tokio::test]
    async fn test_random_proxy_unknown_session() {
        let pool = Arc::new(crate::pool::Pool::new(crate::pool::PoolConfig::default()));
        let dispatcher = Dispatcher::new(
            pool,
            Arc::new(ValidProxyMap::new()),
            Arc::new(UserAgents::new(vec![])),
        );
        assert!(dispatcher.random_proxy("Unregistered").await.is_none());
    }

    #[tokio::test]
    async fn test_random_proxy_picks_from_list() {
        let pool = Arc::new(crate::pool::Pool::new(crate::pool::PoolConfig::default()));
        let valid = Arc::new(ValidProxyMap::new());
        let endpoint = Endpoint {
            host: "1.2.3.4".to_string(),
            port: 8080,
        };
        valid.replace("CoinMarketCap", vec![endpoint.clone()]).await;
        let dispatcher = Dispatcher::new(pool, valid, Arc::new(UserAgents::new(vec![])));
        assert_eq!(dispatcher.random_proxy("CoinMarketCap").await, Some(endpoint));
    }

    #[tokio::test]
    async fn test_try_http_empty_headers_succeeds_against_unreachable_host() {
        // No network is actually reachable in test environments; this just
        // exercises the client-build and error-absorption path.
        let pool = Arc::new(crate::pool::Pool::new(crate::pool::PoolConfig::default()));
        let dispatcher = Dispatcher::new(
            pool,
            Arc::new(ValidProxyMap::new()),
            Arc::new(UserAgents::new(vec![])),
        );
        let session = crate::sessions::get("CoinMarketCap").unwrap();
        let result = dispatcher
            .try_http("http://127.0.0.1:1", session, None)
            .await;
        assert!(result.is_none());
    }
}
