//! Proxy validator: scrapes candidate proxies, probes them per session
//! through a real browser, and republishes the surviving set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{
    FAILED_SET_TTL, MAX_CONCURRENT_TESTS, PROBE_ACQUIRE_TIMEOUT, PROBE_CONTENT_WAIT,
    PROBE_MIN_CONTENT_LEN, PROBE_WALL_CLOCK_BUDGET, SESSION_TASK_TIMEOUT, SESSION_VALID_QUOTA,
    VALIDATION_BATCH_SIZE, VALIDATION_TIMEOUT,
};
use crate::sessions::Session;
use crate::sources::{scrape_proxies, Endpoint};
use crate::{FetchError, Result};

/// `httpbin.org`'s echo endpoint, substituted for HTTPS session targets that
/// a headless Chrome instance bound to an untrusted HTTP proxy may fail to
/// TLS-negotiate through (spec.md §4.4 step 4b).
const HTTPS_PROBE_TARGET: &str = "http://httpbin.org/ip";

/// Probes one candidate proxy against one session's target URL.
///
/// The production implementation renders the page through a pooled
/// headless-browser instance pinned to the candidate proxy; tests supply a
/// fake that never touches a real browser or network.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(&self, session: &Session, endpoint: &Endpoint) -> bool;
}

/// Probes a candidate by rendering a target through a browser instance
/// pinned to it, judging success on wall-clock time and rendered length —
/// the `"error" not in page_source` substring heuristic from the original
/// implementation is deliberately not ported (see DESIGN.md).
pub struct BrowserProbe {
    pool: Arc<crate::pool::Pool>,
}

impl BrowserProbe {
    pub fn new(pool: Arc<crate::pool::Pool>) -> Self {
        Self { pool }
    }

    /// Acquires an instance pinned to `endpoint` (2 s acquire timeout) and
    /// renders `url` through it, returning the rendered page length.
    async fn render(&self, endpoint: &Endpoint, url: &str) -> Result<usize> {
        let lease = tokio::time::timeout(PROBE_ACQUIRE_TIMEOUT, self.pool.acquire(Some(&endpoint.url())))
            .await
            .map_err(|_| FetchError::Timeout)??
            .ok_or_else(|| FetchError::Other("validator pool exhausted".to_string()))?;

        let result = self.render_with_lease(&lease, url).await;
        self.pool.release(lease, result.is_err()).await;
        result
    }

    /// Navigates the leased instance to `url` under the 800 ms validation
    /// page-load timeout, then polls `page_source` for up to 2 s for it to
    /// exceed [`PROBE_MIN_CONTENT_LEN`] bytes.
    async fn render_with_lease(&self, lease: &crate::pool::Lease, url: &str) -> Result<usize> {
        let page = lease
            .browser
            .new_page(url)
            .await
            .map_err(|e| FetchError::Browser(format!("failed to open tab: {}", e)))?;

        // A slow or unreachable proxy simply leaves the page partially
        // loaded rather than failing the probe outright; the content-length
        // poll below is what actually decides success.
        let _ = tokio::time::timeout(VALIDATION_TIMEOUT, page.wait_for_navigation()).await;

        let deadline = Instant::now() + PROBE_CONTENT_WAIT;
        loop {
            let html = page.content().await.unwrap_or_default();
            if html.len() > PROBE_MIN_CONTENT_LEN || Instant::now() >= deadline {
                let _ = page.close().await;
                return Ok(html.len());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[async_trait]
impl ProxyProbe for BrowserProbe {
    async fn probe(&self, session: &Session, endpoint: &Endpoint) -> bool {
        let target = if session.url.starts_with("https://") {
            HTTPS_PROBE_TARGET
        } else {
            session.url.as_str()
        };

        let started = Instant::now();
        let result = tokio::time::timeout(PROBE_WALL_CLOCK_BUDGET, self.render(endpoint, target)).await;
        let elapsed = started.elapsed();

        match result {
            Ok(Ok(len)) => elapsed < PROBE_WALL_CLOCK_BUDGET && len > PROBE_MIN_CONTENT_LEN,
            Ok(Err(e)) => {
                debug!(proxy = %endpoint.url(), "probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!(proxy = %endpoint.url(), "probe timed out");
                false
            }
        }
    }
}

/// Per-session table of the currently trusted, validated proxies.
#[derive(Default)]
pub struct ValidProxyMap {
    inner: RwLock<HashMap<String, Vec<Endpoint>>>,
}

impl ValidProxyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces a session's trusted list.
    pub async fn replace(&self, session: &str, proxies: Vec<Endpoint>) {
        self.inner.write().await.insert(session.to_string(), proxies);
    }

    /// Returns a clone of a session's current trusted list, if any.
    pub async fn get(&self, session: &str) -> Option<Vec<Endpoint>> {
        self.inner.read().await.get(session).cloned()
    }

    /// Returns per-session counts plus the total across all sessions.
    pub async fn stats(&self) -> (HashMap<String, usize>, usize) {
        let inner = self.inner.read().await;
        let counts: HashMap<String, usize> = inner.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        let total = counts.values().sum();
        (counts, total)
    }
}

/// Recently-failed proxy endpoints, excluded from the next validation round
/// until the blacklist is periodically cleared.
pub struct FailedSet {
    inner: RwLock<HashSet<Endpoint>>,
    last_cleared: RwLock<Instant>,
}

impl FailedSet {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashSet::new()),
            last_cleared: RwLock::new(Instant::now()),
        }
    }

    pub async fn mark_failed(&self, endpoint: Endpoint) {
        self.inner.write().await.insert(endpoint);
    }

    pub async fn contains(&self, endpoint: &Endpoint) -> bool {
        self.inner.read().await.contains(endpoint)
    }

    /// Clears the blacklist if [`FAILED_SET_TTL`] has elapsed since the last
    /// clear, and always records the attempt's timestamp check.
    pub async fn clear_if_stale(&self) {
        let mut last = self.last_cleared.write().await;
        if last.elapsed() >= FAILED_SET_TTL {
            self.inner.write().await.clear();
            *last = Instant::now();
            debug!("failed-proxy blacklist cleared");
        }
    }
}

impl Default for FailedSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs validation rounds against the configured sessions, using a
/// [`ProxyProbe`] to test each candidate and publishing survivors into a
/// [`ValidProxyMap`].
pub struct Validator<P: ProxyProbe> {
    http: Client,
    probe: Arc<P>,
    pub valid: Arc<ValidProxyMap>,
    pub failed: Arc<FailedSet>,
}

impl<P: ProxyProbe> Validator<P> {
    pub fn new(http: Client, probe: Arc<P>, valid: Arc<ValidProxyMap>, failed: Arc<FailedSet>) -> Self {
        Self {
            http,
            probe,
            valid,
            failed,
        }
    }

    /// Runs one full validation round: scrape candidates, validate them
    /// against every registered session, and publish the survivors.
    pub async fn run_round(&self) {
        self.failed.clear_if_stale().await;

        let candidates = scrape_proxies(&self.http).await;
        let mut fresh = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !self.failed.contains(&candidate).await {
                fresh.push(candidate);
            }
        }

        if fresh.is_empty() {
            warn!("no candidate proxies survived the failed-set filter");
            return;
        }

        let mut joins = JoinSet::new();
        for name in crate::sessions::names() {
            let session = crate::sessions::get(name).expect("name came from sessions::names()").clone();
            let candidates = fresh.clone();
            let probe = Arc::clone(&self.probe);
            let failed = Arc::clone(&self.failed);
            joins.spawn(async move {
                let name = session.name.clone();
                let valid = tokio::time::timeout(
                    SESSION_TASK_TIMEOUT,
                    validate_session(&session, candidates, probe, failed),
                )
                .await
                .unwrap_or_else(|_| {
                    warn!(session = %name, "per-session validation task timed out");
                    Vec::new()
                });
                (name, valid)
            });
        }

        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok((session_name, valid)) => {
                    info!(session = %session_name, valid = valid.len(), "validation round complete");
                    self.valid.replace(&session_name, valid).await;
                }
                Err(e) => warn!("validation task panicked: {}", e),
            }
        }
    }
}

/// Validates `candidates` against one session: batches of
/// [`VALIDATION_BATCH_SIZE`], each batch probed with up to
/// [`MAX_CONCURRENT_TESTS`] concurrent probes, stopping once the quota is
/// reached. The batch that crosses the quota is allowed to overshoot before
/// the final truncation to [`SESSION_VALID_QUOTA`] — see DESIGN.md.
async fn validate_session<P: ProxyProbe>(
    session: &Session,
    candidates: Vec<Endpoint>,
    probe: Arc<P>,
    failed: Arc<FailedSet>,
) -> Vec<Endpoint> {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TESTS));
    let mut valid = Vec::new();

    for batch in candidates.chunks(VALIDATION_BATCH_SIZE) {
        if valid.len() >= SESSION_VALID_QUOTA {
            break;
        }

        let mut joins = JoinSet::new();
        for endpoint in batch {
            let endpoint = endpoint.clone();
            let session = session.clone();
            let probe = Arc::clone(&probe);
            let semaphore = Arc::clone(&semaphore);
            let failed = Arc::clone(&failed);
            joins.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let ok = probe.probe(&session, &endpoint).await;
                if !ok {
                    failed.mark_failed(endpoint.clone()).await;
                }
                (endpoint, ok)
            });
        }

        while let Some(joined) = joins.join_next().await {
            if let Ok((endpoint, true)) = joined {
                valid.push(endpoint);
            }
        }
    }

    valid.truncate(SESSION_VALID_QUOTA);
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysValid;
    #[async_trait]
    impl ProxyProbe for AlwaysValid {
        async fn probe(&self, _session: &crate::sessions::Session, _endpoint: &Endpoint) -> bool {
            true
        }
    }

    struct AlwaysInvalid;
    #[async_trait]
    impl ProxyProbe for AlwaysInvalid {
        async fn probe(&self, _session: &crate::sessions::Session, _endpoint: &Endpoint) -> bool {
            false
        }
    }

    struct CountingProbe {
        calls: AtomicUsize,
    }
    #[async_trait]
    impl ProxyProbe for CountingProbe {
        async fn probe(&self, _session: &crate::sessions::Session, _endpoint: &Endpoint) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn candidates(n: usize) -> Vec<Endpoint> {
        (0..n)
            .map(|i| Endpoint {
                host: format!("10.0.0.{}", i),
                port: 8080,
            })
            .collect()
    }

    fn fake_session() -> crate::sessions::Session {
        crate::sessions::get("CoinMarketCap").unwrap().clone()
    }

    #[tokio::test]
    async fn test_validate_session_all_valid_is_truncated_to_quota() {
        let session = fake_session();
        let failed = Arc::new(FailedSet::new());
        let valid = validate_session(&session, candidates(30), Arc::new(AlwaysValid), failed).await;
        assert_eq!(valid.len(), SESSION_VALID_QUOTA);
    }

    #[tokio::test]
    async fn test_validate_session_all_invalid_yields_empty() {
        let session = fake_session();
        let failed = Arc::new(FailedSet::new());
        let valid = validate_session(&session, candidates(12), Arc::new(AlwaysInvalid), failed.clone()).await;
        assert!(valid.is_empty());
        for endpoint in candidates(12) {
            assert!(failed.contains(&endpoint).await);
        }
    }

    #[tokio::test]
    async fn test_validate_session_stops_scheduling_once_quota_reached() {
        let session = fake_session();
        let failed = Arc::new(FailedSet::new());
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
        });
        // 5 batches of size VALIDATION_BATCH_SIZE would cover 25 candidates;
        // quota is 20, so the probe must not be called on the final batch.
        let _ = validate_session(&session, candidates(25), Arc::clone(&probe), failed).await;
        assert!(probe.calls.load(Ordering::SeqCst) < 25);
    }

    #[tokio::test]
    async fn test_valid_proxy_map_replace_and_get() {
        let map = ValidProxyMap::new();
        map.replace("s", candidates(3)).await;
        assert_eq!(map.get("s").await.unwrap().len(), 3);
        assert!(map.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_valid_proxy_map_stats() {
        let map = ValidProxyMap::new();
        map.replace("a", candidates(2)).await;
        map.replace("b", candidates(5)).await;
        let (counts, total) = map.stats().await;
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("b"), Some(&5));
        assert_eq!(total, 7);
    }

    #[tokio::test]
    async fn test_failed_set_mark_and_contains() {
        let set = FailedSet::new();
        let endpoint = candidates(1).remove(0);
        assert!(!set.contains(&endpoint).await);
        set.mark_failed(endpoint.clone()).await;
        assert!(set.contains(&endpoint).await);
    }
}
