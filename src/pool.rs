//! Browser instance pool: a bounded set of headless-browser instances, each
//! pinned to a proxy (or to no proxy) for its lifetime.
//!
//! Generalizes the teacher's single shared `BrowserPool` (one browser, many
//! tabs) into many browsers, each launched once with a fixed
//! `--proxy-server` argument — Chrome cannot change its proxy at runtime, so
//! switching a slot to a different proxy means tearing down and relaunching
//! it, mirroring the original driver pool's `_reconfigure_driver_proxy`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{MAX_INSTANCE_ERRORS, REAPER_INTERVAL};
use crate::fetcher::{PageFetcher, WaitStrategy};
use crate::{FetchError, Result};

/// Configuration shared by every instance a pool launches.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of concurrently-held browser instances.
    pub max_instances: usize,
    /// Whether to run Chrome in headless mode.
    pub headless: bool,
    /// Explicit Chrome executable path; auto-detected/downloaded if `None`.
    pub chrome_path: Option<String>,
    /// How long an unused instance may sit idle before the reaper closes it.
    pub idle_timeout: Duration,
    /// Extra Chrome launch arguments applied to every instance.
    pub launch_args: Vec<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_instances: 10,
            headless: true,
            chrome_path: None,
            idle_timeout: crate::config::SERVING_IDLE_TIMEOUT,
            launch_args: Vec::new(),
        }
    }
}

struct Slot {
    id: u64,
    proxy: Option<String>,
    browser: Arc<Browser>,
    in_use: bool,
    last_used: Instant,
    error_count: u32,
}

/// Snapshot of a pool's current occupancy, mirroring the original
/// `DriverPool.get_stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub active: usize,
    pub available: usize,
    pub max: usize,
}

/// Health-checks a browser at checkout via the `Browser.getVersion` CDP
/// command — an always-available property whose failure means the
/// underlying Chrome process died silently.
async fn is_alive(browser: &Browser) -> bool {
    browser.version().await.is_ok()
}

/// A bounded pool of proxy-pinned headless-browser instances.
pub struct Pool {
    config: PoolConfig,
    slots: Mutex<Vec<Slot>>,
    next_id: AtomicU64,
}

/// An acquired instance, returned to the pool when dropped goes out of scope
/// via an explicit [`Pool::release`] call by the caller.
pub struct Lease {
    id: u64,
    pub browser: Arc<Browser>,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Acquires an instance pinned to `proxy` (`None` means "no proxy").
    ///
    /// Scans idle slots pinned to the same proxy, health-checking each
    /// before handing it out; a slot that fails the probe is destroyed and
    /// the scan continues (spec.md §4.3 step 1).
    /// Failing that, launches a new one if under `max_instances`; failing
    /// that, reconfigures (relaunches) the oldest idle slot pinned to a
    /// different proxy. Returns `Ok(None)` only if every slot is currently
    /// checked out.
    pub async fn acquire(&self, proxy: Option<&str>) -> Result<Option<Lease>> {
        let mut slots = self.slots.lock().await;

        loop {
            let candidate = slots
                .iter()
                .position(|s| !s.in_use && s.proxy.as_deref() == proxy && s.error_count < MAX_INSTANCE_ERRORS);
            let Some(pos) = candidate else { break };

            if is_alive(&slots[pos].browser).await {
                let slot = &mut slots[pos];
                slot.in_use = true;
                slot.last_used = Instant::now();
                debug!(id = slot.id, "reusing pooled browser instance");
                return Ok(Some(Lease {
                    id: slot.id,
                    browser: Arc::clone(&slot.browser),
                }));
            }

            warn!(id = slots[pos].id, "checked-out instance failed health probe, destroying");
            slots.remove(pos);
        }

        if slots.len() < self.config.max_instances {
            drop(slots);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let browser = self.launch(proxy).await?;
            info!(id, proxy = proxy.unwrap_or("<none>"), "launched browser instance");
            let mut slots = self.slots.lock().await;
            slots.push(Slot {
                id,
                proxy: proxy.map(str::to_string),
                browser: Arc::clone(&browser),
                in_use: true,
                last_used: Instant::now(),
                error_count: 0,
            });
            return Ok(Some(Lease { id, browser }));
        }

        if let Some(pos) = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.in_use)
            .min_by_key(|(_, s)| s.last_used)
            .map(|(pos, _)| pos)
        {
            let id = slots[pos].id;
            drop(slots);
            let browser = self.launch(proxy).await?;
            info!(id, "reconfigured browser instance for new proxy");
            let mut slots = self.slots.lock().await;
            if let Some(slot) = slots.iter_mut().find(|s| s.id == id) {
                slot.browser = Arc::clone(&browser);
                slot.proxy = proxy.map(str::to_string);
                slot.in_use = true;
                slot.last_used = Instant::now();
                slot.error_count = 0;
            }
            return Ok(Some(Lease { id, browser }));
        }

        Ok(None)
    }

    /// Returns an instance to the pool. `had_error` increments the slot's
    /// error count; at `MAX_INSTANCE_ERRORS` the slot is destroyed instead
    /// of being requeued.
    pub async fn release(&self, lease: Lease, had_error: bool) {
        let mut slots = self.slots.lock().await;
        let Some(pos) = slots.iter().position(|s| s.id == lease.id) else {
            return;
        };

        if had_error {
            slots[pos].error_count += 1;
        }

        if slots[pos].error_count >= MAX_INSTANCE_ERRORS {
            warn!(id = lease.id, "destroying browser instance past error threshold");
            slots.remove(pos);
            return;
        }

        slots[pos].in_use = false;
        slots[pos].last_used = Instant::now();
    }

    /// Closes and removes every idle slot older than `idle_timeout`.
    pub async fn reap_idle(&self) {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|s| s.in_use || s.last_used.elapsed() < self.config.idle_timeout);
        let reaped = before - slots.len();
        if reaped > 0 {
            debug!(reaped, "idle reaper closed browser instances");
        }
    }

    /// Spawns a long-lived background task that calls [`Pool::reap_idle`]
    /// every `REAPER_INTERVAL` until `pool` is dropped.
    pub fn spawn_reaper(pool: Arc<Pool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(REAPER_INTERVAL).await;
                pool.reap_idle().await;
            }
        })
    }

    pub async fn stats(&self) -> PoolStats {
        let slots = self.slots.lock().await;
        PoolStats {
            active: slots.iter().filter(|s| s.in_use).count(),
            available: slots.iter().filter(|s| !s.in_use).count(),
            max: self.config.max_instances,
        }
    }

    pub async fn shutdown(&self) {
        let mut slots = self.slots.lock().await;
        debug!(count = slots.len(), "shutting down browser pool");
        slots.clear();
    }

    async fn launch(&self, proxy: Option<&str>) -> Result<Arc<Browser>> {
        let mut builder = BrowserConfig::builder();

        if self.config.headless {
            builder = builder.arg("--headless=new");
        }

        if let Some(ref path) = self.config.chrome_path {
            builder = builder.chrome_executable(path);
        } else {
            let chrome_path = crate::browser_setup::ensure_chrome().await?;
            debug!("using Chrome at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        builder = builder.arg(
            "--user-agent=Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
             AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        );
        builder = builder.arg("--disable-blink-features=AutomationControlled");

        builder = builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-logging")
            .arg("--disable-default-apps")
            .arg("--disable-popup-blocking")
            .arg("--window-size=1920,1080")
            .arg("--no-first-run");

        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        for arg in &self.config.launch_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| FetchError::Browser(format!("failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| FetchError::Browser(format!("failed to launch browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser CDP handler error: {}", e);
                }
            }
            debug!("browser CDP handler exited");
        });

        Ok(Arc::new(browser))
    }
}

/// A [`PageFetcher`] that checks instances out of a [`Pool`] for each fetch,
/// releasing them (flagging an error if the fetch failed) when done.
pub struct PooledFetcher {
    pool: Arc<Pool>,
    proxy: Option<String>,
    user_agent: Option<String>,
    wait: WaitStrategy,
    page_load_timeout: Duration,
}

impl PooledFetcher {
    pub fn new(pool: Arc<Pool>, proxy: Option<String>) -> Self {
        Self {
            pool,
            proxy,
            user_agent: None,
            wait: WaitStrategy::default(),
            page_load_timeout: crate::config::SELENIUM_TIMEOUT,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_page_load_timeout(mut self, timeout: Duration) -> Self {
        self.page_load_timeout = timeout;
        self
    }
}

#[async_trait]
impl PageFetcher for PooledFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let lease = self
            .pool
            .acquire(self.proxy.as_deref())
            .await?
            .ok_or_else(|| FetchError::Other("browser pool exhausted".to_string()))?;

        let result = fetch_with_lease(
            &lease,
            url,
            self.user_agent.as_deref(),
            &self.wait,
            self.page_load_timeout,
        )
        .await;
        self.pool.release(lease, result.is_err()).await;
        result
    }
}

async fn fetch_with_lease(
    lease: &Lease,
    url: &str,
    user_agent: Option<&str>,
    wait: &WaitStrategy,
    page_load_timeout: Duration,
) -> Result<String> {
    let page = lease
        .browser
        .new_page(url)
        .await
        .map_err(|e| FetchError::Browser(format!("failed to open tab: {}", e)))?;

    if let Some(ua) = user_agent {
        page.set_user_agent(SetUserAgentOverrideParams::new(ua))
            .await
            .map_err(|e| FetchError::Browser(format!("failed to set user agent: {}", e)))?;
    }

    match wait {
        WaitStrategy::Load => {
            tokio::time::timeout(page_load_timeout, page.wait_for_navigation())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(|e| FetchError::Browser(format!("navigation wait failed: {}", e)))?;
        }
        WaitStrategy::NetworkIdle { idle_ms } => {
            tokio::time::timeout(page_load_timeout, page.wait_for_navigation())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(|e| FetchError::Browser(format!("navigation wait failed: {}", e)))?;
            tokio::time::sleep(Duration::from_millis(*idle_ms)).await;
        }
        WaitStrategy::Selector { css, timeout_ms } => {
            let found = tokio::time::timeout(Duration::from_millis(*timeout_ms), async {
                page.find_element(css.as_str()).await
            })
            .await;
            if let Err(_) | Ok(Err(_)) = found {
                debug!("selector '{}' not found within {}ms", css, timeout_ms);
            }
        }
        WaitStrategy::Delay { ms } => {
            tokio::time::timeout(page_load_timeout, page.wait_for_navigation())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(|e| FetchError::Browser(format!("navigation wait failed: {}", e)))?;
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
    }

    let html = page
        .content()
        .await
        .map_err(|e| FetchError::Browser(format!("failed to get page content: {}", e)))?;

    if let Err(e) = page.close().await {
        warn!("failed to close browser tab: {}", e);
    }

    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_instances, 10);
        assert!(config.headless);
    }

    #[tokio::test]
    async fn test_pool_stats_empty() {
        let pool = Pool::new(PoolConfig::default());
        let stats = pool.stats().await;
        assert_eq!(stats.active, 0);
        assert_eq!(stats.available, 0);
        assert_eq!(stats.max, 10);
    }

    #[tokio::test]
    async fn test_pool_shutdown_empty() {
        let pool = Pool::new(PoolConfig::default());
        pool.shutdown().await;
        assert_eq!(pool.stats().await.active, 0);
    }
}
