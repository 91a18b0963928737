//! Compile-time configuration constants.
//!
//! Mirrors the original Python service's `internal/config/config.py`: no
//! environment variables, everything fixed at build time.

use std::time::Duration;

/// Number of candidate proxies validated per batch within a session.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Per-session validation batch size (spec.md §4.4 step 4).
pub const VALIDATION_BATCH_SIZE: usize = 5;

/// Default timeout for a plain-HTTP session fetch.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(1500);

/// Page-load timeout used while validating a proxy.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_millis(800);

/// Interval between refresh-scheduler validation rounds.
pub const UPDATE_TIME_MINUTES: u64 = 15;

/// Page-load timeout used by a serving browser instance.
pub const SELENIUM_TIMEOUT: Duration = Duration::from_secs(3);

/// Max browser instances in the validator's dedicated pool.
pub const MAX_VALIDATION_DRIVERS: usize = 25;

/// Max concurrent probes within a single validation batch.
pub const MAX_CONCURRENT_TESTS: usize = 15;

/// Max browser instances in the RPC surface's serving pool.
pub const SERVING_POOL_SIZE: usize = 10;

/// Per-session cap on entries retained in the `ValidProxyMap`.
pub const SESSION_VALID_QUOTA: usize = 20;

/// Idle eviction threshold for the serving pool.
pub const SERVING_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Idle eviction threshold for the validator's pool.
pub const VALIDATOR_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which the idle reaper scans a pool.
pub const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// An instance is destroyed after this many `had_error=true` releases.
pub const MAX_INSTANCE_ERRORS: u32 = 3;

/// Wall-clock budget for a single validation probe to count as successful.
pub const PROBE_WALL_CLOCK_BUDGET: Duration = Duration::from_secs(5);

/// Wall-clock budget for one session's entire validation task.
pub const SESSION_TASK_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimum rendered page length (bytes) for a probe to count as successful.
pub const PROBE_MIN_CONTENT_LEN: usize = 50;

/// Timeout for acquiring a validator-pool instance during a probe.
pub const PROBE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a probe polls for `page_source` to exceed [`PROBE_MIN_CONTENT_LEN`].
pub const PROBE_CONTENT_WAIT: Duration = Duration::from_secs(2);

/// How long the `FailedSet` is retained before being cleared.
pub const FAILED_SET_TTL: Duration = Duration::from_secs(30 * 60);

/// Timeout for a source-list HTTP GET.
pub const SOURCE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry attempts for the user-agent source list.
pub const USER_AGENT_FETCH_RETRIES: u32 = 3;

/// Back-off between user-agent source retries.
pub const USER_AGENT_FETCH_BACKOFF: Duration = Duration::from_secs(2);

/// Maximum gRPC message size (request and response), in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// RPC surface listen address.
pub const LISTEN_ADDR: &str = "[::]:5000";

/// Built-in desktop user agents used when every source list fails.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Proxy source lists scraped for candidate `host:port` endpoints.
pub const PROXY_SOURCE_URLS: &[&str] = &[
    "https://raw.githubusercontent.com/officialputuid/KangProxy/refs/heads/KangProxy/https/https.txt",
    "https://raw.githubusercontent.com/vakhov/fresh-proxy-list/refs/heads/master/https.txt",
];

/// Source lists scraped for user-agent strings.
pub const USER_AGENT_SOURCE_URLS: &[&str] = &[
    "https://gist.githubusercontent.com/pzb/b4b6f57144aea7827ae4/raw/cf847b76a142955b1410c8bcef3aabe221a63db1/user-agents.txt",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_and_batch_sizes_are_consistent_with_spec() {
        assert_eq!(SESSION_VALID_QUOTA, 20);
        assert_eq!(VALIDATION_BATCH_SIZE, 5);
        assert_eq!(MAX_CONCURRENT_TESTS, 15);
    }

    #[test]
    fn message_size_is_64_mib() {
        assert_eq!(MAX_MESSAGE_SIZE, 64 * 1024 * 1024);
    }

    #[test]
    fn default_user_agents_are_desktop() {
        for ua in DEFAULT_USER_AGENTS {
            assert!(ua.contains("Mozilla/"));
            assert!(!ua.contains("Mobile"));
        }
    }
}
