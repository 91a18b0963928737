//! Integration tests for the fetch dispatcher.
//!
//! The fallback-ladder tests marked `#[ignore]` below drive a real headless
//! browser and real network access and are excluded from default runs.
//!
//! Run with: `cargo test --test dispatcher_integration -- --ignored`

use std::sync::Arc;

use fetchproxy::dispatcher::{Dispatcher, UserAgents};
use fetchproxy::error::FetchError;
use fetchproxy::pool::{Pool, PoolConfig};
use fetchproxy::validator::ValidProxyMap;

fn make_dispatcher() -> Dispatcher {
    let pool = Arc::new(Pool::new(PoolConfig::default()));
    Dispatcher::new(pool, Arc::new(ValidProxyMap::new()), Arc::new(UserAgents::new(vec![])))
}

#[tokio::test]
async fn test_fetch_content_empty_session_never_touches_network() {
    let dispatcher = make_dispatcher();
    let err = dispatcher
        .fetch_content("", "https://example.com", true)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::EmptySession));
}

#[tokio::test]
async fn test_fetch_content_unknown_session_never_touches_network() {
    let dispatcher = make_dispatcher();
    let err = dispatcher
        .fetch_content("NoSuchSession", "https://example.com", true)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::UnknownSession(name) if name == "NoSuchSession"));
}

#[tokio::test]
#[ignore]
async fn test_fetch_content_direct_http_fallback_against_real_target() {
    let dispatcher = make_dispatcher();
    let result = dispatcher
        .fetch_content("CoinMarketCap", "https://example.com", true)
        .await;
    assert!(result.is_ok(), "expected the direct-HTTP fallback to succeed: {:?}", result);
}
