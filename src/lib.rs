//! # fetchproxy
//!
//! A content-fetching RPC service that brokers HTTP retrieval through a
//! dynamically maintained pool of third-party HTTP proxies, rendering pages
//! in a real browser engine to defeat bot-detection and JS-gated content.
//!
//! Clients call the `FetchProxyService` gRPC surface (see [`rpc`]) naming a
//! target URL and a configured [`sessions::Session`]; the server returns the
//! rendered page body fetched through a vetted proxy with a randomised user
//! agent, falling back progressively to weaker fetch modes when the
//! preferred path fails (see [`dispatcher`]).
//!
//! A background [`scheduler`] periodically re-runs the [`validator`] to keep
//! each session's trusted proxy list fresh.

pub mod browser_setup;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod fetcher_http;
pub mod pool;
pub mod rpc;
pub mod scheduler;
pub mod sessions;
pub mod sources;
pub mod validator;

pub use error::{FetchError, Result};
pub use fetcher::{PageFetcher, WaitStrategy};
