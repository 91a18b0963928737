//! Error types for the proxy-fetch broker.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Errors that can surface across a component boundary.
///
/// Purely internal failures (a single proxy probe failing, one fallback
/// step in the dispatcher ladder failing) are handled locally as plain
/// `Result`s and never promoted to a variant here — only failures that a
/// caller of this crate, or the RPC layer, needs to name.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Headless browser launch or control failed.
    #[error("browser error: {0}")]
    Browser(String),

    /// Failed to parse a response body or source list.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// No session by that name is registered.
    #[error("session '{0}' not found")]
    UnknownSession(String),

    /// The session name supplied by the caller was empty.
    #[error("session name must not be empty")]
    EmptySession,

    /// Every step of the fetch dispatcher's fallback ladder failed.
    #[error("all fetch strategies failed for session '{0}'")]
    AllStrategiesFailed(String),

    /// A validation or fetch step exceeded its timeout budget.
    #[error("operation timed out")]
    Timeout,

    /// Chrome/Chromium could not be located or downloaded.
    #[error("failed to provision a browser driver: {0}")]
    DriverSetup(String),

    /// Generic error for conditions that don't warrant a dedicated variant.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_session() {
        let err = FetchError::UnknownSession("CoinMarketCap".to_string());
        assert_eq!(err.to_string(), "session 'CoinMarketCap' not found");
    }

    #[test]
    fn test_error_display_empty_session() {
        let err = FetchError::EmptySession;
        assert_eq!(err.to_string(), "session name must not be empty");
    }

    #[test]
    fn test_error_display_all_strategies_failed() {
        let err = FetchError::AllStrategiesFailed("CoinMarketCap".to_string());
        assert_eq!(
            err.to_string(),
            "all fetch strategies failed for session 'CoinMarketCap'"
        );
    }

    #[test]
    fn test_error_display_timeout() {
        let err = FetchError::Timeout;
        assert_eq!(err.to_string(), "operation timed out");
    }

    #[test]
    fn test_error_display_other() {
        let err = FetchError::Other("something went wrong".to_string());
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_error_debug() {
        let err = FetchError::Timeout;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Timeout"));
    }
}
