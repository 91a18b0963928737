//! Session registry: named fetch profiles (target URL, headers, timeout).

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::config::DEFAULT_SESSION_TIMEOUT;

/// A named fetch profile: a target URL plus the headers and timeout a
/// dispatcher call for this session should use.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session name, as named by RPC callers.
    pub name: String,
    /// The URL to fetch when this session is invoked.
    pub url: String,
    /// Headers applied on the plain-HTTP fallback steps.
    pub headers: HashMap<String, String>,
    /// Wall-clock budget for the plain-HTTP fallback steps.
    pub timeout: Duration,
}

impl Session {
    fn new(name: &str, url: &str, headers: &[(&str, &str)], timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            timeout,
        }
    }
}

/// Static table of configured sessions, keyed by name.
///
/// Ported from the original service's single configured entry
/// (`CoinMarketCap`) so the registry is non-empty out of the box.
static SESSIONS: Lazy<HashMap<String, Session>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "CoinMarketCap".to_string(),
        Session::new(
            "CoinMarketCap",
            "https://coinmarketcap.com/es/",
            &[
                ("Accept-Language", "es-ES,es;q=0.9"),
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
                ),
            ],
            DEFAULT_SESSION_TIMEOUT,
        ),
    );
    map
});

/// Looks up a session by name.
pub fn get(name: &str) -> Option<&'static Session> {
    SESSIONS.get(name)
}

/// Returns whether any session is registered under `name`.
pub fn contains(name: &str) -> bool {
    SESSIONS.contains_key(name)
}

/// Returns the names of all registered sessions.
pub fn names() -> Vec<&'static str> {
    SESSIONS.keys().map(|s| s.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_is_registered() {
        assert!(contains("CoinMarketCap"));
    }

    #[test]
    fn test_unknown_session_is_absent() {
        assert!(get("DoesNotExist").is_none());
    }

    #[test]
    fn test_default_session_fields() {
        let session = get("CoinMarketCap").unwrap();
        assert_eq!(session.url, "https://coinmarketcap.com/es/");
        assert_eq!(session.timeout, DEFAULT_SESSION_TIMEOUT);
        assert_eq!(
            session.headers.get("Accept-Language").map(String::as_str),
            Some("es-ES,es;q=0.9")
        );
    }

    #[test]
    fn test_names_includes_default() {
        assert!(names().contains(&"CoinMarketCap"));
    }
}
