//! Source lists fetcher: scrapes candidate proxy endpoints and user agents
//! from a small set of fixed upstream mirrors.

use std::collections::HashSet;

use reqwest::Client;
use tracing::{debug, warn};

use crate::config::{
    DEFAULT_USER_AGENTS, PROXY_SOURCE_URLS, SOURCE_FETCH_TIMEOUT, USER_AGENT_FETCH_BACKOFF,
    USER_AGENT_FETCH_RETRIES, USER_AGENT_SOURCE_URLS,
};

/// A candidate proxy endpoint, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Fetches the fixed proxy source lists and parses `host:port` pairs out of
/// each line, deduplicating while preserving first-seen order.
///
/// Mirrors the original `scrape_proxies()`: a line is split on `:` and the
/// first two fields are taken as host and port; lines that don't parse are
/// skipped rather than failing the whole fetch.
pub async fn scrape_proxies(client: &Client) -> Vec<Endpoint> {
    let mut seen = HashSet::new();
    let mut endpoints = Vec::new();

    for &url in PROXY_SOURCE_URLS {
        let body = match fetch_text(client, url, SOURCE_FETCH_TIMEOUT).await {
            Ok(body) => body,
            Err(e) => {
                warn!("proxy source list {} failed: {}", url, e);
                continue;
            }
        };

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(3, ':');
            let host = match parts.next() {
                Some(h) if !h.is_empty() => h,
                _ => continue,
            };
            let port: u16 = match parts.next().and_then(|p| p.parse().ok()) {
                Some(p) => p,
                None => continue,
            };
            let endpoint = Endpoint {
                host: host.to_string(),
                port,
            };
            if seen.insert(endpoint.clone()) {
                endpoints.push(endpoint);
            }
        }
    }

    debug!("scraped {} candidate proxy endpoints", endpoints.len());
    endpoints
}

/// Fetches the user-agent gist, retrying with a fixed back-off, and filters
/// to desktop browser strings. Falls back to the built-in default list if
/// every attempt fails.
///
/// Mirrors the original `scrape_user_agents()`: keep lines containing
/// `Mozilla/` that do not mention `Android`, `iPhone`, `iPad`, or `Mobile`.
pub async fn scrape_user_agents(client: &Client) -> Vec<String> {
    for attempt in 1..=USER_AGENT_FETCH_RETRIES {
        match fetch_text(client, USER_AGENT_SOURCE_URLS[0], SOURCE_FETCH_TIMEOUT).await {
            Ok(body) => {
                let agents = filter_desktop_user_agents(&body);
                if !agents.is_empty() {
                    debug!("scraped {} user agents", agents.len());
                    return agents;
                }
                warn!("user agent source returned no usable lines (attempt {})", attempt);
            }
            Err(e) => {
                warn!(
                    "user agent source fetch failed (attempt {}/{}): {}",
                    attempt, USER_AGENT_FETCH_RETRIES, e
                );
            }
        }
        if attempt < USER_AGENT_FETCH_RETRIES {
            tokio::time::sleep(USER_AGENT_FETCH_BACKOFF).await;
        }
    }

    warn!("falling back to built-in default user agents");
    DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
}

fn filter_desktop_user_agents(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut agents = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || !line.contains("Mozilla/") {
            continue;
        }
        if ["Android", "iPhone", "iPad", "Mobile"]
            .iter()
            .any(|needle| line.contains(needle))
        {
            continue;
        }
        if seen.insert(line.to_string()) {
            agents.push(line.to_string());
        }
    }
    agents
}

async fn fetch_text(
    client: &Client,
    url: &str,
    timeout: std::time::Duration,
) -> Result<String, reqwest::Error> {
    client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        let endpoint = Endpoint {
            host: "1.2.3.4".to_string(),
            port: 8080,
        };
        assert_eq!(endpoint.url(), "http://1.2.3.4:8080");
    }

    #[test]
    fn test_filter_desktop_user_agents_excludes_mobile() {
        let body = "Mozilla/5.0 (Windows NT 10.0) Chrome/124\n\
                     Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)\n\
                     Mozilla/5.0 (Linux; Android 14)\n\
                     Mozilla/5.0 (iPad; CPU OS 17_0)\n\
                     not a user agent line\n";
        let agents = filter_desktop_user_agents(body);
        assert_eq!(agents.len(), 1);
        assert!(agents[0].contains("Windows NT 10.0"));
    }

    #[test]
    fn test_filter_desktop_user_agents_dedupes() {
        let body = "Mozilla/5.0 (Windows NT 10.0) Chrome/124\n\
                     Mozilla/5.0 (Windows NT 10.0) Chrome/124\n";
        let agents = filter_desktop_user_agents(body);
        assert_eq!(agents.len(), 1);
    }

    #[test]
    fn test_filter_desktop_user_agents_empty_on_no_match() {
        let body = "nothing here\nMobile Safari only\n";
        assert!(filter_desktop_user_agents(body).is_empty());
    }
}
