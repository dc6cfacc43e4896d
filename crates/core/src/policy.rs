//! Route classification.
//!
//! Maps a request identity to the strategy the interceptor runs for it. The
//! classifier only looks at the URL path: no I/O, no hidden state, and its
//! answer is recomputed on every request.
//!
//! Rules, first match wins:
//! 1. path under a network-only prefix → [`RouteClass::NetworkOnly`]
//! 2. path under a user-content prefix, or an image extension → [`RouteClass::CacheFirst`]
//! 3. anything else → [`RouteClass::NetworkFirst`]

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::request::RequestIdentity;

/// Caching strategy bucket for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    /// Always go to the origin; the store is never consulted.
    NetworkOnly,
    /// Serve from the store when present, populate it on miss.
    CacheFirst,
    /// Prefer the origin, fall back to the store when the network is gone.
    NetworkFirst,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::NetworkOnly => "network_only",
            RouteClass::CacheFirst => "cache_first",
            RouteClass::NetworkFirst => "network_first",
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path-pattern classifier.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    network_only_prefixes: Vec<String>,
    cache_first_prefixes: Vec<String>,
    cache_first_extensions: HashSet<String>,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

impl RoutePolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            network_only_prefixes: config.network_only_prefixes.iter().map(|p| trim_prefix(p)).collect(),
            cache_first_prefixes: config.cache_first_prefixes.iter().map(|p| trim_prefix(p)).collect(),
            cache_first_extensions: config
                .cache_first_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Classify a request by its path.
    pub fn classify(&self, identity: &RequestIdentity) -> RouteClass {
        self.classify_path(identity.path())
    }

    pub fn classify_path(&self, path: &str) -> RouteClass {
        if self.network_only_prefixes.iter().any(|p| under_prefix(path, p)) {
            return RouteClass::NetworkOnly;
        }

        if self.cache_first_prefixes.iter().any(|p| under_prefix(path, p)) {
            return RouteClass::CacheFirst;
        }

        if let Some(ext) = extension(path)
            && self.cache_first_extensions.contains(&ext)
        {
            return RouteClass::CacheFirst;
        }

        RouteClass::NetworkFirst
    }
}

fn trim_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
}

/// Segment-aware prefix test: `/api` covers `/api` and `/api/x`, not `/apiary`.
fn under_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Lowercased extension of the last path segment, if it has one.
fn extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(url: &str) -> RouteClass {
        RoutePolicy::default().classify(&RequestIdentity::get(url).unwrap())
    }

    #[test]
    fn test_api_is_network_only() {
        assert_eq!(classify("https://shop.test/api/orders"), RouteClass::NetworkOnly);
        assert_eq!(classify("https://shop.test/api"), RouteClass::NetworkOnly);
    }

    #[test]
    fn test_prefix_is_segment_aware() {
        assert_eq!(classify("https://shop.test/apiary"), RouteClass::NetworkFirst);
        assert_eq!(classify("https://shop.test/uploadsfoo"), RouteClass::NetworkFirst);
    }

    #[test]
    fn test_uploads_are_cache_first() {
        assert_eq!(classify("https://shop.test/uploads/photo.jpg"), RouteClass::CacheFirst);
        assert_eq!(classify("https://shop.test/uploads/report.pdf"), RouteClass::CacheFirst);
    }

    #[test]
    fn test_image_extensions_are_cache_first() {
        assert_eq!(classify("https://shop.test/static/logo.PNG"), RouteClass::CacheFirst);
        assert_eq!(classify("https://shop.test/favicon.ico"), RouteClass::CacheFirst);
        assert_eq!(classify("https://shop.test/img/hero.webp?v=3"), RouteClass::CacheFirst);
    }

    #[test]
    fn test_api_wins_over_image_extension() {
        assert_eq!(classify("https://shop.test/api/avatar.png"), RouteClass::NetworkOnly);
    }

    #[test]
    fn test_pages_are_network_first() {
        assert_eq!(classify("https://shop.test/"), RouteClass::NetworkFirst);
        assert_eq!(classify("https://shop.test/orders/new"), RouteClass::NetworkFirst);
        assert_eq!(classify("https://shop.test/app.js"), RouteClass::NetworkFirst);
        assert_eq!(classify("https://shop.test/.png"), RouteClass::NetworkFirst);
    }

    #[test]
    fn test_custom_config() {
        let policy = RoutePolicy::from_config(&PolicyConfig {
            network_only_prefixes: vec!["/graphql/".into()],
            cache_first_prefixes: vec!["/media".into()],
            cache_first_extensions: vec![".woff2".into()],
        });
        assert_eq!(policy.classify_path("/graphql"), RouteClass::NetworkOnly);
        assert_eq!(policy.classify_path("/media/a.mp4"), RouteClass::CacheFirst);
        assert_eq!(policy.classify_path("/fonts/inter.woff2"), RouteClass::CacheFirst);
        assert_eq!(policy.classify_path("/api/orders"), RouteClass::NetworkFirst);
    }

    #[test]
    fn test_route_class_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&RouteClass::CacheFirst).unwrap(), "\"cache_first\"");
        assert_eq!(RouteClass::NetworkOnly.to_string(), "network_only");
    }
}
