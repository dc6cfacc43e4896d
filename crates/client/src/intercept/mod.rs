//! Interception controller.
//!
//! Every outgoing request enters through [`Interceptor::intercept`], which
//! classifies it and runs one of three strategies against the store and the
//! fetcher:
//!
//! - **network-only**: fetch and return verbatim; the store is never touched.
//! - **cache-first**: serve a stored entry if there is one; otherwise fetch,
//!   store, return.
//! - **network-first**: fetch; only when no response could be obtained at all,
//!   fall back to the stored entry.
//!
//! Store writes are best-effort: a rejected write is logged and the response
//! is still returned.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use offcache_core::{
    AppConfig, Error, GenerationLease, HttpResponse, RequestIdentity, RouteClass, RoutePolicy, Store, StoredResponse,
};

use crate::fetch::Fetcher;

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// Live response from the origin.
    Network,
    /// Stored entry served without contacting the origin.
    Cache,
    /// Stored entry served because the origin could not be reached.
    Offline,
}

/// Result of a successful interception.
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub route: RouteClass,
    pub source: ResponseSource,
    pub response: HttpResponse,
    /// When the served entry was stored; None for live responses.
    pub stored_at: Option<DateTime<Utc>>,
}

impl Intercepted {
    fn network(route: RouteClass, response: HttpResponse) -> Self {
        Self { route, source: ResponseSource::Network, response, stored_at: None }
    }

    fn stored(route: RouteClass, source: ResponseSource, stored: StoredResponse) -> Self {
        let stored_at = Some(stored.stored_at);
        Self { route, source, response: stored.into_response(), stored_at }
    }
}

/// Policy-driven request interceptor.
pub struct Interceptor {
    store: Store,
    fetcher: Arc<dyn Fetcher>,
    policy: RoutePolicy,
    cache_network_first: bool,
}

impl Interceptor {
    pub fn new(store: Store, fetcher: Arc<dyn Fetcher>, policy: RoutePolicy) -> Self {
        Self { store, fetcher, policy, cache_network_first: true }
    }

    pub fn from_config(store: Store, fetcher: Arc<dyn Fetcher>, config: &AppConfig) -> Self {
        Self::new(store, fetcher, RoutePolicy::from_config(&config.policy))
            .with_network_first_caching(config.cache_network_first)
    }

    /// Whether successful network-first responses are written to the store.
    pub fn with_network_first_caching(mut self, enabled: bool) -> Self {
        self.cache_network_first = enabled;
        self
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Handle one request.
    ///
    /// The route is recomputed on every call.
    pub async fn intercept(&self, identity: &RequestIdentity) -> Result<Intercepted, Error> {
        let route = self.policy.classify(identity);
        tracing::debug!(%identity, %route, "intercept");

        match route {
            RouteClass::NetworkOnly => self.network_only(identity).await,
            RouteClass::CacheFirst => self.cache_first(identity).await,
            RouteClass::NetworkFirst => self.network_first(identity).await,
        }
    }

    async fn network_only(&self, identity: &RequestIdentity) -> Result<Intercepted, Error> {
        let response = self.fetcher.fetch(identity).await?;
        Ok(Intercepted::network(RouteClass::NetworkOnly, response))
    }

    async fn cache_first(&self, identity: &RequestIdentity) -> Result<Intercepted, Error> {
        let route = RouteClass::CacheFirst;
        let lease = self.store.lease().await;

        if let Some(lease) = &lease
            && let Some(stored) = read(lease, identity).await
        {
            tracing::debug!(%identity, generation = lease.generation(), "cache hit");
            return Ok(Intercepted::stored(route, ResponseSource::Cache, stored));
        }

        tracing::debug!(%identity, "cache miss");
        let response = self.fetcher.fetch(identity).await?;
        if let Some(lease) = &lease {
            write(lease, identity, &response).await;
        }
        Ok(Intercepted::network(route, response))
    }

    async fn network_first(&self, identity: &RequestIdentity) -> Result<Intercepted, Error> {
        let route = RouteClass::NetworkFirst;
        let lease = self.store.lease().await;

        match self.fetcher.fetch(identity).await {
            Ok(response) => {
                if self.cache_network_first
                    && let Some(lease) = &lease
                {
                    write(lease, identity, &response).await;
                }
                Ok(Intercepted::network(route, response))
            }
            Err(err) if err.is_network_unavailable() => {
                if let Some(lease) = &lease
                    && let Some(stored) = read(lease, identity).await
                {
                    tracing::debug!(%identity, generation = lease.generation(), "network unavailable, serving stored entry");
                    return Ok(Intercepted::stored(route, ResponseSource::Offline, stored));
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

/// Store lookup that degrades to a miss when the store itself fails.
async fn read(lease: &GenerationLease, identity: &RequestIdentity) -> Option<StoredResponse> {
    match lease.get(identity).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(%identity, error = %e, "store read failed; treating as miss");
            None
        }
    }
}

/// Best-effort store write. Only successful GET responses are kept.
async fn write(lease: &GenerationLease, identity: &RequestIdentity, response: &HttpResponse) {
    if !identity.is_get() || !response.is_success() {
        return;
    }
    let stored = StoredResponse::now(response.clone());
    if let Err(e) = lease.put(identity, &stored).await {
        tracing::warn!(%identity, generation = lease.generation(), error = %e, "cache write rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Outcome, ScriptedFetcher, text};
    use offcache_core::CacheDb;

    async fn active_store() -> Store {
        let store = Store::open(CacheDb::open_in_memory().await.unwrap()).await.unwrap();
        store.db().begin_install("v1").await.unwrap();
        store.db().commit_install("v1", Vec::new()).await.unwrap();
        store.activate("v1").await.unwrap();
        store
    }

    async fn setup() -> (Store, Arc<ScriptedFetcher>, Interceptor) {
        let store = active_store().await;
        let fetcher = Arc::new(ScriptedFetcher::new());
        let interceptor = Interceptor::new(store.clone(), fetcher.clone(), RoutePolicy::default());
        (store, fetcher, interceptor)
    }

    fn id(url: &str) -> RequestIdentity {
        RequestIdentity::get(url).unwrap()
    }

    #[tokio::test]
    async fn test_cache_first_populates_then_serves_from_store() {
        let (store, fetcher, interceptor) = setup().await;
        let photo = id("https://shop.test/uploads/photo.jpg");
        fetcher.ok(photo.url().as_str(), "jpeg");

        let first = interceptor.intercept(&photo).await.unwrap();
        assert_eq!(first.route, RouteClass::CacheFirst);
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(first.response.body, b"jpeg".to_vec());
        assert!(store.get(&photo).await.unwrap().is_some());

        fetcher.respond(photo.url().as_str(), Outcome::Offline);
        let second = interceptor.intercept(&photo).await.unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.response, first.response);
        assert!(second.stored_at.is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_hit_never_fetches() {
        let (store, fetcher, interceptor) = setup().await;
        let logo = id("https://shop.test/img/logo.png");
        store.put(&logo, &StoredResponse::now(text("cached"))).await.unwrap();

        for _ in 0..3 {
            let result = interceptor.intercept(&logo).await.unwrap();
            assert_eq!(result.response.body, b"cached".to_vec());
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_offline_miss_surfaces_network_unavailable() {
        let (store, fetcher, interceptor) = setup().await;
        let photo = id("https://shop.test/uploads/new.jpg");

        let result = interceptor.intercept(&photo).await;
        assert!(matches!(result, Err(Error::NetworkUnavailable(_))));
        assert_eq!(fetcher.calls(), 1);
        assert!(store.get(&photo).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_first_origin_error_not_stored() {
        let (store, fetcher, interceptor) = setup().await;
        let photo = id("https://shop.test/uploads/gone.jpg");
        fetcher.respond(photo.url().as_str(), Outcome::Status(404));

        let result = interceptor.intercept(&photo).await;
        assert!(matches!(result, Err(Error::OriginError(ref r)) if r.status == 404));
        assert!(store.get(&photo).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_network_only_never_touches_store() {
        let (store, fetcher, interceptor) = setup().await;
        let orders = id("https://shop.test/api/orders");
        fetcher.ok(orders.url().as_str(), "[]");

        let result = interceptor.intercept(&orders).await.unwrap();
        assert_eq!(result.route, RouteClass::NetworkOnly);
        assert_eq!(result.source, ResponseSource::Network);
        assert!(store.get(&orders).await.unwrap().is_none());
        assert_eq!(store.lease_count("v1"), 0);
    }

    #[tokio::test]
    async fn test_network_only_offline_ignores_stored_entry() {
        let (store, fetcher, interceptor) = setup().await;
        let orders = id("https://shop.test/api/orders");
        store.put(&orders, &StoredResponse::now(text("stale"))).await.unwrap();
        fetcher.respond(orders.url().as_str(), Outcome::Offline);

        let result = interceptor.intercept(&orders).await;
        assert!(matches!(result, Err(Error::NetworkUnavailable(_))));
        assert_eq!(store.get(&orders).await.unwrap().unwrap().body, b"stale".to_vec());
    }

    #[tokio::test]
    async fn test_network_first_prefers_live_response() {
        let (store, fetcher, interceptor) = setup().await;
        let home = id("https://shop.test/");
        store.put(&home, &StoredResponse::now(text("stale home"))).await.unwrap();
        fetcher.ok(home.url().as_str(), "fresh home");

        let result = interceptor.intercept(&home).await.unwrap();
        assert_eq!(result.route, RouteClass::NetworkFirst);
        assert_eq!(result.source, ResponseSource::Network);
        assert_eq!(result.response.body, b"fresh home".to_vec());
        assert_eq!(store.get(&home).await.unwrap().unwrap().body, b"fresh home".to_vec());
    }

    #[tokio::test]
    async fn test_network_first_falls_back_when_offline() {
        let (store, fetcher, interceptor) = setup().await;
        let home = id("https://shop.test/");
        store.put(&home, &StoredResponse::now(text("prior home"))).await.unwrap();
        fetcher.respond(home.url().as_str(), Outcome::Offline);

        let result = interceptor.intercept(&home).await.unwrap();
        assert_eq!(result.source, ResponseSource::Offline);
        assert_eq!(result.response.body, b"prior home".to_vec());
    }

    #[tokio::test]
    async fn test_network_first_offline_miss_returns_original_error() {
        let (_store, _fetcher, interceptor) = setup().await;
        let page = id("https://shop.test/orders/new");

        let result = interceptor.intercept(&page).await;
        assert!(matches!(result, Err(Error::NetworkUnavailable(_))));
    }

    #[tokio::test]
    async fn test_network_first_origin_error_does_not_fall_back() {
        let (store, fetcher, interceptor) = setup().await;
        let home = id("https://shop.test/");
        store.put(&home, &StoredResponse::now(text("prior home"))).await.unwrap();
        fetcher.respond(home.url().as_str(), Outcome::Status(500));

        let result = interceptor.intercept(&home).await;
        assert!(matches!(result, Err(Error::OriginError(ref r)) if r.status == 500));
    }

    #[tokio::test]
    async fn test_network_first_caching_can_be_disabled() {
        let (store, fetcher, interceptor) = setup().await;
        let interceptor = interceptor.with_network_first_caching(false);
        let about = id("https://shop.test/about");
        fetcher.ok(about.url().as_str(), "about");

        interceptor.intercept(&about).await.unwrap();
        assert!(store.get(&about).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_get_requests_are_not_stored() {
        let (store, fetcher, interceptor) = setup().await;
        let upload = RequestIdentity::new("PUT", "https://shop.test/uploads/photo.jpg").unwrap();
        fetcher.ok(upload.url().as_str(), "ok");

        let result = interceptor.intercept(&upload).await.unwrap();
        assert_eq!(result.route, RouteClass::CacheFirst);
        assert!(store.get(&upload).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_without_active_generation_still_serves_network() {
        let store = Store::open(CacheDb::open_in_memory().await.unwrap()).await.unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let interceptor = Interceptor::new(store, fetcher.clone(), RoutePolicy::default());
        let photo = id("https://shop.test/uploads/photo.jpg");
        fetcher.ok(photo.url().as_str(), "jpeg");

        let result = interceptor.intercept(&photo).await.unwrap();
        assert_eq!(result.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_concurrent_cache_first_misses_both_succeed() {
        let (store, fetcher, interceptor) = setup().await;
        let interceptor = Arc::new(interceptor);
        let photo = id("https://shop.test/uploads/race.jpg");
        fetcher.ok(photo.url().as_str(), "jpeg");

        let (a, b) = tokio::join!(interceptor.intercept(&photo), interceptor.intercept(&photo));
        assert_eq!(a.unwrap().response.body, b"jpeg".to_vec());
        assert_eq!(b.unwrap().response.body, b"jpeg".to_vec());
        assert!(fetcher.calls() >= 1);
        assert_eq!(store.db().count_entries("v1").await.unwrap(), 1);
    }
}
