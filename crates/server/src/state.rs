//! Shared server state: one interceptor and one lifecycle manager over a
//! single store.

use std::sync::Arc;

use url::Url;

use offcache_client::{FetchClient, FetchConfig, Fetcher, Interceptor, LifecycleManager};
use offcache_core::{AppConfig, CacheDb, Error, RequestIdentity, Store};

pub struct AppState {
    pub config: AppConfig,
    pub origin: Option<Url>,
    pub store: Store,
    pub interceptor: Interceptor,
    pub lifecycle: LifecycleManager,
}

impl AppState {
    /// Open the configured database and wire the reqwest fetcher.
    pub async fn open(config: AppConfig) -> Result<Self, Error> {
        let db = CacheDb::open(&config.db_path).await?;
        let store = Store::open(db).await?;
        let fetcher: Arc<dyn Fetcher> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
        Self::build(config, store, fetcher)
    }

    pub fn build(config: AppConfig, store: Store, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let origin = config
            .origin_url()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let interceptor = Interceptor::from_config(store.clone(), fetcher.clone(), &config);
        let lifecycle = LifecycleManager::from_config(store.clone(), fetcher, &config)?;
        Ok(Self { config, origin, store, interceptor, lifecycle })
    }

    /// Resolve a tool-supplied URL into a request identity.
    pub fn identity(&self, method: &str, url: &str) -> Result<RequestIdentity, Error> {
        RequestIdentity::resolve(method, url, self.origin.as_ref())
    }

    /// Startup sequence.
    ///
    /// Cleans up after an unclean shutdown, then installs the configured
    /// generation unless it is already active. A failed install is logged and
    /// the previously active generation keeps serving.
    pub async fn bootstrap(&self) -> Result<(), Error> {
        self.lifecycle.recover().await?;

        let target = self.config.generation.as_str();
        if self.store.active_generation().await.as_deref() == Some(target) {
            tracing::info!(generation = target, "configured generation already active");
            return Ok(());
        }

        match self.lifecycle.install(target).await {
            Ok(_) if self.config.auto_activate => {
                self.lifecycle.activate(target).await?;
            }
            Ok(_) => {
                tracing::info!(generation = target, "installed; waiting for generation_activate");
            }
            Err(e) => {
                tracing::warn!(generation = target, error = %e, "install failed; keeping current generation");
            }
        }
        Ok(())
    }
}
