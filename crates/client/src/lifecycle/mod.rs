//! Cache generation lifecycle.
//!
//! ```text
//! Installing ──► Waiting ──► Active ──► Superseded ──► Deleted
//! ```
//!
//! Installation fetches the whole manifest before anything is written; the
//! entries and the `Waiting` state then land in one transaction. A failed
//! fetch aborts the install and leaves the active generation alone.
//! Activation swaps the active pointer and then collects every superseded
//! generation once its in-flight readers are gone.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use offcache_core::cache::NewEntry;
use offcache_core::{AppConfig, CacheDb, Error, Generation, Manifest, RequestIdentity, Store, StoredResponse};

use crate::fetch::Fetcher;

/// Default number of concurrent manifest fetches.
const DEFAULT_INSTALL_CONCURRENCY: usize = 4;

/// Drives generations through install, activation and garbage collection.
pub struct LifecycleManager {
    store: Store,
    fetcher: Arc<dyn Fetcher>,
    manifest: Manifest,
    concurrency: usize,
    installing: Mutex<HashSet<String>>,
}

impl LifecycleManager {
    pub fn new(store: Store, fetcher: Arc<dyn Fetcher>, manifest: Manifest) -> Self {
        Self { store, fetcher, manifest, concurrency: DEFAULT_INSTALL_CONCURRENCY, installing: Mutex::default() }
    }

    pub fn from_config(store: Store, fetcher: Arc<dyn Fetcher>, config: &AppConfig) -> Result<Self, Error> {
        let manifest = Manifest::from_config(config)?;
        Ok(Self::new(store, fetcher, manifest).with_concurrency(config.install_concurrency))
    }

    /// Limit concurrent manifest fetches. Values below 1 are raised to 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Install a generation: fetch every manifest entry, then persist them all.
    ///
    /// # Errors
    ///
    /// - `ManifestInstall` if any manifest fetch fails; nothing is persisted.
    /// - `InvalidTransition` if the name is already installing, active or superseded.
    ///
    /// Dropping the returned future part-way removes whatever the install had
    /// recorded; an existing `Waiting` generation of the same name is kept.
    pub async fn install(&self, name: &str) -> Result<Generation, Error> {
        let mut guard = self.claim(name)?;
        guard.armed = true;
        if let Err(e) = self.store.db().begin_install(name).await {
            guard.armed = false;
            return Err(e);
        }
        tracing::info!(generation = name, assets = self.manifest.len(), "installing generation");

        let entries = match self.fetch_manifest(name).await {
            Ok(entries) => entries,
            Err(e) => {
                self.abort(name).await;
                guard.armed = false;
                return Err(e);
            }
        };

        let committed = self.store.db().commit_install(name, entries).await;
        if let Err(e) = committed {
            self.abort(name).await;
            guard.armed = false;
            return Err(Error::ManifestInstall { generation: name.to_string(), reason: e.to_string() });
        }
        guard.armed = false;
        drop(guard);

        tracing::info!(generation = name, "generation installed, waiting for activation");
        self.store
            .db()
            .get_generation(name)
            .await?
            .ok_or_else(|| Error::GenerationNotFound(name.to_string()))
    }

    /// Mark `name` as being installed by this manager.
    fn claim(&self, name: &str) -> Result<InstallGuard<'_>, Error> {
        let mut installing = self.installing.lock().unwrap_or_else(PoisonError::into_inner);
        if !installing.insert(name.to_string()) {
            return Err(Error::InvalidTransition(format!("cannot install generation {name}: it is installing")));
        }
        Ok(InstallGuard {
            db: self.store.db().clone(),
            name: name.to_string(),
            installing: &self.installing,
            armed: false,
        })
    }

    async fn abort(&self, name: &str) {
        if let Err(e) = self.store.db().abort_install(name).await {
            tracing::warn!(generation = name, error = %e, "failed to remove aborted install");
        }
    }

    async fn fetch_manifest(&self, name: &str) -> Result<Vec<NewEntry>, Error> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for identity in self.manifest.entries().iter().cloned() {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();

            join_set.spawn(async move {
                // Hold permit for task duration to enforce concurrency limit
                let _permit = semaphore.acquire_owned().await;
                let result = fetcher.fetch(&identity).await;
                (identity, result)
            });
        }

        let mut entries = Vec::with_capacity(self.manifest.len());
        while let Some(joined) = join_set.join_next().await {
            let (identity, result) = joined.map_err(|e| install_error(name, format!("fetch task failed: {e}")))?;
            let response = result.map_err(|e| {
                tracing::warn!(generation = name, %identity, error = %e, "manifest fetch failed");
                install_error(name, format!("{identity}: {e}"))
            })?;
            entries.push(new_entry(name, &identity, StoredResponse::now(response))?);
        }

        Ok(entries)
    }

    /// Activate a waiting generation, then collect superseded ones.
    ///
    /// Returns the name of the generation that was superseded, if any.
    pub async fn activate(&self, name: &str) -> Result<Option<String>, Error> {
        let previous = self.store.activate(name).await?;
        self.collect_superseded().await?;
        Ok(previous)
    }

    /// Install and immediately activate.
    pub async fn install_and_activate(&self, name: &str) -> Result<Option<String>, Error> {
        self.install(name).await?;
        self.activate(name).await
    }

    /// Delete every superseded generation once its leases drain.
    ///
    /// Returns the names that were deleted.
    pub async fn collect_superseded(&self) -> Result<Vec<String>, Error> {
        let superseded = self.store.db().superseded_generations().await?;
        for name in &superseded {
            self.store.delete_generation(name).await?;
        }
        Ok(superseded)
    }

    /// Startup housekeeping: drop half-finished installs and finish any
    /// garbage collection interrupted by a restart.
    pub async fn recover(&self) -> Result<(), Error> {
        let stale = self.store.db().remove_stale_installs().await?;
        if stale > 0 {
            tracing::warn!(stale, "removed generations left installing by a previous run");
        }
        let collected = self.collect_superseded().await?;
        if !collected.is_empty() {
            tracing::info!(?collected, "collected superseded generations");
        }
        Ok(())
    }

    /// All generations with their states and entry counts.
    pub async fn generations(&self) -> Result<Vec<Generation>, Error> {
        self.store.generations().await
    }
}

/// Releases an install claim. If the install future is dropped while armed,
/// the half-made generation is removed in the background.
struct InstallGuard<'a> {
    db: CacheDb,
    name: String,
    installing: &'a Mutex<HashSet<String>>,
    armed: bool,
}

impl Drop for InstallGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            tracing::warn!(generation = %self.name, "install cancelled; removing partial generation");
            let db = self.db.clone();
            let name = self.name.clone();
            handle.spawn(async move {
                if let Err(e) = db.abort_install(&name).await {
                    tracing::warn!(generation = %name, error = %e, "failed to remove cancelled install");
                }
            });
        }
        self.installing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

fn install_error(name: &str, reason: String) -> Error {
    Error::ManifestInstall { generation: name.to_string(), reason }
}

fn new_entry(name: &str, identity: &RequestIdentity, stored: StoredResponse) -> Result<NewEntry, Error> {
    NewEntry::new(identity, &stored).map_err(|e| install_error(name, e.to_string()))
}
