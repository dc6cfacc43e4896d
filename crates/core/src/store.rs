//! Generation-aware response store.
//!
//! [`Store`] keeps the active-generation pointer in memory next to the SQLite
//! database. Requests pin the generation they read from with a
//! [`GenerationLease`]; a superseded generation is only deleted once every
//! lease on it has been dropped.
//!
//! Leases are taken under the pointer's read lock and the pointer is swapped
//! under its write lock, so a request sees either the old generation or the
//! new one, never a mix.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Notify, RwLock};

use crate::Error;
use crate::cache::entries::NewEntry;
use crate::cache::hash::identity_key;
use crate::cache::{CacheDb, Generation};
use crate::request::RequestIdentity;
use crate::response::StoredResponse;

#[derive(Debug, Default)]
struct Leases {
    counts: Mutex<HashMap<String, usize>>,
    released: Notify,
}

impl Leases {
    fn acquire(&self, generation: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(generation.to_string()).or_insert(0) += 1;
    }

    fn release(&self, generation: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(generation) {
            *count -= 1;
            if *count == 0 {
                counts.remove(generation);
            }
        }
        drop(counts);
        self.released.notify_waiters();
    }

    fn count(&self, generation: &str) -> usize {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(generation).copied().unwrap_or(0)
    }

    async fn drained(&self, generation: &str) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count(generation) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug)]
struct Inner {
    db: CacheDb,
    active: RwLock<Option<String>>,
    leases: Leases,
}

/// Handle to the persistent store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Wrap an opened database, loading the active pointer from it.
    pub async fn open(db: CacheDb) -> Result<Self, Error> {
        let active = db.active_generation().await?;
        tracing::debug!(active = ?active, "store opened");
        Ok(Self { inner: Arc::new(Inner { db, active: RwLock::new(active), leases: Leases::default() }) })
    }

    /// Underlying database, for lifecycle bookkeeping.
    pub fn db(&self) -> &CacheDb {
        &self.inner.db
    }

    /// Name of the generation currently serving lookups.
    pub async fn active_generation(&self) -> Option<String> {
        self.inner.active.read().await.clone()
    }

    /// Pin the active generation for the duration of one request.
    ///
    /// Returns None when no generation has been activated yet.
    pub async fn lease(&self) -> Option<GenerationLease> {
        let active = self.inner.active.read().await;
        let generation = active.clone()?;
        self.inner.leases.acquire(&generation);
        Some(GenerationLease { store: self.clone(), generation })
    }

    /// Number of outstanding leases on a generation.
    pub fn lease_count(&self, generation: &str) -> usize {
        self.inner.leases.count(generation)
    }

    /// Look up a stored response in the active generation.
    pub async fn get(&self, identity: &RequestIdentity) -> Result<Option<StoredResponse>, Error> {
        match self.lease().await {
            Some(lease) => lease.get(identity).await,
            None => Ok(None),
        }
    }

    /// Upsert a response into the active generation.
    pub async fn put(&self, identity: &RequestIdentity, response: &StoredResponse) -> Result<(), Error> {
        match self.lease().await {
            Some(lease) => lease.put(identity, response).await,
            None => Err(Error::StoreWrite("no active generation".into())),
        }
    }

    /// Activate a waiting generation and swap the in-memory pointer.
    ///
    /// Returns the generation that was superseded, if any.
    pub async fn activate(&self, generation: &str) -> Result<Option<String>, Error> {
        let mut active = self.inner.active.write().await;
        let previous = self.inner.db.activate_generation(generation).await?;
        *active = Some(generation.to_string());
        tracing::info!(generation, previous = ?previous, "generation activated");
        Ok(previous)
    }

    /// Remove every entry of a non-active generation and mark it deleted.
    ///
    /// Waits for outstanding leases on the generation to be released first.
    pub async fn delete_generation(&self, generation: &str) -> Result<u64, Error> {
        if self.active_generation().await.as_deref() == Some(generation) {
            return Err(Error::InvalidTransition(format!("cannot delete generation {generation}: it is active")));
        }
        self.inner.leases.drained(generation).await;
        let removed = self.inner.db.delete_generation(generation).await?;
        tracing::info!(generation, removed, "generation deleted");
        Ok(removed)
    }

    /// All known generations with their states.
    pub async fn generations(&self) -> Result<Vec<Generation>, Error> {
        self.inner.db.list_generations().await
    }
}

/// A pinned reference to one generation.
///
/// Every read and write made through the lease targets the same generation,
/// even if another one is activated meanwhile.
#[derive(Debug)]
pub struct GenerationLease {
    store: Store,
    generation: String,
}

impl GenerationLease {
    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub async fn get(&self, identity: &RequestIdentity) -> Result<Option<StoredResponse>, Error> {
        self.store
            .inner
            .db
            .get_entry(&self.generation, &identity_key(identity))
            .await
    }

    pub async fn put(&self, identity: &RequestIdentity, response: &StoredResponse) -> Result<(), Error> {
        let entry = NewEntry::new(identity, response)?;
        self.store.inner.db.put_entry(&self.generation, entry).await
    }
}

impl Drop for GenerationLease {
    fn drop(&mut self) {
        self.store.inner.leases.release(&self.generation);
    }
}
