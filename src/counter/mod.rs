//! The shared brick counter.
//!
//! `CounterStore` sits in front of a [`CounterBackend`]:
//! - reads are served from a TTL cache and refreshed from the backend at most
//!   once at a time; when the backend is down the last known value is returned;
//! - mutations go through a single writer task (see [`writer`]) and refresh the
//!   cache with the value the backend returns.

pub mod backend;
pub mod postgres;
mod writer;

pub use self::backend::{BackendFuture, CounterBackend, LogEntry, MemoryCounterBackend};
pub use self::postgres::PgCounterBackend;

use self::writer::{Job, Mutation, Writer};
use crate::clock::{to_delta, Clock};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info_span, warn, Instrument};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("counter query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("counter writer has stopped")]
    WriterClosed,
    #[error("invalid counter value: {0}")]
    InvalidValue(i64),
}

#[derive(Clone, Copy, Debug)]
pub struct CounterConfig {
    cache_ttl: Duration,
    queue_capacity: usize,
}

impl CounterConfig {
    /// Default: 60s read cache, 1024 queued mutations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.cache_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Clamp the queue capacity to `1..=MAX_QUEUE_CAPACITY`.
    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            cache_ttl: self.cache_ttl,
            queue_capacity: self.queue_capacity.clamp(1, MAX_QUEUE_CAPACITY),
        }
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Cached counter value. `generation` moves on every applied mutation so a
/// refresh that started earlier cannot overwrite a newer value.
#[derive(Debug, Default)]
pub(crate) struct CacheState {
    value: i64,
    expires_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl CacheState {
    fn fresh(&self, now: DateTime<Utc>) -> Option<i64> {
        match self.expires_at {
            Some(expires_at) if now < expires_at => Some(self.value),
            _ => None,
        }
    }

    pub(crate) fn store_authoritative(&mut self, value: i64, expires_at: DateTime<Utc>) {
        self.value = value;
        self.expires_at = Some(expires_at);
        self.generation = self.generation.wrapping_add(1);
    }

    fn store_refresh(&mut self, generation: u64, value: i64, expires_at: DateTime<Utc>) {
        if self.generation == generation {
            self.value = value;
            self.expires_at = Some(expires_at);
        }
    }
}

pub struct CounterStore {
    backend: Arc<dyn CounterBackend>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    cache: Arc<Mutex<CacheState>>,
    refresh: tokio::sync::Mutex<()>,
    jobs: mpsc::Sender<Job>,
}

impl CounterStore {
    /// Build the store and start its writer task. Must run inside a Tokio runtime.
    #[must_use]
    pub fn spawn(
        backend: Arc<dyn CounterBackend>,
        config: CounterConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.normalize();
        let ttl = to_delta(config.cache_ttl());
        let cache = Arc::new(Mutex::new(CacheState::default()));
        let (jobs, receiver) = mpsc::channel(config.queue_capacity());

        Writer {
            backend: backend.clone(),
            clock: clock.clone(),
            ttl,
            cache: cache.clone(),
        }
        .spawn(receiver);

        Self {
            backend,
            clock,
            ttl,
            cache,
            refresh: tokio::sync::Mutex::new(()),
            jobs,
        }
    }

    fn cache(&self) -> MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last value seen from the backend, fresh or not. Zero before the first load.
    #[must_use]
    pub fn last_known(&self) -> i64 {
        self.cache().value
    }

    /// Current counter value. Never fails.
    ///
    /// Within the TTL the cached value is returned. After it, one caller refreshes
    /// from the backend while concurrent callers get the cached value. A failed
    /// refresh falls back to the last known value.
    pub async fn read(&self) -> i64 {
        if let Some(value) = self.cache().fresh(self.clock.now()) {
            return value;
        }

        let Ok(_refreshing) = self.refresh.try_lock() else {
            debug!("counter refresh in flight, serving last known value");
            return self.last_known();
        };

        // Another caller may have finished a refresh while we were checking.
        if let Some(value) = self.cache().fresh(self.clock.now()) {
            return value;
        }

        let generation = self.cache().generation;
        let span = info_span!("counter.refresh");

        match self.backend.read().instrument(span).await {
            Ok(value) => {
                let expires_at = self.clock.now() + self.ttl;
                let mut cache = self.cache();
                cache.store_refresh(generation, value, expires_at);
                cache.value
            }
            Err(err) => {
                warn!("counter refresh failed, serving last known value: {err}");
                self.last_known()
            }
        }
    }

    /// Add `delta` bricks and return the new authoritative count.
    ///
    /// # Errors
    /// Returns `PersistenceError` if `delta` is not positive or the backend fails.
    pub async fn increment(&self, delta: i64) -> Result<i64, PersistenceError> {
        if delta <= 0 {
            return Err(PersistenceError::InvalidValue(delta));
        }
        self.submit(Mutation::Increment(delta)).await
    }

    /// Overwrite the count.
    ///
    /// # Errors
    /// Returns `PersistenceError` if `value` is negative or the backend fails.
    pub async fn set(&self, value: i64) -> Result<i64, PersistenceError> {
        if value < 0 {
            return Err(PersistenceError::InvalidValue(value));
        }
        self.submit(Mutation::Set(value)).await
    }

    async fn submit(&self, mutation: Mutation) -> Result<i64, PersistenceError> {
        let (reply, response) = oneshot::channel();

        self.jobs
            .send(Job { mutation, reply })
            .await
            .map_err(|_| PersistenceError::WriterClosed)?;

        response.await.map_err(|_| PersistenceError::WriterClosed)?
    }

    /// Append the current count to the backend log.
    ///
    /// # Errors
    /// Returns `PersistenceError` if the backend rejects the log entry.
    pub async fn snapshot(&self) -> Result<i64, PersistenceError> {
        let count = self.read().await;
        self.backend
            .append_log_entry(self.clock.now(), count)
            .await?;
        Ok(count)
    }
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterStore")
            .field("ttl", &self.ttl)
            .field("cache", &*self.cache())
            .finish_non_exhaustive()
    }
}
