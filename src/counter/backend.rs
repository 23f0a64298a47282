//! Persistence collaborator for the brick counter.

use super::PersistenceError;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type BackendFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, PersistenceError>> + Send + 'a>>;

/// Durable owner of the counter.
///
/// `increment` must be atomic on its own: the in-process writer queue
/// serializes this instance, but nothing stops another process from writing.
pub trait CounterBackend: Send + Sync {
    fn read(&self) -> BackendFuture<'_, i64>;
    fn increment(&self, delta: i64) -> BackendFuture<'_, i64>;
    fn set(&self, value: i64) -> BackendFuture<'_, i64>;
    fn append_log_entry(&self, logged_at: DateTime<Utc>, count: i64) -> BackendFuture<'_, ()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub logged_at: DateTime<Utc>,
    pub count: i64,
}

/// Snapshots kept by [`MemoryCounterBackend`]; older ones are dropped.
pub const MEMORY_LOG_CAPACITY: usize = 1024;

/// Counter kept in process memory. Used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryCounterBackend {
    count: Mutex<i64>,
    log: Mutex<VecDeque<LogEntry>>,
}

impl MemoryCounterBackend {
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self {
            count: Mutex::new(initial),
            log: Mutex::new(VecDeque::new()),
        }
    }

    fn count(&self) -> MutexGuard<'_, i64> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

impl CounterBackend for MemoryCounterBackend {
    fn read(&self) -> BackendFuture<'_, i64> {
        Box::pin(async move { Ok(*self.count()) })
    }

    fn increment(&self, delta: i64) -> BackendFuture<'_, i64> {
        Box::pin(async move {
            let mut count = self.count();
            *count = count.saturating_add(delta);
            Ok(*count)
        })
    }

    fn set(&self, value: i64) -> BackendFuture<'_, i64> {
        Box::pin(async move {
            let mut count = self.count();
            *count = value;
            Ok(*count)
        })
    }

    fn append_log_entry(&self, logged_at: DateTime<Utc>, count: i64) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
            if log.len() >= MEMORY_LOG_CAPACITY {
                log.pop_front();
            }
            log.push_back(LogEntry { logged_at, count });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_tracks_count_and_log() -> Result<(), PersistenceError> {
        let backend = MemoryCounterBackend::new(5);
        assert_eq!(backend.read().await?, 5);
        assert_eq!(backend.increment(3).await?, 8);
        assert_eq!(backend.set(2).await?, 2);
        assert_eq!(backend.read().await?, 2);

        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        backend.append_log_entry(at, 2).await?;
        assert_eq!(
            backend.log_entries(),
            vec![LogEntry {
                logged_at: at,
                count: 2
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn memory_log_keeps_only_recent_entries() -> Result<(), PersistenceError> {
        let backend = MemoryCounterBackend::new(0);
        let start = 1_700_000_000;

        for i in 0..MEMORY_LOG_CAPACITY + 10 {
            let at = DateTime::from_timestamp(start + i as i64, 0).unwrap_or_default();
            backend.append_log_entry(at, i as i64).await?;
        }

        let entries = backend.log_entries();
        assert_eq!(entries.len(), MEMORY_LOG_CAPACITY);
        assert_eq!(entries.first().map(|e| e.count), Some(10));
        assert_eq!(
            entries.last().map(|e| e.count),
            Some((MEMORY_LOG_CAPACITY + 9) as i64)
        );
        Ok(())
    }
}
