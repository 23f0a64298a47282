//! Single-flight writer for counter mutations.
//!
//! Every `increment`/`set` is pushed onto a bounded channel together with a
//! oneshot reply. One task drains the channel in submission order and runs a
//! single backend call at a time, so two increments can never interleave.

use super::{backend::CounterBackend, CacheState, PersistenceError};
use crate::clock::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Mutation {
    Increment(i64),
    Set(i64),
}

#[derive(Debug)]
pub(super) struct Job {
    pub(super) mutation: Mutation,
    pub(super) reply: oneshot::Sender<Result<i64, PersistenceError>>,
}

pub(super) struct Writer {
    pub(super) backend: Arc<dyn CounterBackend>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ttl: chrono::Duration,
    pub(super) cache: Arc<Mutex<CacheState>>,
}

impl Writer {
    /// Spawn the writer task. It stops once every sender has been dropped.
    pub(super) fn spawn(self, jobs: mpsc::Receiver<Job>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(jobs))
    }

    async fn run(self, mut jobs: mpsc::Receiver<Job>) {
        while let Some(job) = jobs.recv().await {
            let result = self.apply(job.mutation).await;

            if job.reply.send(result).is_err() {
                debug!(mutation = ?job.mutation, "caller left before the counter mutation finished");
            }
        }

        debug!("counter writer stopped");
    }

    async fn apply(&self, mutation: Mutation) -> Result<i64, PersistenceError> {
        let result = match mutation {
            Mutation::Increment(delta) => self.backend.increment(delta).await,
            Mutation::Set(value) => self.backend.set(value).await,
        };

        match &result {
            Ok(value) => {
                let expires_at = self.clock.now() + self.ttl;
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .store_authoritative(*value, expires_at);
                debug!(?mutation, value, "counter mutation applied");
            }
            // The cache keeps its previous value so readers never see a phantom count.
            Err(err) => error!(?mutation, "counter mutation failed: {err}"),
        }

        result
    }
}
