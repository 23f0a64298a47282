//! Per-client failure tracking and temporary blocks.
//!
//! Flow Overview:
//! 1) Every wrong code appends a timestamp to the client's failure record.
//! 2) Attempts older than the failure window are pruned before counting.
//! 3) When the surviving count reaches `max_failed_attempts` the client is
//!    blocked until `blocked_at + block_duration`.
//! 4) A correct code clears the failure record but never lifts a block.
//! 5) Once a block elapses the attempts that led to it are forgotten.
//!
//! State is per process and lives in memory only; `purge_expired` keeps it
//! bounded by the number of recently active clients.

use crate::clock::{to_delta, Clock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use utoipa::ToSchema;

const DEFAULT_MAX_FAILED_ATTEMPTS: usize = 3;
const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(3 * 60);
const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug)]
pub struct GuardConfig {
    max_failed_attempts: usize,
    failure_window: Duration,
    block_duration: Duration,
}

impl GuardConfig {
    /// Default guard: 3 failures within 3 minutes block a client for 1 minute.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            failure_window: DEFAULT_FAILURE_WINDOW,
            block_duration: DEFAULT_BLOCK_DURATION,
        }
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: usize) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_failure_window_minutes(mut self, minutes: u64) -> Self {
        self.failure_window = Duration::from_secs(minutes.saturating_mul(60));
        self
    }

    #[must_use]
    pub fn with_block_duration_minutes(mut self, minutes: u64) -> Self {
        self.block_duration = Duration::from_secs(minutes.saturating_mul(60));
        self
    }

    #[must_use]
    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    #[must_use]
    pub fn with_block_duration(mut self, duration: Duration) -> Self {
        self.block_duration = duration;
        self
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> usize {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn failure_window(&self) -> Duration {
        self.failure_window
    }

    #[must_use]
    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }

    /// Clamp values that would make the guard meaningless.
    #[must_use]
    pub fn normalize(self) -> Self {
        Self {
            max_failed_attempts: self.max_failed_attempts.max(1),
            ..self
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub blocked_at: DateTime<Utc>,
    pub unblock_at: DateTime<Utc>,
}

/// Result of recording a wrong code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    Flagged { attempts: usize },
    Blocked { unblock_at: DateTime<Utc> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct BlockedClient {
    pub client_id: String,
    pub blocked_at: DateTime<Utc>,
    pub unblock_at: DateTime<Utc>,
    pub remaining_seconds: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct PendingFailures {
    pub client_id: String,
    pub attempts: usize,
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub pruned_attempts: usize,
    pub removed_failure_records: usize,
    pub removed_blocks: usize,
}

#[derive(Debug, Default)]
struct GuardState {
    failures: HashMap<String, Vec<DateTime<Utc>>>,
    blocks: HashMap<String, BlockRecord>,
}

impl GuardState {
    /// Remove the block of `client_id` if it has elapsed, together with every
    /// attempt made before it ended, so the client starts clean.
    ///
    /// Returns the number of attempts forgotten, or `None` when there was no
    /// elapsed block.
    fn lift_elapsed_block(&mut self, client_id: &str, now: DateTime<Utc>) -> Option<usize> {
        let block = self
            .blocks
            .get(client_id)
            .copied()
            .filter(|block| now >= block.unblock_at)?;
        self.blocks.remove(client_id);

        let Some(attempts) = self.failures.get_mut(client_id) else {
            return Some(0);
        };
        let before = attempts.len();
        attempts.retain(|attempt| *attempt >= block.unblock_at);
        Some(before - attempts.len())
    }
}

#[derive(Debug)]
pub struct AttemptGuard {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<GuardState>,
}

impl AttemptGuard {
    #[must_use]
    pub fn new(config: GuardConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: config.normalize(),
            clock,
            state: Mutex::new(GuardState::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `client_id` is currently blocked. An elapsed block is removed here.
    pub fn is_blocked(&self, client_id: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state();

        if let Some(forgotten) = state.lift_elapsed_block(client_id, now) {
            debug!(client_id, forgotten, "block elapsed");
            return false;
        }

        state.blocks.contains_key(client_id)
    }

    /// Record a wrong code for `client_id`.
    ///
    /// A block that is already active keeps its original expiry.
    pub fn record_failure(&self, client_id: &str) -> FailureOutcome {
        let now = self.clock.now();
        let cutoff = now - to_delta(self.config.failure_window);
        let mut state = self.state();

        if let Some(forgotten) = state.lift_elapsed_block(client_id, now) {
            debug!(client_id, forgotten, "block elapsed");
        }

        let attempts = state.failures.entry(client_id.to_string()).or_default();
        attempts.retain(|attempt| *attempt > cutoff);
        attempts.push(now);
        let count = attempts.len();

        if let Some(block) = state.blocks.get(client_id) {
            if now < block.unblock_at {
                return FailureOutcome::Blocked {
                    unblock_at: block.unblock_at,
                };
            }
        }

        if count >= self.config.max_failed_attempts {
            let unblock_at = now + to_delta(self.config.block_duration);
            state.blocks.insert(
                client_id.to_string(),
                BlockRecord {
                    blocked_at: now,
                    unblock_at,
                },
            );
            info!(client_id, attempts = count, %unblock_at, "client blocked");
            return FailureOutcome::Blocked { unblock_at };
        }

        debug!(client_id, attempts = count, "failed attempt recorded");
        FailureOutcome::Flagged { attempts: count }
    }

    /// Forget the failure history of `client_id`. Active blocks are left alone.
    pub fn record_success(&self, client_id: &str) {
        if self.state().failures.remove(client_id).is_some() {
            debug!(client_id, "failure record cleared after success");
        }
    }

    /// Maintenance sweep: prune stale attempts, drop empty records and elapsed blocks.
    pub fn purge_expired(&self) -> PurgeReport {
        let now = self.clock.now();
        let cutoff = now - to_delta(self.config.failure_window);
        let mut state = self.state();
        let mut report = PurgeReport::default();

        let elapsed: Vec<String> = state
            .blocks
            .iter()
            .filter(|(_, block)| now >= block.unblock_at)
            .map(|(client_id, _)| client_id.clone())
            .collect();
        for client_id in &elapsed {
            if let Some(forgotten) = state.lift_elapsed_block(client_id, now) {
                report.pruned_attempts += forgotten;
                report.removed_blocks += 1;
            }
        }

        state.failures.retain(|_, attempts| {
            let before = attempts.len();
            attempts.retain(|attempt| *attempt > cutoff);
            report.pruned_attempts += before - attempts.len();
            if attempts.is_empty() {
                report.removed_failure_records += 1;
                false
            } else {
                true
            }
        });

        report
    }

    /// Clients with an active block, soonest expiry first.
    #[must_use]
    pub fn blocked_clients(&self) -> Vec<BlockedClient> {
        let now = self.clock.now();
        let state = self.state();

        let mut clients: Vec<BlockedClient> = state
            .blocks
            .iter()
            .filter(|(_, block)| now < block.unblock_at)
            .map(|(client_id, block)| BlockedClient {
                client_id: client_id.clone(),
                blocked_at: block.blocked_at,
                unblock_at: block.unblock_at,
                remaining_seconds: (block.unblock_at - now).num_seconds(),
            })
            .collect();
        clients.sort_by(|a, b| {
            a.unblock_at
                .cmp(&b.unblock_at)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });

        clients
    }

    /// Clients with failures still inside the window, most attempts first.
    #[must_use]
    pub fn pending_failures(&self) -> Vec<PendingFailures> {
        let cutoff = self.clock.now() - to_delta(self.config.failure_window);
        let state = self.state();

        let mut pending: Vec<PendingFailures> = state
            .failures
            .iter()
            .filter_map(|(client_id, attempts)| {
                let live: Vec<&DateTime<Utc>> =
                    attempts.iter().filter(|attempt| **attempt > cutoff).collect();
                let oldest = **live.first()?;
                let newest = **live.last()?;
                Some(PendingFailures {
                    client_id: client_id.clone(),
                    attempts: live.len(),
                    oldest,
                    newest,
                })
            })
            .collect();
        pending.sort_by(|a, b| {
            b.attempts
                .cmp(&a.attempts)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });

        pending
    }

    /// Lift a block by hand. Returns `true` if one existed.
    pub fn clear_block(&self, client_id: &str) -> bool {
        let removed = self.state().blocks.remove(client_id).is_some();
        if removed {
            info!(client_id, "block cleared by administrator");
        }
        removed
    }

    /// Drop a failure record by hand. Returns `true` if one existed.
    pub fn clear_failures(&self, client_id: &str) -> bool {
        let removed = self.state().failures.remove(client_id).is_some();
        if removed {
            info!(client_id, "failure record cleared by administrator");
        }
        removed
    }
}
