//! Request orchestration: attempt guard, OTP check, then the counter.

use crate::{
    clock::Clock,
    counter::{CounterStore, PersistenceError},
    guard::{AttemptGuard, FailureOutcome},
    otp::OtpEngine,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const MIN_DELTA: i64 = 1;
pub const MAX_DELTA: i64 = 3;

/// Why a placement was refused. Every variant is an ordinary outcome.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("requested delta {0} is outside 1..=3")]
    InvalidDelta(i64),
    #[error("client is blocked")]
    Blocked,
    #[error("invalid one-time code")]
    InvalidCode,
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug)]
pub struct BrickService {
    otp: OtpEngine,
    guard: AttemptGuard,
    counter: CounterStore,
    clock: Arc<dyn Clock>,
}

impl BrickService {
    #[must_use]
    pub fn new(
        otp: OtpEngine,
        guard: AttemptGuard,
        counter: CounterStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            otp,
            guard,
            counter,
            clock,
        }
    }

    /// Place `delta` bricks if `claimed` is a valid code for `client_id`.
    ///
    /// The delta is checked first and a blocked client is refused before the
    /// code is looked at; neither counts as an attempt. Persistence failures
    /// after a valid code are not held against the client either.
    ///
    /// # Errors
    /// Returns a [`Rejection`] describing why nothing was placed.
    #[instrument(skip(self, claimed))]
    pub async fn place_bricks(
        &self,
        client_id: &str,
        delta: i64,
        claimed: &str,
    ) -> Result<i64, Rejection> {
        if !(MIN_DELTA..=MAX_DELTA).contains(&delta) {
            return Err(Rejection::InvalidDelta(delta));
        }

        if self.guard.is_blocked(client_id) {
            return Err(Rejection::Blocked);
        }

        if !self.otp.validate(claimed, self.clock.now()) {
            match self.guard.record_failure(client_id) {
                FailureOutcome::Flagged { attempts } => {
                    warn!(attempts, "invalid code");
                }
                FailureOutcome::Blocked { unblock_at } => {
                    warn!(%unblock_at, "invalid code, client blocked");
                }
            }
            return Err(Rejection::InvalidCode);
        }

        self.guard.record_success(client_id);

        let count = self.counter.increment(delta).await?;
        info!(count, "bricks placed");

        Ok(count)
    }

    pub async fn get_counter(&self) -> i64 {
        self.counter.read().await
    }

    #[must_use]
    pub fn server_time_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    #[must_use]
    pub fn otp(&self) -> &OtpEngine {
        &self.otp
    }

    #[must_use]
    pub fn guard(&self) -> &AttemptGuard {
        &self.guard
    }

    #[must_use]
    pub fn counter(&self) -> &CounterStore {
        &self.counter
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
