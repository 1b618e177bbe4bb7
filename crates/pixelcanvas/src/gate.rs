//! # Rate Gatekeeper
//!
//! Decides whether a user may draw again, based on the `lastUpdated`
//! timestamp of their user record.
//!
//! The read and the decision are not atomic with the write that later bumps
//! `lastUpdated`: two concurrent requests from one user inside the cooldown
//! can both be accepted. The store offers no conditional write here, so the
//! race is accepted rather than papered over with a process-local lock.

use crate::{Document, DocumentStore, Error, Result, TimeSource};
use chrono::{DateTime, Utc};
use core::time::Duration;

/// Field of the user record holding the time of the last accepted draw.
pub const LAST_UPDATED_FIELD: &str = "lastUpdated";

/// Why a request was let through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptReason {
    /// The user has no record yet.
    FirstTimeUser,
    /// The record exists but `lastUpdated` is missing or not a timestamp.
    UnreadableTimestamp,
    /// The cooldown has elapsed since the last accepted draw.
    CooldownElapsed,
}

/// Outcome of a gate check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Accept(AcceptReason),
    Reject { retry_after: Duration },
}

impl GateDecision {
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept(_))
    }

    /// Turns a rejection into [`Error::RateLimited`].
    pub fn into_result(self) -> Result<AcceptReason> {
        match self {
            Self::Accept(reason) => Ok(reason),
            Self::Reject { retry_after } => Err(Error::RateLimited { retry_after }),
        }
    }
}

/// Per-user cooldown check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateGate {
    cooldown: Duration,
}

impl RateGate {
    pub const fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decides on a request given the user's record as of `now`.
    ///
    /// A `lastUpdated` in the future counts as "just drew" and is rejected.
    pub fn check(&self, record: Option<&Document>, now: DateTime<Utc>) -> GateDecision {
        let Some(record) = record else {
            return GateDecision::Accept(AcceptReason::FirstTimeUser);
        };
        let last = match record.get(LAST_UPDATED_FIELD) {
            Some(value) => match value.as_timestamp() {
                Some(ts) => ts,
                None => {
                    tracing::warn!(
                        user = %record.name,
                        kind = value.kind(),
                        "Unexpected type for lastUpdated, allowing request"
                    );
                    return GateDecision::Accept(AcceptReason::UnreadableTimestamp);
                }
            },
            None => {
                tracing::warn!(
                    user = %record.name,
                    "User record has no lastUpdated, allowing request"
                );
                return GateDecision::Accept(AcceptReason::UnreadableTimestamp);
            }
        };

        // Negative elapsed time (clock skew) is below any cooldown.
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if now < last || elapsed < self.cooldown {
            let retry_after = self.cooldown.saturating_sub(elapsed);
            return GateDecision::Reject { retry_after };
        }
        GateDecision::Accept(AcceptReason::CooldownElapsed)
    }

    /// Reads `collection/user` and checks it against the clock.
    pub async fn admit(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
        user: &str,
        clock: &dyn TimeSource,
    ) -> Result<GateDecision> {
        let record = store.get(collection, user).await?;
        if record.is_none() {
            tracing::info!(user, "User record not found, allowing request");
        }
        let decision = self.check(record.as_ref(), clock.now());
        if let GateDecision::Reject { retry_after } = decision {
            tracing::info!(
                user,
                ?retry_after,
                cooldown = ?self.cooldown,
                "Rate limit exceeded"
            );
        }
        Ok(decision)
    }
}
