//! Report retrieval state machine: bounded retries with a per-attempt timeout.
//!
//! The fetcher performs no I/O. Every entry point returns the [`FetchEffect`]s
//! the caller must carry out (start or cancel a load, arm or cancel a timer,
//! probe the network) and every completion signal is tagged with the
//! [`AttemptId`] it was issued for. A signal whose id is not the live attempt,
//! or which arrives in a state that cannot accept it, is dropped.

use std::time::Duration;

use shared::{AttemptId, FetchFailure, IdentityToken};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::ClientSettings,
    locator::{derive_locator, ReportOrigin, ResourceLocator},
};

/// Retries after the first attempt.
pub const MAX_RETRIES: u32 = 2;
pub const TOTAL_ATTEMPTS: u32 = MAX_RETRIES + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            backoff: Duration::from_secs(2),
        }
    }
}

impl From<&ClientSettings> for RetryPolicy {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            attempt_timeout: settings.attempt_timeout,
            backoff: settings.retry_backoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    /// Load for attempt `n` (0-based) is in flight with its timeout armed.
    Attempting(u32),
    /// Previous attempt failed; waiting out the backoff before attempt `n`.
    RetryPending(u32),
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    AttemptTimeout,
    RetryBackoff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub id: AttemptId,
    pub token: IdentityToken,
    pub index: u32,
    pub locator: ResourceLocator,
    pub started_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEffect {
    StartLoad {
        attempt: AttemptId,
        index: u32,
        locator: ResourceLocator,
    },
    CancelLoad {
        attempt: AttemptId,
    },
    ArmTimer {
        attempt: AttemptId,
        kind: TimerKind,
        after: Duration,
    },
    CancelTimer {
        attempt: AttemptId,
    },
    /// Advisory only; the result must never change a retry decision.
    ProbeNetwork {
        attempt: AttemptId,
    },
    RetryScheduled {
        attempt: AttemptId,
        failed_index: u32,
        failure: FetchFailure,
    },
    Succeeded {
        attempt: AttemptId,
        token: IdentityToken,
        locator: ResourceLocator,
    },
    Failed {
        attempt: AttemptId,
        failure: FetchFailure,
    },
}

pub struct ReportFetcher {
    origin: ReportOrigin,
    policy: RetryPolicy,
    state: FetchState,
    current: Option<FetchAttempt>,
    next_attempt_id: u64,
    loads_issued: u64,
}

impl ReportFetcher {
    pub fn new(origin: ReportOrigin, policy: RetryPolicy) -> Self {
        Self {
            origin,
            policy,
            state: FetchState::Idle,
            current: None,
            next_attempt_id: 1,
            loads_issued: 0,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.report_origin.clone(), RetryPolicy::from(settings))
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn current_attempt(&self) -> Option<&FetchAttempt> {
        self.current.as_ref()
    }

    pub fn is_current(&self, attempt: AttemptId) -> bool {
        self.current.as_ref().is_some_and(|a| a.id == attempt)
    }

    pub fn loads_issued(&self) -> u64 {
        self.loads_issued
    }

    pub fn locator_for(&self, token: &IdentityToken) -> ResourceLocator {
        derive_locator(&self.origin, token)
    }

    /// Starts attempt 0 for `token`, discarding whatever came before.
    pub fn begin(&mut self, token: IdentityToken) -> Vec<FetchEffect> {
        let mut effects = self.release();
        effects.extend(self.start_attempt(token, 0));
        effects
    }

    pub fn on_loaded(&mut self, attempt: AttemptId) -> Vec<FetchEffect> {
        if !self.accepts_load_signal(attempt) {
            debug!(attempt = attempt.0, state = ?self.state, "report: ignoring stale load success");
            return Vec::new();
        }
        let Some(finished) = self.current.take() else {
            return Vec::new();
        };

        self.state = FetchState::Succeeded;
        info!(
            attempt = finished.id.0,
            index = finished.index,
            elapsed_ms = finished.started_at.elapsed().as_millis() as u64,
            locator = %finished.locator,
            "report: image loaded"
        );
        vec![
            FetchEffect::CancelTimer {
                attempt: finished.id,
            },
            FetchEffect::Succeeded {
                attempt: finished.id,
                token: finished.token,
                locator: finished.locator,
            },
        ]
    }

    pub fn on_load_error(&mut self, attempt: AttemptId, reason: impl Into<String>) -> Vec<FetchEffect> {
        if !self.accepts_load_signal(attempt) {
            debug!(attempt = attempt.0, state = ?self.state, "report: ignoring stale load error");
            return Vec::new();
        }

        let mut effects = vec![FetchEffect::CancelTimer { attempt }];
        effects.extend(self.handle_failure(FetchFailure::LoadFailed {
            reason: reason.into(),
        }));
        effects
    }

    /// Same policy path as [`Self::on_load_error`]; the in-flight load is
    /// abandoned so a late answer cannot be mistaken for a newer attempt's.
    pub fn on_timeout(&mut self, attempt: AttemptId) -> Vec<FetchEffect> {
        if !self.accepts_load_signal(attempt) {
            debug!(attempt = attempt.0, state = ?self.state, "report: ignoring stale timeout");
            return Vec::new();
        }

        let mut effects = vec![FetchEffect::CancelLoad { attempt }];
        effects.extend(self.handle_failure(FetchFailure::TimedOut {
            after: self.policy.attempt_timeout,
        }));
        effects
    }

    pub fn on_backoff_elapsed(&mut self, attempt: AttemptId) -> Vec<FetchEffect> {
        let FetchState::RetryPending(next_index) = self.state else {
            debug!(attempt = attempt.0, state = ?self.state, "report: ignoring backoff outside retry");
            return Vec::new();
        };
        if !self.is_current(attempt) {
            debug!(attempt = attempt.0, "report: ignoring stale backoff");
            return Vec::new();
        }
        let Some(previous) = self.current.take() else {
            return Vec::new();
        };

        self.start_attempt(previous.token, next_index)
    }

    /// Back to `Idle` from any state, cancelling whatever is outstanding.
    pub fn reset(&mut self) -> Vec<FetchEffect> {
        let effects = self.release();
        if self.state != FetchState::Idle {
            info!(from = ?self.state, "report: fetcher reset");
        }
        self.state = FetchState::Idle;
        effects
    }

    fn accepts_load_signal(&self, attempt: AttemptId) -> bool {
        matches!(self.state, FetchState::Attempting(_)) && self.is_current(attempt)
    }

    fn start_attempt(&mut self, token: IdentityToken, index: u32) -> Vec<FetchEffect> {
        let id = AttemptId(self.next_attempt_id);
        self.next_attempt_id += 1;
        self.loads_issued += 1;

        let locator = derive_locator(&self.origin, &token);
        info!(
            attempt = id.0,
            index,
            total = TOTAL_ATTEMPTS,
            locator = %locator,
            "report: attempt started"
        );

        self.state = FetchState::Attempting(index);
        self.current = Some(FetchAttempt {
            id,
            token,
            index,
            locator: locator.clone(),
            started_at: Instant::now(),
        });

        vec![
            FetchEffect::StartLoad {
                attempt: id,
                index,
                locator,
            },
            FetchEffect::ArmTimer {
                attempt: id,
                kind: TimerKind::AttemptTimeout,
                after: self.policy.attempt_timeout,
            },
        ]
    }

    fn handle_failure(&mut self, failure: FetchFailure) -> Vec<FetchEffect> {
        let Some(failed) = self.current.as_ref() else {
            return Vec::new();
        };
        let (attempt, index) = (failed.id, failed.index);

        warn!(
            attempt = attempt.0,
            index,
            total = TOTAL_ATTEMPTS,
            timeout = failure.is_timeout(),
            locator = %failed.locator,
            "report: attempt failed: {failure}"
        );

        if index < MAX_RETRIES {
            self.state = FetchState::RetryPending(index + 1);
            return vec![
                FetchEffect::ProbeNetwork { attempt },
                FetchEffect::RetryScheduled {
                    attempt,
                    failed_index: index,
                    failure,
                },
                FetchEffect::ArmTimer {
                    attempt,
                    kind: TimerKind::RetryBackoff,
                    after: self.policy.backoff,
                },
            ];
        }

        warn!(attempt = attempt.0, "report: retries exhausted");
        self.state = FetchState::Failed;
        self.current = None;
        vec![FetchEffect::Failed { attempt, failure }]
    }

    fn release(&mut self) -> Vec<FetchEffect> {
        let Some(previous) = self.current.take() else {
            return Vec::new();
        };
        match self.state {
            FetchState::Attempting(_) => vec![
                FetchEffect::CancelTimer {
                    attempt: previous.id,
                },
                FetchEffect::CancelLoad {
                    attempt: previous.id,
                },
            ],
            FetchState::RetryPending(_) => vec![FetchEffect::CancelTimer {
                attempt: previous.id,
            }],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "tests/fetcher_tests.rs"]
mod tests;
