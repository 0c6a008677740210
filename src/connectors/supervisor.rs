//! Reconnect supervision
//!
//! The retry/backoff behavior of a connector is an explicit state machine
//! with named states and transition triggers, kept free of network I/O so
//! it is testable on its own. Connectors report successes and failures;
//! the supervisor decides whether to retry (and after how long) or give up,
//! publishing each transition through the connector's state channel.

use std::time::Duration;

use tokio::sync::watch;

use super::backoff::{delay_for_attempt, RetryPolicy};
use super::ConnectionState;

/// Classification of a connection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network blip, rate limit, momentary 5xx — retried within the
    /// transient budget
    Transient,
    /// Expired/invalid credential — retried within the (smaller) auth budget
    Auth,
}

/// What the connector should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait out the backoff, then reconnect
    RetryAfter(Duration),
    /// Retry budget exhausted; the connector is terminal
    GiveUp,
}

/// Per-connector retry state machine
#[derive(Debug)]
pub struct Supervisor {
    policy: RetryPolicy,
    consecutive_failures: u32,
    auth_failures: u32,
    state: watch::Sender<ConnectionState>,
}

impl Supervisor {
    /// Create a supervisor publishing to the given state channel
    #[must_use]
    pub fn new(policy: RetryPolicy, state: watch::Sender<ConnectionState>) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
            auth_failures: 0,
            state,
        }
    }

    /// Mark a connect/handshake attempt as started
    pub fn connecting(&self) {
        let _ = self.state.send(ConnectionState::Connecting);
    }

    /// Mark the connection as established; resets both failure budgets
    pub fn live(&mut self) {
        self.consecutive_failures = 0;
        self.auth_failures = 0;
        let _ = self.state.send(ConnectionState::Live);
    }

    /// Mark the connector terminal (requested stop or exhausted budget)
    pub fn stopped(&self) {
        let _ = self.state.send(ConnectionState::Stopped);
    }

    /// Record a failure and decide the next step.
    ///
    /// Publishes `Reconnecting` (with the computed backoff) or `Stopped`.
    pub fn failure(&mut self, kind: FailureKind) -> RetryDecision {
        let attempt = self.consecutive_failures;
        self.consecutive_failures += 1;
        if kind == FailureKind::Auth {
            self.auth_failures += 1;
        }

        let exhausted = self.consecutive_failures > self.policy.max_retries
            || self.auth_failures > self.policy.max_auth_retries;

        if exhausted {
            let _ = self.state.send(ConnectionState::Stopped);
            return RetryDecision::GiveUp;
        }

        let backoff = delay_for_attempt(&self.policy, attempt);
        let _ = self.state.send(ConnectionState::Reconnecting {
            attempt: self.consecutive_failures,
            backoff,
        });
        RetryDecision::RetryAfter(backoff)
    }
}
