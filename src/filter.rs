//! Message filter chain
//!
//! A fixed-order sequence of pass/drop checks evaluated per event, cheapest
//! and most specific first. Filtering is binary: an event is never rewritten,
//! and a drop's only side effect is a diagnostic counter increment.

use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;

use crate::config::FilterPolicy;
use crate::event::ChatEvent;
use crate::Result;

/// Why an event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Outside the inclusive `[min_length, max_length]` bounds
    Length,
    /// Starts with the command prefix
    Command,
    /// Contains a URL-like substring
    Link,
    /// Sender is in the blocked-users set
    BlockedUser,
    /// Text contains a blocked word
    BlockedWord,
}

/// Filter outcome for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward to delivery
    Pass,
    /// Discard, with the first matching reason
    Drop(DropReason),
}

/// Diagnostic counters, the filter chain's only side effect
#[derive(Debug, Default)]
pub struct FilterStats {
    pub passed: AtomicU64,
    pub dropped_length: AtomicU64,
    pub dropped_command: AtomicU64,
    pub dropped_link: AtomicU64,
    pub dropped_user: AtomicU64,
    pub dropped_word: AtomicU64,
}

impl FilterStats {
    fn record(&self, verdict: Verdict) {
        let counter = match verdict {
            Verdict::Pass => &self.passed,
            Verdict::Drop(DropReason::Length) => &self.dropped_length,
            Verdict::Drop(DropReason::Command) => &self.dropped_command,
            Verdict::Drop(DropReason::Link) => &self.dropped_link,
            Verdict::Drop(DropReason::BlockedUser) => &self.dropped_user,
            Verdict::Drop(DropReason::BlockedWord) => &self.dropped_word,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Total dropped events across all reasons
    #[must_use]
    pub fn total_dropped(&self) -> u64 {
        self.dropped_length.load(Ordering::Relaxed)
            + self.dropped_command.load(Ordering::Relaxed)
            + self.dropped_link.load(Ordering::Relaxed)
            + self.dropped_user.load(Ordering::Relaxed)
            + self.dropped_word.load(Ordering::Relaxed)
    }
}

/// Compiled filter chain for one pipeline run
pub struct FilterChain {
    policy: FilterPolicy,
    link_pattern: Regex,
    blocked_users: Vec<String>,
    blocked_words: Vec<String>,
    stats: FilterStats,
}

impl FilterChain {
    /// Compile a filter chain from a policy.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the policy is malformed; this happens
    /// at pipeline start, before any connector runs.
    pub fn new(policy: FilterPolicy) -> Result<Self> {
        policy.validate()?;

        // Scheme prefix or bare www. domain, per the original heuristic
        let link_pattern =
            Regex::new(r"(?i)https?://|www\.").expect("link pattern is valid");

        let blocked_users = policy
            .blocked_users
            .iter()
            .map(|u| u.to_lowercase())
            .collect();
        let blocked_words = policy
            .blocked_words
            .iter()
            .map(|w| w.to_lowercase())
            .collect();

        Ok(Self {
            policy,
            link_pattern,
            blocked_users,
            blocked_words,
            stats: FilterStats::default(),
        })
    }

    /// Evaluate one event in fixed order:
    /// length → command → link → blocked user → blocked word.
    pub fn evaluate(&self, event: &ChatEvent) -> Verdict {
        let verdict = self.check(event);
        self.stats.record(verdict);
        verdict
    }

    /// Diagnostic counters
    #[must_use]
    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    fn check(&self, event: &ChatEvent) -> Verdict {
        let len = event.text.chars().count();
        if len < self.policy.min_length || len > self.policy.max_length {
            return Verdict::Drop(DropReason::Length);
        }

        if self.policy.ignore_commands && event.text.starts_with(&self.policy.command_prefix) {
            return Verdict::Drop(DropReason::Command);
        }

        if self.policy.ignore_links && self.link_pattern.is_match(&event.text) {
            return Verdict::Drop(DropReason::Link);
        }

        let username = event.username.to_lowercase();
        if self.blocked_users.iter().any(|u| *u == username) {
            return Verdict::Drop(DropReason::BlockedUser);
        }

        if !self.blocked_words.is_empty() {
            let text = event.text.to_lowercase();
            if self.blocked_words.iter().any(|w| text.contains(w)) {
                return Verdict::Drop(DropReason::BlockedWord);
            }
        }

        Verdict::Pass
    }
}
