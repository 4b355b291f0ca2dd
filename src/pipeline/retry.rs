// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded retry with exponential backoff for the transmit step.
//!
//! Only transient record-store failures ([`TransportError::Unavailable`])
//! are retried. Rejections and crypto errors fail the upload at once.

use std::time::Duration;

use super::TransportError;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// The error is permanent.
    GiveUp,
    /// Maximum attempts used up.
    Exhausted,
}

impl RetryPolicy {
    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Decide what to do after `attempt` (1-based) failed with `err`.
    pub fn decide(&self, err: &TransportError, attempt: u32) -> RetryDecision {
        if !err.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if attempt >= self.max_attempts {
            tracing::warn!(attempt, max = self.max_attempts, "retry limit exhausted");
            return RetryDecision::Exhausted;
        }
        let delay = self.compute_delay(attempt);
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling retry");
        RetryDecision::RetryAfter(delay)
    }

    /// delay = min(initial * multiplier^(attempt - 1), max)
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let scaled = self.initial_backoff.as_nanos() as f64 * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_backoff.as_nanos() as f64).max(0.0);
        Duration::from_nanos(capped.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> TransportError {
        TransportError::Unavailable("redb: io error".into())
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.compute_delay(1), Duration::from_millis(200));
        assert_eq!(policy.compute_delay(2), Duration::from_millis(400));
        assert_eq!(policy.compute_delay(3), Duration::from_millis(800));
        assert_eq!(policy.compute_delay(10), Duration::from_secs(2));
    }

    #[test]
    fn transient_errors_retry_until_exhausted() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(&unavailable(), 1),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert!(matches!(
            policy.decide(&unavailable(), 2),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(policy.decide(&unavailable(), 3), RetryDecision::Exhausted);
    }

    #[test]
    fn rejections_are_never_retried() {
        let policy = RetryPolicy::default();
        let rejected = TransportError::Rejected("iv must be 24 hex characters".into());
        assert_eq!(policy.decide(&rejected, 1), RetryDecision::GiveUp);
    }

    #[test]
    fn no_retry_gives_up_after_first_attempt() {
        assert_eq!(
            RetryPolicy::no_retry().decide(&unavailable(), 1),
            RetryDecision::Exhausted
        );
    }
}
