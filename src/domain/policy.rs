//! Token bucket policy and admission decisions.
//!
//! A policy is supplied per call and never persisted. Only the bucket state
//! it acts on lives in the store (see [`crate::domain::bucket`]).

use crate::domain::error::StoreError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw return value of [`crate::RateLimiter::try_acquire`] for a rejected
/// strict request.
///
/// Non-strict buckets may legitimately report negative remainders. They are
/// floored at `REJECTED + 1`, so an admitted remainder never equals the
/// sentinel.
pub const REJECTED: i64 = i64::MIN;

/// Per-call token bucket configuration.
///
/// # Example
/// ```
/// use tenant_kv::RateLimitPolicy;
///
/// // 10 requests of burst, 1 request back every second, strict admission
/// let policy = RateLimitPolicy::new(10, 1_000, 1)
///     .with_take(1)
///     .at(1_700_000_000_000)
///     .strict(true);
///
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Bucket capacity.
    pub max_amount: i64,
    /// Interval between refills, in milliseconds.
    pub refill_time_ms: i64,
    /// Tokens added per elapsed interval.
    pub refill_amount: i64,
    /// Cost of this request.
    #[serde(default = "default_take")]
    pub take: i64,
    /// Caller's current time, unix milliseconds.
    #[serde(default)]
    pub at: i64,
    /// Reject requests that would drive the bucket below zero.
    #[serde(default)]
    pub strict: bool,
}

fn default_take() -> i64 {
    1
}

impl RateLimitPolicy {
    /// Create a policy costing one token per request, non-strict, at time 0.
    pub fn new(max_amount: i64, refill_time_ms: i64, refill_amount: i64) -> Self {
        Self {
            max_amount,
            refill_time_ms,
            refill_amount,
            take: default_take(),
            at: 0,
            strict: false,
        }
    }

    /// Create a policy whose refill interval is given as a `Duration`.
    ///
    /// Intervals longer than `i64::MAX` milliseconds saturate.
    pub fn per_interval(max_amount: i64, refill_time: Duration, refill_amount: i64) -> Self {
        let refill_time_ms = i64::try_from(refill_time.as_millis()).unwrap_or(i64::MAX);
        Self::new(max_amount, refill_time_ms, refill_amount)
    }

    /// Set the cost of this request.
    pub fn with_take(mut self, take: i64) -> Self {
        self.take = take;
        self
    }

    /// Set the caller's notion of the current time (unix ms).
    pub fn at(mut self, at: i64) -> Self {
        self.at = at;
        self
    }

    /// Set strict admission.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Check the policy is usable.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a non-positive capacity or refill interval,
    /// or a negative refill amount or cost.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_amount <= 0 {
            return Err(StoreError::invalid_argument(format!(
                "max_amount must be positive, got {}",
                self.max_amount
            )));
        }
        if self.refill_time_ms <= 0 {
            return Err(StoreError::invalid_argument(format!(
                "refill_time_ms must be positive, got {}",
                self.refill_time_ms
            )));
        }
        if self.refill_amount < 0 {
            return Err(StoreError::invalid_argument(format!(
                "refill_amount must not be negative, got {}",
                self.refill_amount
            )));
        }
        if self.take < 0 {
            return Err(StoreError::invalid_argument(format!(
                "take must not be negative, got {}",
                self.take
            )));
        }
        Ok(())
    }
}

/// Outcome of one token bucket acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request was admitted and the bucket updated.
    Admitted {
        /// Tokens left after this request. Negative for non-strict overdraw.
        remaining: i64,
    },
    /// A strict request was refused; the bucket was not modified.
    Rejected {
        /// Tokens available when the request was refused.
        remaining: i64,
    },
}

impl Decision {
    /// Check if the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }

    /// Check if the request was rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected { .. })
    }

    /// Tokens left (admitted) or available (rejected).
    pub fn remaining(&self) -> i64 {
        match self {
            Decision::Admitted { remaining } | Decision::Rejected { remaining } => *remaining,
        }
    }

    /// Flatten to the integer contract: the remainder, or [`REJECTED`].
    pub fn to_raw(&self) -> i64 {
        match self {
            Decision::Admitted { remaining } => *remaining,
            Decision::Rejected { .. } => REJECTED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RateLimitPolicy::new(10, 1_000, 2);

        assert_eq!(policy.take, 1);
        assert_eq!(policy.at, 0);
        assert!(!policy.strict);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_per_interval() {
        let policy = RateLimitPolicy::per_interval(5, Duration::from_secs(60), 5);
        assert_eq!(policy.refill_time_ms, 60_000);
    }

    #[test]
    fn test_invalid_policies() {
        let cases = [
            RateLimitPolicy::new(0, 1_000, 1),
            RateLimitPolicy::new(-1, 1_000, 1),
            RateLimitPolicy::new(10, 0, 1),
            RateLimitPolicy::new(10, 1_000, -1),
            RateLimitPolicy::new(10, 1_000, 1).with_take(-1),
        ];

        for policy in cases {
            let err = policy.validate().unwrap_err();
            assert!(
                matches!(err, StoreError::InvalidArgument { .. }),
                "{:?} should be invalid",
                policy
            );
        }
    }

    #[test]
    fn test_zero_take_and_refill_are_valid() {
        assert!(RateLimitPolicy::new(1, 1, 0).with_take(0).validate().is_ok());
    }

    #[test]
    fn test_decision_raw_values() {
        assert_eq!(Decision::Admitted { remaining: 3 }.to_raw(), 3);
        assert_eq!(Decision::Admitted { remaining: -2 }.to_raw(), -2);
        assert_eq!(Decision::Rejected { remaining: 0 }.to_raw(), REJECTED);
        assert_eq!(Decision::Rejected { remaining: 0 }.remaining(), 0);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let policy: RateLimitPolicy = serde_json::from_str(
            r#"{"max_amount": 100, "refill_time_ms": 60000, "refill_amount": 100}"#,
        )
        .unwrap();

        assert_eq!(policy, RateLimitPolicy::new(100, 60_000, 100));
    }
}
