//! Persisted token bucket state and the refill/take algorithm.
//!
//! The record is two big-endian `i64`s: `remaining` then `next_refill_at`.
//! Every adapter runs [`apply`] (or, for Redis, the equivalent Lua script)
//! inside one atomic store operation.

use crate::domain::policy::{Decision, RateLimitPolicy, REJECTED};
use std::fmt;

/// Width of an encoded bucket record in bytes.
pub const RECORD_LEN: usize = 16;

/// Per-key token bucket state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    /// Tokens currently in the bucket. Negative after non-strict overdraw.
    pub remaining: i64,
    /// Unix ms at which the next refill becomes due.
    pub next_refill_at: i64,
}

/// A stored record had the wrong width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordWidthError {
    /// Width actually found.
    pub actual: usize,
}

impl fmt::Display for RecordWidthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record is {} bytes, expected {}", self.actual, RECORD_LEN)
    }
}

impl std::error::Error for RecordWidthError {}

impl BucketState {
    /// A full bucket whose first refill is one interval after `policy.at`.
    pub fn fresh(policy: &RateLimitPolicy) -> Self {
        Self {
            remaining: policy.max_amount,
            next_refill_at: policy.at.saturating_add(policy.refill_time_ms),
        }
    }

    /// Encode to the fixed-width record.
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[..8].copy_from_slice(&self.remaining.to_be_bytes());
        out[8..].copy_from_slice(&self.next_refill_at.to_be_bytes());
        out
    }

    /// Decode a stored record.
    ///
    /// # Errors
    /// Returns `RecordWidthError` unless `bytes` is exactly [`RECORD_LEN`] long.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordWidthError> {
        let record: &[u8; RECORD_LEN] = bytes.try_into().map_err(|_| RecordWidthError {
            actual: bytes.len(),
        })?;

        let mut remaining = [0u8; 8];
        let mut next_refill_at = [0u8; 8];
        remaining.copy_from_slice(&record[..8]);
        next_refill_at.copy_from_slice(&record[8..]);

        Ok(Self {
            remaining: i64::from_be_bytes(remaining),
            next_refill_at: i64::from_be_bytes(next_refill_at),
        })
    }

    /// Add every refill that is due at `at`.
    ///
    /// Refill never lowers a bucket already at or above `max_amount`.
    fn refill(&mut self, policy: &RateLimitPolicy) {
        if policy.at < self.next_refill_at {
            return;
        }

        let interval = i128::from(policy.refill_time_ms.max(1));
        let elapsed = i128::from(policy.at) - i128::from(self.next_refill_at);
        let intervals = elapsed / interval + 1;

        if self.remaining < policy.max_amount {
            let refilled =
                i128::from(self.remaining) + intervals * i128::from(policy.refill_amount);
            self.remaining = clamp_i64(refilled.min(i128::from(policy.max_amount)));
        }
        self.next_refill_at = clamp_i64(i128::from(self.next_refill_at) + intervals * interval);
    }
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Result of running the bucket algorithm once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketUpdate {
    /// What to report to the caller.
    pub decision: Decision,
    /// State to write back, `None` when nothing may be persisted.
    pub persist: Option<BucketState>,
}

/// Run one acquisition against `current` (`None` if the key holds no record).
///
/// The caller is responsible for validating `policy` and for making the
/// read, this call and the write one atomic unit.
pub fn apply(current: Option<BucketState>, policy: &RateLimitPolicy) -> BucketUpdate {
    let mut state = current.unwrap_or_else(|| BucketState::fresh(policy));
    state.refill(policy);

    // An admitted remainder never lands on the rejection sentinel.
    let after = state
        .remaining
        .saturating_sub(policy.take)
        .max(REJECTED + 1);
    if policy.strict && after < 0 {
        return BucketUpdate {
            decision: Decision::Rejected {
                remaining: state.remaining,
            },
            persist: None,
        };
    }

    state.remaining = after;
    BucketUpdate {
        decision: Decision::Admitted { remaining: after },
        persist: Some(state),
    }
}
