//! Rate limiter coordination logic.
//!
//! The rate limiter validates a policy, hands the whole acquisition to the
//! store as one atomic operation and records the outcome. It keeps no bucket
//! state of its own: every call is a fresh round trip.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, Store};
use crate::domain::error::StoreError;
use crate::domain::key::DerivedKey;
use crate::domain::policy::{Decision, RateLimitPolicy};
use std::fmt;
use std::sync::Arc;

/// Token bucket rate limiter over a shared store.
///
/// Concurrent callers on the same key, in this process or another, are
/// serialized by the store. The limiter itself takes no locks.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tenant_kv::{derive_key, MemoryStore, RateLimitPolicy, RateLimiter, SystemClock};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tenant_kv::StoreError> {
/// let clock = Arc::new(SystemClock::new());
/// let store = Arc::new(MemoryStore::new(clock.clone()));
/// let limiter = RateLimiter::new(store, clock);
///
/// let key = derive_key("dataset-1", "ratelimit", &["login".into()])?;
/// let policy = RateLimitPolicy::new(10, 1_000, 1).strict(true);
///
/// assert_eq!(limiter.try_acquire_now(&key, &policy).await?, 9);
/// # Ok(())
/// # }
/// ```
pub struct RateLimiter<S: Store + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl<S: Store + ?Sized> RateLimiter<S> {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `store` - The shared store that executes acquisitions atomically
    /// * `clock` - Time source for [`RateLimiter::try_acquire_now`]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            metrics: Metrics::new(),
        }
    }

    /// Acquire `policy.take` tokens from the bucket under `key`.
    ///
    /// # Errors
    /// - `InvalidArgument` if the policy does not validate (the store is not called)
    /// - `CorruptedState` if the stored record does not decode
    /// - `StoreUnavailable` if the store cannot be reached
    pub async fn acquire(
        &self,
        key: &DerivedKey,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, StoreError> {
        policy.validate()?;

        let decision = match self.store.eval_token_bucket(key, policy).await {
            Ok(decision) => decision,
            Err(e) => {
                self.metrics.record_store_error();
                tracing::warn!(
                    error = %e,
                    key = %key,
                    "Rate limit acquisition failed"
                );
                return Err(e);
            }
        };

        match decision {
            Decision::Admitted { remaining } => {
                self.metrics.record_admitted();
                tracing::debug!(key = %key, take = policy.take, remaining, "Tokens acquired");
            }
            Decision::Rejected { remaining } => {
                self.metrics.record_rejected();
                tracing::debug!(key = %key, take = policy.take, remaining, "Request rejected");
            }
        }

        Ok(decision)
    }

    /// Acquire tokens and flatten the outcome to an integer.
    ///
    /// # Returns
    /// The remaining capacity after this request (negative for non-strict
    /// overdraw), or [`crate::REJECTED`] if a strict request was refused.
    pub async fn try_acquire(
        &self,
        key: &DerivedKey,
        policy: &RateLimitPolicy,
    ) -> Result<i64, StoreError> {
        self.acquire(key, policy).await.map(|d| d.to_raw())
    }

    /// Like [`RateLimiter::try_acquire`], with `at` taken from the clock.
    pub async fn try_acquire_now(
        &self,
        key: &DerivedKey,
        policy: &RateLimitPolicy,
    ) -> Result<i64, StoreError> {
        let policy = policy.at(self.clock.now_ms());
        self.try_acquire(key, &policy).await
    }

    /// Get the metrics tracker.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get the underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: Store + ?Sized> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: Store + ?Sized> fmt::Debug for RateLimiter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store)
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}
