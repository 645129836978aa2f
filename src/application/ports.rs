//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::error::StoreError;
use crate::domain::key::DerivedKey;
use crate::domain::policy::{Decision, RateLimitPolicy};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Current time as unix milliseconds.
    fn now_ms(&self) -> i64;
}

/// Write condition for [`Store::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    /// Write unconditionally.
    #[default]
    Always,
    /// Write only if the key holds no value.
    IfAbsent,
    /// Write only if the key already holds a value.
    IfPresent,
}

/// Options for [`Store::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    /// Write condition.
    pub condition: SetCondition,
    /// Expire the key after this long. `None` keeps it until deleted.
    pub ttl: Option<Duration>,
}

impl SetOptions {
    /// Write only if absent.
    pub fn if_absent() -> Self {
        Self {
            condition: SetCondition::IfAbsent,
            ttl: None,
        }
    }

    /// Write only if present.
    pub fn if_present() -> Self {
        Self {
            condition: SetCondition::IfPresent,
            ttl: None,
        }
    }

    /// Expire the written key after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Port for the shared key-value store.
///
/// Exactly the capabilities this crate uses, nothing more. Each method is a
/// single store round trip and each is atomic on its own; there are no
/// multi-key transactions. Implementations must not retry.
#[async_trait]
pub trait Store: Send + Sync + Debug {
    /// Read a plain value.
    async fn get(&self, key: &DerivedKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a plain value.
    ///
    /// # Returns
    /// Whether the write was applied (always true for `SetCondition::Always`).
    async fn set(
        &self,
        key: &DerivedKey,
        value: &[u8],
        options: SetOptions,
    ) -> Result<bool, StoreError>;

    /// Delete a key of any type. Returns whether it existed.
    async fn delete(&self, key: &DerivedKey) -> Result<bool, StoreError>;

    /// Run one token bucket acquisition as a single atomic operation.
    ///
    /// The policy has already been validated. A stored record that does not
    /// decode must fail with `CorruptedState` and stay untouched.
    async fn eval_token_bucket(
        &self,
        key: &DerivedKey,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, StoreError>;

    /// Append values to the tail of a list. Returns the new length.
    async fn list_push(&self, key: &DerivedKey, values: &[Vec<u8>]) -> Result<u64, StoreError>;

    /// Read an inclusive range of a list. Negative indices count from the tail.
    async fn list_range(
        &self,
        key: &DerivedKey,
        start: i64,
        stop: i64,
    ) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Add items to an approximate-cardinality counter.
    ///
    /// Returns whether the estimate changed.
    async fn cardinality_add(&self, key: &DerivedKey, items: &[Vec<u8>])
        -> Result<bool, StoreError>;

    /// Approximate number of distinct items added to a counter.
    async fn cardinality_count(&self, key: &DerivedKey) -> Result<u64, StoreError>;

    /// Add `by` to an integer value, creating it at 0. Returns the new value.
    async fn incr_by(&self, key: &DerivedKey, by: i64) -> Result<i64, StoreError>;

    /// Expire a key after `ttl`. Returns whether the key existed.
    async fn expire(&self, key: &DerivedKey, ttl: Duration) -> Result<bool, StoreError>;

    /// Read many integer values at once, `None` for missing keys.
    ///
    /// A present value that is not an integer is `UnexpectedStoreResponse`.
    async fn get_many(&self, keys: &[DerivedKey]) -> Result<Vec<Option<i64>>, StoreError>;
}
