//! Store double that fails every call.

use crate::application::ports::{SetOptions, Store};
use crate::domain::error::StoreError;
use crate::domain::key::DerivedKey;
use crate::domain::policy::{Decision, RateLimitPolicy};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A store whose every operation returns the same error.
///
/// Counts calls so tests can assert that nothing retried behind their back.
#[derive(Debug)]
pub struct FailingStore {
    error: StoreError,
    calls: AtomicUsize,
}

impl FailingStore {
    /// Fail every call with `error`.
    pub fn new(error: StoreError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every call with `StoreUnavailable`.
    pub fn unavailable() -> Self {
        Self::new(StoreError::unavailable("connection refused"))
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(self.error.clone())
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn get(&self, _key: &DerivedKey) -> Result<Option<Vec<u8>>, StoreError> {
        self.fail()
    }

    async fn set(
        &self,
        _key: &DerivedKey,
        _value: &[u8],
        _options: SetOptions,
    ) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn delete(&self, _key: &DerivedKey) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn eval_token_bucket(
        &self,
        _key: &DerivedKey,
        _policy: &RateLimitPolicy,
    ) -> Result<Decision, StoreError> {
        self.fail()
    }

    async fn list_push(&self, _key: &DerivedKey, _values: &[Vec<u8>]) -> Result<u64, StoreError> {
        self.fail()
    }

    async fn list_range(
        &self,
        _key: &DerivedKey,
        _start: i64,
        _stop: i64,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        self.fail()
    }

    async fn cardinality_add(
        &self,
        _key: &DerivedKey,
        _items: &[Vec<u8>],
    ) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn cardinality_count(&self, _key: &DerivedKey) -> Result<u64, StoreError> {
        self.fail()
    }

    async fn incr_by(&self, _key: &DerivedKey, _by: i64) -> Result<i64, StoreError> {
        self.fail()
    }

    async fn expire(&self, _key: &DerivedKey, _ttl: Duration) -> Result<bool, StoreError> {
        self.fail()
    }

    async fn get_many(&self, _keys: &[DerivedKey]) -> Result<Vec<Option<i64>>, StoreError> {
        self.fail()
    }
}
