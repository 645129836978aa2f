//! Tenant-scoped facade over a shared store.
//!
//! A [`TenantStore`] binds one store handle to one dataset identifier. Every
//! operation takes a logical prefix and a component list, derives the key for
//! this tenant and forwards exactly one call to the store.

use crate::application::limiter::RateLimiter;
use crate::application::ports::{Clock, SetOptions, Store};
use crate::domain::error::StoreError;
use crate::domain::key::{derive_key, DerivedKey, KeyComponent};
use crate::domain::policy::{Decision, RateLimitPolicy};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A validated dataset identifier.
///
/// Stands in for whatever request context the host application uses to
/// carry the current tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tenant {
    dataset_id: String,
}

impl Tenant {
    /// Create a tenant from its dataset identifier.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `dataset_id` is empty.
    pub fn new(dataset_id: impl Into<String>) -> Result<Self, StoreError> {
        let dataset_id = dataset_id.into();
        if dataset_id.is_empty() {
            return Err(StoreError::invalid_argument(
                "dataset identifier must not be empty",
            ));
        }
        Ok(Self { dataset_id })
    }

    /// The dataset identifier.
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    /// Derive the key for `prefix` and `components` within this tenant.
    pub fn key(&self, prefix: &str, components: &[KeyComponent]) -> Result<DerivedKey, StoreError> {
        derive_key(&self.dataset_id, prefix, components)
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dataset_id)
    }
}

/// Store operations scoped to one tenant.
///
/// Cheap to clone; clones share the store handle and limiter metrics.
pub struct TenantStore<S: Store + ?Sized> {
    tenant: Tenant,
    store: Arc<S>,
    limiter: RateLimiter<S>,
}

impl<S: Store + ?Sized> TenantStore<S> {
    /// Bind `store` to `tenant`.
    pub fn new(tenant: Tenant, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let limiter = RateLimiter::new(Arc::clone(&store), clock);
        Self {
            tenant,
            store,
            limiter,
        }
    }

    /// Bind another tenant to the same store and limiter.
    pub fn for_tenant(&self, tenant: Tenant) -> Self {
        Self {
            tenant,
            store: Arc::clone(&self.store),
            limiter: self.limiter.clone(),
        }
    }

    /// The tenant this handle is scoped to.
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// The rate limiter sharing this handle's store.
    pub fn limiter(&self) -> &RateLimiter<S> {
        &self.limiter
    }

    /// Derive the key for `prefix` and `components` within this tenant.
    pub fn key(&self, prefix: &str, components: &[KeyComponent]) -> Result<DerivedKey, StoreError> {
        self.tenant.key(prefix, components)
    }

    /// Add `by` to an integer counter. Returns the new value.
    pub async fn increment(
        &self,
        prefix: &str,
        components: &[KeyComponent],
        by: i64,
    ) -> Result<i64, StoreError> {
        let key = self.key(prefix, components)?;
        self.store.incr_by(&key, by).await
    }

    /// Read a plain value.
    pub async fn get(
        &self,
        prefix: &str,
        components: &[KeyComponent],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let key = self.key(prefix, components)?;
        self.store.get(&key).await
    }

    /// Delete a key. Returns whether it existed.
    pub async fn delete(
        &self,
        prefix: &str,
        components: &[KeyComponent],
    ) -> Result<bool, StoreError> {
        let key = self.key(prefix, components)?;
        self.store.delete(&key).await
    }

    /// Write a plain value, possibly conditionally. Returns whether it was applied.
    pub async fn set(
        &self,
        prefix: &str,
        components: &[KeyComponent],
        value: &[u8],
        options: SetOptions,
    ) -> Result<bool, StoreError> {
        let key = self.key(prefix, components)?;
        self.store.set(&key, value, options).await
    }

    /// Read an inclusive range of a list.
    pub async fn list_read(
        &self,
        prefix: &str,
        components: &[KeyComponent],
        start: i64,
        stop: i64,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let key = self.key(prefix, components)?;
        self.store.list_range(&key, start, stop).await
    }

    /// Append values to a list. Returns the new length.
    pub async fn list_push(
        &self,
        prefix: &str,
        components: &[KeyComponent],
        values: &[Vec<u8>],
    ) -> Result<u64, StoreError> {
        if values.is_empty() {
            return Err(StoreError::invalid_argument("list_push needs at least one value"));
        }
        let key = self.key(prefix, components)?;
        self.store.list_push(&key, values).await
    }

    /// Approximate number of distinct items in a cardinality counter.
    pub async fn cardinality_count(
        &self,
        prefix: &str,
        components: &[KeyComponent],
    ) -> Result<u64, StoreError> {
        let key = self.key(prefix, components)?;
        self.store.cardinality_count(&key).await
    }

    /// Add items to a cardinality counter. Returns whether the estimate changed.
    pub async fn cardinality_add(
        &self,
        prefix: &str,
        components: &[KeyComponent],
        items: &[Vec<u8>],
    ) -> Result<bool, StoreError> {
        let key = self.key(prefix, components)?;
        self.store.cardinality_add(&key, items).await
    }

    /// Expire a key after `ttl`. Returns whether the key existed.
    pub async fn expire(
        &self,
        prefix: &str,
        components: &[KeyComponent],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let key = self.key(prefix, components)?;
        self.store.expire(&key, ttl).await
    }

    /// Read many integer values under one prefix in a single round trip.
    ///
    /// `component_sets[i]` selects the key whose value lands at index `i`.
    pub async fn get_numbers(
        &self,
        prefix: &str,
        component_sets: &[Vec<KeyComponent>],
    ) -> Result<Vec<Option<i64>>, StoreError> {
        if component_sets.is_empty() {
            return Ok(Vec::new());
        }
        let keys = component_sets
            .iter()
            .map(|components| self.key(prefix, components))
            .collect::<Result<Vec<_>, _>>()?;
        self.store.get_many(&keys).await
    }

    /// Acquire tokens from this tenant's bucket. See [`RateLimiter::try_acquire`].
    pub async fn rate_limit(
        &self,
        prefix: &str,
        components: &[KeyComponent],
        policy: &RateLimitPolicy,
    ) -> Result<i64, StoreError> {
        let key = self.key(prefix, components)?;
        self.limiter.try_acquire(&key, policy).await
    }

    /// Typed form of [`TenantStore::rate_limit`].
    pub async fn rate_limit_decision(
        &self,
        prefix: &str,
        components: &[KeyComponent],
        policy: &RateLimitPolicy,
    ) -> Result<Decision, StoreError> {
        let key = self.key(prefix, components)?;
        self.limiter.acquire(&key, policy).await
    }
}

impl<S: Store + ?Sized> Clone for TenantStore<S> {
    fn clone(&self) -> Self {
        Self {
            tenant: self.tenant.clone(),
            store: Arc::clone(&self.store),
            limiter: self.limiter.clone(),
        }
    }
}

impl<S: Store + ?Sized> fmt::Debug for TenantStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantStore")
            .field("tenant", &self.tenant)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::REJECTED;
    use crate::infrastructure::memory::MemoryStore;
    use crate::infrastructure::mocks::MockClock;

    const T0: i64 = 1_700_000_000_000;

    fn tenant_store(dataset: &str) -> (TenantStore<MemoryStore>, MockClock) {
        let clock = MockClock::new(T0);
        let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let tenant = Tenant::new(dataset).unwrap();
        (TenantStore::new(tenant, store, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_empty_tenant_rejected() {
        assert!(matches!(
            Tenant::new(""),
            Err(StoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_tenant_key_matches_derive_key() {
        let tenant = Tenant::new("ds").unwrap();
        assert_eq!(
            tenant.key("counter", &["x".into()]).unwrap(),
            derive_key("ds", "counter", &["x".into()]).unwrap()
        );
    }

    #[tokio::test]
    async fn test_increment() {
        let (store, _) = tenant_store("ds");

        assert_eq!(store.increment("counter", &["a".into()], 1).await.unwrap(), 1);
        assert_eq!(store.increment("counter", &["a".into()], 4).await.unwrap(), 5);
        assert_eq!(store.increment("counter", &["a".into()], -2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let (a, _) = tenant_store("tenant-a");
        let b = a.for_tenant(Tenant::new("tenant-b").unwrap());

        a.increment("counter", &["x".into()], 10).await.unwrap();

        assert_eq!(b.increment("counter", &["x".into()], 1).await.unwrap(), 1);
        assert_eq!(b.get("counter", &["y".into()]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_numbers() {
        let (store, _) = tenant_store("ds");
        store.increment("counter", &["a".into()], 3).await.unwrap();
        store.increment("counter", &["c".into()], 7).await.unwrap();

        let values = store
            .get_numbers(
                "counter",
                &[vec!["a".into()], vec!["b".into()], vec!["c".into()]],
            )
            .await
            .unwrap();

        assert_eq!(values, vec![Some(3), None, Some(7)]);
        assert!(store.get_numbers("counter", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_push_requires_values() {
        let (store, _) = tenant_store("ds");
        let err = store.list_push("log", &[], &[]).await.unwrap_err();

        assert!(matches!(err, StoreError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_passthrough() {
        let (store, _) = tenant_store("ds");
        let policy = RateLimitPolicy::new(1, 1_000, 1).at(T0).strict(true);

        assert_eq!(
            store
                .rate_limit("ratelimit", &["login".into()], &policy)
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .rate_limit("ratelimit", &["login".into()], &policy)
                .await
                .unwrap(),
            REJECTED
        );
        assert!(store
            .rate_limit_decision("ratelimit", &["other".into()], &policy)
            .await
            .unwrap()
            .is_admitted());
    }
}
