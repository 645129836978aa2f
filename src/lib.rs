//! # tenant-kv
//!
//! Multi-tenant key-value store access with atomic token-bucket rate limiting.
//!
//! Every key is derived deterministically from a tenant's dataset identifier,
//! a logical prefix and a list of components, so independent processes agree
//! on where a counter, list or rate-limit bucket lives without coordinating.
//! Rate-limit decisions execute as one atomic operation inside the store, so
//! concurrent callers on the same key never double-count tokens.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tenant_kv::{
//!     Clock, MemoryStore, RateLimitPolicy, SystemClock, Tenant, TenantStore, REJECTED,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tenant_kv::StoreError> {
//! let clock = Arc::new(SystemClock::new());
//! let store = Arc::new(MemoryStore::new(clock.clone()));
//! let tenant = TenantStore::new(Tenant::new("dataset-1")?, store, clock.clone());
//!
//! // Counters
//! tenant.increment("views", &["page".into(), 42.into()], 1).await?;
//!
//! // Rate limiting: 10 tokens, one back every second, refuse when empty
//! let policy = RateLimitPolicy::new(10, 1_000, 1)
//!     .at(clock.now_ms())
//!     .strict(true);
//! let remaining = tenant.rate_limit("login", &["alice".into()], &policy).await?;
//! assert_ne!(remaining, REJECTED);
//! # Ok(())
//! # }
//! ```
//!
//! ## Keys
//!
//! A key is the 128-bit XXH3 digest of the canonical JSON array
//! `[dataset_id, prefix, component...]`, stored as 16 raw bytes. Text
//! components are JSON strings, integers are JSON numbers and byte components
//! are written as lowercase hex strings:
//!
//! ```rust
//! use tenant_kv::{canonical_text, derive_key};
//!
//! let text = canonical_text("ds", "counter", &["a".into(), 7.into()]).unwrap();
//! assert_eq!(text, r#"["ds","counter","a",7]"#);
//!
//! let key = derive_key("ds", "counter", &["a".into(), 7.into()]).unwrap();
//! assert_eq!(key.to_hex().len(), 32);
//! ```
//!
//! ## Token Bucket
//!
//! A bucket holds `remaining` tokens and the time of its next refill. Each
//! acquisition refills every whole interval that has elapsed (never above
//! `max_amount`), then takes `take` tokens:
//!
//! - **Lenient** (default): the take always applies and `remaining` may go
//!   negative, pushing the caller's next admission further out
//! - **Strict**: a request that would go negative is refused, nothing is
//!   written and [`REJECTED`] is returned
//!
//! Use [`RateLimiter::acquire`] or [`TenantStore::rate_limit_decision`] for a
//! typed [`Decision`] instead of the flat integer.
//!
//! ## Stores
//!
//! - [`MemoryStore`]: in-process, for tests and single-instance deployments
//! - `RedisStore` (feature `redis-store`): shared across instances; the
//!   bucket update runs as a Lua script
//!
//! Any other backend plugs in by implementing [`Store`].
//!
//! ## Errors
//!
//! Every fallible call returns [`StoreError`]. Only `StoreUnavailable` is
//! worth retrying; nothing in this crate retries on its own.
//!
//! ## Observability
//!
//! Store failures are logged through `tracing` at `warn`, decisions at
//! `debug`. [`RateLimiter::metrics`] counts admissions, rejections and store
//! errors.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    bucket::{BucketState, RECORD_LEN},
    error::StoreError,
    key::{canonical_text, derive_key, DerivedKey, KeyComponent, KEY_LEN},
    policy::{Decision, RateLimitPolicy, REJECTED},
};

pub use application::{
    limiter::RateLimiter,
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, SetCondition, SetOptions, Store},
    tenant::{Tenant, TenantStore},
};

pub use infrastructure::{clock::SystemClock, memory::MemoryStore};

#[cfg(feature = "redis-store")]
pub use infrastructure::redis_store::{RedisStore, RedisStoreConfig};
