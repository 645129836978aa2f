//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic against a store:
//! - Rate limiter (one atomic acquisition per call)
//! - Tenant facade (key derivation plus store passthroughs)
//! - Metrics (admission counters)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod tenant;
