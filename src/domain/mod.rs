//! Domain layer - pure logic with no I/O.
//!
//! This layer contains the core concepts and invariants:
//! - Key derivation (tenant, prefix and components to a 16-byte key)
//! - Token bucket policy, decisions and the refill/take algorithm
//! - The error taxonomy shared by every adapter
//!
//! All types in this layer are pure and easily testable.

pub mod bucket;
pub mod error;
pub mod key;
pub mod policy;
