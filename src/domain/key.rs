//! Deterministic key derivation for tenant-scoped store entries.
//!
//! A derived key identifies one logical entry in the shared store:
//! - Dataset identifier (the tenant)
//! - Logical prefix ("ratelimit", "counter", ...)
//! - Caller-supplied components, in order
//!
//! The ordered list `[dataset_id, prefix, components...]` is serialized as a
//! JSON array and hashed with XXH3-128. The 16 digest bytes are the store key.
//!
//! ## Stability
//!
//! The key format is fixed by three choices: JSON array serialization, the
//! XXH3-128 hash with seed 0, and big-endian digest bytes. Changing any of them
//! orphans every key already written. There is no resharding support; this
//! scheme only has to be good enough to spread tenants over one keyspace.
//!
//! XXH3 is not a cryptographic hash. Collisions are improbable, not impossible.

use crate::domain::error::StoreError;
use serde_json::Value;
use std::fmt;
use xxhash_rust::xxh3::xxh3_128;

/// Width of a derived key in bytes.
pub const KEY_LEN: usize = 16;

/// One caller-supplied key component.
///
/// Byte buffers are rendered as lowercase hex text before serialization, so two
/// buffers with identical content always produce the same key. That rendering
/// is the only normalization: `Bytes(vec![0xab])` and `Str("ab")` serialize to
/// the same JSON string and therefore derive the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyComponent {
    /// A text component, serialized as a JSON string.
    Str(String),
    /// An integer component, serialized as a JSON number.
    Int(i64),
    /// A raw byte component, serialized as a lowercase hex JSON string.
    Bytes(Vec<u8>),
}

impl KeyComponent {
    fn to_json(&self) -> Value {
        match self {
            KeyComponent::Str(s) => Value::String(s.clone()),
            KeyComponent::Int(n) => Value::from(*n),
            KeyComponent::Bytes(b) => Value::String(hex::encode(b)),
        }
    }
}

impl From<&str> for KeyComponent {
    fn from(value: &str) -> Self {
        KeyComponent::Str(value.to_string())
    }
}

impl From<String> for KeyComponent {
    fn from(value: String) -> Self {
        KeyComponent::Str(value)
    }
}

impl From<&String> for KeyComponent {
    fn from(value: &String) -> Self {
        KeyComponent::Str(value.clone())
    }
}

macro_rules! int_component {
    ($($t:ty),*) => {
        $(
            impl From<$t> for KeyComponent {
                fn from(value: $t) -> Self {
                    KeyComponent::Int(i64::from(value))
                }
            }
        )*
    };
}

int_component!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_component {
    ($($t:ty),*) => {
        $(
            impl TryFrom<$t> for KeyComponent {
                type Error = StoreError;

                fn try_from(value: $t) -> Result<Self, Self::Error> {
                    i64::try_from(value).map(KeyComponent::Int).map_err(|_| {
                        StoreError::invalid_argument(format!(
                            "integer component {value} exceeds i64::MAX"
                        ))
                    })
                }
            }
        )*
    };
}

// Unsigned types wider than i64 only convert when the value fits.
wide_int_component!(u64, usize);

impl From<&[u8]> for KeyComponent {
    fn from(value: &[u8]) -> Self {
        KeyComponent::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for KeyComponent {
    fn from(value: Vec<u8>) -> Self {
        KeyComponent::Bytes(value)
    }
}

impl<const N: usize> From<[u8; N]> for KeyComponent {
    fn from(value: [u8; N]) -> Self {
        KeyComponent::Bytes(value.to_vec())
    }
}

/// A fixed-width, tenant-scoped store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    /// Wrap raw key bytes, e.g. when reading keys back from the store.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        DerivedKey(bytes)
    }

    /// The raw key bytes as written to the store.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lowercase hex rendering of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for DerivedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Serialize `[dataset_id, prefix, components...]` to its canonical JSON text.
///
/// Exposed so callers can log or compare the exact text that gets hashed.
pub fn canonical_text(
    dataset_id: &str,
    prefix: &str,
    components: &[KeyComponent],
) -> Result<String, StoreError> {
    if dataset_id.is_empty() {
        return Err(StoreError::invalid_argument(
            "dataset identifier must not be empty",
        ));
    }

    let mut parts = Vec::with_capacity(components.len() + 2);
    parts.push(Value::String(dataset_id.to_string()));
    parts.push(Value::String(prefix.to_string()));
    parts.extend(components.iter().map(KeyComponent::to_json));

    serde_json::to_string(&Value::Array(parts))
        .map_err(|e| StoreError::invalid_argument(format!("key serialization failed: {e}")))
}

/// Derive the store key for a tenant, prefix and component list.
///
/// # Errors
/// Returns `InvalidArgument` if `dataset_id` is empty.
pub fn derive_key(
    dataset_id: &str,
    prefix: &str,
    components: &[KeyComponent],
) -> Result<DerivedKey, StoreError> {
    let text = canonical_text(dataset_id, prefix, components)?;
    Ok(DerivedKey(xxh3_128(text.as_bytes()).to_be_bytes()))
}
