//! Error taxonomy shared by every store-facing operation.

use thiserror::Error;

/// Errors surfaced by key derivation, the rate limiter and store adapters.
///
/// Nothing in this crate retries. `StoreUnavailable` is the only variant for
/// which a retry can succeed, see [`StoreError::is_retryable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached (connection refused, dropped, timed out).
    #[error("store unavailable: {reason}")]
    StoreUnavailable {
        /// Description of the underlying failure.
        reason: String,
    },

    /// A persisted rate-limit record could not be decoded.
    ///
    /// The record is left untouched; it is never reinitialized.
    #[error("corrupted state under key {key}: {reason}")]
    CorruptedState {
        /// Hex rendering of the affected key.
        key: String,
        /// What was wrong with the record.
        reason: String,
    },

    /// The caller supplied an unusable argument.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was rejected.
        reason: String,
    },

    /// The store replied with something outside the expected protocol.
    #[error("unexpected store response to {operation}: {reason}")]
    UnexpectedStoreResponse {
        /// Store operation that produced the reply.
        operation: &'static str,
        /// Description of the reply.
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::StoreUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupted(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::CorruptedState {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        StoreError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn unexpected(operation: &'static str, reason: impl Into<String>) -> Self {
        StoreError::UnexpectedStoreResponse {
            operation,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StoreUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(StoreError::unavailable("connection refused").is_retryable());
        assert!(!StoreError::corrupted("00", "short record").is_retryable());
        assert!(!StoreError::invalid_argument("empty dataset").is_retryable());
        assert!(!StoreError::unexpected("SET", "integer reply").is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = StoreError::corrupted("abcd", "record is 3 bytes, expected 16");
        assert_eq!(
            err.to_string(),
            "corrupted state under key abcd: record is 3 bytes, expected 16"
        );

        let err = StoreError::unexpected("SET", "integer reply 7");
        assert_eq!(
            err.to_string(),
            "unexpected store response to SET: integer reply 7"
        );
    }
}
