//! The shared error-code taxonomy every public error type in this workspace
//! maps onto, so a transport layer above this core can translate any
//! internal error into a stable wire-level code without matching on
//! crate-internal variants.

use serde::{Deserialize, Serialize};

/// A stable, wire-safe error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The request failed input validation.
    ValidationFailed,
    /// The thing being created already exists.
    AlreadyExists,
    /// The referenced aggregate or record does not exist.
    NotFound,
    /// The aggregate exists but is not in a state that accepts this command
    /// (e.g. acting on a deactivated user).
    NotActive,
    /// The command would not change any observable state.
    NoChanges,
    /// An optimistic concurrency check failed.
    ConcurrencyConflict,
    /// The caller's authorization context does not grant this action.
    PermissionDenied,
    /// The instance does not have the feature this command requires enabled.
    FeatureDisabled,
    /// The instance has exceeded a quota this command would consume.
    QuotaExceeded,
    /// An unexpected internal failure (storage, serialization, I/O).
    Internal,
}

impl ErrorCode {
    /// Whether this code describes a caller mistake (bad input, conflicting
    /// state) as opposed to a system-side failure.
    #[must_use]
    pub const fn is_caller_error(self) -> bool {
        !matches!(self, Self::Internal)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::NotActive => "NOT_ACTIVE",
            Self::NoChanges => "NO_CHANGES",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::FeatureDisabled => "FEATURE_DISABLED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// Implemented by every public error type so callers can translate to a
/// wire-level [`ErrorCode`] without matching on internal variants.
pub trait HasErrorCode {
    /// This error's wire-level classification.
    fn code(&self) -> ErrorCode;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_spec_wire_names() {
        assert_eq!(ErrorCode::ValidationFailed.to_string(), "VALIDATION_FAILED");
        assert_eq!(ErrorCode::NotActive.to_string(), "NOT_ACTIVE");
        assert_eq!(ErrorCode::Internal.to_string(), "INTERNAL");
    }

    #[test]
    fn internal_is_not_a_caller_error() {
        assert!(!ErrorCode::Internal.is_caller_error());
        assert!(ErrorCode::NotFound.is_caller_error());
    }
}
