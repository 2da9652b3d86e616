//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── ValidationError  - Input validation failures (fail fast)          │
//! │  ├── ConflictReason   - Why a state transition was refused             │
//! │  └── CoreError        - The taxonomy every operation returns           │
//! │                                                                         │
//! │  till-db errors (separate crate)                                       │
//! │  └── DbError          - sqlx failures, converted into CoreError        │
//! │                                                                         │
//! │  Flow: ValidationError ─┐                                              │
//! │        DbError ─────────┼──► CoreError ──► ErrorBody {code, message}   │
//! │        ConflictReason ──┘                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (ids, fields)
//! 3. Every error has a stable machine-readable kind

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Core Error
// =============================================================================

/// The error taxonomy of every ledger operation.
///
/// ## Propagation
/// Validation runs before any transaction begins. Every other variant is
/// raised inside a transaction, which is rolled back before the error
/// reaches the caller. Nothing is retried.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed validation (empty cart, non-positive quantity/amount).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The requested state transition is not allowed right now.
    ///
    /// ## When This Occurs
    /// - Opening a second shift for the same cashier
    /// - Closing a closed shift
    /// - Selling into a shift that is not open
    /// - Cancelling a cancelled sale
    #[error("Conflict: {0}")]
    Conflict(ConflictReason),

    /// Unknown shift, sale or product id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The resource exists but belongs to another tenant.
    #[error("{entity} {id} belongs to another tenant")]
    CrossTenant { entity: String, id: String },

    /// The underlying transaction failed and was rolled back.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a CrossTenant error for a given entity type and ID.
    pub fn cross_tenant(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::CrossTenant {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns the stable machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::ValidationError,
            CoreError::Conflict(_) => ErrorKind::ConflictError,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::CrossTenant { .. } => ErrorKind::CrossTenant,
            CoreError::Storage(_) => ErrorKind::StorageError,
        }
    }

    /// Returns the conflict reason, if this is a conflict.
    pub fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            CoreError::Conflict(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Builds the serializable body handed to the HTTP layer.
    ///
    /// ```json
    /// { "code": "CONFLICT_ERROR", "reason": "SHIFT_NOT_OPEN",
    ///   "message": "Conflict: shift is not open" }
    /// ```
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.kind(),
            reason: self.conflict_reason(),
            message: self.to_string(),
        }
    }
}

impl From<ConflictReason> for CoreError {
    fn from(reason: ConflictReason) -> Self {
        CoreError::Conflict(reason)
    }
}

// =============================================================================
// Conflict Reason
// =============================================================================

/// Why a state transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ConflictReason {
    /// The cashier already has an open shift in this tenant.
    ShiftAlreadyOpen,
    /// The shift was already closed (closing is terminal).
    ShiftAlreadyClosed,
    /// A sale referenced a shift that is not open.
    ShiftNotOpen,
    /// The sale was already cancelled.
    AlreadyCancelled,
    /// Stock would go below zero under the `reject_insufficient` policy.
    InsufficientStock,
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ConflictReason::ShiftAlreadyOpen => "an open shift already exists for this cashier",
            ConflictReason::ShiftAlreadyClosed => "shift is already closed",
            ConflictReason::ShiftNotOpen => "shift is not open",
            ConflictReason::AlreadyCancelled => "sale is already cancelled",
            ConflictReason::InsufficientStock => "insufficient stock",
        };
        f.write_str(text)
    }
}

// =============================================================================
// Error Kind / Body
// =============================================================================

/// Stable machine-readable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ErrorKind {
    /// Input validation failed (400)
    ValidationError,
    /// State transition refused (409)
    ConflictError,
    /// Resource not found (404)
    NotFound,
    /// Resource belongs to another tenant (403)
    CrossTenant,
    /// Transaction failed and was rolled back (500)
    StorageError,
}

/// What the caller receives when an operation fails.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ErrorBody {
    pub code: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConflictReason>,
    pub message: String,
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These are raised before any transaction begins.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or more.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, malformed amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::Conflict(ConflictReason::ShiftNotOpen);
        assert_eq!(err.to_string(), "Conflict: shift is not open");

        let err = CoreError::not_found("Sale", "abc");
        assert_eq!(err.to_string(), "Sale not found: abc");
    }

    #[test]
    fn test_kinds_are_stable() {
        let json = serde_json::to_string(&ErrorKind::ConflictError).unwrap();
        assert_eq!(json, "\"CONFLICT_ERROR\"");

        let json = serde_json::to_string(&ConflictReason::AlreadyCancelled).unwrap();
        assert_eq!(json, "\"ALREADY_CANCELLED\"");
    }

    #[test]
    fn test_body_carries_reason_only_for_conflicts() {
        let body = CoreError::Conflict(ConflictReason::ShiftAlreadyOpen).body();
        assert_eq!(body.code, ErrorKind::ConflictError);
        assert_eq!(body.reason, Some(ConflictReason::ShiftAlreadyOpen));

        let body = CoreError::cross_tenant("Shift", "s-1").body();
        assert_eq!(body.code, ErrorKind::CrossTenant);
        assert!(body.reason.is_none());
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "line_items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert_eq!(core_err.kind(), ErrorKind::ValidationError);
    }
}
