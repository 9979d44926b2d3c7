// 🚨 Error Taxonomy - what can go wrong, and whose fault it is
//
// Validation  → the user typed something wrong (field-scoped, nothing written)
// Integrity   → the store refused a duplicate (nothing written)
// Persistence → the store failed for another reason (re-fetch before trusting anything)
//
// Raw rusqlite errors never leave the crate; they are classified here.

use serde::Serialize;
use thiserror::Error;

/// Result type used by every store-facing operation in the crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

/// A single rejected field.
///
/// `field` is a stable identifier (`quantity_delta`, `purchase_date`, ...) the
/// caller uses to re-prompt; `message` is the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        ValidationError {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// LEDGER ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed - {0}")]
    Validation(#[from] ValidationError),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    Rejected(String),

    #[error("invalid username or password")]
    Unauthorized,
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        LedgerError::NotFound { entity, id }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        LedgerError::Rejected(msg.into())
    }

    /// Short machine-readable name, used by the API error body.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::Integrity(_) => "integrity",
            LedgerError::Persistence(_) => "persistence",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::Rejected(_) => "rejected",
            LedgerError::Unauthorized => "unauthorized",
        }
    }

    /// Field name for field-scoped failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            LedgerError::Validation(e) => Some(e.field),
            _ => None,
        }
    }

    /// Recoverable errors leave the store untouched; the user can fix the input and retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LedgerError::Persistence(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                LedgerError::Integrity(err.to_string())
            }
            _ => LedgerError::Persistence(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_constraint_violation_is_integrity() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (name TEXT UNIQUE)", []).unwrap();
        conn.execute("INSERT INTO t (name) VALUES ('a')", []).unwrap();

        let err: LedgerError = conn
            .execute("INSERT INTO t (name) VALUES ('a')", [])
            .unwrap_err()
            .into();

        assert_eq!(err.kind(), "integrity");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_other_sqlite_errors_are_persistence() {
        let conn = Connection::open_in_memory().unwrap();
        let err: LedgerError = conn
            .execute("INSERT INTO missing_table (x) VALUES (1)", [])
            .unwrap_err()
            .into();

        assert_eq!(err.kind(), "persistence");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_validation_error_names_field() {
        let err: LedgerError = ValidationError::new("unit_price", "bad price").into();
        assert_eq!(err.field(), Some("unit_price"));
        assert_eq!(err.to_string(), "validation failed - unit_price: bad price");
    }
}
