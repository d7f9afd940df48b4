//! Store-level error types.

use thiserror::Error;

/// MySQL `ER_NO_SUCH_TABLE`.
pub const ER_NO_SUCH_TABLE: u16 = 1146;
/// MySQL `ER_DUP_ENTRY`.
pub const ER_DUP_ENTRY: u16 = 1062;
/// MySQL `ER_BAD_FIELD_ERROR`.
pub const ER_BAD_FIELD: u16 = 1054;
/// MySQL `ER_SP_DOES_NOT_EXIST`.
pub const ER_SP_DOES_NOT_EXIST: u16 = 1305;
/// MySQL `ER_TABLE_EXISTS_ERROR`.
pub const ER_TABLE_EXISTS: u16 = 1050;
/// MySQL `ER_PARSE_ERROR`.
pub const ER_PARSE_ERROR: u16 = 1064;
/// Generic server-side failure (`ER_UNKNOWN_ERROR`).
pub const ER_UNKNOWN: u16 = 1105;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a store backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// the connection could not be established
    #[error("cannot connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    /// the store rejected a statement
    #[error("statement rejected{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Rejected { code: Option<u16>, message: String },

    /// a returned value could not be converted
    #[error("cannot decode column {column}: {reason}")]
    Decode { column: String, reason: String },
}

impl StoreError {
    pub fn rejected(code: u16, message: impl Into<String>) -> Self {
        StoreError::Rejected {
            code: Some(code),
            message: message.into(),
        }
    }

    /// check if the store reported a missing table or view
    pub fn is_table_not_found(&self) -> bool {
        match self {
            StoreError::Rejected { code, message } => table_not_found(*code, message),
            _ => false,
        }
    }
}

/// Classify a rejection as a missing table or view.
///
/// Dolt reports unknown system views with the generic error number, so the
/// message is checked as well.
pub fn table_not_found(code: Option<u16>, message: &str) -> bool {
    code == Some(ER_NO_SUCH_TABLE) || message.to_ascii_lowercase().contains("table not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_not_found_classification() {
        assert!(StoreError::rejected(ER_NO_SUCH_TABLE, "no such table").is_table_not_found());

        let by_message = StoreError::Rejected {
            code: Some(ER_UNKNOWN),
            message: "table not found: dolt_diff_t".into(),
        };
        assert!(by_message.is_table_not_found());

        assert!(!StoreError::rejected(ER_DUP_ENTRY, "duplicate").is_table_not_found());
        let connect = StoreError::Connect {
            target: "db/main".into(),
            reason: "refused".into(),
        };
        assert!(!connect.is_table_not_found());
    }

    #[test]
    fn test_rejected_display() {
        let err = StoreError::rejected(1105, "branch already exists");
        assert_eq!(err.to_string(), "statement rejected (1105): branch already exists");

        let err = StoreError::Rejected { code: None, message: "boom".into() };
        assert_eq!(err.to_string(), "statement rejected: boom");
    }
}
