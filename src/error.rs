//! Crate-wide error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::schema::SchemaError;
use crate::store::{table_not_found, StoreError};

/// Result type for action-layer operations.
pub type DoltResult<T> = Result<T, DoltError>;

/// Errors surfaced by the action layer.
///
/// Nothing here is retried internally; every failure reaches the caller.
#[derive(Debug, Error)]
pub enum DoltError {
    /// the session could not be established
    #[error("connection error: cannot bind {target}: {reason}")]
    Connection { target: String, reason: String },

    /// a referenced table or view does not exist
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// the store rejected a statement or procedure call
    #[error("operation error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Operation { code: Option<u16>, message: String },

    /// the operation needs more history than the branch has
    #[error("empty result: {0}")]
    EmptyResult(String),

    /// the caller passed arguments that cannot be sent
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// the store answered with a shape the action layer cannot read
    #[error("unexpected result: {0}")]
    UnexpectedResult(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl DoltError {
    /// Server error number, for rejected operations.
    pub fn code(&self) -> Option<u16> {
        match self {
            DoltError::Operation { code, .. } => *code,
            _ => None,
        }
    }

    /// check if the error reports a missing table or view
    pub fn is_table_not_found(&self) -> bool {
        match self {
            DoltError::Schema(SchemaError::TableNotFound(_)) => true,
            DoltError::Operation { code, message } => table_not_found(*code, message),
            _ => false,
        }
    }
}

impl From<StoreError> for DoltError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Connect { target, reason } => DoltError::Connection { target, reason },
            StoreError::Rejected { code, message } => DoltError::Operation { code, message },
            StoreError::Decode { column, reason } => {
                DoltError::UnexpectedResult(format!("column {column}: {reason}"))
            }
        }
    }
}
