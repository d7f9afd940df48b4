//! Schema lookup errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// the table or view does not exist on the bound branch
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// the table exists but has no such column
    #[error("column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },
}
