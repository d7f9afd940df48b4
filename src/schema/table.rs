//! Reflected table structure.

use std::fmt;

use super::error::SchemaError;
use super::statement::{quote_ident, Insert, Select, Statement};

/// One column as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// SQL type as the server spells it, e.g. `varchar(20)`.
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// A table or view whose columns have been reflected.
///
/// Handles are snapshots: they are not refreshed when the table changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    name: String,
    columns: Vec<ColumnInfo>,
}

impl TableHandle {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backtick-quoted name for use in SQL text.
    pub fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column, ignoring case the way MySQL does.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Like [`column`](Self::column) but fails with `ColumnNotFound`.
    pub fn require_column(&self, name: &str) -> Result<&ColumnInfo, SchemaError> {
        self.column(name).ok_or_else(|| SchemaError::ColumnNotFound {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    /// Primary key columns in table order.
    pub fn primary_key(&self) -> Vec<&ColumnInfo> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Start a SELECT against this table.
    pub fn select(&self) -> Select<'_> {
        Select::new(self)
    }

    /// Start a multi-row INSERT into `columns`.
    pub fn insert<S: AsRef<str>>(&self, columns: &[S]) -> Result<Insert<'_>, SchemaError> {
        Insert::new(self, columns)
    }

    /// `DELETE FROM t`, which unlike TRUNCATE stays inside a transaction.
    pub fn delete_all(&self) -> Statement {
        Statement::new(format!("DELETE FROM {}", self.quoted_name()))
    }

    /// `DROP TABLE t`.
    pub fn drop_table(&self) -> Statement {
        Statement::new(format!("DROP TABLE {}", self.quoted_name()))
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", column.name, column.data_type)?;
            if column.primary_key {
                write!(f, " PRIMARY KEY")?;
            } else if !column.nullable {
                write!(f, " NOT NULL")?;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample() -> TableHandle {
        TableHandle::new(
            "dividend",
            vec![
                ColumnInfo {
                    name: "id".into(),
                    data_type: "int".into(),
                    nullable: false,
                    primary_key: true,
                },
                ColumnInfo {
                    name: "amount".into(),
                    data_type: "decimal(10,2)".into(),
                    nullable: true,
                    primary_key: false,
                },
            ],
        )
    }

    #[test]
    fn test_column_lookup() {
        let table = sample();
        assert_eq!(table.column_names(), vec!["id", "amount"]);
        assert!(table.has_column("AMOUNT"));
        assert_eq!(table.primary_key().len(), 1);
        assert_eq!(
            table.require_column("price").unwrap_err(),
            SchemaError::ColumnNotFound {
                table: "dividend".into(),
                column: "price".into()
            }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(sample().to_string(), "dividend(id int PRIMARY KEY, amount decimal(10,2))");
    }
}
