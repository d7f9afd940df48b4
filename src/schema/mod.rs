//! On-demand schema reflection.
//!
//! Nothing about a table's shape is assumed ahead of time: every action
//! that builds SQL first reflects the table it targets. Names are free
//! form, so constructed names such as a table's diff view
//! (`dolt_diff_<table>`) reflect the same way ordinary tables do.

mod error;
mod statement;
pub mod system;
mod table;

pub use error::SchemaError;
pub use statement::{quote_ident, Insert, Order, Select, Statement};
pub use table::{ColumnInfo, TableHandle};

use tracing::debug;

use crate::error::{DoltError, DoltResult};
use crate::session::Session;
use crate::store::{value_as_string, Connection};

/// Reflect the columns of `table_name` on the session's branch.
///
/// Fails with [`SchemaError::TableNotFound`] when no such table or view
/// exists.
pub fn reflect<C: Connection>(session: &mut Session<C>, table_name: &str) -> DoltResult<TableHandle> {
    if table_name.is_empty() {
        return Err(DoltError::InvalidInput("table name must not be empty".into()));
    }

    let sql = format!("SHOW COLUMNS FROM {}", quote_ident(table_name));
    let rs = match session.query(&sql, &[]) {
        Ok(rs) => rs,
        Err(e) if e.is_table_not_found() => {
            return Err(SchemaError::TableNotFound(table_name.to_string()).into());
        }
        Err(e) => return Err(e),
    };
    if rs.is_empty() {
        return Err(SchemaError::TableNotFound(table_name.to_string()).into());
    }

    let text = |row: &crate::store::Row<'_>, column: &str| -> DoltResult<String> {
        row.named(column).and_then(value_as_string).ok_or_else(|| {
            DoltError::UnexpectedResult(format!("SHOW COLUMNS row without {column}"))
        })
    };

    let mut columns = Vec::with_capacity(rs.len());
    for row in rs.iter() {
        columns.push(ColumnInfo {
            name: text(&row, "Field")?,
            data_type: text(&row, "Type")?,
            nullable: text(&row, "Null")?.eq_ignore_ascii_case("YES"),
            primary_key: text(&row, "Key")?.eq_ignore_ascii_case("PRI"),
        });
    }
    debug!(table = table_name, columns = columns.len(), "reflected");
    Ok(TableHandle::new(table_name, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn test_reflect_table_and_diff_view() {
        let store = MemoryStore::with_database("db");
        let mut session = Session::bind(&store, "db", "main").unwrap();
        session
            .execute("CREATE TABLE t (id INT PRIMARY KEY, val VARCHAR(20) NOT NULL)", &[])
            .unwrap();

        let table = reflect(&mut session, "t").unwrap();
        assert_eq!(table.column_names(), vec!["id", "val"]);
        assert!(table.column("id").unwrap().primary_key);
        assert!(!table.column("val").unwrap().nullable);

        let diff = reflect(&mut session, &system::diff_view("t")).unwrap();
        assert!(diff.has_column("from_val"));
        assert!(diff.has_column("diff_type"));
    }

    #[test]
    fn test_reflect_missing_table() {
        let store = MemoryStore::with_database("db");
        let mut session = Session::bind(&store, "db", "main").unwrap();
        let err = reflect(&mut session, "ghost").unwrap_err();
        assert!(matches!(err, DoltError::Schema(SchemaError::TableNotFound(ref t)) if t == "ghost"));
    }
}
