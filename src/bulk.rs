//! Generic row-level mutations against arbitrary tables.

use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::error::{DoltError, DoltResult};
use crate::report;
use crate::schema::{self, Order, TableHandle};
use crate::session::Session;
use crate::store::{Connection, Value};

/// One row as column name to value.
pub type Record = BTreeMap<String, Value>;

/// What [`drop_table`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    Missing,
}

impl fmt::Display for DropOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropOutcome::Dropped => write!(f, "table dropped"),
            DropOutcome::Missing => write!(f, "table does not exist"),
        }
    }
}

/// Insert `rows` in one multi-row statement; returns the affected count.
///
/// Every record must carry the same column names. The statement commits
/// at the storage layer as soon as it runs; it is not a version-control
/// commit.
pub fn insert<C: Connection>(session: &mut Session<C>, table_name: &str, rows: &[Record]) -> DoltResult<u64> {
    let Some(columns) = uniform_columns(rows)? else {
        return Ok(0);
    };
    let table = schema::reflect(session, table_name)?;
    let inserted = insert_into(session, &table, &columns, rows)?;
    info!(table = table_name, rows = inserted, "inserted rows");
    Ok(inserted)
}

/// Drop `table_name` if it exists.
pub fn drop_table<C: Connection>(session: &mut Session<C>, table_name: &str) -> DoltResult<DropOutcome> {
    let existing = report::list_tables(session)?
        .into_iter()
        .find(|t| t.eq_ignore_ascii_case(table_name));
    let Some(existing) = existing else {
        info!(table = table_name, "table does not exist, nothing to drop");
        return Ok(DropOutcome::Missing);
    };
    let table = schema::reflect(session, &existing)?;
    table.drop_table().execute(session)?;
    info!(table = table_name, "dropped table");
    Ok(DropOutcome::Dropped)
}

/// Replace every row of `table_name` with `rows`.
///
/// The delete and the insert share one transaction, so a failing insert
/// leaves the old rows in place. A crash of the client between the two
/// statements is left to the server's transaction handling.
pub fn replace_table<C: Connection>(
    session: &mut Session<C>,
    table_name: &str,
    rows: &[Record],
) -> DoltResult<u64> {
    let columns = uniform_columns(rows)?;
    let table = schema::reflect(session, table_name)?;

    let inserted = session.transaction(|session| {
        table.delete_all().execute(session)?;
        match &columns {
            Some(columns) => insert_into(session, &table, columns, rows),
            None => Ok(0),
        }
    })?;
    info!(table = table_name, rows = inserted, "replaced table contents");
    Ok(inserted)
}

/// Reflect `table_name`.
pub fn load_table<C: Connection>(session: &mut Session<C>, table_name: &str) -> DoltResult<TableHandle> {
    schema::reflect(session, table_name)
}

/// Every row of `table_name`, ordered by primary key when it has one.
pub fn load_rows<C: Connection>(session: &mut Session<C>, table_name: &str) -> DoltResult<Vec<Record>> {
    let table = schema::reflect(session, table_name)?;
    let mut select = table.select();
    for key in table.primary_key() {
        select = select.order_by(&key.name, Order::Asc);
    }
    let rs = select.build()?.query(session)?;
    Ok(rs.iter().map(|row| row.to_record()).collect())
}

fn insert_into<C: Connection>(
    session: &mut Session<C>,
    table: &TableHandle,
    columns: &[String],
    rows: &[Record],
) -> DoltResult<u64> {
    let mut insert = table.insert(columns)?;
    for record in rows {
        insert = insert.row(columns.iter().map(|c| record[c].clone()).collect());
    }
    insert.build().execute(session)
}

/// Column names shared by all `rows`, or `None` when there are no rows.
fn uniform_columns(rows: &[Record]) -> DoltResult<Option<Vec<String>>> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    if first.is_empty() {
        return Err(DoltError::InvalidInput("rows must have at least one column".into()));
    }
    for (i, row) in rows.iter().enumerate().skip(1) {
        if !row.keys().eq(first.keys()) {
            return Err(DoltError::InvalidInput(format!(
                "row {i} has columns {:?}, expected {:?}",
                row.keys().collect::<Vec<_>>(),
                first.keys().collect::<Vec<_>>()
            )));
        }
    }
    Ok(Some(first.keys().cloned().collect()))
}
