//! Working-set status, history and row-level diffs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{DoltError, DoltResult};
use crate::schema::{self, system, Order, SchemaError, TableHandle};
use crate::session::Session;
use crate::store::{value_as_bool, value_as_string, Connection, Row, Value};

/// Name of the branch the server thinks the session is on.
pub fn active_branch<C: Connection>(session: &mut Session<C>) -> DoltResult<String> {
    let rs = session.query("SELECT ACTIVE_BRANCH()", &[])?;
    rs.first()
        .and_then(|row| row.get(0))
        .and_then(value_as_string)
        .ok_or_else(|| DoltError::UnexpectedResult("ACTIVE_BRANCH() returned nothing".into()))
}

/// Tables on the bound branch.
pub fn list_tables<C: Connection>(session: &mut Session<C>) -> DoltResult<Vec<String>> {
    let rs = session.query("SHOW TABLES", &[])?;
    Ok(rs.iter().filter_map(|row| row.get(0).and_then(value_as_string)).collect())
}

/// A table with uncommitted changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub table_name: String,
    /// `new table`, `modified`, `deleted`, ...
    pub status: String,
    pub staged: bool,
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let area = if self.staged { "staged" } else { "unstaged" };
        write!(f, "{}: {} ({area})", self.table_name, self.status)
    }
}

/// Tables with uncommitted modifications; empty means a clean working set.
pub fn status<C: Connection>(session: &mut Session<C>) -> DoltResult<Vec<TableStatus>> {
    let view = schema::reflect(session, system::STATUS)?;
    let has_staged = view.has_column("staged");
    let mut columns = vec!["table_name", "status"];
    if has_staged {
        columns.push("staged");
    }
    let rs = view
        .select()
        .columns(&columns)
        .order_by("table_name", Order::Asc)
        .build()?
        .query(session)?;

    rs.iter()
        .map(|row| {
            Ok(TableStatus {
                table_name: required_text(&row, "table_name")?,
                status: required_text(&row, "status")?,
                staged: has_staged && row.named("staged").and_then(value_as_bool).unwrap_or(false),
            })
        })
        .collect()
}

/// One commit of the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub commit_hash: String,
    pub committer: String,
    pub email: Option<String>,
    pub date: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "commit {}", self.commit_hash)?;
        match &self.email {
            Some(email) => writeln!(f, "Author: {} <{email}>", self.committer)?,
            None => writeln!(f, "Author: {}", self.committer)?,
        }
        writeln!(f, "Date:   {}", self.date)?;
        write!(f, "\n    {}", self.message)
    }
}

/// Commits reachable from the bound branch's HEAD, newest first.
pub fn log<C: Connection>(session: &mut Session<C>) -> DoltResult<Vec<LogEntry>> {
    let view = schema::reflect(session, system::LOG)?;
    let rs = view
        .select()
        .order_by("date", Order::Desc)
        .build()?
        .query(session)?;

    rs.iter()
        .map(|row| {
            Ok(LogEntry {
                commit_hash: required_text(&row, "commit_hash")?,
                committer: required_text(&row, "committer")?,
                email: row.named("email").and_then(value_as_string),
                date: row.named("date").and_then(value_as_string).unwrap_or_default(),
                message: row.named("message").and_then(value_as_string).unwrap_or_default(),
            })
        })
        .collect()
}

/// How a row changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    Added,
    Removed,
    Modified,
}

impl FromStr for DiffType {
    type Err = DoltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(DiffType::Added),
            "removed" => Ok(DiffType::Removed),
            "modified" => Ok(DiffType::Modified),
            other => Err(DoltError::UnexpectedResult(format!("unknown diff type: {other}"))),
        }
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiffType::Added => "added",
            DiffType::Removed => "removed",
            DiffType::Modified => "modified",
        })
    }
}

/// One changed row with its values before and after, keyed by the
/// underlying table's column names.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRow {
    pub diff_type: DiffType,
    pub from: BTreeMap<String, Value>,
    pub to: BTreeMap<String, Value>,
}

impl fmt::Display for DiffRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |values: &BTreeMap<String, Value>| {
            values
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self.diff_type {
            DiffType::Added => write!(f, "+ {}", side(&self.to)),
            DiffType::Removed => write!(f, "- {}", side(&self.from)),
            DiffType::Modified => write!(f, "~ {} -> {}", side(&self.from), side(&self.to)),
        }
    }
}

/// Uncommitted row changes of `table_name`.
pub fn diff<C: Connection>(session: &mut Session<C>, table_name: &str) -> DoltResult<Vec<DiffRow>> {
    let view = schema::reflect(session, &system::diff_view(table_name))?;
    let columns = tracked_columns(&view);
    working_diff(session, &view, &columns)
}

/// Uncommitted row changes of `table_name`, restricted to `columns`.
pub fn diff_columns<C: Connection>(
    session: &mut Session<C>,
    table_name: &str,
    columns: &[&str],
) -> DoltResult<Vec<DiffRow>> {
    let view = schema::reflect(session, &system::diff_view(table_name))?;
    let tracked = tracked_columns(&view);
    let mut selected = Vec::with_capacity(columns.len());
    for column in columns {
        match tracked.iter().find(|t| t.eq_ignore_ascii_case(column)) {
            Some(name) => selected.push(name.clone()),
            None => {
                return Err(SchemaError::ColumnNotFound {
                    table: table_name.to_string(),
                    column: column.to_string(),
                }
                .into())
            }
        }
    }
    working_diff(session, &view, &selected)
}

/// Underlying table columns, recovered from the view's `to_<column>` names.
fn tracked_columns(view: &TableHandle) -> Vec<String> {
    view.column_names()
        .into_iter()
        .filter_map(|c| c.strip_prefix("to_"))
        .filter(|c| !matches!(*c, "commit" | "commit_date"))
        .map(str::to_string)
        .collect()
}

fn working_diff<C: Connection>(
    session: &mut Session<C>,
    view: &TableHandle,
    columns: &[String],
) -> DoltResult<Vec<DiffRow>> {
    let mut projection = vec!["diff_type".to_string()];
    for column in columns {
        projection.push(format!("from_{column}"));
        projection.push(format!("to_{column}"));
    }
    let rs = view
        .select()
        .columns(&projection)
        .filter_eq("to_commit", system::WORKING)
        .build()?
        .query(session)?;

    rs.iter()
        .map(|row| {
            let diff_type = required_text(&row, "diff_type")?.parse()?;
            let side = |prefix: &str| -> BTreeMap<String, Value> {
                columns
                    .iter()
                    .map(|c| {
                        let value = row.named(&format!("{prefix}{c}")).cloned().unwrap_or(Value::Null);
                        (c.clone(), value)
                    })
                    .collect()
            };
            Ok(DiffRow {
                diff_type,
                from: side("from_"),
                to: side("to_"),
            })
        })
        .collect()
}

fn required_text(row: &Row<'_>, column: &str) -> DoltResult<String> {
    row.named(column)
        .and_then(value_as_string)
        .ok_or_else(|| DoltError::UnexpectedResult(format!("missing {column} in result row")))
}
