//! In-process store implementing the Dolt procedure and system-table
//! contract.
//!
//! Every database keeps its own commit history and branches behind a
//! shared lock, so connections bound to different branches of the same
//! [`MemoryStore`] observe each other's commits the way sessions on a real
//! server do.
//!
//! ```
//! use doltkit::store::memory::MemoryStore;
//! use doltkit::store::{Connection, Connector};
//!
//! let store = MemoryStore::with_database("stocks");
//! let mut conn = store.connect("stocks", "main").unwrap();
//! let rs = conn.query("SELECT ACTIVE_BRANCH()", &[]).unwrap();
//! assert_eq!(rs.rows[0][0], "main");
//! ```

mod ast;
mod eval;
mod parser;
mod procedures;
mod repo;
mod views;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use self::ast::{Delete, Insert, Select, SelectColumn, Statement, Update};
use self::eval::{evaluate, matches_where, sort_order, unknown_function, Functions, Scope};
use self::parser::Parser;
use self::repo::{Repo, Table, Tables};
use self::views::{system_view, Relation};
use super::error::{
    StoreError, StoreResult, ER_BAD_FIELD, ER_NO_SUCH_TABLE, ER_PARSE_ERROR, ER_TABLE_EXISTS, ER_UNKNOWN,
};
use super::{connection_target, Connection, Connector, ResultSet, Value};

/// MySQL `ER_BAD_TABLE_ERROR`, raised by DROP TABLE on a missing table.
const ER_BAD_TABLE: u16 = 1051;
/// MySQL `ER_WRONG_VALUE_COUNT_ON_ROW`.
const ER_WRONG_VALUE_COUNT: u16 = 1136;
/// MySQL `ER_DB_CREATE_EXISTS`.
const ER_DB_EXISTS: u16 = 1007;

/// Branch every new database starts with.
pub const DEFAULT_BRANCH: &str = "main";

/// A set of in-memory databases.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    databases: Arc<Mutex<BTreeMap<String, Repo>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding one fresh database.
    pub fn with_database(name: &str) -> Self {
        let store = Self::new();
        store.databases.lock().insert(name.to_string(), Repo::init(DEFAULT_BRANCH));
        store
    }

    /// Create a database whose only branch is [`DEFAULT_BRANCH`].
    pub fn create_database(&self, name: &str) -> StoreResult<()> {
        self.create_database_with_branch(name, DEFAULT_BRANCH)
    }

    /// Create a database with a custom initial branch name.
    pub fn create_database_with_branch(&self, name: &str, branch: &str) -> StoreResult<()> {
        let mut databases = self.databases.lock();
        if databases.contains_key(name) {
            return Err(StoreError::rejected(
                ER_DB_EXISTS,
                format!("can't create database {name}; database exists"),
            ));
        }
        databases.insert(name.to_string(), Repo::init(branch));
        Ok(())
    }

    /// Names of all databases.
    pub fn databases(&self) -> Vec<String> {
        self.databases.lock().keys().cloned().collect()
    }
}

impl Connector for MemoryStore {
    type Connection = MemoryConnection;

    fn connect(&self, database: &str, branch: &str) -> StoreResult<MemoryConnection> {
        let target = connection_target(database, branch);
        let databases = self.databases.lock();
        let repo = databases.get(database).ok_or_else(|| StoreError::Connect {
            target: target.clone(),
            reason: format!("database not found: {database}"),
        })?;
        if !repo.has_branch(branch) {
            return Err(StoreError::Connect {
                target,
                reason: format!("branch not found: {branch}"),
            });
        }
        Ok(MemoryConnection {
            store: self.clone(),
            database: database.to_string(),
            branch: branch.to_string(),
            snapshot: None,
        })
    }
}

/// A connection to one branch of a [`MemoryStore`] database.
#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    database: String,
    branch: String,
    /// Working set captured by BEGIN, restored by ROLLBACK.
    snapshot: Option<Tables>,
}

/// Server functions visible to expressions.
struct Host<'a> {
    repo: &'a Repo,
    database: &'a str,
    branch: &'a str,
}

impl Functions for Host<'_> {
    fn call(&self, name: &str, args: &[Value]) -> StoreResult<Value> {
        match name {
            "ACTIVE_BRANCH" => Ok(Value::from(self.branch)),
            "DATABASE" => Ok(Value::from(self.database)),
            "HASHOF" => {
                let rev = args.first().and_then(Value::as_str).ok_or_else(|| {
                    StoreError::rejected(ER_UNKNOWN, "HASHOF expects a ref name")
                })?;
                Ok(Value::from(self.repo.resolve(self.branch, rev)?))
            }
            other => Err(unknown_function(other)),
        }
    }
}

impl MemoryConnection {
    /// Database this connection is bound to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Branch this connection is bound to.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> StoreResult<(ResultSet, u64)> {
        let stmt = Parser::parse(sql, params)
            .map_err(|e| StoreError::rejected(ER_PARSE_ERROR, e.to_string()))?;

        let store = self.store.clone();
        let mut databases = store.databases.lock();
        let repo = databases.get_mut(&self.database).ok_or_else(|| {
            StoreError::rejected(ER_UNKNOWN, format!("database not found: {}", self.database))
        })?;
        let branch = self.branch.clone();

        match stmt {
            Statement::Select(select) => {
                let rs = self.select(repo, select)?;
                let n = rs.len() as u64;
                Ok((rs, n))
            }
            Statement::Call { name, args } => {
                let rs = procedures::call(repo, &branch, &name, &args)?;
                Ok((rs, 0))
            }
            Statement::ShowTables => {
                let mut rs = ResultSet::new(vec![format!("Tables_in_{}", self.database)]);
                for name in repo.branch(&branch)?.working.keys() {
                    rs.push(vec![Value::from(name.as_str())]);
                }
                let n = rs.len() as u64;
                Ok((rs, n))
            }
            Statement::ShowColumns(name) => {
                let rs = show_columns(repo, &branch, &name)?;
                let n = rs.len() as u64;
                Ok((rs, n))
            }
            Statement::Begin => {
                self.snapshot = Some(repo.branch(&branch)?.working.clone());
                Ok((ResultSet::default(), 0))
            }
            Statement::Commit => {
                self.snapshot = None;
                Ok((ResultSet::default(), 0))
            }
            Statement::Rollback => {
                if let Some(snapshot) = self.snapshot.take() {
                    repo.branch_mut(&branch)?.working = snapshot;
                }
                Ok((ResultSet::default(), 0))
            }
            write => {
                let working = &mut repo.branch_mut(&branch)?.working;
                let n = apply_write(working, write)?;
                Ok((ResultSet::default(), n))
            }
        }
    }

    fn select(&self, repo: &Repo, select: Select) -> StoreResult<ResultSet> {
        let host = Host {
            repo,
            database: &self.database,
            branch: &self.branch,
        };

        let Some(from) = select.from else {
            let mut rs = ResultSet::default();
            let mut row = Vec::with_capacity(select.columns.len());
            for column in &select.columns {
                match column {
                    SelectColumn::Expr { expr, label } => {
                        rs.columns.push(label.clone());
                        row.push(evaluate(expr, Scope::empty(), &host)?);
                    }
                    _ => {
                        return Err(StoreError::rejected(ER_UNKNOWN, "no tables used"));
                    }
                }
            }
            rs.push(row);
            return Ok(rs);
        };

        let relation = resolve_relation(repo, &self.branch, &from)?;

        let mut rows = Vec::new();
        for row in relation.rows {
            let keep = match &select.where_clause {
                Some(expr) => matches_where(expr, Scope::new(&relation.columns, &row), &host)?,
                None => true,
            };
            if keep {
                rows.push(row);
            }
        }

        if !select.order_by.is_empty() {
            let keys = select
                .order_by
                .iter()
                .map(|ob| Ok((column_position(&relation.columns, &ob.column)?, ob.ascending)))
                .collect::<StoreResult<Vec<_>>>()?;
            rows.sort_by(|a, b| {
                keys.iter()
                    .map(|&(i, asc)| {
                        let ord = sort_order(&a[i], &b[i]);
                        if asc { ord } else { ord.reverse() }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let rows = rows
            .into_iter()
            .skip(select.offset.unwrap_or(0))
            .take(select.limit.unwrap_or(usize::MAX));

        let mut rs = ResultSet::default();
        for column in &select.columns {
            match column {
                SelectColumn::Wildcard => rs.columns.extend(relation.columns.iter().cloned()),
                SelectColumn::Column(name) => {
                    column_position(&relation.columns, name)?;
                    rs.columns.push(name.clone());
                }
                SelectColumn::Expr { label, .. } => rs.columns.push(label.clone()),
            }
        }
        for row in rows {
            let mut out = Vec::with_capacity(rs.columns.len());
            for column in &select.columns {
                match column {
                    SelectColumn::Wildcard => out.extend(row.iter().cloned()),
                    SelectColumn::Column(name) => {
                        out.push(row[column_position(&relation.columns, name)?].clone())
                    }
                    SelectColumn::Expr { expr, .. } => {
                        out.push(evaluate(expr, Scope::new(&relation.columns, &row), &host)?)
                    }
                }
            }
            rs.push(out);
        }
        Ok(rs)
    }
}

impl Connection for MemoryConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<ResultSet> {
        self.run(sql, params).map(|(rs, _)| rs)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<u64> {
        self.run(sql, params).map(|(_, n)| n)
    }
}

fn no_such_table(name: &str) -> StoreError {
    StoreError::rejected(ER_NO_SUCH_TABLE, format!("table not found: {name}"))
}

fn column_position(columns: &[String], name: &str) -> StoreResult<usize> {
    columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name))
        .ok_or_else(|| StoreError::rejected(ER_BAD_FIELD, format!("column \"{name}\" could not be found")))
}

/// Find a working table by name, ignoring case.
fn find_table<'t>(tables: &'t Tables, name: &str) -> Option<(&'t String, &'t Table)> {
    tables.iter().find(|(k, _)| k.eq_ignore_ascii_case(name))
}

fn resolve_relation(repo: &Repo, branch: &str, name: &str) -> StoreResult<Relation> {
    if let Some(view) = system_view(repo, branch, name)? {
        return Ok(view);
    }
    find_table(&repo.branch(branch)?.working, name)
        .map(|(_, t)| Relation::from_table(t))
        .ok_or_else(|| no_such_table(name))
}

fn show_columns(repo: &Repo, branch: &str, name: &str) -> StoreResult<ResultSet> {
    let mut rs = ResultSet::new(
        ["Field", "Type", "Null", "Key", "Default", "Extra"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
    );

    if let Some((_, table)) = find_table(&repo.branch(branch)?.working, name) {
        for column in &table.columns {
            rs.push(vec![
                Value::from(column.name.as_str()),
                Value::from(column.data_type.as_str()),
                Value::from(if column.nullable { "YES" } else { "NO" }),
                Value::from(if column.primary_key { "PRI" } else { "" }),
                Value::Null,
                Value::from(""),
            ]);
        }
        return Ok(rs);
    }

    let view = system_view(repo, branch, name)?.ok_or_else(|| no_such_table(name))?;
    for column in view.columns {
        rs.push(vec![
            Value::from(column),
            Value::from("text"),
            Value::from("YES"),
            Value::from(""),
            Value::Null,
            Value::from(""),
        ]);
    }
    Ok(rs)
}

/// Host for write statements: literals only, no server functions.
struct NoFunctions;

impl Functions for NoFunctions {
    fn call(&self, name: &str, _args: &[Value]) -> StoreResult<Value> {
        Err(unknown_function(name))
    }
}

fn apply_write(working: &mut Tables, stmt: Statement) -> StoreResult<u64> {
    match stmt {
        Statement::CreateTable(create) => {
            if find_table(working, &create.name).is_some() {
                if create.if_not_exists {
                    return Ok(0);
                }
                return Err(StoreError::rejected(
                    ER_TABLE_EXISTS,
                    format!("table with name {} already exists", create.name),
                ));
            }
            working.insert(create.name, Table::new(create.columns));
            Ok(0)
        }
        Statement::DropTable(drop) => {
            let key = find_table(working, &drop.name).map(|(k, _)| k.clone());
            match key {
                Some(key) => {
                    working.remove(&key);
                    Ok(0)
                }
                None if drop.if_exists => Ok(0),
                None => Err(StoreError::rejected(
                    ER_BAD_TABLE,
                    format!("Unknown table '{}'", drop.name),
                )),
            }
        }
        Statement::Insert(insert) => insert_rows(working, insert),
        Statement::Update(update) => update_rows(working, update),
        Statement::Delete(delete) => delete_rows(working, delete),
        other => Err(StoreError::rejected(
            ER_UNKNOWN,
            format!("unsupported statement: {other:?}"),
        )),
    }
}

fn table_mut<'t>(working: &'t mut Tables, name: &str) -> StoreResult<&'t mut Table> {
    let key = find_table(working, name)
        .map(|(k, _)| k.clone())
        .ok_or_else(|| no_such_table(name))?;
    working.get_mut(&key).ok_or_else(|| no_such_table(name))
}

fn insert_rows(working: &mut Tables, insert: Insert) -> StoreResult<u64> {
    let table = table_mut(working, &insert.table)?;
    let targets = match &insert.columns {
        Some(columns) => columns
            .iter()
            .map(|c| {
                table
                    .index_of(c)
                    .ok_or_else(|| StoreError::rejected(ER_BAD_FIELD, format!("unknown column '{c}'")))
            })
            .collect::<StoreResult<Vec<_>>>()?,
        None => (0..table.columns.len()).collect(),
    };

    // Stage into a copy so a failing row leaves the table untouched.
    let mut staged = table.clone();
    let mut count = 0;
    for values in &insert.values {
        if values.len() != targets.len() {
            return Err(StoreError::rejected(
                ER_WRONG_VALUE_COUNT,
                format!("column count doesn't match value count at row {}", count + 1),
            ));
        }
        let mut row = vec![Value::Null; staged.columns.len()];
        for (&index, expr) in targets.iter().zip(values) {
            row[index] = evaluate(expr, Scope::empty(), &NoFunctions)?;
        }
        staged.insert(row)?;
        count += 1;
    }
    *table = staged;
    Ok(count)
}

fn update_rows(working: &mut Tables, update: Update) -> StoreResult<u64> {
    let table = table_mut(working, &update.table)?;
    let names: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
    let assignments = update
        .assignments
        .iter()
        .map(|(column, expr)| Ok((column_position(&names, column)?, expr)))
        .collect::<StoreResult<Vec<_>>>()?;

    let mut rebuilt = Table::new(table.columns.clone());
    let mut count = 0;
    for row in table.rows.values() {
        let scope = Scope::new(&names, row);
        let hit = match &update.where_clause {
            Some(expr) => matches_where(expr, scope, &NoFunctions)?,
            None => true,
        };
        let mut next = row.clone();
        if hit {
            for (index, expr) in &assignments {
                next[*index] = evaluate(expr, scope, &NoFunctions)?;
            }
            count += 1;
        }
        rebuilt.insert(next)?;
    }
    *table = rebuilt;
    Ok(count)
}

fn delete_rows(working: &mut Tables, delete: Delete) -> StoreResult<u64> {
    let table = table_mut(working, &delete.table)?;
    let names: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
    let mut doomed = Vec::new();
    for (key, row) in &table.rows {
        let hit = match &delete.where_clause {
            Some(expr) => matches_where(expr, Scope::new(&names, row), &NoFunctions)?,
            None => true,
        };
        if hit {
            doomed.push(key.clone());
        }
    }
    for key in &doomed {
        table.rows.remove(key);
    }
    Ok(doomed.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connect() -> (MemoryStore, MemoryConnection) {
        let store = MemoryStore::with_database("db");
        let mut conn = store.connect("db", "main").unwrap();
        conn.execute("CREATE TABLE t (id INT PRIMARY KEY, val VARCHAR(20))", &[])
            .unwrap();
        (store, conn)
    }

    #[test]
    fn test_connect_unknown_branch() {
        let store = MemoryStore::with_database("db");
        let err = store.connect("db", "nope").unwrap_err();
        assert!(matches!(err, StoreError::Connect { ref target, .. } if target == "db/nope"));
        assert!(store.connect("other", "main").is_err());
    }

    #[test]
    fn test_insert_select_where_order() {
        let (_store, mut conn) = connect();
        let n = conn
            .execute(
                "INSERT INTO t (id, val) VALUES (?, ?), (?, ?), (?, ?)",
                &[json!(2), json!("b"), json!(1), json!("a"), json!(3), Value::Null],
            )
            .unwrap();
        assert_eq!(n, 3);

        let rs = conn
            .query("SELECT id FROM t WHERE val IS NOT NULL ORDER BY id DESC", &[])
            .unwrap();
        assert_eq!(rs.rows, vec![vec![json!(2)], vec![json!(1)]]);

        let rs = conn.query("SELECT * FROM t LIMIT 1 OFFSET 1", &[]).unwrap();
        assert_eq!(rs.columns, vec!["id", "val"]);
        assert_eq!(rs.rows, vec![vec![json!(2), json!("b")]]);
    }

    #[test]
    fn test_failed_insert_is_atomic() {
        let (_store, mut conn) = connect();
        let err = conn
            .execute("INSERT INTO t (id, val) VALUES (1, 'a'), (1, 'b')", &[])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
        assert!(conn.query("SELECT * FROM t", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_update_and_delete() {
        let (_store, mut conn) = connect();
        conn.execute("INSERT INTO t VALUES (1, NULL), (2, 'x')", &[]).unwrap();
        let n = conn
            .execute("UPDATE t SET val = ? WHERE val IS NULL", &[json!("filled")])
            .unwrap();
        assert_eq!(n, 1);
        let n = conn.execute("DELETE FROM t WHERE id = ?", &[json!(2)]).unwrap();
        assert_eq!(n, 1);
        let rs = conn.query("SELECT val FROM t", &[]).unwrap();
        assert_eq!(rs.rows, vec![vec![json!("filled")]]);
    }

    #[test]
    fn test_transaction_rollback_restores_rows() {
        let (_store, mut conn) = connect();
        conn.execute("INSERT INTO t VALUES (1, 'keep')", &[]).unwrap();
        conn.execute("BEGIN", &[]).unwrap();
        conn.execute("DELETE FROM t", &[]).unwrap();
        conn.execute("ROLLBACK", &[]).unwrap();
        assert_eq!(conn.query("SELECT * FROM t", &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_show_tables_and_columns() {
        let (_store, mut conn) = connect();
        let rs = conn.query("SHOW TABLES", &[]).unwrap();
        assert_eq!(rs.columns, vec!["Tables_in_db"]);
        assert_eq!(rs.rows, vec![vec![json!("t")]]);

        let rs = conn.query("SHOW COLUMNS FROM `t`", &[]).unwrap();
        let keys: Vec<_> = rs.iter().map(|r| r.named("Key").cloned()).collect();
        assert_eq!(keys, vec![Some(json!("PRI")), Some(json!(""))]);

        let rs = conn.query("SHOW COLUMNS FROM `dolt_diff_t`", &[]).unwrap();
        assert_eq!(rs.first().unwrap().str_at(0), Some("to_id"));

        let err = conn.query("SHOW COLUMNS FROM missing", &[]).unwrap_err();
        assert!(err.is_table_not_found());
    }

    #[test]
    fn test_branch_sessions_share_history() {
        let (store, mut main) = connect();
        main.query("CALL DOLT_COMMIT('-A', '-m', ?)", &[json!("create t")]).unwrap();
        main.query("CALL DOLT_BRANCH(?)", &[json!("dev")]).unwrap();

        let mut dev = store.connect("db", "dev").unwrap();
        let rs = dev.query("SELECT ACTIVE_BRANCH()", &[]).unwrap();
        assert_eq!(rs.rows[0][0], json!("dev"));
        assert_eq!(dev.query("SHOW TABLES", &[]).unwrap().len(), 1);

        let head = main.query("SELECT HASHOF('HEAD')", &[]).unwrap();
        let dev_head = dev.query("SELECT HASHOF('main')", &[]).unwrap();
        assert_eq!(head.rows, dev_head.rows);
    }

    #[test]
    fn test_parse_error_is_rejected() {
        let (_store, mut conn) = connect();
        let err = conn.query("SELEC nonsense", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Rejected { code: Some(ER_PARSE_ERROR), .. }));
    }
}
