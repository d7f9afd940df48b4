//! System views computed from a repository on every read.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::store::error::{StoreError, StoreResult, ER_NO_SUCH_TABLE};
use crate::store::Value;

use super::repo::{CommitRecord, Repo, Row, Table, Tables};

/// Marker used for the working set in diff views.
pub(crate) const WORKING: &str = "WORKING";

const DIFF_PREFIX: &str = "dolt_diff_";

/// Columns plus rows, the shape every FROM source is reduced to.
#[derive(Debug, Clone, Default)]
pub(crate) struct Relation {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Relation {
    fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows of a user table in key order.
    pub(crate) fn from_table(table: &Table) -> Self {
        Self {
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            rows: table.rows.values().cloned().collect(),
        }
    }
}

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Materialize `name` if it is a system view; `Ok(None)` otherwise.
pub(crate) fn system_view(repo: &Repo, branch: &str, name: &str) -> StoreResult<Option<Relation>> {
    let lower = name.to_ascii_lowercase();
    let relation = match lower.as_str() {
        "dolt_branches" => branches(repo),
        "dolt_log" => log(repo, branch)?,
        "dolt_status" => status(repo, branch)?,
        "dolt_commit_ancestors" => commit_ancestors(repo),
        _ => match lower.strip_prefix(DIFF_PREFIX) {
            Some(table) => diff(repo, branch, &name[DIFF_PREFIX.len()..], table)?,
            None => return Ok(None),
        },
    };
    Ok(Some(relation))
}

fn branches(repo: &Repo) -> Relation {
    let mut rel = Relation::new(&[
        "name",
        "hash",
        "latest_committer",
        "latest_committer_email",
        "latest_commit_date",
        "latest_commit_message",
    ]);
    for (name, state) in repo.branches() {
        let Ok(head) = repo.commit(&state.head) else {
            continue;
        };
        rel.rows.push(vec![
            Value::from(name.as_str()),
            Value::from(head.hash.as_str()),
            Value::from(head.committer.as_str()),
            Value::from(head.email.as_str()),
            Value::from(format_date(&head.date)),
            Value::from(head.message.as_str()),
        ]);
    }
    rel
}

fn log(repo: &Repo, branch: &str) -> StoreResult<Relation> {
    let head = &repo.branch(branch)?.head;
    let mut rel = Relation::new(&["commit_hash", "committer", "email", "date", "message"]);
    for commit in repo.history(head) {
        rel.rows.push(vec![
            Value::from(commit.hash.as_str()),
            Value::from(commit.committer.as_str()),
            Value::from(commit.email.as_str()),
            Value::from(format_date(&commit.date)),
            Value::from(commit.message.as_str()),
        ]);
    }
    Ok(rel)
}

fn status(repo: &Repo, branch: &str) -> StoreResult<Relation> {
    let state = repo.branch(branch)?;
    let head = &repo.commit(&state.head)?.root;
    let mut rel = Relation::new(&["table_name", "staged", "status"]);
    for (staged, from, to) in [(true, head, &state.staged), (false, &state.staged, &state.working)] {
        for (table, change) in changed_tables(from, to) {
            rel.rows
                .push(vec![Value::from(table), Value::Bool(staged), Value::from(change)]);
        }
    }
    Ok(rel)
}

fn changed_tables<'a>(from: &'a Tables, to: &'a Tables) -> Vec<(&'a str, &'static str)> {
    let names: BTreeSet<&String> = from.keys().chain(to.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| match (from.get(name), to.get(name)) {
            (None, Some(_)) => Some((name.as_str(), "new table")),
            (Some(_), None) => Some((name.as_str(), "deleted")),
            (Some(a), Some(b)) if a != b => Some((name.as_str(), "modified")),
            _ => None,
        })
        .collect()
}

fn commit_ancestors(repo: &Repo) -> Relation {
    let mut rel = Relation::new(&["commit_hash", "parent_hash", "parent_index"]);
    for commit in repo.commits() {
        for (index, parent) in commit.parents.iter().enumerate() {
            rel.rows.push(vec![
                Value::from(commit.hash.as_str()),
                Value::from(parent.as_str()),
                Value::from(index as u64),
            ]);
        }
    }
    rel
}

/// One snapshot of a table on either side of a diff.
struct Side<'a> {
    table: Option<&'a Table>,
    commit: String,
    date: Option<String>,
}

fn diff(repo: &Repo, branch: &str, requested: &str, lower: &str) -> StoreResult<Relation> {
    let state = repo.branch(branch)?;
    let head = repo.commit(&state.head)?;
    let lookup = |tables: &Tables| -> Option<String> {
        tables
            .keys()
            .find(|k| k.eq_ignore_ascii_case(lower))
            .cloned()
    };

    let history = repo.history(&head.hash);
    let table_name = lookup(&state.working)
        .or_else(|| history.iter().find_map(|c| lookup(&c.root)))
        .ok_or_else(|| {
            StoreError::rejected(ER_NO_SUCH_TABLE, format!("table not found: {DIFF_PREFIX}{requested}"))
        })?;

    let columns: Vec<String> = state
        .working
        .get(&table_name)
        .or_else(|| history.iter().find_map(|c| c.root.get(&table_name)))
        .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();

    let mut names = Vec::with_capacity(columns.len() * 2 + 5);
    names.extend(columns.iter().map(|c| format!("to_{c}")));
    names.extend(["to_commit".to_string(), "to_commit_date".to_string()]);
    names.extend(columns.iter().map(|c| format!("from_{c}")));
    names.extend([
        "from_commit".to_string(),
        "from_commit_date".to_string(),
        "diff_type".to_string(),
    ]);
    let mut rel = Relation {
        columns: names,
        rows: Vec::new(),
    };

    let working = Side {
        table: state.working.get(&table_name),
        commit: WORKING.to_string(),
        date: None,
    };
    push_row_changes(&mut rel, &columns, &commit_side(head, &table_name), &working);

    let mut cursor = head;
    while let Some(parent) = cursor.parents.first() {
        let parent = repo.commit(parent)?;
        let (from, to) = (commit_side(parent, &table_name), commit_side(cursor, &table_name));
        push_row_changes(&mut rel, &columns, &from, &to);
        cursor = parent;
    }
    Ok(rel)
}

fn commit_side<'a>(commit: &'a CommitRecord, table: &str) -> Side<'a> {
    Side {
        table: commit.root.get(table),
        commit: commit.hash.clone(),
        date: Some(format_date(&commit.date)),
    }
}

fn push_row_changes(rel: &mut Relation, columns: &[String], from: &Side<'_>, to: &Side<'_>) {
    let keys: BTreeSet<&String> = from
        .table
        .map(|t| t.rows.keys())
        .into_iter()
        .flatten()
        .chain(to.table.map(|t| t.rows.keys()).into_iter().flatten())
        .collect();

    for key in keys {
        let before = from.table.and_then(|t| t.rows.get(key));
        let after = to.table.and_then(|t| t.rows.get(key));
        let diff_type = match (before, after) {
            (None, Some(_)) => "added",
            (Some(_), None) => "removed",
            (Some(a), Some(b)) if a != b => "modified",
            _ => continue,
        };

        let mut row = project(columns, to.table, after);
        row.push(Value::from(to.commit.as_str()));
        row.push(to.date.clone().map_or(Value::Null, Value::from));
        row.extend(project(columns, from.table, before));
        row.push(Value::from(from.commit.as_str()));
        row.push(from.date.clone().map_or(Value::Null, Value::from));
        row.push(Value::from(diff_type));
        rel.rows.push(row);
    }
}

/// Values of `columns` from a row, NULL where absent.
fn project(columns: &[String], table: Option<&Table>, row: Option<&Row>) -> Vec<Value> {
    columns
        .iter()
        .map(|c| {
            table
                .and_then(|t| t.index_of(c))
                .and_then(|i| row.and_then(|r| r.get(i)))
                .cloned()
                .unwrap_or(Value::Null)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::repo::{ColumnDef, CommitOptions};
    use super::*;
    use serde_json::json;

    fn repo_with_row() -> Repo {
        let mut repo = Repo::init("main");
        let mut id = ColumnDef::new("id", "int");
        id.primary_key = true;
        let mut table = Table::new(vec![id, ColumnDef::new("val", "text")]);
        table.insert(vec![json!(1), Value::Null]).unwrap();
        repo.branch_mut("main").unwrap().working.insert("t".into(), table);
        repo
    }

    #[test]
    fn test_status_reports_unstaged_new_table() {
        let repo = repo_with_row();
        let rel = system_view(&repo, "main", "dolt_status").unwrap().unwrap();
        assert_eq!(rel.rows, vec![vec![json!("t"), json!(false), json!("new table")]]);
    }

    #[test]
    fn test_diff_working_added_row() {
        let repo = repo_with_row();
        let rel = system_view(&repo, "main", "dolt_diff_t").unwrap().unwrap();
        assert_eq!(
            rel.columns,
            vec![
                "to_id", "to_val", "to_commit", "to_commit_date", "from_id", "from_val",
                "from_commit", "from_commit_date", "diff_type"
            ]
        );
        assert_eq!(rel.rows.len(), 1);
        let row = &rel.rows[0];
        assert_eq!(row[0], json!(1));
        assert_eq!(row[1], Value::Null);
        assert_eq!(row[2], json!(WORKING));
        assert_eq!(row[8], json!("added"));
    }

    #[test]
    fn test_diff_after_commit_moves_to_history() {
        let mut repo = repo_with_row();
        repo.stage_all("main").unwrap();
        let hash = repo
            .commit_staged("main", CommitOptions { message: "m1".into(), ..Default::default() })
            .unwrap()
            .unwrap();
        let rel = system_view(&repo, "main", "dolt_diff_t").unwrap().unwrap();
        assert_eq!(rel.rows.len(), 1);
        assert_eq!(rel.rows[0][2], json!(hash));

        let rel = system_view(&repo, "main", "dolt_log").unwrap().unwrap();
        assert_eq!(rel.rows.len(), 2);
        assert_eq!(rel.rows[0][4], json!("m1"));
    }

    #[test]
    fn test_unknown_diff_table() {
        let repo = Repo::init("main");
        let err = system_view(&repo, "main", "dolt_diff_missing").unwrap_err();
        assert!(err.is_table_not_found());
        assert!(system_view(&repo, "main", "users").unwrap().is_none());
    }

    #[test]
    fn test_root_commit_has_no_ancestors() {
        let repo = Repo::init("main");
        let rel = system_view(&repo, "main", "dolt_commit_ancestors").unwrap().unwrap();
        assert!(rel.rows.is_empty());
    }
}
