use doltkit::bulk::{self, Record};
use doltkit::report::{self, DiffType};
use doltkit::schema::{self, SchemaError};
use doltkit::store::memory::{MemoryConnection, MemoryStore};
use doltkit::vcs::{self, Author, BranchOutcome, DEFAULT_PROTECTED};
use doltkit::{DoltError, Session};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn author() -> Author {
    Author::new("Test User", "test@example.com").unwrap()
}

fn record(id: i64, val: Value) -> Record {
    Record::from([("id".to_string(), json!(id)), ("val".to_string(), val)])
}

/// A `main` branch holding one committed, empty table `t(id, val)`.
fn setup() -> (MemoryStore, Session<MemoryConnection>) {
    let store = MemoryStore::with_database("db");
    let mut session = Session::bind(&store, "db", "main").unwrap();
    session
        .execute("CREATE TABLE t (id INT PRIMARY KEY, val TEXT)", &[])
        .unwrap();
    vcs::commit(&mut session, &author(), "create t").unwrap().unwrap();
    (store, session)
}

#[test]
fn test_bind_unknown_branch_fails() {
    let store = MemoryStore::with_database("db");
    let err = Session::bind(&store, "db", "nope").unwrap_err();
    assert!(matches!(err, DoltError::Connection { .. }));
    let err = Session::bind(&store, "other", "main").unwrap_err();
    assert!(matches!(err, DoltError::Connection { .. }));
}

#[test]
fn test_active_branch_matches_binding() {
    let (store, mut session) = setup();
    assert_eq!(report::active_branch(&mut session).unwrap(), "main");

    vcs::create_branch(&mut session, "dev").unwrap();
    let mut dev = vcs::checkout(&store, "db", "dev").unwrap();
    assert_eq!(report::active_branch(&mut dev).unwrap(), "dev");
    assert_eq!(dev.branch(), "dev");
}

#[test]
fn test_delete_non_primary_after_create() {
    let (_store, mut session) = setup();
    for name in ["feature-a", "feature-b", "fix/c"] {
        assert_eq!(vcs::create_branch(&mut session, name).unwrap(), BranchOutcome::Created);
    }

    let report = vcs::delete_non_primary_branches(&mut session, &DEFAULT_PROTECTED).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.deleted, vec!["feature-a", "feature-b", "fix/c"]);
    assert_eq!(vcs::list_branches(&mut session).unwrap(), vec!["main"]);
}

#[test]
fn test_delete_non_primary_reports_each_failure() {
    let (_store, mut session) = setup();
    vcs::create_branch(&mut session, "dev").unwrap();

    // the bound branch itself is not protected here, so its delete fails
    // while the other branch is still removed
    let report = vcs::delete_non_primary_branches(&mut session, &[]).unwrap();
    assert_eq!(report.deleted, vec!["dev"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "main");
    assert!(matches!(report.failed[0].1, DoltError::Operation { .. }));
}

#[test]
fn test_create_branch_is_idempotent() {
    let (_store, mut session) = setup();
    assert_eq!(vcs::create_branch(&mut session, "dev").unwrap(), BranchOutcome::Created);
    assert_eq!(vcs::create_branch(&mut session, "dev").unwrap(), BranchOutcome::Exists);
    assert_eq!(vcs::list_branches(&mut session).unwrap(), vec!["dev", "main"]);
}

#[test]
fn test_branch_names_are_bound_not_spliced() {
    let (_store, mut session) = setup();
    let name = "it's-a-branch";
    assert_eq!(vcs::create_branch(&mut session, name).unwrap(), BranchOutcome::Created);
    assert!(vcs::list_branches(&mut session).unwrap().iter().any(|b| b == name));
    vcs::delete_branch(&mut session, name, false).unwrap();
}

#[test]
fn test_empty_commit_returns_none() {
    let (_store, mut session) = setup();
    let before = report::log(&mut session).unwrap().len();
    assert_eq!(vcs::commit(&mut session, &author(), "nothing").unwrap(), None);
    assert_eq!(report::log(&mut session).unwrap().len(), before);
}

#[test]
fn test_commit_records_author() {
    let (_store, mut session) = setup();
    bulk::insert(&mut session, "t", &[record(1, json!("a"))]).unwrap();
    let hash = vcs::commit(&mut session, &author(), "add a").unwrap().unwrap();

    let log = report::log(&mut session).unwrap();
    assert_eq!(log[0].commit_hash, hash.as_str());
    assert_eq!(log[0].committer, "Test User");
    assert_eq!(log[0].email.as_deref(), Some("test@example.com"));
    assert_eq!(vcs::head_hash(&mut session).unwrap(), hash);
}

#[test]
fn test_reset_to_initial_leaves_one_entry() {
    let (_store, mut session) = setup();
    bulk::insert(&mut session, "t", &[record(1, json!("a"))]).unwrap();
    vcs::commit(&mut session, &author(), "second").unwrap();

    let initial = vcs::reset_to_initial(&mut session).unwrap();
    let log = report::log(&mut session).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].commit_hash, initial.as_str());
    assert_eq!(vcs::head_hash(&mut session).unwrap(), initial);
    assert_eq!(report::list_tables(&mut session).unwrap(), Vec::<String>::new());
}

#[test]
fn test_reset_to_initial_after_back_to_back_commits() {
    let store = MemoryStore::with_database("db");
    let mut session = Session::bind(&store, "db", "main").unwrap();
    let initial = vcs::head_hash(&mut session).unwrap();

    session
        .execute("CREATE TABLE t (id INT PRIMARY KEY, val TEXT)", &[])
        .unwrap();
    vcs::commit(&mut session, &author(), "c0").unwrap().unwrap();
    for id in 1..=5 {
        bulk::insert(&mut session, "t", &[record(id, Value::Null)]).unwrap();
        vcs::commit(&mut session, &author(), &format!("c{id}")).unwrap().unwrap();
    }

    assert_eq!(vcs::reset_to_initial(&mut session).unwrap(), initial);
    let log = report::log(&mut session).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message, "Initialize data repository");
}

#[test]
fn test_reset_to_previous_head_single_commit() {
    let store = MemoryStore::with_database("db");
    let mut session = Session::bind(&store, "db", "main").unwrap();
    let err = vcs::reset_to_previous_head(&mut session).unwrap_err();
    assert!(matches!(err, DoltError::EmptyResult(_)));
}

#[test]
fn test_reset_to_previous_head_undoes_last_commit() {
    let (_store, mut session) = setup();
    let first = vcs::head_hash(&mut session).unwrap();
    bulk::insert(&mut session, "t", &[record(1, json!("a"))]).unwrap();
    vcs::commit(&mut session, &author(), "add a").unwrap();

    assert_eq!(vcs::reset_to_previous_head(&mut session).unwrap(), first);
    assert_eq!(report::log(&mut session).unwrap()[0].message, "create t");
    assert!(bulk::load_rows(&mut session, "t").unwrap().is_empty());
}

#[test]
fn test_reset_hard_discards_working_changes() {
    let (_store, mut session) = setup();
    bulk::insert(&mut session, "t", &[record(1, json!("a"))]).unwrap();
    assert_eq!(report::status(&mut session).unwrap().len(), 1);

    vcs::reset_hard(&mut session, None).unwrap();
    assert!(report::status(&mut session).unwrap().is_empty());
    assert!(bulk::load_rows(&mut session, "t").unwrap().is_empty());
}

#[test]
fn test_diff_shows_added_rows_with_nulls() {
    let (_store, mut session) = setup();
    let rows = vec![record(1, Value::Null), record(2, Value::Null)];
    bulk::insert(&mut session, "t", &rows).unwrap();

    let diff = report::diff(&mut session, "t").unwrap();
    assert_eq!(diff.len(), 2);
    for row in &diff {
        assert_eq!(row.diff_type, DiffType::Added);
        assert_eq!(row.to["val"], Value::Null);
        assert_eq!(row.from["id"], Value::Null);
    }
    let mut ids: Vec<_> = diff.iter().map(|r| r.to["id"].clone()).collect();
    ids.sort_by_key(|v| v.as_i64());
    assert_eq!(ids, vec![json!(1), json!(2)]);
}

#[test]
fn test_diff_modified_and_removed() {
    let (_store, mut session) = setup();
    bulk::insert(&mut session, "t", &[record(1, json!("a")), record(2, json!("b"))]).unwrap();
    vcs::commit(&mut session, &author(), "seed").unwrap();

    session
        .execute("UPDATE t SET val = ? WHERE id = ?", &[json!("z"), json!(1)])
        .unwrap();
    session.execute("DELETE FROM t WHERE id = ?", &[json!(2)]).unwrap();

    let mut diff = report::diff_columns(&mut session, "t", &["val"]).unwrap();
    diff.sort_by_key(|r| r.diff_type.to_string());
    assert_eq!(diff.len(), 2);
    assert_eq!(diff[0].diff_type, DiffType::Modified);
    assert_eq!(diff[0].from["val"], json!("a"));
    assert_eq!(diff[0].to["val"], json!("z"));
    assert_eq!(diff[1].diff_type, DiffType::Removed);
    assert_eq!(diff[1].to["val"], Value::Null);
    assert!(!diff[0].to.contains_key("id"));
}

#[test]
fn test_diff_unknown_table_or_column() {
    let (_store, mut session) = setup();
    let err = report::diff(&mut session, "missing").unwrap_err();
    assert!(matches!(err, DoltError::Schema(SchemaError::TableNotFound(_))));

    let err = report::diff_columns(&mut session, "t", &["price"]).unwrap_err();
    assert!(matches!(err, DoltError::Schema(SchemaError::ColumnNotFound { .. })));
}

#[test]
fn test_status_reports_new_table() {
    let store = MemoryStore::with_database("db");
    let mut session = Session::bind(&store, "db", "main").unwrap();
    assert!(report::status(&mut session).unwrap().is_empty());

    session.execute("CREATE TABLE u (id INT PRIMARY KEY)", &[]).unwrap();
    let status = report::status(&mut session).unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].table_name, "u");
    assert_eq!(status[0].status, "new table");
    assert!(!status[0].staged);
}

#[test]
fn test_self_merge_has_no_conflicts() {
    let (_store, mut session) = setup();
    let head = vcs::head_hash(&mut session).unwrap();
    let log_len = report::log(&mut session).unwrap().len();

    let result = vcs::merge(&mut session, "main").unwrap();
    assert_eq!(result.conflicts, 0);
    assert!(!result.has_conflicts());
    assert!(result.fast_forward || result.commit.is_none());
    assert_eq!(result.commit, None);
    assert_eq!(vcs::head_hash(&mut session).unwrap(), head);
    assert_eq!(report::log(&mut session).unwrap().len(), log_len);
}

#[test]
fn test_merge_fast_forward() {
    let (store, mut main) = setup();
    vcs::create_branch(&mut main, "dev").unwrap();

    let mut dev = vcs::checkout(&store, "db", "dev").unwrap();
    bulk::insert(&mut dev, "t", &[record(1, json!("a"))]).unwrap();
    let dev_head = vcs::commit(&mut dev, &author(), "dev work").unwrap();

    let result = vcs::merge(&mut main, "dev").unwrap();
    assert!(result.fast_forward);
    assert_eq!(result.conflicts, 0);
    assert_eq!(result.commit, dev_head);
    assert_eq!(bulk::load_rows(&mut main, "t").unwrap(), vec![record(1, json!("a"))]);
}

#[test]
fn test_merge_reports_conflicts() {
    let (store, mut main) = setup();
    bulk::insert(&mut main, "t", &[record(1, json!("base"))]).unwrap();
    vcs::commit(&mut main, &author(), "base").unwrap();
    vcs::create_branch(&mut main, "dev").unwrap();

    let mut dev = vcs::checkout(&store, "db", "dev").unwrap();
    dev.execute("UPDATE t SET val = ? WHERE id = ?", &[json!("theirs"), json!(1)])
        .unwrap();
    vcs::commit(&mut dev, &author(), "theirs").unwrap();

    main.execute("UPDATE t SET val = ? WHERE id = ?", &[json!("ours"), json!(1)])
        .unwrap();
    let ours = vcs::commit(&mut main, &author(), "ours").unwrap();

    let result = vcs::merge(&mut main, "dev").unwrap();
    assert!(result.has_conflicts());
    assert_eq!(result.conflicts, 1);
    assert_eq!(result.commit, None);
    assert_eq!(vcs::head_hash(&mut main).ok(), ours);
}

#[test]
fn test_merge_unknown_branch_is_operation_error() {
    let (_store, mut session) = setup();
    let err = vcs::merge(&mut session, "ghost").unwrap_err();
    assert!(matches!(err, DoltError::Operation { .. }));
}

#[test]
fn test_scenario_insert_commit_diff() {
    let (_store, mut session) = setup();
    assert!(report::diff(&mut session, "t").unwrap().is_empty());

    bulk::insert(&mut session, "t", &[record(1, Value::Null)]).unwrap();
    let diff = report::diff(&mut session, "t").unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].diff_type, DiffType::Added);
    assert_eq!(diff[0].to["id"], json!(1));
    assert_eq!(diff[0].to["val"], Value::Null);

    vcs::commit(&mut session, &author(), "m1").unwrap().unwrap();
    let log = report::log(&mut session).unwrap();
    assert_eq!(log[0].message, "m1");
    assert_eq!(log.iter().filter(|e| e.message == "m1").count(), 1);
    assert!(report::diff(&mut session, "t").unwrap().is_empty());
}

#[test]
fn test_replace_table_shows_as_modified() {
    let (_store, mut session) = setup();
    bulk::insert(&mut session, "t", &[record(1, Value::Null), record(2, json!("x"))]).unwrap();
    vcs::commit(&mut session, &author(), "seed").unwrap();

    bulk::replace_table(&mut session, "t", &[record(1, json!("x")), record(2, json!("x"))]).unwrap();
    let diff = report::diff(&mut session, "t").unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].diff_type, DiffType::Modified);
    assert_eq!(diff[0].from["val"], Value::Null);
}

#[test]
fn test_dropped_table_restored_by_reset() {
    let (_store, mut session) = setup();
    assert_eq!(bulk::drop_table(&mut session, "t").unwrap(), bulk::DropOutcome::Dropped);
    assert!(schema::reflect(&mut session, "t").is_err());

    vcs::reset_hard(&mut session, None).unwrap();
    let table = bulk::load_table(&mut session, "t").unwrap();
    assert_eq!(table.column_names(), vec!["id", "val"]);
}
