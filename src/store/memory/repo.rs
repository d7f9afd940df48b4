//! Commit history, branches and working sets of one in-memory database.
//!
//! Each branch owns a head commit plus two mutable table sets: the staged
//! set (what the next commit records) and the working set (what queries
//! see). Commits snapshot the staged set and are never removed.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use ulid::Ulid;

use crate::store::error::{StoreError, StoreResult, ER_DUP_ENTRY, ER_UNKNOWN};
use crate::store::Value;

/// Author recorded on commits the store makes by itself.
const SYSTEM_COMMITTER: (&str, &str) = ("doltkit", "doltkit@localhost");

/// A row, one value per column.
pub(crate) type Row = Vec<Value>;

/// Tables keyed by name.
pub(crate) type Tables = BTreeMap<String, Table>;

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnDef {
    pub(crate) fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
        }
    }
}

/// A table: columns plus rows keyed by primary key.
///
/// Keyless tables key rows by their full content, so two tables with the
/// same rows compare equal regardless of insertion order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Table {
    pub columns: Vec<ColumnDef>,
    pub rows: BTreeMap<String, Row>,
}

impl Table {
    pub(crate) fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    pub(crate) fn index_of(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(column))
    }

    fn base_key(&self, row: &Row) -> String {
        let pk: Vec<&Value> = self
            .columns
            .iter()
            .zip(row)
            .filter(|(c, _)| c.primary_key)
            .map(|(_, v)| v)
            .collect();
        if pk.is_empty() {
            serde_json::to_string(row).unwrap_or_default()
        } else {
            serde_json::to_string(&pk).unwrap_or_default()
        }
    }

    fn is_keyless(&self) -> bool {
        !self.columns.iter().any(|c| c.primary_key)
    }

    /// Insert a row, rejecting duplicate primary keys.
    pub(crate) fn insert(&mut self, row: Row) -> StoreResult<()> {
        for (column, value) in self.columns.iter().zip(&row) {
            if !column.nullable && value.is_null() {
                return Err(StoreError::rejected(
                    1048,
                    format!("column '{}' cannot be null", column.name),
                ));
            }
        }

        let base = self.base_key(&row);
        if self.is_keyless() {
            let mut key = base.clone();
            let mut n = 1;
            while self.rows.contains_key(&key) {
                key = format!("{base}#{n}");
                n += 1;
            }
            self.rows.insert(key, row);
            return Ok(());
        }

        if self.rows.contains_key(&base) {
            return Err(StoreError::rejected(
                ER_DUP_ENTRY,
                format!("duplicate primary key given: {base}"),
            ));
        }
        self.rows.insert(base, row);
        Ok(())
    }
}

/// An immutable commit.
#[derive(Debug, Clone)]
pub(crate) struct CommitRecord {
    pub hash: String,
    pub parents: Vec<String>,
    pub committer: String,
    pub email: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub root: Tables,
}

/// A branch pointer with its staged and working sets.
#[derive(Debug, Clone)]
pub(crate) struct BranchState {
    pub head: String,
    pub staged: Tables,
    pub working: Tables,
}

/// Options for [`Repo::commit`].
#[derive(Debug, Clone, Default)]
pub(crate) struct CommitOptions {
    pub author: Option<(String, String)>,
    pub message: String,
    pub skip_empty: bool,
    pub allow_empty: bool,
}

/// Outcome of [`Repo::merge`], mirroring the merge procedure's result row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergeOutcome {
    pub hash: Option<String>,
    pub fast_forward: bool,
    pub conflicts: u64,
    pub message: String,
}

/// One database: its commits and branches.
#[derive(Debug, Clone)]
pub(crate) struct Repo {
    commits: HashMap<String, CommitRecord>,
    branches: BTreeMap<String, BranchState>,
    last_date: DateTime<Utc>,
}

fn fail(message: impl Into<String>) -> StoreError {
    StoreError::rejected(ER_UNKNOWN, message)
}

impl Repo {
    /// Create a database whose single branch holds the initial commit.
    pub(crate) fn init(default_branch: &str) -> Self {
        let mut repo = Self {
            commits: HashMap::new(),
            branches: BTreeMap::new(),
            last_date: DateTime::<Utc>::MIN_UTC,
        };
        let date = repo.next_date();
        let hash = new_hash();
        repo.commits.insert(
            hash.clone(),
            CommitRecord {
                hash: hash.clone(),
                parents: vec![],
                committer: SYSTEM_COMMITTER.0.into(),
                email: SYSTEM_COMMITTER.1.into(),
                date,
                message: "Initialize data repository".into(),
                root: Tables::new(),
            },
        );
        repo.branches.insert(
            default_branch.to_string(),
            BranchState {
                head: hash,
                staged: Tables::new(),
                working: Tables::new(),
            },
        );
        repo
    }

    /// Strictly increasing commit timestamps at millisecond precision,
    /// the precision `dolt_log.date` is rendered with.
    fn next_date(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(3);
        let date = if now > self.last_date {
            now
        } else {
            self.last_date + Duration::milliseconds(1)
        };
        self.last_date = date;
        date
    }

    pub(crate) fn has_branch(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    pub(crate) fn branches(&self) -> impl Iterator<Item = (&String, &BranchState)> {
        self.branches.iter()
    }

    pub(crate) fn branch(&self, name: &str) -> StoreResult<&BranchState> {
        self.branches
            .get(name)
            .ok_or_else(|| fail(format!("branch not found: {name}")))
    }

    pub(crate) fn branch_mut(&mut self, name: &str) -> StoreResult<&mut BranchState> {
        self.branches
            .get_mut(name)
            .ok_or_else(|| fail(format!("branch not found: {name}")))
    }

    pub(crate) fn commit(&self, hash: &str) -> StoreResult<&CommitRecord> {
        self.commits
            .get(hash)
            .ok_or_else(|| fail(format!("commit not found: {hash}")))
    }

    pub(crate) fn commits(&self) -> impl Iterator<Item = &CommitRecord> {
        self.commits.values()
    }

    pub(crate) fn head_commit(&self, branch: &str) -> StoreResult<&CommitRecord> {
        let head = &self.branch(branch)?.head;
        self.commit(head)
    }

    /// Resolve `HEAD`, `HEAD~n`, `HEAD^`, a branch name or a commit hash.
    pub(crate) fn resolve(&self, current: &str, rev: &str) -> StoreResult<String> {
        let (base, back) = match rev.split_once('~') {
            Some((base, n)) if n.is_empty() => (base, 1),
            Some((base, n)) => (
                base,
                n.parse::<usize>()
                    .map_err(|_| fail(format!("invalid revision: {rev}")))?,
            ),
            None => match rev.strip_suffix('^') {
                Some(base) => (base, 1),
                None => (rev, 0),
            },
        };

        let mut hash = if base.eq_ignore_ascii_case("HEAD") {
            self.branch(current)?.head.clone()
        } else if let Some(branch) = self.branches.get(base) {
            branch.head.clone()
        } else if self.commits.contains_key(base) {
            base.to_string()
        } else {
            return Err(fail(format!("branch or commit not found: {base}")));
        };

        for _ in 0..back {
            hash = self
                .commit(&hash)?
                .parents
                .first()
                .cloned()
                .ok_or_else(|| fail(format!("invalid ancestor revision: {rev}")))?;
        }
        Ok(hash)
    }

    pub(crate) fn create_branch(&mut self, name: &str, start: &str) -> StoreResult<()> {
        if self.branches.contains_key(name) {
            return Err(fail(format!("fatal: A branch named '{name}' already exists.")));
        }
        let root = self.commit(start)?.root.clone();
        self.branches.insert(
            name.to_string(),
            BranchState {
                head: start.to_string(),
                staged: root.clone(),
                working: root,
            },
        );
        Ok(())
    }

    pub(crate) fn delete_branch(&mut self, current: &str, name: &str, force: bool) -> StoreResult<()> {
        let target = self.branch(name)?.head.clone();
        if name == current {
            return Err(fail(format!("cannot delete checked out branch '{name}'")));
        }
        if !force {
            let current_head = &self.branch(current)?.head;
            if !self.is_ancestor(&target, current_head) {
                return Err(fail(format!(
                    "branch '{name}' is not fully merged; use force to delete it"
                )));
            }
        }
        self.branches.remove(name);
        Ok(())
    }

    pub(crate) fn stage_all(&mut self, branch: &str) -> StoreResult<()> {
        let state = self.branch_mut(branch)?;
        state.staged = state.working.clone();
        Ok(())
    }

    pub(crate) fn stage_tables(&mut self, branch: &str, tables: &[String]) -> StoreResult<()> {
        let state = self.branch_mut(branch)?;
        for name in tables {
            match state.working.get(name) {
                Some(table) => {
                    state.staged.insert(name.clone(), table.clone());
                }
                None if state.staged.contains_key(name) => {
                    state.staged.remove(name);
                }
                None => return Err(fail(format!("table not found: {name}"))),
            }
        }
        Ok(())
    }

    /// Unstage everything, keeping the working set.
    pub(crate) fn reset_soft(&mut self, branch: &str) -> StoreResult<()> {
        let root = self.head_commit(branch)?.root.clone();
        self.branch_mut(branch)?.staged = root;
        Ok(())
    }

    /// Move the branch to `target` and discard staged and working changes.
    pub(crate) fn reset_hard(&mut self, branch: &str, target: &str) -> StoreResult<()> {
        let root = self.commit(target)?.root.clone();
        let state = self.branch_mut(branch)?;
        state.head = target.to_string();
        state.staged = root.clone();
        state.working = root;
        Ok(())
    }

    /// Commit the staged set. `Ok(None)` means nothing was committed.
    pub(crate) fn commit_staged(
        &mut self,
        branch: &str,
        options: CommitOptions,
    ) -> StoreResult<Option<String>> {
        if options.message.trim().is_empty() {
            return Err(fail("must provide commit message"));
        }
        let head = self.head_commit(branch)?;
        let parent = head.hash.clone();
        let staged = self.branch(branch)?.staged.clone();

        if staged == head.root && !options.allow_empty {
            if options.skip_empty {
                return Ok(None);
            }
            return Err(fail("nothing to commit"));
        }

        let (committer, email) = options.author.unwrap_or_else(|| {
            (SYSTEM_COMMITTER.0.to_string(), SYSTEM_COMMITTER.1.to_string())
        });
        let date = self.next_date();
        let hash = new_hash();
        self.commits.insert(
            hash.clone(),
            CommitRecord {
                hash: hash.clone(),
                parents: vec![parent],
                committer,
                email,
                date,
                message: options.message,
                root: staged,
            },
        );
        self.branch_mut(branch)?.head = hash.clone();
        Ok(Some(hash))
    }

    /// Merge `source` (branch or commit) into `branch`.
    pub(crate) fn merge(&mut self, branch: &str, source: &str) -> StoreResult<MergeOutcome> {
        let theirs = self.resolve(branch, source)?;
        let state = self.branch(branch)?;
        let ours = state.head.clone();

        if state.working != self.commit(&ours)?.root || state.staged != state.working {
            return Err(fail("cannot merge with uncommitted changes"));
        }

        if self.is_ancestor(&theirs, &ours) {
            return Ok(MergeOutcome {
                hash: None,
                fast_forward: false,
                conflicts: 0,
                message: "Everything up-to-date".into(),
            });
        }

        if self.is_ancestor(&ours, &theirs) {
            self.reset_hard(branch, &theirs)?;
            return Ok(MergeOutcome {
                hash: Some(theirs),
                fast_forward: true,
                conflicts: 0,
                message: "merge successful".into(),
            });
        }

        let base_root = match self.merge_base(&ours, &theirs) {
            Some(base) => self.commit(&base)?.root.clone(),
            None => Tables::new(),
        };
        let ours_root = self.commit(&ours)?.root.clone();
        let theirs_root = self.commit(&theirs)?.root.clone();

        let (merged, conflicts) = merge_roots(&base_root, &ours_root, &theirs_root);
        if conflicts > 0 {
            return Ok(MergeOutcome {
                hash: None,
                fast_forward: false,
                conflicts,
                message: "conflicts found".into(),
            });
        }

        let date = self.next_date();
        let hash = new_hash();
        self.commits.insert(
            hash.clone(),
            CommitRecord {
                hash: hash.clone(),
                parents: vec![ours, theirs],
                committer: SYSTEM_COMMITTER.0.into(),
                email: SYSTEM_COMMITTER.1.into(),
                date,
                message: format!("Merge {source} into {branch}"),
                root: merged,
            },
        );
        self.reset_hard(branch, &hash)?;
        Ok(MergeOutcome {
            hash: Some(hash),
            fast_forward: false,
            conflicts: 0,
            message: "merge successful".into(),
        })
    }

    /// Every commit reachable from `head`, newest first.
    pub(crate) fn history(&self, head: &str) -> Vec<&CommitRecord> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([head.to_string()]);
        let mut out = Vec::new();
        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&hash) {
                queue.extend(commit.parents.iter().cloned());
                out.push(commit);
            }
        }
        out.sort_by(|a, b| b.date.cmp(&a.date));
        out
    }

    fn is_ancestor(&self, ancestor: &str, of: &str) -> bool {
        self.history(of).iter().any(|c| c.hash == ancestor)
    }

    fn merge_base(&self, a: &str, b: &str) -> Option<String> {
        let theirs: BTreeSet<&str> = self.history(b).iter().map(|c| c.hash.as_str()).collect();
        self.history(a)
            .into_iter()
            .find(|c| theirs.contains(c.hash.as_str()))
            .map(|c| c.hash.clone())
    }
}

fn new_hash() -> String {
    Ulid::new().to_string().to_ascii_lowercase()
}

/// Three-way merge of table sets, returning the merged set and the number
/// of conflicting rows (or tables, when schemas diverge).
fn merge_roots(base: &Tables, ours: &Tables, theirs: &Tables) -> (Tables, u64) {
    let names: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
    let mut merged = Tables::new();
    let mut conflicts = 0;

    for name in names {
        let (b, o, t) = (base.get(name), ours.get(name), theirs.get(name));
        let result = if o == t || t == b {
            o.cloned()
        } else if o == b {
            t.cloned()
        } else {
            match (o, t) {
                (Some(o), Some(t)) if o.columns == t.columns => {
                    let (table, n) = merge_rows(b.filter(|b| b.columns == o.columns), o, t);
                    conflicts += n;
                    Some(table)
                }
                _ => {
                    conflicts += 1;
                    o.cloned()
                }
            }
        };
        if let Some(table) = result {
            merged.insert(name.clone(), table);
        }
    }
    (merged, conflicts)
}

fn merge_rows(base: Option<&Table>, ours: &Table, theirs: &Table) -> (Table, u64) {
    let empty = BTreeMap::new();
    let base_rows = base.map(|b| &b.rows).unwrap_or(&empty);
    let keys: BTreeSet<&String> = base_rows
        .keys()
        .chain(ours.rows.keys())
        .chain(theirs.rows.keys())
        .collect();

    let mut table = Table::new(ours.columns.clone());
    let mut conflicts = 0;
    for key in keys {
        let (b, o, t) = (base_rows.get(key), ours.rows.get(key), theirs.rows.get(key));
        let row = if o == t || t == b {
            o
        } else if o == b {
            t
        } else {
            conflicts += 1;
            o
        };
        if let Some(row) = row {
            table.rows.insert(key.clone(), row.clone());
        }
    }
    (table, conflicts)
}
