//! Commits and resets.

use tracing::info;

use super::procedure::{Procedure, ADD, COMMIT, RESET};
use super::types::{Author, CommitHash};
use crate::error::{DoltError, DoltResult};
use crate::schema::{self, system, Order};
use crate::session::Session;
use crate::store::{value_as_string, Connection, ResultSet, Value};

/// Stage every table and commit with skip-empty semantics.
///
/// Returns `Ok(None)` when there was nothing to commit. Staging and
/// committing are separate calls; if the second fails, the changes stay
/// staged and the next `commit` stages them again.
pub fn commit<C: Connection>(
    session: &mut Session<C>,
    author: &Author,
    message: &str,
) -> DoltResult<Option<CommitHash>> {
    if message.trim().is_empty() {
        return Err(DoltError::InvalidInput("commit message must not be empty".into()));
    }

    Procedure::new(ADD).arg("-A").call(session)?;
    let rs = Procedure::new(COMMIT)
        .arg("--skip-empty")
        .arg("--author")
        .arg(author.to_string())
        .arg("-m")
        .arg(message)
        .call(session)?;

    let hash = first_text(&rs).map(CommitHash::new);
    match &hash {
        Some(hash) => info!(branch = session.branch(), commit = %hash, "committed"),
        None => info!(branch = session.branch(), "nothing to commit"),
    }
    Ok(hash)
}

/// Discard staged and working changes, moving the branch to `target`
/// (or keeping it at HEAD when `None`).
pub fn reset_hard<C: Connection>(session: &mut Session<C>, target: Option<&CommitHash>) -> DoltResult<()> {
    let mut call = Procedure::new(RESET).arg("--hard");
    if let Some(target) = target {
        call = call.arg(target.as_str());
    }
    call.call(session)?;
    match target {
        Some(target) => info!(branch = session.branch(), target = %target, "reset to commit"),
        None => info!(branch = session.branch(), "reset to HEAD"),
    }
    Ok(())
}

/// Hard-reset to the oldest commit in the branch's log.
pub fn reset_to_initial<C: Connection>(session: &mut Session<C>) -> DoltResult<CommitHash> {
    let log = schema::reflect(session, system::LOG)?;
    let rs = log
        .select()
        .columns(&["commit_hash"])
        .order_by("date", Order::Asc)
        .limit(1)
        .build()?
        .query(session)?;
    let initial = first_text(&rs)
        .map(CommitHash::new)
        .ok_or_else(|| DoltError::EmptyResult(format!("branch {} has no commits", session.branch())))?;
    reset_hard(session, Some(&initial))?;
    Ok(initial)
}

/// Undo the last commit: hard-reset to the first parent of HEAD.
///
/// Fails with [`DoltError::EmptyResult`] when HEAD has no parent.
pub fn reset_to_previous_head<C: Connection>(session: &mut Session<C>) -> DoltResult<CommitHash> {
    let head = head_hash(session)?;
    let ancestors = schema::reflect(session, system::COMMIT_ANCESTORS)?;
    let rs = ancestors
        .select()
        .columns(&["parent_hash"])
        .filter_eq("commit_hash", head.as_str())
        .filter_eq("parent_index", 0)
        .build()?
        .query(session)?;
    let parent = first_text(&rs).map(CommitHash::new).ok_or_else(|| {
        DoltError::EmptyResult(format!(
            "HEAD {} of branch {} has no previous commit",
            head.short(),
            session.branch()
        ))
    })?;
    reset_hard(session, Some(&parent))?;
    Ok(parent)
}

/// Hash of the bound branch's HEAD.
pub fn head_hash<C: Connection>(session: &mut Session<C>) -> DoltResult<CommitHash> {
    let rs = session.query("SELECT HASHOF(?)", &[Value::from("HEAD")])?;
    first_text(&rs)
        .map(CommitHash::new)
        .ok_or_else(|| DoltError::UnexpectedResult("HASHOF('HEAD') returned nothing".into()))
}

/// First cell of the first row as non-empty text.
fn first_text(rs: &ResultSet) -> Option<String> {
    rs.first()
        .and_then(|row| row.get(0))
        .and_then(value_as_string)
        .filter(|s| !s.is_empty())
}
