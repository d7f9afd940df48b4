//! Branch listing, creation and deletion.

use tracing::{info, warn};

use super::procedure::{Procedure, BRANCH};
use super::types::{BranchOutcome, DeletionReport};
use crate::error::{DoltError, DoltResult};
use crate::schema::{self, system, Order};
use crate::session::Session;
use crate::store::{value_as_string, Connection};

/// Names of every branch, sorted.
pub fn list_branches<C: Connection>(session: &mut Session<C>) -> DoltResult<Vec<String>> {
    let view = schema::reflect(session, system::BRANCHES)?;
    let rs = view
        .select()
        .columns(&["name"])
        .order_by("name", Order::Asc)
        .build()?
        .query(session)?;
    rs.iter()
        .map(|row| {
            row.get(0)
                .and_then(value_as_string)
                .ok_or_else(|| DoltError::UnexpectedResult("branch row without a name".into()))
        })
        .collect()
}

/// Create `name` at the session's HEAD unless a branch with that exact
/// name already exists.
///
/// Another session may create the same branch between the existence check
/// and the call; the server rejects that as an operation error.
pub fn create_branch<C: Connection>(session: &mut Session<C>, name: &str) -> DoltResult<BranchOutcome> {
    validate_name(name)?;
    if list_branches(session)?.iter().any(|b| b == name) {
        info!(branch = name, "branch exists");
        return Ok(BranchOutcome::Exists);
    }
    Procedure::new(BRANCH).arg(name).call(session)?;
    info!(branch = name, from = session.branch(), "created branch");
    Ok(BranchOutcome::Created)
}

/// Delete one branch. Without `force` the server refuses branches whose
/// commits are not merged into the bound branch.
pub fn delete_branch<C: Connection>(session: &mut Session<C>, name: &str, force: bool) -> DoltResult<()> {
    validate_name(name)?;
    let flag = if force { "-D" } else { "-d" };
    Procedure::new(BRANCH).arg(flag).arg(name).call(session)?;
    info!(branch = name, force, "deleted branch");
    Ok(())
}

/// Force-delete every branch not named in `protected`.
///
/// Each delete is attempted independently; failures are collected in the
/// report rather than stopping the sweep. Only the initial listing can
/// fail the whole call.
pub fn delete_non_primary_branches<C: Connection>(
    session: &mut Session<C>,
    protected: &[&str],
) -> DoltResult<DeletionReport> {
    let mut report = DeletionReport::default();
    for name in list_branches(session)? {
        if protected.contains(&name.as_str()) {
            continue;
        }
        match delete_branch(session, &name, true) {
            Ok(()) => report.deleted.push(name),
            Err(e) => {
                warn!(branch = %name, error = %e, "failed to delete branch");
                report.failed.push((name, e));
            }
        }
    }
    Ok(report)
}

fn validate_name(name: &str) -> DoltResult<()> {
    if name.trim().is_empty() {
        return Err(DoltError::InvalidInput("branch name must not be empty".into()));
    }
    Ok(())
}
