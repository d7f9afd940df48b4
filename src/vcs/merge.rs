//! Merges and branch checkout.

use tracing::{info, warn};

use super::procedure::{Procedure, MERGE};
use super::types::{CommitHash, MergeResult};
use crate::error::{DoltError, DoltResult};
use crate::session::Session;
use crate::store::{value_as_bool, value_as_string, value_as_u64, Connection, Connector, ResultSet};

/// Merge `branch` into the session's bound branch.
///
/// Conflicts are reported through [`MergeResult::conflicts`], never
/// resolved.
pub fn merge<C: Connection>(session: &mut Session<C>, branch: &str) -> DoltResult<MergeResult> {
    if branch.trim().is_empty() {
        return Err(DoltError::InvalidInput("merge source must not be empty".into()));
    }
    let rs = Procedure::new(MERGE).arg(branch).call(session)?;
    let result = parse_merge(&rs)?;

    if result.has_conflicts() {
        warn!(into = session.branch(), from = branch, conflicts = result.conflicts, "merge has conflicts");
    } else {
        info!(
            into = session.branch(),
            from = branch,
            commit = ?result.commit.as_ref().map(CommitHash::as_str),
            fast_forward = result.fast_forward,
            "merged"
        );
    }
    Ok(result)
}

/// Read the positional `(hash, fast_forward, conflicts[, message])` row.
fn parse_merge(rs: &ResultSet) -> DoltResult<MergeResult> {
    let row = rs
        .first()
        .ok_or_else(|| DoltError::UnexpectedResult("merge returned no rows".into()))?;
    if row.len() < 3 {
        return Err(DoltError::UnexpectedResult(format!(
            "merge returned {} column(s), expected at least 3",
            row.len()
        )));
    }

    let commit = row
        .get(0)
        .and_then(value_as_string)
        .filter(|s| !s.is_empty())
        .map(CommitHash::new);
    let fast_forward = row
        .get(1)
        .and_then(value_as_bool)
        .ok_or_else(|| DoltError::UnexpectedResult("merge fast_forward is not a flag".into()))?;
    let conflicts = row
        .get(2)
        .and_then(value_as_u64)
        .ok_or_else(|| DoltError::UnexpectedResult("merge conflicts is not a count".into()))?;
    let message = row.get(3).and_then(value_as_string).filter(|s| !s.is_empty());

    Ok(MergeResult {
        commit,
        fast_forward,
        conflicts,
        message,
    })
}

/// Bind a session to another branch.
///
/// Branches are part of the connection identity, so moving between them
/// means opening a new session.
pub fn checkout<K: Connector + ?Sized>(
    connector: &K,
    database: &str,
    branch: &str,
) -> DoltResult<Session<K::Connection>> {
    Session::bind(connector, database, branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn merge_rows(values: Vec<serde_json::Value>) -> ResultSet {
        let mut rs = ResultSet::new(
            ["hash", "fast_forward", "conflicts", "message"]
                .iter()
                .take(values.len())
                .map(|c| c.to_string())
                .collect(),
        );
        rs.push(values);
        rs
    }

    #[test]
    fn test_parse_fast_forward() {
        let result = parse_merge(&merge_rows(vec![json!("abc"), json!(1), json!(0)])).unwrap();
        assert_eq!(result.commit, Some(CommitHash::new("abc")));
        assert!(result.fast_forward);
        assert_eq!(result.conflicts, 0);
        assert_eq!(result.message, None);
    }

    #[test]
    fn test_parse_conflicts_with_empty_hash() {
        let result = parse_merge(&merge_rows(vec![
            json!(""),
            json!("0"),
            json!("3"),
            json!("conflicts found"),
        ]))
        .unwrap();
        assert_eq!(result.commit, None);
        assert!(!result.fast_forward);
        assert_eq!(result.conflicts, 3);
        assert_eq!(result.message.as_deref(), Some("conflicts found"));
    }

    #[test]
    fn test_parse_short_row() {
        let err = parse_merge(&merge_rows(vec![json!("abc")])).unwrap_err();
        assert!(matches!(err, DoltError::UnexpectedResult(_)));
        assert!(parse_merge(&ResultSet::default()).is_err());
    }
}
