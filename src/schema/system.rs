//! Names of the Dolt system tables and views.

/// One row per branch: `name`, `hash`, latest commit metadata.
pub const BRANCHES: &str = "dolt_branches";
/// Commit history of the bound branch.
pub const LOG: &str = "dolt_log";
/// Tables with staged or unstaged changes.
pub const STATUS: &str = "dolt_status";
/// `(commit_hash, parent_hash, parent_index)` for every commit.
pub const COMMIT_ANCESTORS: &str = "dolt_commit_ancestors";
/// Prefix of the per-table diff views.
pub const DIFF_PREFIX: &str = "dolt_diff_";
/// `to_commit` value marking the uncommitted working set.
pub const WORKING: &str = "WORKING";

/// Name of the diff view for `table`.
pub fn diff_view(table: &str) -> String {
    format!("{DIFF_PREFIX}{table}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_view_name() {
        assert_eq!(diff_view("dividend"), "dolt_diff_dividend");
    }
}
