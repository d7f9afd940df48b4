//! Typed outcomes of version-control operations.

use std::fmt;
use std::str::FromStr;

use crate::error::{DoltError, DoltResult};

/// Branch names that bulk deletion never touches unless told otherwise.
pub const DEFAULT_PROTECTED: [&str; 2] = ["main", "master"];

/// An opaque commit identifier as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitHash(String);

impl CommitHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CommitHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A commit author, rendered as `Name <email>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> DoltResult<Self> {
        let author = Self {
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
        };
        if author.name.is_empty() || author.email.is_empty() {
            return Err(DoltError::InvalidInput(
                "author name and email must be non-empty".into(),
            ));
        }
        if author.name.contains(['<', '>']) || author.email.contains(['<', '>']) {
            return Err(DoltError::InvalidInput(format!(
                "author must not contain angle brackets: {author}"
            )));
        }
        Ok(author)
    }
}

impl FromStr for Author {
    type Err = DoltError;

    /// Parse `Name <email>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DoltError::InvalidInput(format!("author must look like 'Name <email>': {s:?}"));
        let (name, rest) = s.split_once('<').ok_or_else(invalid)?;
        let email = rest.trim_end().strip_suffix('>').ok_or_else(invalid)?;
        Author::new(name, email).map_err(|_| invalid())
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Result of `create_branch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    Created,
    /// The name was already taken; nothing was changed.
    Exists,
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// Resulting commit, or `None` when nothing was committed.
    pub commit: Option<CommitHash>,
    pub fast_forward: bool,
    /// Rows (or tables) in conflict; non-zero means the merge needs an operator.
    pub conflicts: u64,
    /// Server-provided summary, when the server sends one.
    pub message: Option<String>,
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        self.conflicts > 0
    }
}

impl fmt::Display for MergeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.commit {
            Some(hash) => write!(f, "merged at {}", hash.short())?,
            None => write!(f, "no merge commit")?,
        }
        if self.fast_forward {
            write!(f, " (fast-forward)")?;
        }
        if self.has_conflicts() {
            write!(f, ", {} conflict(s)", self.conflicts)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Per-branch results of a bulk delete.
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, DoltError)>,
}

impl DeletionReport {
    /// True when every attempted delete succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for DeletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deleted {} branch(es)", self.deleted.len())?;
        for (name, err) in &self.failed {
            write!(f, "\n  failed to delete {name}: {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_parse_and_display() {
        let author: Author = "Jane Doe <jane@example.com>".parse().unwrap();
        assert_eq!(author.name, "Jane Doe");
        assert_eq!(author.email, "jane@example.com");
        assert_eq!(author.to_string(), "Jane Doe <jane@example.com>");

        assert!("jane@example.com".parse::<Author>().is_err());
        assert!(" <jane@example.com>".parse::<Author>().is_err());
        assert!(Author::new("a<b", "c").is_err());
    }

    #[test]
    fn test_commit_hash_short() {
        let hash = CommitHash::new("0123456789abcdef");
        assert_eq!(hash.short(), "01234567");
        assert_eq!(CommitHash::new("abc").short(), "abc");
    }

    #[test]
    fn test_merge_result_display() {
        let result = MergeResult {
            commit: None,
            fast_forward: false,
            conflicts: 2,
            message: None,
        };
        assert!(result.has_conflicts());
        assert_eq!(result.to_string(), "no merge commit, 2 conflict(s)");
    }
}
