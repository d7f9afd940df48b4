//! Version-control actions.
//!
//! Every action runs on a bound [`Session`](crate::session::Session) and
//! applies to that session's branch. Mutations are issued as Dolt stored
//! procedures whose arguments are always bound parameters; their tabular
//! results are read back into the types in this module. No history is
//! cached client-side: each call asks the server.
//!
//! ```
//! use doltkit::session::Session;
//! use doltkit::store::memory::MemoryStore;
//! use doltkit::vcs::{self, Author, BranchOutcome};
//!
//! let store = MemoryStore::with_database("db");
//! let mut session = Session::bind(&store, "db", "main").unwrap();
//!
//! assert_eq!(vcs::create_branch(&mut session, "dev").unwrap(), BranchOutcome::Created);
//! assert_eq!(vcs::create_branch(&mut session, "dev").unwrap(), BranchOutcome::Exists);
//!
//! let author: Author = "Ada <ada@example.com>".parse().unwrap();
//! assert!(vcs::commit(&mut session, &author, "nothing yet").unwrap().is_none());
//! ```

mod branch;
mod commit;
mod merge;
mod procedure;
mod types;

pub use branch::{create_branch, delete_branch, delete_non_primary_branches, list_branches};
pub use commit::{commit, head_hash, reset_hard, reset_to_initial, reset_to_previous_head};
pub use merge::{checkout, merge};
pub use types::{Author, BranchOutcome, CommitHash, DeletionReport, MergeResult, DEFAULT_PROTECTED};
