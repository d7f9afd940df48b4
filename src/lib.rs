//! doltkit - version-control actions for Dolt SQL databases
//!
//! Dolt keeps every table under git-style version control and exposes
//! that history through SQL: stored procedures (`DOLT_BRANCH`,
//! `DOLT_COMMIT`, `DOLT_MERGE`, ...) and system views (`dolt_log`,
//! `dolt_status`, `dolt_diff_<table>`, ...). This crate wraps that
//! contract in typed operations on a branch-bound [`Session`].
//!
//! # Example
//!
//! ```
//! use doltkit::store::memory::MemoryStore;
//! use doltkit::vcs::{self, Author};
//! use doltkit::{bulk, report, Session};
//! use serde_json::json;
//!
//! let store = MemoryStore::with_database("stocks");
//! let mut session = Session::bind(&store, "stocks", "main").unwrap();
//! session.execute("CREATE TABLE t (id INT PRIMARY KEY, val TEXT)", &[]).unwrap();
//!
//! let row = bulk::Record::from([("id".to_string(), json!(1)), ("val".to_string(), json!(null))]);
//! bulk::insert(&mut session, "t", &[row]).unwrap();
//! assert_eq!(report::diff(&mut session, "t").unwrap().len(), 1);
//!
//! let author: Author = "Ada <ada@example.com>".parse().unwrap();
//! let hash = vcs::commit(&mut session, &author, "m1").unwrap();
//! assert!(hash.is_some());
//! assert!(report::diff(&mut session, "t").unwrap().is_empty());
//! ```

pub mod bulk;
pub mod config;
pub mod error;
pub mod report;
pub mod schema;
pub mod session;
pub mod store;
pub mod vcs;

pub use config::ServerConfig;
pub use error::{DoltError, DoltResult};
pub use session::Session;
