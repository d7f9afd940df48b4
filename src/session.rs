//! Branch-bound sessions.
//!
//! A [`Session`] pairs an open connection with the database and branch it
//! was bound to. The branch never changes for the life of the session; to
//! work on another branch, bind a new session.
//!
//! ```
//! use doltkit::session::Session;
//! use doltkit::store::memory::MemoryStore;
//!
//! let store = MemoryStore::with_database("stocks");
//! let session = Session::bind(&store, "stocks", "main").unwrap();
//! assert_eq!(session.branch(), "main");
//! ```

use tracing::{debug, info, warn};

use crate::error::{DoltError, DoltResult};
use crate::store::{Connection, Connector, ResultSet, Value};

/// An open connection bound to `(database, branch)`.
#[derive(Debug)]
pub struct Session<C: Connection> {
    database: String,
    branch: String,
    conn: C,
}

impl<C: Connection> Session<C> {
    /// Open a connection to `branch` of `database`.
    pub fn bind<K>(connector: &K, database: &str, branch: &str) -> DoltResult<Self>
    where
        K: Connector<Connection = C> + ?Sized,
    {
        if database.is_empty() || branch.is_empty() {
            return Err(DoltError::InvalidInput(format!(
                "database and branch must be non-empty (got {database:?}, {branch:?})"
            )));
        }
        let conn = connector.connect(database, branch)?;
        info!(database, branch, "using branch");
        Ok(Self {
            database: database.to_string(),
            branch: branch.to_string(),
            conn,
        })
    }

    /// Wrap an already-open connection.
    pub fn from_connection(database: impl Into<String>, branch: impl Into<String>, conn: C) -> Self {
        Self {
            database: database.into(),
            branch: branch.into(),
            conn,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Run a statement that returns rows.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> DoltResult<ResultSet> {
        debug!(branch = %self.branch, sql, params = params.len(), "query");
        Ok(self.conn.query(sql, params)?)
    }

    /// Run a statement for its effect, returning the affected row count.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> DoltResult<u64> {
        debug!(branch = %self.branch, sql, params = params.len(), "execute");
        Ok(self.conn.execute(sql, params)?)
    }

    /// Run `f` between BEGIN and COMMIT, rolling back if it fails.
    pub fn transaction<F, T>(&mut self, f: F) -> DoltResult<T>
    where
        F: FnOnce(&mut Self) -> DoltResult<T>,
    {
        self.execute("BEGIN", &[])?;
        match f(self) {
            Ok(result) => {
                self.execute("COMMIT", &[])?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback) = self.execute("ROLLBACK", &[]) {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Release the connection.
    pub fn close(self) {
        debug!(database = %self.database, branch = %self.branch, "session closed");
    }
}
