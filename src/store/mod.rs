//! Connected-session abstraction over a Dolt-compatible SQL store.
//!
//! The action layer never talks to a driver directly. It sends SQL text
//! with positional `?` placeholders through a [`Connection`], and obtains
//! connections bound to a `(database, branch)` pair from a [`Connector`].
//!
//! Two implementations ship with the crate:
//!
//! - [`memory::MemoryStore`]: an in-process store that understands the
//!   Dolt procedure and system-table contract. Used for tests and demos.
//! - `mysql::MySqlConnector` (feature `mysql`): a real server connection
//!   over the MySQL wire protocol.

mod error;
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;
mod result;

pub use error::{table_not_found, StoreError, StoreResult, ER_NO_SUCH_TABLE};
pub use result::{value_as_bool, value_as_string, value_as_u64, ResultSet, Row};

/// A single SQL value.
pub type Value = serde_json::Value;

/// An open connection scoped to one database branch.
///
/// Dropping the connection releases it.
pub trait Connection {
    /// Run a statement that returns rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<ResultSet>;

    /// Run a statement that does not return rows, yielding the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<u64>;
}

/// Opens connections bound to a database branch.
pub trait Connector {
    type Connection: Connection;

    /// Open a connection whose identity is `<database>/<branch>`.
    fn connect(&self, database: &str, branch: &str) -> StoreResult<Self::Connection>;
}

impl<C: Connector + ?Sized> Connector for &C {
    type Connection = C::Connection;

    fn connect(&self, database: &str, branch: &str) -> StoreResult<Self::Connection> {
        (**self).connect(database, branch)
    }
}

/// Connection target string understood by Dolt: the branch rides in the
/// database name.
pub fn connection_target(database: &str, branch: &str) -> String {
    format!("{database}/{branch}")
}
