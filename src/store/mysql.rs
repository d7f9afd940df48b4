//! MySQL wire-protocol backend for a running Dolt SQL server.
//!
//! The driver is async; each connector owns a current-thread runtime and
//! blocks on it so the rest of the crate stays synchronous.

use std::sync::Arc;

use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlDatabaseError, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column as _, ConnectOptions, Executor, MySql, Row as _, TypeInfo, ValueRef};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::{connection_target, Connection, Connector, ResultSet, Value};
use crate::config::ServerConfig;

/// Opens branch-bound connections to a Dolt SQL server.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: ServerConfig,
    runtime: Arc<Runtime>,
}

impl MySqlConnector {
    /// Create a connector for the configured server.
    pub fn new(config: ServerConfig) -> StoreResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Connect {
                target: config.address(),
                reason: format!("cannot start runtime: {e}"),
            })?;
        Ok(Self {
            config,
            runtime: Arc::new(runtime),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn options(&self, target: &str) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .database(target);
        match &self.config.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    fn connect(&self, database: &str, branch: &str) -> StoreResult<MySqlConnection> {
        let target = connection_target(database, branch);
        debug!(server = %self.config.address(), %target, "connecting");
        let options = self.options(&target);
        let conn = self
            .runtime
            .block_on(options.connect())
            .map_err(|e| StoreError::Connect {
                target: target.clone(),
                reason: e.to_string(),
            })?;
        Ok(MySqlConnection {
            conn,
            runtime: self.runtime.clone(),
        })
    }
}

/// A connection to one branch on a Dolt SQL server.
pub struct MySqlConnection {
    conn: sqlx::MySqlConnection,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection").finish_non_exhaustive()
    }
}

impl Connection for MySqlConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> StoreResult<ResultSet> {
        let conn = &mut self.conn;
        let rows = self
            .runtime
            .block_on(async {
                if params.is_empty() {
                    conn.fetch_all(sql).await
                } else {
                    bind_all(sqlx::query(sql), params).fetch_all(&mut *conn).await
                }
            })
            .map_err(map_error)?;

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => Vec::new(),
        };
        let mut rs = ResultSet::new(columns);
        for row in &rows {
            rs.push(decode_row(row)?);
        }
        Ok(rs)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> StoreResult<u64> {
        let conn = &mut self.conn;
        let result = self
            .runtime
            .block_on(async {
                if params.is_empty() {
                    conn.execute(sql).await
                } else {
                    bind_all(sqlx::query(sql), params).execute(&mut *conn).await
                }
            })
            .map_err(map_error)?;
        Ok(result.rows_affected())
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => query.bind(i),
                (None, Some(u)) => query.bind(u),
                _ => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn map_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => StoreError::Rejected {
            code: db.try_downcast_ref::<MySqlDatabaseError>().map(|e| e.number()),
            message: db.message().to_string(),
        },
        other => StoreError::Rejected {
            code: None,
            message: other.to_string(),
        },
    }
}

fn decode_row(row: &MySqlRow) -> StoreResult<Vec<Value>> {
    (0..row.columns().len()).map(|i| decode_cell(row, i)).collect()
}

/// Convert one cell to a JSON value by its MySQL type name.
fn decode_cell(row: &MySqlRow, index: usize) -> StoreResult<Value> {
    let column = &row.columns()[index];
    let err = |e: sqlx::Error| StoreError::Decode {
        column: column.name().to_string(),
        reason: e.to_string(),
    };

    if row.try_get_raw(index).map_err(err)?.is_null() {
        return Ok(Value::Null);
    }

    let value = match CellKind::of(column.type_info().name()) {
        CellKind::Bool => Value::Bool(row.try_get::<bool, _>(index).map_err(err)?),
        CellKind::Signed => Value::from(row.try_get::<i64, _>(index).map_err(err)?),
        CellKind::Unsigned => Value::from(row.try_get::<u64, _>(index).map_err(err)?),
        CellKind::Float => Value::from(f64::from(row.try_get::<f32, _>(index).map_err(err)?)),
        CellKind::Double => Value::from(row.try_get::<f64, _>(index).map_err(err)?),
        CellKind::Date => Value::from(
            row.try_get::<chrono::NaiveDate, _>(index)
                .map_err(err)?
                .to_string(),
        ),
        CellKind::Time => Value::from(
            row.try_get::<chrono::NaiveTime, _>(index)
                .map_err(err)?
                .format("%H:%M:%S%.f")
                .to_string(),
        ),
        CellKind::DateTime => Value::from(
            row.try_get::<chrono::NaiveDateTime, _>(index)
                .map_err(err)?
                .format("%Y-%m-%d %H:%M:%S%.f")
                .to_string(),
        ),
        CellKind::Timestamp => Value::from(
            row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)
                .map_err(err)?
                .to_rfc3339(),
        ),
        CellKind::Json => row.try_get::<sqlx::types::Json<Value>, _>(index).map_err(err)?.0,
        CellKind::Bytes => {
            let bytes = row.try_get::<Vec<u8>, _>(index).map_err(err)?;
            Value::from(String::from_utf8_lossy(&bytes).into_owned())
        }
        CellKind::Text => Value::from(row.try_get_unchecked::<String, _>(index).map_err(err)?),
    };
    Ok(value)
}

/// How a column's values are decoded, by MySQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Bool,
    Signed,
    Unsigned,
    Float,
    Double,
    Date,
    Time,
    DateTime,
    Timestamp,
    Json,
    Bytes,
    /// DECIMAL, CHAR, VARCHAR, TEXT, ENUM and SET arrive as text on both
    /// protocols.
    Text,
}

impl CellKind {
    fn of(type_name: &str) -> Self {
        match type_name {
            "BOOLEAN" => CellKind::Bool,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => CellKind::Signed,
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => CellKind::Unsigned,
            "FLOAT" => CellKind::Float,
            "DOUBLE" => CellKind::Double,
            "DATE" => CellKind::Date,
            "TIME" => CellKind::Time,
            "DATETIME" => CellKind::DateTime,
            "TIMESTAMP" => CellKind::Timestamp,
            "JSON" => CellKind::Json,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => CellKind::Bytes,
            _ => CellKind::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_errors_have_no_code() {
        let err = map_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Rejected { code: None, .. }));
        assert!(!err.is_table_not_found());
    }

    #[test]
    fn test_temporal_types_are_decoded_natively() {
        assert_eq!(CellKind::of("TIME"), CellKind::Time);
        assert_eq!(CellKind::of("DATE"), CellKind::Date);
        assert_eq!(CellKind::of("DATETIME"), CellKind::DateTime);
        assert_eq!(CellKind::of("TIMESTAMP"), CellKind::Timestamp);
        assert_eq!(CellKind::of("DECIMAL"), CellKind::Text);
        assert_eq!(CellKind::of("BIGINT UNSIGNED"), CellKind::Unsigned);
    }

    #[test]
    fn test_connector_keeps_config() {
        let config = ServerConfig::default().host("dolt.local").port(3307);
        let connector = MySqlConnector::new(config.clone()).unwrap();
        assert_eq!(connector.config(), &config);
    }
}
