//! Stored-procedure calls with fully parameterized arguments.

use crate::error::DoltResult;
use crate::schema::Statement;
use crate::session::Session;
use crate::store::{Connection, ResultSet, Value};

pub(crate) const BRANCH: &str = "DOLT_BRANCH";
pub(crate) const ADD: &str = "DOLT_ADD";
pub(crate) const COMMIT: &str = "DOLT_COMMIT";
pub(crate) const RESET: &str = "DOLT_RESET";
pub(crate) const MERGE: &str = "DOLT_MERGE";

/// `CALL NAME(?, ?, ...)` where every flag and value is a parameter.
#[derive(Debug, Clone)]
pub(crate) struct Procedure {
    name: &'static str,
    args: Vec<Value>,
}

impl Procedure {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            args: Vec::new(),
        }
    }

    pub(crate) fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Value::String(value.into()));
        self
    }

    pub(crate) fn statement(&self) -> Statement {
        let placeholders = vec!["?"; self.args.len()].join(", ");
        Statement::with_params(format!("CALL {}({placeholders})", self.name), self.args.clone())
    }

    pub(crate) fn call<C: Connection>(&self, session: &mut Session<C>) -> DoltResult<ResultSet> {
        self.statement().query(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_statement_is_parameterized() {
        let stmt = Procedure::new(COMMIT)
            .arg("--author")
            .arg("O'Brien <ob@example.com>")
            .arg("-m")
            .arg("it's done")
            .statement();
        assert_eq!(stmt.sql, "CALL DOLT_COMMIT(?, ?, ?, ?)");
        assert_eq!(stmt.params[3], json!("it's done"));
    }

    #[test]
    fn test_no_arguments() {
        assert_eq!(Procedure::new(ADD).statement().sql, "CALL DOLT_ADD()");
    }
}
