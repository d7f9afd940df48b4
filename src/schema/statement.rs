//! SQL text built from reflected tables.
//!
//! Identifiers are backtick-quoted; values always travel as `?`
//! parameters.

use std::fmt;

use sqlparser::ast::Ident;

use super::error::SchemaError;
use super::table::TableHandle;
use crate::error::DoltResult;
use crate::session::Session;
use crate::store::{Connection, ResultSet, Value};

/// Quote an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    Ident::with_quote('`', name).to_string()
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Run as a query on `session`.
    pub fn query<C: Connection>(&self, session: &mut Session<C>) -> DoltResult<ResultSet> {
        session.query(&self.sql, &self.params)
    }

    /// Run for effect on `session`.
    pub fn execute<C: Connection>(&self, session: &mut Session<C>) -> DoltResult<u64> {
        session.execute(&self.sql, &self.params)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
enum Filter {
    Eq(String, Value),
    NotEq(String, Value),
}

/// SELECT builder. Column names are checked against the table on
/// [`build`](Select::build).
#[derive(Debug, Clone)]
pub struct Select<'t> {
    table: &'t TableHandle,
    columns: Vec<String>,
    filters: Vec<Filter>,
    order_by: Vec<(String, Order)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl<'t> Select<'t> {
    pub(crate) fn new(table: &'t TableHandle) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Restrict the projection; all columns are selected by default.
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// `column = value`, or `column IS NULL` for a NULL value.
    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    /// `column <> value`, or `column IS NOT NULL` for a NULL value.
    pub fn filter_ne(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::NotEq(column.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order_by.push((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(self) -> Result<Statement, SchemaError> {
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| self.checked(c))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };
        let mut sql = format!("SELECT {projection} FROM {}", self.table.quoted_name());
        let mut params = Vec::new();

        for (i, filter) in self.filters.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            let (column, value, negated) = match filter {
                Filter::Eq(c, v) => (c, v, false),
                Filter::NotEq(c, v) => (c, v, true),
            };
            let column = self.checked(column)?;
            match (value.is_null(), negated) {
                (true, false) => sql.push_str(&format!("{column} IS NULL")),
                (true, true) => sql.push_str(&format!("{column} IS NOT NULL")),
                (false, false) => sql.push_str(&format!("{column} = ?")),
                (false, true) => sql.push_str(&format!("{column} <> ?")),
            }
            if !value.is_null() {
                params.push(value.clone());
            }
        }

        for (i, (column, order)) in self.order_by.iter().enumerate() {
            sql.push_str(if i == 0 { " ORDER BY " } else { ", " });
            sql.push_str(&self.checked(column)?);
            sql.push_str(match order {
                Order::Asc => " ASC",
                Order::Desc => " DESC",
            });
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            if self.limit.is_none() {
                sql.push_str(&format!(" LIMIT {}", u64::MAX));
            }
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(Statement::with_params(sql, params))
    }

    fn checked(&self, column: &str) -> Result<String, SchemaError> {
        self.table.require_column(column)?;
        Ok(quote_ident(column))
    }
}

/// Multi-row INSERT builder.
#[derive(Debug, Clone)]
pub struct Insert<'t> {
    table: &'t TableHandle,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl<'t> Insert<'t> {
    pub(crate) fn new<S: AsRef<str>>(table: &'t TableHandle, columns: &[S]) -> Result<Self, SchemaError> {
        let columns = columns
            .iter()
            .map(|c| table.require_column(c.as_ref()).map(|_| c.as_ref().to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            table,
            columns,
            rows: Vec::new(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Append a row; values must be in [`columns`](Self::columns) order.
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn build(self) -> Statement {
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = format!("({})", vec!["?"; self.columns.len()].join(", "));
        let values = vec![placeholders; self.rows.len()].join(", ");
        let params = self.rows.into_iter().flatten().collect();
        Statement::with_params(
            format!("INSERT INTO {} ({columns}) VALUES {values}", self.table.quoted_name()),
            params,
        )
    }
}
