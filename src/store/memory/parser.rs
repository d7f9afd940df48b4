//! SQL parsing for the in-memory store.
//!
//! Converts SQL strings into [`Statement`]s using `sqlparser`'s MySQL
//! dialect, binding `?` placeholders from the supplied parameters in the
//! order they appear in the text.

use sqlparser::ast as sp;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser as SqlParser;
use thiserror::Error;

use super::ast::*;
use super::repo::ColumnDef;
use crate::store::Value;

/// Result type for parsing operations.
pub(crate) type ParseResult<T> = Result<T, ParseError>;

/// SQL parsing errors.
#[derive(Debug, Clone, Error)]
pub(crate) enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("statement expects {expected} parameter(s), {given} given")]
    ParameterCount { expected: usize, given: usize },

    #[error("empty query")]
    EmptyQuery,

    #[error("multiple statements not supported")]
    MultipleStatements,
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        ParseError::Syntax(e.to_string())
    }
}

/// Statement parser with placeholder binding.
pub(crate) struct Parser<'p> {
    params: &'p [Value],
    next: usize,
}

impl<'p> Parser<'p> {
    /// Parse a SQL string, binding `params` to its placeholders.
    pub(crate) fn parse(sql: &str, params: &'p [Value]) -> ParseResult<Statement> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        let mut parser = Parser { params, next: 0 };
        let stmt = match parser.parse_special(sql)? {
            Some(stmt) => stmt,
            None => {
                let statements = SqlParser::parse_sql(&MySqlDialect {}, sql)?;
                match statements.as_slice() {
                    [] => return Err(ParseError::EmptyQuery),
                    [single] => parser.convert_statement(single)?,
                    _ => return Err(ParseError::MultipleStatements),
                }
            }
        };

        if parser.next != params.len() {
            return Err(ParseError::ParameterCount {
                expected: parser.next,
                given: params.len(),
            });
        }
        Ok(stmt)
    }

    /// Commands handled without sqlparser.
    fn parse_special(&mut self, sql: &str) -> ParseResult<Option<Statement>> {
        let upper = sql.to_uppercase();
        let words: Vec<&str> = upper.split_whitespace().collect();
        let stmt = match words.as_slice() {
            ["BEGIN"] | ["BEGIN", "TRANSACTION"] | ["START", "TRANSACTION"] => Statement::Begin,
            ["COMMIT"] => Statement::Commit,
            ["ROLLBACK"] => Statement::Rollback,
            ["SHOW", "TABLES"] => Statement::ShowTables,
            ["SHOW", "COLUMNS", "FROM", _] | ["SHOW", "FIELDS", "FROM", _] => {
                Statement::ShowColumns(Self::unquote(last_word(sql))?)
            }
            ["DESCRIBE", _] | ["DESC", _] => Statement::ShowColumns(Self::unquote(last_word(sql))?),
            _ => return Ok(None),
        };
        Ok(Some(stmt))
    }

    fn unquote(word: &str) -> ParseResult<String> {
        let name = match word.strip_prefix('`').and_then(|w| w.strip_suffix('`')) {
            Some(inner) => inner.replace("``", "`"),
            None => word.to_string(),
        };
        if name.is_empty() {
            return Err(ParseError::InvalidIdentifier(word.to_string()));
        }
        Ok(name)
    }

    fn convert_statement(&mut self, stmt: &sp::Statement) -> ParseResult<Statement> {
        match stmt {
            sp::Statement::CreateTable(create) => Self::convert_create_table(create),
            sp::Statement::Drop { object_type, names, if_exists, .. } => {
                Self::convert_drop(object_type, names, *if_exists)
            }
            sp::Statement::Query(query) => self.convert_query(query),
            sp::Statement::Insert(insert) => self.convert_insert(insert),
            sp::Statement::Update { table, assignments, selection, .. } => {
                self.convert_update(table, assignments, selection)
            }
            sp::Statement::Delete(delete) => self.convert_delete(delete),
            sp::Statement::Call(function) => self.convert_call(function),
            sp::Statement::StartTransaction { .. } => Ok(Statement::Begin),
            sp::Statement::Commit { .. } => Ok(Statement::Commit),
            sp::Statement::Rollback { .. } => Ok(Statement::Rollback),
            other => Err(ParseError::UnsupportedStatement(other.to_string())),
        }
    }

    fn convert_create_table(create: &sp::CreateTable) -> ParseResult<Statement> {
        let name = Self::extract_table_name(&create.name)?;
        let columns = create
            .columns
            .iter()
            .map(|col| {
                let mut def = ColumnDef::new(col.name.value.clone(), col.data_type.to_string());
                for opt in &col.options {
                    match &opt.option {
                        sp::ColumnOption::NotNull => def.nullable = false,
                        sp::ColumnOption::Unique { is_primary: true, .. } => {
                            def.primary_key = true;
                            def.nullable = false;
                        }
                        _ => {}
                    }
                }
                def
            })
            .collect();

        Ok(Statement::CreateTable(CreateTable {
            name,
            columns,
            if_not_exists: create.if_not_exists,
        }))
    }

    fn convert_drop(
        object_type: &sp::ObjectType,
        names: &[sp::ObjectName],
        if_exists: bool,
    ) -> ParseResult<Statement> {
        match (object_type, names) {
            (sp::ObjectType::Table, [name]) => Ok(Statement::DropTable(DropTable {
                name: Self::extract_table_name(name)?,
                if_exists,
            })),
            (sp::ObjectType::Table, _) => Err(ParseError::UnsupportedStatement(
                "DROP of multiple tables".into(),
            )),
            (other, _) => Err(ParseError::UnsupportedStatement(format!("DROP {other}"))),
        }
    }

    fn convert_query(&mut self, query: &sp::Query) -> ParseResult<Statement> {
        let select = match query.body.as_ref() {
            sp::SetExpr::Select(s) => s,
            other => {
                return Err(ParseError::UnsupportedStatement(format!(
                    "unsupported query: {other}"
                )))
            }
        };

        // Projection comes first in the text, so its placeholders bind first.
        let columns = self.convert_projection(&select.projection)?;

        let from = match select.from.as_slice() {
            [] => None,
            [table] => Some(Self::extract_from_table(table)?),
            _ => {
                return Err(ParseError::UnsupportedStatement(
                    "at most one table in FROM".into(),
                ))
            }
        };

        let where_clause = select
            .selection
            .as_ref()
            .map(|e| self.convert_expr(e))
            .transpose()?;

        let order_by = match &query.order_by {
            Some(ob) => Self::extract_order_by(ob)?,
            None => Vec::new(),
        };

        let limit = query.limit.as_ref().and_then(Self::expr_to_usize);
        let offset = query.offset.as_ref().and_then(|o| Self::expr_to_usize(&o.value));

        Ok(Statement::Select(Select {
            columns,
            from,
            where_clause,
            order_by,
            limit,
            offset,
        }))
    }

    fn convert_projection(&mut self, items: &[sp::SelectItem]) -> ParseResult<Vec<SelectColumn>> {
        items
            .iter()
            .map(|item| match item {
                sp::SelectItem::Wildcard(_) => Ok(SelectColumn::Wildcard),
                sp::SelectItem::UnnamedExpr(sp::Expr::Identifier(ident)) => {
                    Ok(SelectColumn::Column(ident.value.clone()))
                }
                sp::SelectItem::UnnamedExpr(expr) => Ok(SelectColumn::Expr {
                    label: expr.to_string(),
                    expr: self.convert_expr(expr)?,
                }),
                sp::SelectItem::ExprWithAlias { expr, alias } => Ok(SelectColumn::Expr {
                    label: alias.value.clone(),
                    expr: self.convert_expr(expr)?,
                }),
                other => Err(ParseError::UnsupportedExpression(other.to_string())),
            })
            .collect()
    }

    fn extract_order_by(ob: &sp::OrderBy) -> ParseResult<Vec<OrderBy>> {
        match &ob.kind {
            sp::OrderByKind::All(_) => Ok(vec![]),
            sp::OrderByKind::Expressions(exprs) => exprs
                .iter()
                .map(|expr| match &expr.expr {
                    sp::Expr::Identifier(id) => Ok(OrderBy {
                        column: id.value.clone(),
                        ascending: expr.options.asc.unwrap_or(true),
                    }),
                    other => Err(ParseError::UnsupportedExpression(format!(
                        "ORDER BY {other}"
                    ))),
                })
                .collect(),
        }
    }

    fn convert_insert(&mut self, insert: &sp::Insert) -> ParseResult<Statement> {
        let table = match &insert.table {
            sp::TableObject::TableName(name) => Self::extract_table_name(name)?,
            sp::TableObject::TableFunction(_) => {
                return Err(ParseError::UnsupportedStatement(
                    "table function not supported".into(),
                ))
            }
        };

        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.iter().map(|c| c.value.clone()).collect())
        };

        let values = match insert.source.as_ref().map(|s| s.body.as_ref()) {
            Some(sp::SetExpr::Values(sp::Values { rows, .. })) => rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|e| self.convert_expr(e))
                        .collect::<ParseResult<Vec<_>>>()
                })
                .collect::<ParseResult<Vec<_>>>()?,
            _ => {
                return Err(ParseError::UnsupportedStatement(
                    "INSERT ... SELECT not supported".into(),
                ))
            }
        };

        Ok(Statement::Insert(Insert {
            table,
            columns,
            values,
        }))
    }

    fn convert_update(
        &mut self,
        table: &sp::TableWithJoins,
        assignments: &[sp::Assignment],
        selection: &Option<sp::Expr>,
    ) -> ParseResult<Statement> {
        let table = Self::extract_from_table(table)?;

        let assignments = assignments
            .iter()
            .map(|a| {
                let column = match &a.target {
                    sp::AssignmentTarget::ColumnName(name) => Self::extract_table_name(name)?,
                    sp::AssignmentTarget::Tuple(_) => {
                        return Err(ParseError::UnsupportedExpression(
                            "tuple assignment".into(),
                        ))
                    }
                };
                Ok((column, self.convert_expr(&a.value)?))
            })
            .collect::<ParseResult<Vec<_>>>()?;

        let where_clause = selection.as_ref().map(|e| self.convert_expr(e)).transpose()?;

        Ok(Statement::Update(Update {
            table,
            assignments,
            where_clause,
        }))
    }

    fn convert_delete(&mut self, delete: &sp::Delete) -> ParseResult<Statement> {
        let tables = match &delete.from {
            sp::FromTable::WithFromKeyword(tables) => tables,
            sp::FromTable::WithoutKeyword(tables) => tables,
        };
        let table = match tables.as_slice() {
            [table] => Self::extract_from_table(table)?,
            _ => {
                return Err(ParseError::UnsupportedStatement(
                    "DELETE from multiple tables not supported".into(),
                ))
            }
        };
        let where_clause = delete.selection.as_ref().map(|e| self.convert_expr(e)).transpose()?;

        Ok(Statement::Delete(Delete {
            table,
            where_clause,
        }))
    }

    fn convert_call(&mut self, function: &sp::Function) -> ParseResult<Statement> {
        let name = function.name.to_string();
        let args = self
            .function_args(&function.args)?
            .into_iter()
            .map(|arg| match arg {
                Expr::Literal(v) => Ok(v),
                other => Err(ParseError::UnsupportedExpression(format!(
                    "procedure argument must be a literal: {other:?}"
                ))),
            })
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Statement::Call { name, args })
    }

    fn function_args(&mut self, args: &sp::FunctionArguments) -> ParseResult<Vec<Expr>> {
        match args {
            sp::FunctionArguments::List(list) => list
                .args
                .iter()
                .map(|arg| match arg {
                    sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => self.convert_expr(e),
                    other => Err(ParseError::UnsupportedExpression(other.to_string())),
                })
                .collect(),
            _ => Ok(vec![]),
        }
    }

    fn convert_expr(&mut self, expr: &sp::Expr) -> ParseResult<Expr> {
        match expr {
            sp::Expr::Identifier(id) => Ok(Expr::Column(id.value.clone())),

            sp::Expr::CompoundIdentifier(parts) => parts
                .last()
                .map(|p| Expr::Column(p.value.clone()))
                .ok_or_else(|| ParseError::InvalidIdentifier("empty compound identifier".into())),

            sp::Expr::Value(v) => Ok(Expr::Literal(self.convert_value(v)?)),

            sp::Expr::BinaryOp { left, op, right } => {
                let left = self.convert_expr(left)?;
                let right = self.convert_expr(right)?;
                Ok(Expr::BinaryOp {
                    left: Box::new(left),
                    op: Self::convert_binary_op(op)?,
                    right: Box::new(right),
                })
            }

            sp::Expr::UnaryOp { op, expr } => {
                let inner = Box::new(self.convert_expr(expr)?);
                match op {
                    sp::UnaryOperator::Not => Ok(Expr::Not(inner)),
                    sp::UnaryOperator::Minus => Ok(Expr::Negate(inner)),
                    sp::UnaryOperator::Plus => Ok(*inner),
                    other => Err(ParseError::UnsupportedExpression(format!(
                        "unary operator {other}"
                    ))),
                }
            }

            sp::Expr::IsNull(e) => Ok(Expr::IsNull {
                expr: Box::new(self.convert_expr(e)?),
                negated: false,
            }),

            sp::Expr::IsNotNull(e) => Ok(Expr::IsNull {
                expr: Box::new(self.convert_expr(e)?),
                negated: true,
            }),

            sp::Expr::InList { expr, list, negated } => {
                let expr = self.convert_expr(expr)?;
                let list = list
                    .iter()
                    .map(|e| self.convert_expr(e))
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(Expr::InList {
                    expr: Box::new(expr),
                    list,
                    negated: *negated,
                })
            }

            sp::Expr::Function(f) => Ok(Expr::Function {
                name: f.name.to_string().to_uppercase(),
                args: self.function_args(&f.args)?,
            }),

            sp::Expr::Nested(inner) => self.convert_expr(inner),

            other => Err(ParseError::UnsupportedExpression(other.to_string())),
        }
    }

    fn convert_value(&mut self, v: &sp::ValueWithSpan) -> ParseResult<Value> {
        match &v.value {
            sp::Value::Null => Ok(Value::Null),
            sp::Value::Boolean(b) => Ok(Value::Bool(*b)),
            sp::Value::Number(s, _) => {
                if let Ok(i) = s.parse::<i64>() {
                    Ok(Value::from(i))
                } else if let Ok(f) = s.parse::<f64>() {
                    Ok(serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null))
                } else {
                    Err(ParseError::UnsupportedExpression(format!("invalid number: {s}")))
                }
            }
            sp::Value::SingleQuotedString(s) | sp::Value::DoubleQuotedString(s) => {
                Ok(Value::String(s.clone()))
            }
            sp::Value::Placeholder(_) => {
                let value = self.params.get(self.next).cloned().ok_or(ParseError::ParameterCount {
                    expected: self.next + 1,
                    given: self.params.len(),
                })?;
                self.next += 1;
                Ok(value)
            }
            other => Err(ParseError::UnsupportedExpression(format!(
                "unsupported value: {other}"
            ))),
        }
    }

    fn convert_binary_op(op: &sp::BinaryOperator) -> ParseResult<BinaryOperator> {
        match op {
            sp::BinaryOperator::Eq => Ok(BinaryOperator::Eq),
            sp::BinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
            sp::BinaryOperator::Lt => Ok(BinaryOperator::Lt),
            sp::BinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
            sp::BinaryOperator::Gt => Ok(BinaryOperator::Gt),
            sp::BinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
            sp::BinaryOperator::And => Ok(BinaryOperator::And),
            sp::BinaryOperator::Or => Ok(BinaryOperator::Or),
            other => Err(ParseError::UnsupportedExpression(format!(
                "unsupported operator: {other}"
            ))),
        }
    }

    fn extract_table_name(name: &sp::ObjectName) -> ParseResult<String> {
        name.0
            .last()
            .map(|part| {
                part.as_ident()
                    .map(|id| id.value.clone())
                    .unwrap_or_else(|| part.to_string())
            })
            .ok_or_else(|| ParseError::InvalidIdentifier("empty table name".into()))
    }

    fn extract_from_table(from: &sp::TableWithJoins) -> ParseResult<String> {
        if !from.joins.is_empty() {
            return Err(ParseError::UnsupportedStatement("joins not supported".into()));
        }
        match &from.relation {
            sp::TableFactor::Table { name, .. } => Self::extract_table_name(name),
            other => Err(ParseError::UnsupportedStatement(format!(
                "unsupported FROM clause: {other}"
            ))),
        }
    }

    fn expr_to_usize(expr: &sp::Expr) -> Option<usize> {
        match expr {
            sp::Expr::Value(v) => match &v.value {
                sp::Value::Number(s, _) => s.parse().ok(),
                _ => None,
            },
            _ => None,
        }
    }
}

fn last_word(sql: &str) -> &str {
    sql.split_whitespace().last().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_select_with_placeholders() {
        let params = [json!("main"), json!("master")];
        let stmt = Parser::parse(
            "SELECT `name` FROM `dolt_branches` WHERE `name` <> ? AND `name` <> ?",
            &params,
        )
        .unwrap();

        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.from.as_deref(), Some("dolt_branches"));
                assert_eq!(s.columns, vec![SelectColumn::Column("name".into())]);
                match s.where_clause {
                    Some(Expr::BinaryOp { left, op: BinaryOperator::And, right }) => {
                        assert!(matches!(*left, Expr::BinaryOp { op: BinaryOperator::NotEq, .. }));
                        match *right {
                            Expr::BinaryOp { right, .. } => {
                                assert_eq!(*right, Expr::Literal(json!("master")))
                            }
                            other => panic!("Expected BinaryOp, got {other:?}"),
                        }
                    }
                    other => panic!("Expected AND, got {other:?}"),
                }
            }
            _ => panic!("Expected Select"),
        }
    }

    #[test]
    fn test_parse_select_order_limit_offset() {
        let stmt = Parser::parse(
            "SELECT `commit_hash` FROM `dolt_log` ORDER BY `date` DESC LIMIT 1 OFFSET 1",
            &[],
        )
        .unwrap();

        match stmt {
            Statement::Select(s) => {
                assert_eq!(s.order_by.len(), 1);
                assert_eq!(s.order_by[0].column, "date");
                assert!(!s.order_by[0].ascending);
                assert_eq!(s.limit, Some(1));
                assert_eq!(s.offset, Some(1));
            }
            _ => panic!("Expected Select"),
        }
    }

    #[test]
    fn test_parse_tableless_function() {
        match Parser::parse("SELECT ACTIVE_BRANCH()", &[]).unwrap() {
            Statement::Select(s) => {
                assert!(s.from.is_none());
                assert!(matches!(
                    &s.columns[0],
                    SelectColumn::Expr { expr: Expr::Function { name, .. }, .. } if name == "ACTIVE_BRANCH"
                ));
            }
            _ => panic!("Expected Select"),
        }
    }

    #[test]
    fn test_parse_call_binds_arguments() {
        let params = [json!("Jane <jane@example.com>"), json!("it's done")];
        let stmt = Parser::parse(
            "CALL DOLT_COMMIT('--skip-empty', '--author', ?, '-m', ?)",
            &params,
        )
        .unwrap();

        assert_eq!(
            stmt,
            Statement::Call {
                name: "DOLT_COMMIT".into(),
                args: vec![
                    json!("--skip-empty"),
                    json!("--author"),
                    json!("Jane <jane@example.com>"),
                    json!("-m"),
                    json!("it's done"),
                ],
            }
        );
    }

    #[test]
    fn test_parse_insert_multi_row() {
        let params = [json!(1), Value::Null, json!(2), json!("x")];
        match Parser::parse("INSERT INTO `t` (`id`, `val`) VALUES (?, ?), (?, ?)", &params).unwrap() {
            Statement::Insert(i) => {
                assert_eq!(i.table, "t");
                assert_eq!(i.columns, Some(vec!["id".into(), "val".into()]));
                assert_eq!(i.values.len(), 2);
                assert_eq!(i.values[0][1], Expr::Literal(Value::Null));
            }
            _ => panic!("Expected Insert"),
        }
    }

    #[test]
    fn test_parse_create_table_primary_key() {
        match Parser::parse("CREATE TABLE t (id INT PRIMARY KEY, val VARCHAR(20))", &[]).unwrap() {
            Statement::CreateTable(ct) => {
                assert_eq!(ct.name, "t");
                assert!(ct.columns[0].primary_key);
                assert!(!ct.columns[0].nullable);
                assert!(ct.columns[1].nullable);
            }
            _ => panic!("Expected CreateTable"),
        }
    }

    #[test]
    fn test_parse_special_commands() {
        assert!(matches!(Parser::parse("BEGIN", &[]).unwrap(), Statement::Begin));
        assert!(matches!(Parser::parse("start transaction", &[]).unwrap(), Statement::Begin));
        assert!(matches!(Parser::parse("ROLLBACK", &[]).unwrap(), Statement::Rollback));
        assert!(matches!(Parser::parse("SHOW TABLES;", &[]).unwrap(), Statement::ShowTables));
        assert_eq!(
            Parser::parse("SHOW COLUMNS FROM `dolt_diff_t`", &[]).unwrap(),
            Statement::ShowColumns("dolt_diff_t".into())
        );
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let err = Parser::parse("SELECT `a` FROM `t` WHERE `a` = ?", &[]).unwrap_err();
        assert!(matches!(err, ParseError::ParameterCount { .. }));

        let err = Parser::parse("SHOW TABLES", &[json!(1)]).unwrap_err();
        assert!(matches!(err, ParseError::ParameterCount { expected: 0, given: 1 }));
    }

    #[test]
    fn test_empty_query() {
        assert!(matches!(Parser::parse("  ", &[]).unwrap_err(), ParseError::EmptyQuery));
    }
}
