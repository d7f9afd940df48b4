//! Expression evaluation.

use std::cmp::Ordering;

use crate::store::error::{StoreError, StoreResult, ER_BAD_FIELD, ER_SP_DOES_NOT_EXIST};
use crate::store::Value;

use super::ast::{BinaryOperator, Expr};

/// Resolves server functions such as `ACTIVE_BRANCH()`.
pub(crate) trait Functions {
    fn call(&self, name: &str, args: &[Value]) -> StoreResult<Value>;
}

/// The row an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Scope<'a> {
    pub(crate) fn new(columns: &'a [String], values: &'a [Value]) -> Self {
        Self { columns, values }
    }

    /// A scope with no columns, for table-less selects.
    pub(crate) fn empty() -> Self {
        Self {
            columns: &[],
            values: &[],
        }
    }

    fn lookup(&self, name: &str) -> StoreResult<Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
            .cloned()
            .ok_or_else(|| {
                StoreError::rejected(ER_BAD_FIELD, format!("column \"{name}\" could not be found"))
            })
    }
}

/// Evaluate an expression against a row.
pub(crate) fn evaluate(expr: &Expr, scope: Scope<'_>, functions: &dyn Functions) -> StoreResult<Value> {
    match expr {
        Expr::Column(name) => scope.lookup(name),

        Expr::Literal(value) => Ok(value.clone()),

        Expr::BinaryOp { left, op, right } => {
            let l = evaluate(left, scope, functions)?;
            let r = evaluate(right, scope, functions)?;
            Ok(eval_binary_op(&l, *op, &r))
        }

        Expr::Not(inner) => {
            let v = evaluate(inner, scope, functions)?;
            Ok(if v.is_null() {
                Value::Null
            } else {
                Value::Bool(!value_to_bool(&v))
            })
        }

        Expr::Negate(inner) => {
            let v = evaluate(inner, scope, functions)?;
            Ok(match v {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Value::from(-i),
                    None => n
                        .as_f64()
                        .and_then(|f| serde_json::Number::from_f64(-f))
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                },
                _ => Value::Null,
            })
        }

        Expr::IsNull { expr, negated } => {
            let is_null = evaluate(expr, scope, functions)?.is_null();
            Ok(Value::Bool(is_null != *negated))
        }

        Expr::InList { expr, list, negated } => {
            let v = evaluate(expr, scope, functions)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let mut found = false;
            for item in list {
                if values_equal(&v, &evaluate(item, scope, functions)?) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }

        Expr::Function { name, args } => {
            let evaluated = args
                .iter()
                .map(|a| evaluate(a, scope, functions))
                .collect::<StoreResult<Vec<_>>>()?;
            eval_builtin(name, &evaluated).map_or_else(|| functions.call(name, &evaluated), Ok)
        }
    }
}

/// Evaluate a WHERE clause, returning true if the row matches.
pub(crate) fn matches_where(expr: &Expr, scope: Scope<'_>, functions: &dyn Functions) -> StoreResult<bool> {
    Ok(value_to_bool(&evaluate(expr, scope, functions)?))
}

fn eval_binary_op(left: &Value, op: BinaryOperator, right: &Value) -> Value {
    let compare = |pred: fn(Ordering) -> bool| {
        if left.is_null() || right.is_null() {
            Value::Null
        } else {
            Value::Bool(compare_values(left, right).map(pred).unwrap_or(false))
        }
    };

    match op {
        BinaryOperator::Eq => compare(|o| o == Ordering::Equal),
        BinaryOperator::NotEq => compare(|o| o != Ordering::Equal),
        BinaryOperator::Lt => compare(|o| o == Ordering::Less),
        BinaryOperator::LtEq => compare(|o| o != Ordering::Greater),
        BinaryOperator::Gt => compare(|o| o == Ordering::Greater),
        BinaryOperator::GtEq => compare(|o| o != Ordering::Less),
        BinaryOperator::And => Value::Bool(value_to_bool(left) && value_to_bool(right)),
        BinaryOperator::Or => Value::Bool(value_to_bool(left) || value_to_bool(right)),
    }
}

fn eval_builtin(name: &str, args: &[Value]) -> Option<Value> {
    match name {
        "COALESCE" => Some(args.iter().find(|a| !a.is_null()).cloned().unwrap_or(Value::Null)),
        "LOWER" => Some(args.first().and_then(Value::as_str).map_or(Value::Null, |s| {
            Value::String(s.to_lowercase())
        })),
        "UPPER" => Some(args.first().and_then(Value::as_str).map_or(Value::Null, |s| {
            Value::String(s.to_uppercase())
        })),
        _ => None,
    }
}

/// Report an unknown function the way the server does.
pub(crate) fn unknown_function(name: &str) -> StoreError {
    StoreError::rejected(ER_SP_DOES_NOT_EXIST, format!("function: '{name}' not found"))
}

/// SQL equality; NULL never equals anything.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

/// Compare two values, coercing numeric strings against numbers.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(s)) => x.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
        (Value::String(s), Value::Number(y)) => s.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Number(_)) => compare_values(&Value::from(i64::from(*x)), b),
        (Value::Number(_), Value::Bool(y)) => compare_values(a, &Value::from(i64::from(*y))),
        _ => None,
    }
}

/// Total order for ORDER BY; NULLs sort first.
pub(crate) fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(a, b).unwrap_or_else(|| a.to_string().cmp(&b.to_string())),
    }
}

fn value_to_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => s.parse::<f64>().map(|f| f != 0.0).unwrap_or(false),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
