use std::cmp::Ordering;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::validation::expr::{BinaryOp, Expr, UnaryOp};
use crate::validation::value::{NULL_LITERAL, Value, Variables};

/// Evaluates `expr` against `variables`.
///
/// Logical operators short-circuit and require boolean operands. Referencing a variable that
/// is not bound is an error.
pub fn evaluate(expr: &Expr, variables: &Variables) -> SyncResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(name) => match variables.get(name) {
            Some(value) => Ok(value.clone()),
            None => bail!(
                ErrorKind::ExpressionEvaluationFailed,
                "Rule references an unknown column",
                name
            ),
        },
        Expr::Unary(UnaryOp::Not, operand) => {
            let value = expect_bool(evaluate(operand, variables)?)?;
            Ok(Value::Bool(!value))
        }
        Expr::Unary(UnaryOp::Neg, operand) => match evaluate(operand, variables)? {
            Value::Int(value) => Ok(match value.checked_neg() {
                Some(negated) => Value::Int(negated),
                None => integer_value(-i128::from(value)),
            }),
            Value::UInt(value) => match i64::try_from(value) {
                Ok(value) => Ok(Value::Int(-value)),
                Err(_) => Ok(Value::Float(-(value as f64))),
            },
            Value::Float(value) => Ok(Value::Float(-value)),
            other => bail!(
                ErrorKind::ExpressionEvaluationFailed,
                "Cannot negate a non-numeric value",
                other.type_name()
            ),
        },
        Expr::Binary(BinaryOp::And, left, right) => {
            if !expect_bool(evaluate(left, variables)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(evaluate(right, variables)?)?))
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            if expect_bool(evaluate(left, variables)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(evaluate(right, variables)?)?))
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, variables)?;
            let right = evaluate(right, variables)?;
            match op {
                BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
                BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
                BinaryOp::Lt => Ok(Value::Bool(compare(&left, &right)?.is_lt())),
                BinaryOp::Le => Ok(Value::Bool(compare(&left, &right)?.is_le())),
                BinaryOp::Gt => Ok(Value::Bool(compare(&left, &right)?.is_gt())),
                BinaryOp::Ge => Ok(Value::Bool(compare(&left, &right)?.is_ge())),
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                    arithmetic(*op, &left, &right)
                }
                BinaryOp::And | BinaryOp::Or => unreachable!("logical operators handled above"),
            }
        }
    }
}

fn expect_bool(value: Value) -> SyncResult<bool> {
    match value {
        Value::Bool(value) => Ok(value),
        other => bail!(
            ErrorKind::ExpressionEvaluationFailed,
            "Logical operator applied to a non-boolean value",
            other.type_name()
        ),
    }
}

/// Equality across types. A null value also equals the `'NULL'` string literal, which is how
/// catalog rules spell missing values.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, Value::Str(s)) | (Value::Str(s), Value::Null) => s == NULL_LITERAL,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (a, b) if a.is_numeric() && b.is_numeric() => {
            matches!(compare_numbers(a, b), Some(Ordering::Equal))
        }
        _ => false,
    }
}

fn compare(left: &Value, right: &Value) -> SyncResult<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (a, b) if a.is_numeric() && b.is_numeric() => match compare_numbers(a, b) {
            Some(ordering) => Ok(ordering),
            None => bail!(
                ErrorKind::ExpressionEvaluationFailed,
                "Cannot order NaN values"
            ),
        },
        (a, b) => bail!(
            ErrorKind::ExpressionEvaluationFailed,
            "Cannot order values of these types",
            format!("{} and {}", a.type_name(), b.type_name())
        ),
    }
}

fn as_i128(value: &Value) -> Option<i128> {
    match value {
        Value::Int(value) => Some(i128::from(*value)),
        Value::UInt(value) => Some(i128::from(*value)),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(value) => Some(*value as f64),
        Value::UInt(value) => Some(*value as f64),
        Value::Float(value) => Some(*value),
        _ => None,
    }
}

fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (as_i128(left), as_i128(right)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => as_f64(left)?.partial_cmp(&as_f64(right)?),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> SyncResult<Value> {
    if !left.is_numeric() || !right.is_numeric() {
        bail!(
            ErrorKind::ExpressionEvaluationFailed,
            "Arithmetic on non-numeric values",
            format!("{} and {}", left.type_name(), right.type_name())
        );
    }

    if let (Some(a), Some(b), false) = (as_i128(left), as_i128(right), op == BinaryOp::Div) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            _ => a.checked_mul(b),
        };
        // Products of two 64-bit operands can exceed i128; those fall through to floats.
        if let Some(result) = result {
            return Ok(integer_value(result));
        }
    }

    let (Some(a), Some(b)) = (as_f64(left), as_f64(right)) else {
        unreachable!("operands checked to be numeric");
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        _ => {
            if b == 0.0 {
                bail!(ErrorKind::ExpressionEvaluationFailed, "Division by zero");
            }
            a / b
        }
    };

    Ok(Value::Float(result))
}

fn integer_value(value: i128) -> Value {
    if let Ok(value) = i64::try_from(value) {
        return Value::Int(value);
    }
    if let Ok(value) = u64::try_from(value) {
        return Value::UInt(value);
    }
    Value::Float(value as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::expr::parse;

    fn eval(source: &str, bindings: &[(&str, Value)]) -> SyncResult<Value> {
        let variables = bindings
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        evaluate(&parse(source)?, &variables)
    }

    #[test]
    fn compares_mixed_numeric_types() {
        let bindings = [("a", Value::Int(-11)), ("b", Value::UInt(3)), ("c", Value::Float(2.5))];
        assert_eq!(eval("a < b", &bindings).unwrap(), Value::Bool(true));
        assert_eq!(eval("c > b", &bindings).unwrap(), Value::Bool(false));
        assert_eq!(eval("b == 3.0", &bindings).unwrap(), Value::Bool(true));
        assert_eq!(eval("c * 2 == 5", &bindings).unwrap(), Value::Bool(true));
    }

    #[test]
    fn null_matches_null_literal_spellings() {
        let bindings = [("a", Value::Null)];
        assert_eq!(eval("a == NULL", &bindings).unwrap(), Value::Bool(true));
        assert_eq!(eval("a != 'NULL'", &bindings).unwrap(), Value::Bool(false));
        assert_eq!(eval("a == 0", &bindings).unwrap(), Value::Bool(false));
    }

    #[test]
    fn ordering_against_null_fails() {
        let err = eval("a > 0", &[("a", Value::Null)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExpressionEvaluationFailed);
    }

    #[test]
    fn rule_from_catalog_rejects_negative_values() {
        let rule = "a != 'NULL' && a > 0";
        assert_eq!(eval(rule, &[("a", Value::Int(-11))]).unwrap(), Value::Bool(false));
        assert_eq!(eval(rule, &[("a", Value::Int(7))]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn logical_operators_short_circuit() {
        // `missing` is never evaluated.
        assert_eq!(
            eval("false && missing > 1", &[]).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(eval("true || missing > 1", &[]).unwrap(), Value::Bool(true));
        assert_eq!(
            eval("missing > 1", &[]).unwrap_err().kind(),
            ErrorKind::ExpressionEvaluationFailed
        );
    }

    #[test]
    fn strings_compare_lexicographically() {
        let bindings = [("zqdm", Value::Str("000002".to_string()))];
        assert_eq!(eval("zqdm > '000001'", &bindings).unwrap(), Value::Bool(true));
        assert!(eval("zqdm > 1", &bindings).is_err());
    }

    #[test]
    fn negating_the_smallest_integer_widens() {
        let bindings = [("a", Value::Int(i64::MIN))];
        assert_eq!(
            eval("-a", &bindings).unwrap(),
            Value::UInt(9_223_372_036_854_775_808)
        );
        assert_eq!(eval("-a > 0", &bindings).unwrap(), Value::Bool(true));
    }

    #[test]
    fn oversized_products_fall_back_to_floats() {
        let bindings = [("a", Value::UInt(u64::MAX))];
        let product = u64::MAX as f64 * u64::MAX as f64;
        assert_eq!(eval("a * a", &bindings).unwrap(), Value::Float(product));
        assert_eq!(eval("a * a > a", &bindings).unwrap(), Value::Bool(true));
        assert_eq!(
            eval("a + a", &bindings).unwrap(),
            Value::Float(2.0 * u64::MAX as f64)
        );
    }

    #[test]
    fn division_by_zero_fails() {
        assert!(eval("1 / 0 > 0", &[]).is_err());
        assert_eq!(eval("7 / 2 == 3.5", &[]).unwrap(), Value::Bool(true));
    }
}
