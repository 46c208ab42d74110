//! Arithmetic and comparison operators on values.

use std::cmp::Ordering;

use crate::ast::{ArithOp, CompareOp};
use crate::error::{EvalError, ValueResult};
use crate::value::{Map, Value};

/// Upper bound in bytes for a string built by repetition.
const MAX_STRING_LEN: usize = 1 << 29;

pub fn arith(op: ArithOp, lhs: Value, rhs: Value) -> ValueResult {
    match op {
        ArithOp::Add => add(lhs, rhs),
        ArithOp::Sub => sub(lhs, rhs),
        ArithOp::Mul => mul(lhs, rhs),
        ArithOp::Div => div(lhs, rhs),
        ArithOp::Rem => rem(lhs, rhs),
    }
}

pub fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    let ord = lhs.cmp(rhs);
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

pub fn add(lhs: Value, rhs: Value) -> ValueResult {
    match (lhs, rhs) {
        (Value::Null, other) | (other, Value::Null) => Ok(other),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::String(mut a), Value::String(b)) => {
            a.push_str(&b);
            Ok(Value::String(a))
        }
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::Object(mut a), Value::Object(b)) => {
            a.extend(b);
            Ok(Value::Object(a))
        }
        (a, b) => Err(mismatch(&a, &b, "added")),
    }
}

fn sub(lhs: Value, rhs: Value) -> ValueResult {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (Value::Array(a), Value::Array(b)) => Ok(Value::Array(
            a.into_iter().filter(|item| !b.contains(item)).collect(),
        )),
        (a, b) => Err(mismatch(&a, &b, "subtracted")),
    }
}

fn mul(lhs: Value, rhs: Value) -> ValueResult {
    match (lhs, rhs) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            repeat_string(&s, n)
        }
        (Value::Object(a), Value::Object(b)) => Ok(Value::Object(deep_merge(a, b))),
        (a, b) => Err(mismatch(&a, &b, "multiplied")),
    }
}

fn div(lhs: Value, rhs: Value) -> ValueResult {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            if b == 0.0 {
                return Err(zero_divisor(&Value::Number(a), &Value::Number(b), "divided"));
            }
            Ok(Value::Number(a / b))
        }
        (Value::String(a), Value::String(b)) => Ok(split_string(&a, &b)),
        (a, b) => Err(mismatch(&a, &b, "divided")),
    }
}

fn rem(lhs: Value, rhs: Value) -> ValueResult {
    match (&lhs, &rhs) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (truncate(*a), truncate(*b));
            if b == 0 {
                return Err(zero_divisor(&lhs, &rhs, "divided"));
            }
            // i64::MIN % -1 overflows; the mathematical result is 0.
            Ok(Value::from(a.checked_rem(b).unwrap_or(0)))
        }
        _ => Err(mismatch(&lhs, &rhs, "divided")),
    }
}

fn truncate(n: f64) -> i64 {
    if n.is_nan() {
        0
    } else {
        n as i64
    }
}

fn repeat_string(s: &str, n: f64) -> ValueResult {
    if n <= 0.0 || n.is_nan() {
        return Ok(Value::Null);
    }
    let count = (n as i64).max(1) as usize;
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_STRING_LEN => Ok(Value::String(s.repeat(count))),
        _ => Err(EvalError::msg("Repeat string result too long")),
    }
}

/// Split on a literal separator. An empty input yields `[]` and an empty
/// separator splits into characters.
pub fn split_string(s: &str, sep: &str) -> Value {
    if s.is_empty() {
        return Value::Array(Vec::new());
    }
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::from).collect()
    };
    Value::Array(parts)
}

fn deep_merge(mut base: Map, overlay: Map) -> Map {
    for (key, value) in overlay {
        let merged = match (base.remove(&key), value) {
            (Some(Value::Object(a)), Value::Object(b)) => Value::Object(deep_merge(a, b)),
            (_, value) => value,
        };
        base.insert(key, merged);
    }
    base
}

fn mismatch(lhs: &Value, rhs: &Value, verb: &str) -> EvalError {
    EvalError::msg(format!(
        "{} and {} cannot be {}",
        lhs.describe(),
        rhs.describe(),
        verb
    ))
}

fn zero_divisor(lhs: &Value, rhs: &Value, verb: &str) -> EvalError {
    EvalError::msg(format!(
        "{} and {} cannot be {} because the divisor is zero",
        lhs.describe(),
        rhs.describe(),
        verb
    ))
}
