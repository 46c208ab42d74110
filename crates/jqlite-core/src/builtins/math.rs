//! Numeric builtins.

use super::with_args2;
use crate::ast::Filter;
use crate::error::{EvalError, ValueResult};
use crate::eval::{once, Env, Outputs};
use crate::value::Value;

pub(super) fn call<'a>(
    name: &str,
    args: &'a [Filter],
    env: &Env,
    input: &Value,
) -> Option<Outputs<'a>> {
    let unary: fn(f64) -> f64 = match (name, args) {
        ("floor", []) => f64::floor,
        ("ceil", []) => f64::ceil,
        ("round", []) => f64::round,
        ("sqrt", []) => f64::sqrt,
        ("fabs", []) => f64::abs,
        ("log", []) => f64::ln,
        ("exp", []) => f64::exp,
        ("log10", []) => f64::log10,
        ("log2", []) => f64::log2,
        ("abs", []) => return Some(once(abs(input))),
        ("isinfinite", []) => return Some(once(number(input).map(|n| Value::Bool(n.is_infinite())))),
        ("isnan", []) => return Some(once(number(input).map(|n| Value::Bool(n.is_nan())))),
        ("isnormal", []) => return Some(once(number(input).map(|n| Value::Bool(n.is_normal())))),
        ("infinite", []) => return Some(once(Ok(Value::Number(f64::INFINITY)))),
        ("nan", []) => return Some(once(Ok(Value::Number(f64::NAN)))),
        ("pow", [base, exponent]) => {
            return Some(with_args2(base, exponent, env, input.clone(), |_, base, exponent| {
                Ok(Value::Number(number(&base)?.powf(number(&exponent)?)))
            }));
        }
        _ => return None,
    };
    Some(once(number(input).map(|n| Value::Number(unary(n)))))
}

fn number(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(EvalError::msg(format!("{} number required", other.describe()))),
    }
}

/// `abs` keeps `-0` and NaN as they are.
fn abs(input: &Value) -> ValueResult {
    match input {
        Value::Number(n) if *n < 0.0 => Ok(Value::Number(-n)),
        Value::Number(_) => Ok(input.clone()),
        other => Err(EvalError::msg(format!("{} has no absolute value", other.describe()))),
    }
}
