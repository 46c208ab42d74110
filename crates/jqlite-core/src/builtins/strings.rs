//! String conversion and manipulation builtins.

use super::with_arg;
use crate::ast::Filter;
use crate::error::{EvalError, ValueResult};
use crate::eval::{once, Env, Outputs};
use crate::format::to_text;
use crate::ops::split_string;
use crate::value::Value;

pub(super) fn call<'a>(
    name: &str,
    args: &'a [Filter],
    env: &Env,
    input: &Value,
) -> Option<Outputs<'a>> {
    let outputs = match (name, args) {
        ("tostring", []) => once(Ok(Value::String(to_text(input)))),
        ("tojson", []) => once(Ok(Value::String(input.to_string()))),
        ("fromjson", []) => once(from_json(input)),
        ("tonumber", []) => once(to_number(input)),
        ("utf8bytelength", []) => once(match input {
            Value::String(s) => Ok(Value::from(s.len())),
            other => Err(EvalError::msg(format!(
                "{} only strings have UTF-8 byte length",
                other.describe()
            ))),
        }),
        ("ascii_downcase", []) => once(map_str(input, "ascii_downcase", |s| s.to_ascii_lowercase())),
        ("ascii_upcase", []) => once(map_str(input, "ascii_upcase", |s| s.to_ascii_uppercase())),
        ("trim", []) => once(map_str(input, "trim", |s| s.trim().to_string())),
        ("ltrim", []) => once(map_str(input, "trim", |s| s.trim_start().to_string())),
        ("rtrim", []) => once(map_str(input, "trim", |s| s.trim_end().to_string())),
        ("explode", []) => once(explode(input)),
        ("implode", []) => once(implode(input)),
        ("ascii", []) => once(ascii(input)),
        ("ascii", [code]) => with_arg(code, env, input.clone(), |_, code| ascii(&code)),
        ("split", [sep]) => with_arg(sep, env, input.clone(), |input, sep| match (&input, &sep) {
            (Value::String(s), Value::String(sep)) => Ok(split_string(s, sep)),
            _ => Err(EvalError::msg("split input and separator must be strings")),
        }),
        ("join", [sep]) => with_arg(sep, env, input.clone(), |input, sep| join(input, &sep)),
        ("startswith", [prefix]) => with_arg(prefix, env, input.clone(), |input, prefix| {
            match (&input, &prefix) {
                (Value::String(s), Value::String(p)) => Ok(Value::Bool(s.starts_with(p.as_str()))),
                _ => Err(EvalError::msg("startswith() requires string inputs")),
            }
        }),
        ("endswith", [suffix]) => with_arg(suffix, env, input.clone(), |input, suffix| {
            match (&input, &suffix) {
                (Value::String(s), Value::String(p)) => Ok(Value::Bool(s.ends_with(p.as_str()))),
                _ => Err(EvalError::msg("endswith() requires string inputs")),
            }
        }),
        ("ltrimstr", [prefix]) => with_arg(prefix, env, input.clone(), |input, prefix| {
            Ok(match (&input, &prefix) {
                (Value::String(s), Value::String(p)) => match s.strip_prefix(p.as_str()) {
                    Some(rest) => Value::from(rest),
                    None => input.clone(),
                },
                _ => input.clone(),
            })
        }),
        ("rtrimstr", [suffix]) => with_arg(suffix, env, input.clone(), |input, suffix| {
            Ok(match (&input, &suffix) {
                (Value::String(s), Value::String(p)) => match s.strip_suffix(p.as_str()) {
                    Some(rest) => Value::from(rest),
                    None => input.clone(),
                },
                _ => input.clone(),
            })
        }),
        _ => return None,
    };
    Some(outputs)
}

fn map_str(input: &Value, what: &str, f: impl Fn(&str) -> String) -> ValueResult {
    match input {
        Value::String(s) => Ok(Value::String(f(s))),
        other => Err(EvalError::msg(format!(
            "{} input must be a string, got {}",
            what,
            other.describe()
        ))),
    }
}

fn from_json(input: &Value) -> ValueResult {
    match input {
        Value::String(s) => Value::from_json(s)
            .map_err(|e| EvalError::msg(format!("{} (while parsing '{}')", e, s))),
        other => Err(EvalError::msg(format!(
            "{} only strings can be parsed",
            other.describe()
        ))),
    }
}

fn to_number(input: &Value) -> ValueResult {
    match input {
        Value::Number(_) => Ok(input.clone()),
        Value::String(s) => serde_json::from_str::<f64>(s.trim())
            .map(Value::Number)
            .map_err(|_| EvalError::msg(format!("Cannot parse '{}' as JSON", s))),
        other => Err(EvalError::msg(format!(
            "{} cannot be parsed as a number",
            other.describe()
        ))),
    }
}

fn explode(input: &Value) -> ValueResult {
    match input {
        Value::String(s) => Ok(Value::Array(
            s.chars().map(|c| Value::from(c as u32 as usize)).collect(),
        )),
        other => Err(EvalError::msg(format!(
            "explode input must be a string, got {}",
            other.describe()
        ))),
    }
}

fn codepoint(value: &Value) -> Result<char, EvalError> {
    match value {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => {
            char::from_u32(*n as u32).ok_or_else(|| EvalError::msg("Invalid codepoint literal"))
        }
        Value::Number(_) => Err(EvalError::msg("Invalid codepoint literal")),
        other => Err(EvalError::msg(format!(
            "Unicode codepoint must be numeric, got {}",
            other.describe()
        ))),
    }
}

fn implode(input: &Value) -> ValueResult {
    match input {
        Value::Array(codes) => codes
            .iter()
            .map(codepoint)
            .collect::<Result<String, _>>()
            .map(Value::String),
        other => Err(EvalError::msg(format!(
            "implode input must be an array, got {}",
            other.describe()
        ))),
    }
}

fn ascii(code: &Value) -> ValueResult {
    match code {
        Value::Number(n) if (0.0..=127.0).contains(n) => codepoint(code).map(|c| Value::String(c.to_string())),
        other => Err(EvalError::msg(format!(
            "ascii requires a code point between 0 and 127, got {}",
            other.describe()
        ))),
    }
}

fn join(input: Value, sep: &Value) -> ValueResult {
    let Value::String(sep) = sep else {
        return Err(EvalError::msg(format!(
            "join separator must be a string, got {}",
            sep.describe()
        )));
    };
    let items = match input {
        Value::Array(items) => items,
        Value::Object(map) => map.into_values().collect(),
        other => return Err(crate::eval::cannot_iterate(&other)),
    };
    let parts = items
        .iter()
        .map(|item| match item {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            Value::Bool(_) | Value::Number(_) => Ok(item.to_string()),
            other => Err(EvalError::msg(format!("Cannot join with {}", other.type_name()))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(parts.join(sep)))
}
