//! Error types for compiling and evaluating jq filters.

use crate::value::Value;
use thiserror::Error;

/// Errors raised before any input is evaluated: while tokenising or parsing
/// a filter, or while decoding JSON text into a [`Value`].
#[derive(Error, Debug)]
pub enum Error {
    /// The filter source could not be tokenised.
    /// Line and column are 1-based.
    #[error("lex error at line {line}, column {column}: {message}")]
    Lex {
        line: usize,
        column: usize,
        message: String,
    },

    /// The token stream does not form a valid filter.
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// JSON text handed to the library was malformed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON text nested deeper than [`MAX_DEPTH`](crate::value::MAX_DEPTH).
    #[error("Exceeds depth limit for parsing")]
    Depth,
}

/// Convenience alias used throughout jqlite-core.
pub type Result<T> = std::result::Result<T, Error>;

/// A runtime failure raised while a filter runs.
///
/// Runtime errors travel through the result stream as `Err` items until a
/// `try` catches them. `catch` receives [`EvalError::into_value`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Raised by the evaluator or a builtin.
    #[error("{0}")]
    Message(String),

    /// Raised by `error(v)`; carries an arbitrary value.
    #[error("{}", thrown_message(.0))]
    Value(Value),
}

impl EvalError {
    pub fn msg(message: impl Into<String>) -> Self {
        EvalError::Message(message.into())
    }

    /// The value a `catch` handler sees as its input.
    pub fn into_value(self) -> Value {
        match self {
            EvalError::Message(message) => Value::String(message),
            EvalError::Value(value) => value,
        }
    }
}

fn thrown_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format!("{} (not a string)", other),
    }
}

/// Result of producing a single value during evaluation.
pub type ValueResult = std::result::Result<Value, EvalError>;
