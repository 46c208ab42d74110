//! # jqlite-core
//!
//! Embeddable interpreter for a substantial subset of the **jq** JSON query
//! language.
//!
//! A filter is compiled once into a [`Program`] and then run against any
//! number of JSON values. Each run yields a lazy stream of results: a filter
//! may produce zero, one or many outputs per input, and runtime errors travel
//! through the stream until a `try` catches them.
//!
//! ## Quick start
//!
//! ```rust
//! use jqlite_core::{compile, Value};
//!
//! let program = compile(".items[] | select(.price > 2) | .name").unwrap();
//! let input = Value::from_json(r#"{"items":[{"name":"a","price":1},{"name":"b","price":3}]}"#).unwrap();
//!
//! let names: Vec<String> = program
//!     .run(input)
//!     .map(|result| result.unwrap().to_string())
//!     .collect();
//! assert_eq!(names, vec![r#""b""#]);
//! ```
//!
//! ## Modules
//!
//! - [`lexer`]: filter source to tokens
//! - [`parser`]: tokens to a [`Filter`] tree
//! - [`eval`]: lazy evaluation of a [`Filter`] against a [`Value`]
//! - [`value`]: the JSON value model with jq's total order
//! - [`format`]: `@csv`, `@base64` and the other string formats
//! - [`error`]: compile-time and runtime error types

pub mod ast;
mod builtins;
pub mod error;
pub mod eval;
pub mod format;
pub mod lexer;
mod ops;
pub mod parser;
mod paths;
pub mod value;

pub use ast::Filter;
pub use builtins::is_defined;
pub use error::{Error, EvalError, Result, ValueResult};
pub use eval::{compile, compile_with_vars, eval, Env, Outputs, Program};
pub use lexer::lex;
pub use parser::{parse, parse_with_globals};
pub use value::{Map, Value};
