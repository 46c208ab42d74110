//! The JSON value model.
//!
//! [`Value`] is the tagged sum every filter consumes and produces. Besides the
//! six JSON variants it defines the operations the evaluator builds on:
//!
//! - **Equality and ordering**: structural equality and the jq total order
//!   `null < false < true < number < string < array < object`.
//! - **Containment**: the relation behind `contains` and `inside`.
//! - **Indexing and slicing**: `.[k]` and `.[a:b]`.
//! - **Path algebra**: [`Value::get_path`], [`Value::set_path`] and
//!   [`Value::delete_paths`], which work on owned copies so an input document
//!   is never visibly modified.
//!
//! Objects are kept in a `BTreeMap`, so every walk over an object (iteration,
//! `keys`, `to_entries`, output encoding) sees keys in lexicographic order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde::Deserialize;

use crate::error::{Error, EvalError, ValueResult};

/// Object representation: keys iterate in lexicographic order.
pub type Map = BTreeMap<String, Value>;

/// Deepest array and object nesting accepted in JSON text.
pub const MAX_DEPTH: usize = 10_000;

/// Arrays longer than this cannot be created by path assignment.
const MAX_ARRAY_INDEX: f64 = 536_870_912.0;

/// Numbers with a magnitude below this print without a fractional part.
const INTEGER_PRINT_LIMIT: f64 = 1e17;

/// A JSON value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    /// The jq type name: `null`, `boolean`, `number`, `string`, `array` or `object`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Only `null` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Short rendering used in error messages, e.g. `number (42)` or
    /// `string ("a long st...)`.
    pub fn describe(&self) -> String {
        const LIMIT: usize = 11;
        let rendered = self.to_string();
        if rendered.len() <= LIMIT {
            return format!("{} ({})", self.type_name(), rendered);
        }
        let mut cut = LIMIT;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{} ({}...)", self.type_name(), &rendered[..cut])
    }

    /// Position in the cross-type order.
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    /// `length`: code points of a string, elements of an array, keys of an
    /// object, absolute value of a number, zero for null.
    pub fn length(&self) -> ValueResult {
        match self {
            Value::Null => Ok(Value::Number(0.0)),
            Value::Bool(_) => Err(EvalError::msg(format!(
                "{} has no length",
                self.describe()
            ))),
            Value::Number(n) => Ok(Value::Number(n.abs())),
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(a) => Ok(Value::from(a.len())),
            Value::Object(m) => Ok(Value::from(m.len())),
        }
    }

    /// Containment as used by `contains`. Values of different types are never
    /// contained in each other; the builtin reports that case as an error.
    pub fn contains(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => b
                .iter()
                .all(|(k, bv)| a.get(k).is_some_and(|av| av.contains(bv))),
            (Value::Array(a), Value::Array(b)) => {
                b.iter().all(|bv| a.iter().any(|av| av.contains(bv)))
            }
            (Value::String(a), Value::String(b)) => a.contains(b.as_str()),
            (a, b) => a == b,
        }
    }

    /// `.[key]`: object lookup, array index, slice object or sub-array search.
    pub fn index(&self, key: &Value) -> ValueResult {
        match (self, key) {
            (Value::Object(map), Value::String(k)) => {
                Ok(map.get(k).cloned().unwrap_or(Value::Null))
            }
            (Value::Array(arr), Value::Number(n)) => Ok(resolve_index(arr.len(), *n)
                .and_then(|i| arr.get(i).cloned())
                .unwrap_or(Value::Null)),
            (Value::Null, Value::String(_) | Value::Number(_) | Value::Null) => Ok(Value::Null),
            (Value::Null | Value::Array(_) | Value::String(_), Value::Object(bounds)) => {
                let start = bounds.get("start").unwrap_or(&Value::Null);
                let end = bounds.get("end").unwrap_or(&Value::Null);
                self.slice(start, end)
            }
            (Value::Array(arr), Value::Array(needle)) => Ok(array_indices(arr, needle)),
            _ => Err(index_error(self, key)),
        }
    }

    /// `.[start:end]` on arrays and strings (by code point); `null` slices to `null`.
    pub fn slice(&self, start: &Value, end: &Value) -> ValueResult {
        let bound = |v: &Value| match v {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(Some(*n)),
            _ => Err(EvalError::msg(
                "Start and end indices of an array slice must be numbers",
            )),
        };
        let (start, end) = (bound(start)?, bound(end)?);
        match self {
            Value::Null => Ok(Value::Null),
            Value::Array(arr) => {
                let (from, to) = slice_bounds(arr.len(), start, end);
                Ok(Value::Array(arr[from..to].to_vec()))
            }
            Value::String(s) => {
                let (from, to) = slice_bounds(s.chars().count(), start, end);
                Ok(Value::String(s.chars().skip(from).take(to - from).collect()))
            }
            other => Err(EvalError::msg(format!(
                "Cannot index {} with object",
                other.type_name()
            ))),
        }
    }

    /// Follow `path` from this value. Missing keys, out-of-range indices and
    /// `null` along the way all produce `null`.
    pub fn get_path(&self, path: &[Value]) -> ValueResult {
        match path.split_first() {
            None => Ok(self.clone()),
            Some((_, _)) if self.is_null() => Ok(Value::Null),
            Some((head, rest)) => self.index(head)?.get_path(rest),
        }
    }

    /// Return a copy of this value with `value` stored at `path`, creating
    /// intermediate objects and arrays as needed.
    pub fn set_path(self, path: &[Value], value: Value) -> ValueResult {
        let Some((head, rest)) = path.split_first() else {
            return Ok(value);
        };
        let base = match (self, head) {
            (Value::Null, Value::String(_)) => Value::Object(Map::new()),
            (Value::Null, Value::Number(_) | Value::Object(_)) => Value::Array(Vec::new()),
            (base, _) => base,
        };
        match (base, head) {
            (Value::Object(mut map), Value::String(key)) => {
                let child = map.remove(key).unwrap_or_default();
                map.insert(key.clone(), child.set_path(rest, value)?);
                Ok(Value::Object(map))
            }
            (Value::Array(mut arr), Value::Number(n)) => {
                let i = assignable_index(arr.len(), *n)?;
                if i >= arr.len() {
                    arr.resize(i + 1, Value::Null);
                }
                let child = std::mem::take(&mut arr[i]);
                arr[i] = child.set_path(rest, value)?;
                Ok(Value::Array(arr))
            }
            (Value::Array(mut arr), Value::Object(bounds)) => {
                let (from, to) = object_slice_bounds(arr.len(), bounds)?;
                let current = Value::Array(arr[from..to].to_vec());
                match current.set_path(rest, value)? {
                    Value::Array(replacement) => {
                        arr.splice(from..to, replacement);
                        Ok(Value::Array(arr))
                    }
                    _ => Err(EvalError::msg(
                        "A slice of an array can only be assigned another array",
                    )),
                }
            }
            (base, head) => Err(index_error(&base, head)),
        }
    }

    /// Delete every path in `paths` (each an array value). Paths are applied
    /// in descending order so array deletions do not shift pending indices.
    pub fn delete_paths(self, paths: &[Value]) -> ValueResult {
        let mut sorted: Vec<&[Value]> = paths
            .iter()
            .map(|p| match p {
                Value::Array(components) => Ok(components.as_slice()),
                _ => Err(EvalError::msg("Path must be specified as an array")),
            })
            .collect::<Result<_, _>>()?;
        sorted.sort_by(|a, b| b.cmp(a));
        sorted.dedup();
        sorted
            .into_iter()
            .try_fold(self, |acc, path| acc.delete_path(path))
    }

    fn delete_path(self, path: &[Value]) -> ValueResult {
        let Some((head, rest)) = path.split_first() else {
            return Ok(Value::Null);
        };
        match (self, head) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Object(mut map), Value::String(key)) => {
                if rest.is_empty() {
                    map.remove(key);
                } else if let Some(child) = map.remove(key) {
                    map.insert(key.clone(), child.delete_path(rest)?);
                }
                Ok(Value::Object(map))
            }
            (Value::Array(mut arr), Value::Number(n)) => {
                if let Some(i) = resolve_index(arr.len(), *n).filter(|i| *i < arr.len()) {
                    if rest.is_empty() {
                        arr.remove(i);
                    } else {
                        let child = std::mem::take(&mut arr[i]);
                        arr[i] = child.delete_path(rest)?;
                    }
                }
                Ok(Value::Array(arr))
            }
            (Value::Array(mut arr), Value::Object(bounds)) => {
                let (from, to) = object_slice_bounds(arr.len(), bounds)?;
                if rest.is_empty() {
                    arr.drain(from..to);
                } else if let Value::Array(replacement) =
                    Value::Array(arr[from..to].to_vec()).delete_path(rest)?
                {
                    arr.splice(from..to, replacement);
                }
                Ok(Value::Array(arr))
            }
            (base, head) => Err(EvalError::msg(format!(
                "Cannot delete field at {} index of {}",
                head.type_name(),
                base.type_name()
            ))),
        }
    }

    /// Decode a single JSON document.
    pub fn from_json(text: &str) -> crate::Result<Value> {
        if depth_exceeded_at(text).is_some() {
            return Err(Error::Depth);
        }
        let mut de = serde_json::Deserializer::from_str(text);
        de.disable_recursion_limit();
        let parsed = serde_json::Value::deserialize(&mut de)?;
        de.end()?;
        Ok(Value::from(parsed))
    }

    /// Decode a sequence of whitespace-separated JSON documents. The stream
    /// ends after the first malformed one.
    pub fn from_json_stream(text: &str) -> impl Iterator<Item = crate::Result<Value>> + '_ {
        let too_deep = depth_exceeded_at(text);
        let mut de = serde_json::Deserializer::from_str(&text[..too_deep.unwrap_or(text.len())]);
        de.disable_recursion_limit();
        let mut documents = de.into_iter::<serde_json::Value>();
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed {
                return None;
            }
            let Some(document) = documents.next() else {
                failed = true;
                return too_deep.map(|_| Err(Error::Depth));
            };
            let decoded = document.map(Value::from).map_err(|e| match too_deep {
                // the cut-off document ends early
                Some(_) if e.is_eof() => Error::Depth,
                _ => Error::Json(e),
            });
            failed = decoded.is_err();
            Some(decoded)
        })
    }

    /// Encode with one indentation unit per nesting level, e.g. `"  "` or `"\t"`.
    pub fn to_json_pretty(&self, indent: &str) -> Result<String, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(out).map_err(serde::ser::Error::custom)
    }
}

/// Byte offset of the first bracket nested deeper than [`MAX_DEPTH`],
/// skipping string contents.
fn depth_exceeded_at(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, byte) in text.bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Some(i);
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Resolve a possibly negative, possibly fractional array index. Returns
/// `None` when a negative index reaches before the start.
fn resolve_index(len: usize, n: f64) -> Option<usize> {
    let i = n.floor();
    let i = if i < 0.0 { i + len as f64 } else { i };
    (i >= 0.0).then_some(i as usize)
}

fn assignable_index(len: usize, n: f64) -> Result<usize, EvalError> {
    if n.is_nan() {
        return Ok(0);
    }
    if n >= MAX_ARRAY_INDEX {
        return Err(EvalError::msg("Array index too large"));
    }
    resolve_index(len, n).ok_or_else(|| EvalError::msg("Out of bounds negative array index"))
}

fn slice_bounds(len: usize, start: Option<f64>, end: Option<f64>) -> (usize, usize) {
    let len_f = len as f64;
    let clamp = |v: f64| {
        let v = if v < 0.0 { v + len_f } else { v };
        v.clamp(0.0, len_f)
    };
    let from = clamp(start.unwrap_or(0.0)).floor() as usize;
    let to = clamp(end.unwrap_or(len_f)).ceil() as usize;
    (from, to.max(from))
}

fn object_slice_bounds(len: usize, bounds: &Map) -> Result<(usize, usize), EvalError> {
    let bound = |key: &str| match bounds.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(*n)),
        Some(_) => Err(EvalError::msg(
            "Start and end indices of an array slice must be numbers",
        )),
    };
    Ok(slice_bounds(len, bound("start")?, bound("end")?))
}

/// Positions at which `needle` occurs as a contiguous run inside `haystack`.
fn array_indices(haystack: &[Value], needle: &[Value]) -> Value {
    if needle.is_empty() {
        return Value::Null;
    }
    let positions = haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(i, _)| Value::from(i))
        .collect();
    Value::Array(positions)
}

fn index_error(base: &Value, key: &Value) -> EvalError {
    match key {
        Value::String(k) => EvalError::msg(format!(
            "Cannot index {} with \"{}\"",
            base.type_name(),
            k
        )),
        other => EvalError::msg(format!(
            "Cannot index {} with {}",
            base.type_name(),
            other.type_name()
        )),
    }
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    // NaN sorts below every number and equals itself.
    a.partial_cmp(&b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()).reverse())
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => compare_numbers(*a, *b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a
                .keys()
                .cmp(b.keys())
                .then_with(|| a.values().cmp(b.values())),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serialize_number(*n, serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for item in arr {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

fn serialize_number<S: Serializer>(n: f64, serializer: S) -> Result<S::Ok, S::Error> {
    if n.is_nan() {
        serializer.serialize_unit()
    } else if n.is_infinite() {
        serializer.serialize_f64(f64::MAX.copysign(n))
    } else if n.fract() == 0.0 && n.abs() < INTEGER_PRINT_LIMIT {
        serializer.serialize_i64(n as i64)
    } else {
        serializer.serialize_f64(n)
    }
}

/// Compact JSON encoding.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}
