//! Builtin function table.
//!
//! Builtins are dispatched on `(name, arity)`. Arguments are unevaluated
//! filters: a builtin that needs argument *values* evaluates them against its
//! own input and runs once per combination of outputs.
//!
//! - [`strings`]: string conversions and manipulation
//! - [`matching`]: regular-expression builtins
//! - [`math`]: numeric functions

mod math;
mod matching;
mod strings;

use std::cmp::Ordering;
use std::iter;

use crate::ast::Filter;
use crate::error::{EvalError, ValueResult};
use crate::eval::{
    cannot_iterate, collect, defer, empty, environment, err, eval, flat_map_ok, iterate, ok,
    once, recurse_values, Env, Outputs,
};
use crate::format;
use crate::ops;
use crate::paths;
use crate::value::{Map, Value};

/// Every builtin as `(name, arity)`.
const BUILTINS: &[(&str, usize)] = &[
    // introspection
    ("type", 0),
    ("length", 0),
    ("utf8bytelength", 0),
    ("keys", 0),
    ("keys_unsorted", 0),
    ("has", 1),
    ("in", 1),
    ("contains", 1),
    ("inside", 1),
    ("empty", 0),
    ("not", 0),
    ("select", 1),
    ("error", 0),
    ("error", 1),
    ("isempty", 1),
    // collections
    ("add", 0),
    ("unique", 0),
    ("unique_by", 1),
    ("sort", 0),
    ("sort_by", 1),
    ("group_by", 1),
    ("reverse", 0),
    ("min", 0),
    ("max", 0),
    ("min_by", 1),
    ("max_by", 1),
    ("first", 0),
    ("last", 0),
    ("first", 1),
    ("last", 1),
    ("nth", 1),
    ("nth", 2),
    ("flatten", 0),
    ("flatten", 1),
    ("range", 1),
    ("range", 2),
    ("range", 3),
    ("limit", 2),
    ("until", 2),
    ("while", 2),
    ("repeat", 1),
    ("any", 0),
    ("all", 0),
    ("any", 1),
    ("all", 1),
    ("any", 2),
    ("all", 2),
    ("transpose", 0),
    ("indices", 1),
    ("index", 1),
    ("rindex", 1),
    // objects and paths
    ("to_entries", 0),
    ("from_entries", 0),
    ("with_entries", 1),
    ("map", 1),
    ("map_values", 1),
    ("del", 1),
    ("path", 1),
    ("paths", 0),
    ("paths", 1),
    ("leaf_paths", 0),
    ("getpath", 1),
    ("setpath", 2),
    ("delpaths", 1),
    // strings
    ("tostring", 0),
    ("tonumber", 0),
    ("tojson", 0),
    ("fromjson", 0),
    ("ascii_downcase", 0),
    ("ascii_upcase", 0),
    ("explode", 0),
    ("implode", 0),
    ("split", 1),
    ("split", 2),
    ("join", 1),
    ("startswith", 1),
    ("endswith", 1),
    ("ltrimstr", 1),
    ("rtrimstr", 1),
    ("trim", 0),
    ("ltrim", 0),
    ("rtrim", 0),
    ("ascii", 0),
    ("ascii", 1),
    ("format", 1),
    ("test", 1),
    ("test", 2),
    ("match", 1),
    ("match", 2),
    ("capture", 1),
    ("capture", 2),
    ("scan", 1),
    ("scan", 2),
    ("splits", 1),
    ("splits", 2),
    ("sub", 2),
    ("sub", 3),
    ("gsub", 2),
    ("gsub", 3),
    // math
    ("floor", 0),
    ("ceil", 0),
    ("round", 0),
    ("sqrt", 0),
    ("fabs", 0),
    ("abs", 0),
    ("pow", 2),
    ("log", 0),
    ("exp", 0),
    ("log10", 0),
    ("log2", 0),
    ("isinfinite", 0),
    ("isnan", 0),
    ("isnormal", 0),
    ("infinite", 0),
    ("nan", 0),
    // type selectors
    ("values", 0),
    ("nulls", 0),
    ("booleans", 0),
    ("numbers", 0),
    ("strings", 0),
    ("arrays", 0),
    ("objects", 0),
    ("iterables", 0),
    ("scalars", 0),
    // recursion
    ("recurse", 0),
    ("recurse", 1),
    ("recurse", 2),
    ("walk", 1),
    // environment and debugging
    ("env", 0),
    ("debug", 0),
    ("debug", 1),
    ("stderr", 0),
];

/// Whether `name/arity` is a builtin.
pub fn is_defined(name: &str, arity: usize) -> bool {
    BUILTINS.iter().any(|(n, a)| *n == name && *a == arity)
}

/// Call builtin `name` with filter arguments `args`.
pub(crate) fn call<'a>(name: &'a str, args: &'a [Filter], env: &Env, input: Value) -> Outputs<'a> {
    if let Some(outputs) = strings::call(name, args, env, &input) {
        return outputs;
    }
    if let Some(outputs) = matching::call(name, args, env, &input) {
        return outputs;
    }
    if let Some(outputs) = math::call(name, args, env, &input) {
        return outputs;
    }
    match (name, args) {
        // ─── introspection ──────────────────────────────────────────────
        ("type", []) => ok(Value::from(input.type_name())),
        ("length", []) => once(input.length()),
        ("keys" | "keys_unsorted", []) => once(keys(&input)),
        ("has", [key]) => with_arg(key, env, input, |input, key| has(&input, &key)),
        ("in", [object]) => with_arg(object, env, input, |input, object| has(&object, &input)),
        ("contains", [other]) => {
            with_arg(other, env, input, |input, other| contains(&input, &other))
        }
        ("inside", [other]) => with_arg(other, env, input, |input, other| contains(&other, &input)),
        ("empty", []) => empty(),
        ("not", []) => ok(Value::Bool(!input.is_truthy())),
        ("select", [cond]) => {
            let candidate = input.clone();
            flat_map_ok(eval(cond, env, input), move |c| {
                if c.is_truthy() {
                    ok(candidate.clone())
                } else {
                    empty()
                }
            })
        }
        ("error", []) => err(EvalError::Value(input)),
        ("error", [message]) => flat_map_ok(eval(message, env, input), |m| err(EvalError::Value(m))),
        ("isempty", [f]) => once(match eval(f, env, input).next() {
            None => Ok(Value::Bool(true)),
            Some(Ok(_)) => Ok(Value::Bool(false)),
            Some(Err(e)) => Err(e),
        }),

        // ─── collections ────────────────────────────────────────────────
        ("add", []) => once(add(input)),
        ("unique", []) => once(sorted(input).map(|mut items| {
            items.dedup();
            Value::Array(items)
        })),
        ("sort", []) => once(sorted(input).map(Value::Array)),
        ("sort_by", [f]) => once(sort_by_keys(input, f, env).map(|pairs| {
            Value::Array(pairs.into_iter().map(|(_, v)| v).collect())
        })),
        ("unique_by", [f]) => once(sort_by_keys(input, f, env).map(|pairs| {
            let mut out: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                if out.last().is_none_or(|(k, _)| *k != key) {
                    out.push((key, value));
                }
            }
            Value::Array(out.into_iter().map(|(_, v)| v).collect())
        })),
        ("group_by", [f]) => once(sort_by_keys(input, f, env).map(|pairs| {
            let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
            for (key, value) in pairs {
                match groups.last_mut() {
                    Some((k, group)) if *k == key => group.push(value),
                    _ => groups.push((key, vec![value])),
                }
            }
            Value::Array(groups.into_iter().map(|(_, g)| Value::Array(g)).collect())
        })),
        ("min", []) => once(extreme(input, Ordering::Less)),
        ("max", []) => once(extreme(input, Ordering::Greater)),
        ("min_by", [f]) => once(extreme_by(input, f, env, Ordering::Less)),
        ("max_by", [f]) => once(extreme_by(input, f, env, Ordering::Greater)),
        ("reverse", []) => once(reverse(input)),
        ("first", []) => once(input.index(&Value::from(0usize))),
        ("last", []) => once(input.index(&Value::from(-1i64))),
        ("nth", [n]) => with_arg(n, env, input, |input, n| input.index(&n)),
        ("first", [f]) => Box::new(eval(f, env, input).take(1)),
        ("last", [f]) => {
            let outputs = eval(f, env, input);
            defer(move || match last(outputs) {
                Ok(Some(v)) => ok(v),
                Ok(None) => empty(),
                Err(e) => err(e),
            })
        }
        ("nth", [n, f]) => {
            let env = env.clone();
            flat_map_ok(eval(n, &env, input.clone()), move |n| {
                let skip = match n {
                    Value::Number(n) if n < 0.0 => {
                        return err(EvalError::msg("Out of bounds negative array index"));
                    }
                    Value::Number(n) => n as usize,
                    other => {
                        return err(EvalError::msg(format!(
                            "Cannot index array with {}",
                            other.type_name()
                        )));
                    }
                };
                let mut outputs = eval(f, &env, input.clone());
                for _ in 0..skip {
                    match outputs.next() {
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return err(e),
                        None => return empty(),
                    }
                }
                Box::new(outputs.take(1))
            })
        }
        ("flatten", []) => once(flatten(input, f64::INFINITY)),
        ("flatten", [depth]) => with_arg(depth, env, input, |input, depth| match depth {
            Value::Number(d) if d >= 0.0 => flatten(input, d),
            Value::Number(_) => Err(EvalError::msg("flatten depth must not be negative")),
            other => Err(EvalError::msg(format!(
                "flatten depth must be a number, got {}",
                other.type_name()
            ))),
        }),
        ("range", [to]) => flat_map_ok(eval(to, env, input), |to| {
            range(Value::from(0usize), to, Value::from(1usize))
        }),
        ("range", [from, to]) => {
            let env = env.clone();
            flat_map_ok(eval(from, &env, input.clone()), move |from| {
                flat_map_ok(eval(to, &env, input.clone()), move |to| {
                    range(from.clone(), to, Value::from(1usize))
                })
            })
        }
        ("range", [from, to, by]) => {
            let env = env.clone();
            flat_map_ok(eval(from, &env, input.clone()), move |from| {
                let env = env.clone();
                let input = input.clone();
                flat_map_ok(eval(to, &env, input.clone()), move |to| {
                    let from = from.clone();
                    flat_map_ok(eval(by, &env, input.clone()), move |by| {
                        range(from.clone(), to.clone(), by)
                    })
                })
            })
        }
        ("limit", [n, f]) => {
            let env = env.clone();
            flat_map_ok(eval(n, &env, input.clone()), move |n| match n {
                Value::Number(n) if n > 0.0 => Box::new(eval(f, &env, input.clone()).take(n as usize)),
                Value::Number(_) => empty(),
                other => err(EvalError::msg(format!(
                    "Invalid limit {}: must be a number",
                    other.describe()
                ))),
            })
        }
        ("until", [cond, update]) => until(cond, update, env.clone(), input),
        ("while", [cond, update]) => while_loop(cond, update, env.clone(), input),
        ("repeat", [f]) => repeat(f, env.clone(), input),
        ("any", []) => defer(move || once(quantify(iterate(input), None, &Env::default(), true))),
        ("all", []) => defer(move || once(quantify(iterate(input), None, &Env::default(), false))),
        ("any", [cond]) => {
            let env = env.clone();
            defer(move || once(quantify(iterate(input), Some(cond), &env, true)))
        }
        ("all", [cond]) => {
            let env = env.clone();
            defer(move || once(quantify(iterate(input), Some(cond), &env, false)))
        }
        ("any", [generator, cond]) => {
            let env = env.clone();
            defer(move || once(quantify(eval(generator, &env, input), Some(cond), &env, true)))
        }
        ("all", [generator, cond]) => {
            let env = env.clone();
            defer(move || once(quantify(eval(generator, &env, input), Some(cond), &env, false)))
        }
        ("transpose", []) => once(transpose(input)),
        ("indices", [target]) => with_arg(target, env, input, |input, target| indices(&input, &target)),
        ("index", [target]) => with_arg(target, env, input, |input, target| {
            indices(&input, &target).map(|found| match found {
                Value::Array(positions) => positions.into_iter().next().unwrap_or_default(),
                other => other,
            })
        }),
        ("rindex", [target]) => with_arg(target, env, input, |input, target| {
            indices(&input, &target).map(|found| match found {
                Value::Array(positions) => positions.into_iter().next_back().unwrap_or_default(),
                other => other,
            })
        }),

        // ─── objects and paths ──────────────────────────────────────────
        ("to_entries", []) => once(to_entries(input)),
        ("from_entries", []) => once(from_entries(input)),
        ("with_entries", [f]) => {
            let env = env.clone();
            defer(move || {
                let mapped = to_entries(input).and_then(|entries| {
                    let mapped = flat_map_ok(iterate(entries), |entry| eval(f, &env, entry));
                    collect(mapped)
                });
                once(mapped.and_then(|entries| from_entries(Value::Array(entries))))
            })
        }
        ("map", [f]) => {
            let env = env.clone();
            defer(move || {
                let mapped = flat_map_ok(iterate(input), move |item| eval(f, &env, item));
                once(collect(mapped).map(Value::Array))
            })
        }
        ("map_values", [f]) => {
            let env = env.clone();
            defer(move || once(map_values(input, f, &env)))
        }
        ("del", [f]) => {
            let env = env.clone();
            defer(move || {
                once(paths::collect_paths(f, &env, &input).and_then(|found| {
                    let found: Vec<Value> = found.into_iter().map(Value::Array).collect();
                    input.delete_paths(&found)
                }))
            })
        }
        ("path", [f]) => paths::path_values(f, env, input),
        ("paths", []) => Box::new(
            paths::all_paths(input).map(|result| result.map(|(path, _)| Value::Array(path))),
        ),
        ("paths", [f]) => {
            let env = env.clone();
            let found = paths::all_paths(input);
            let found = found.flat_map(move |result| -> Outputs<'a> {
                match result {
                    Ok((path, value)) => {
                        let path = Value::Array(path);
                        flat_map_ok(eval(f, &env, value), move |keep| {
                            if keep.is_truthy() {
                                ok(path.clone())
                            } else {
                                empty()
                            }
                        })
                    }
                    Err(e) => err(e),
                }
            });
            Box::new(crate::eval::UntilError::new(found))
        }
        ("leaf_paths", []) => Box::new(paths::all_paths(input).filter_map(|result| match result {
            Ok((path, value)) if is_scalar(&value) => Some(Ok(Value::Array(path))),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })),
        ("getpath", [path]) => with_arg(path, env, input, |input, path| match path {
            Value::Array(components) => input.get_path(&components),
            _ => Err(EvalError::msg("Path must be specified as an array")),
        }),
        ("setpath", [path, value]) => {
            let env = env.clone();
            flat_map_ok(eval(path, &env, input.clone()), move |path| {
                let input = input.clone();
                flat_map_ok(eval(value, &env, input.clone()), move |value| match &path {
                    Value::Array(components) => once(input.clone().set_path(components, value)),
                    _ => err(EvalError::msg("Path must be specified as an array")),
                })
            })
        }
        ("delpaths", [found]) => with_arg(found, env, input, |input, found| match found {
            Value::Array(found) => input.delete_paths(&found),
            other => Err(EvalError::msg(format!(
                "Paths must be specified as an array, got {}",
                other.type_name()
            ))),
        }),

        // ─── type selectors ─────────────────────────────────────────────
        ("values", []) => select_if(input, |v| !v.is_null()),
        ("nulls", []) => select_if(input, Value::is_null),
        ("booleans", []) => select_if(input, |v| matches!(v, Value::Bool(_))),
        ("numbers", []) => select_if(input, |v| matches!(v, Value::Number(_))),
        ("strings", []) => select_if(input, |v| matches!(v, Value::String(_))),
        ("arrays", []) => select_if(input, |v| matches!(v, Value::Array(_))),
        ("objects", []) => select_if(input, |v| matches!(v, Value::Object(_))),
        ("iterables", []) => select_if(input, |v| matches!(v, Value::Array(_) | Value::Object(_))),
        ("scalars", []) => select_if(input, is_scalar),

        // ─── recursion ──────────────────────────────────────────────────
        ("recurse", []) => recurse_values(input),
        ("recurse", [f]) => recurse(f, None, env.clone(), input),
        ("recurse", [f, cond]) => recurse(f, Some(cond), env.clone(), input),
        ("walk", [f]) => {
            let env = env.clone();
            defer(move || walk(input, f, &env))
        }

        // ─── environment and debugging ──────────────────────────────────
        ("env", []) => ok(environment()),
        ("debug", []) => {
            eprintln!("{}", Value::Array(vec![Value::from("DEBUG:"), input.clone()]));
            ok(input)
        }
        ("debug", [message]) => {
            let passthrough = input.clone();
            let messages = eval(message, env, input);
            defer(move || {
                for m in messages {
                    match m {
                        Ok(m) => eprintln!("{}", Value::Array(vec![Value::from("DEBUG:"), m])),
                        Err(e) => return err(e),
                    }
                }
                ok(passthrough)
            })
        }
        ("stderr", []) => {
            eprint!("{}", input);
            ok(input)
        }
        ("format", [name]) => with_arg(name, env, input, |input, name| match name {
            Value::String(name) => format::apply(&name, &input).map(Value::String),
            other => Err(EvalError::msg(format!("{} is not a valid format", other.describe()))),
        }),
        _ => err(EvalError::msg(format!(
            "{}/{} is not defined",
            name,
            args.len()
        ))),
    }
}

// ─── argument helpers ───────────────────────────────────────────────────────

/// Run `f` once per output of `arg`, evaluated against `input`.
pub(crate) fn with_arg<'a, F>(arg: &'a Filter, env: &Env, input: Value, f: F) -> Outputs<'a>
where
    F: Fn(Value, Value) -> ValueResult + 'a,
{
    let subject = input.clone();
    flat_map_ok(eval(arg, env, input), move |a| once(f(subject.clone(), a)))
}

/// Run `f` once per combination of `first` and `second` outputs; `second`
/// varies fastest.
pub(crate) fn with_args2<'a, F>(
    first: &'a Filter,
    second: &'a Filter,
    env: &Env,
    input: Value,
    f: F,
) -> Outputs<'a>
where
    F: Fn(&Value, Value, Value) -> ValueResult + Clone + 'a,
{
    let env = env.clone();
    flat_map_ok(eval(first, &env, input.clone()), move |a| {
        let f = f.clone();
        let subject = input.clone();
        flat_map_ok(eval(second, &env, input.clone()), move |b| {
            once(f(&subject, a.clone(), b))
        })
    })
}

fn select_if<'a>(input: Value, keep: impl Fn(&Value) -> bool) -> Outputs<'a> {
    if keep(&input) {
        ok(input)
    } else {
        empty()
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn last(outputs: Outputs<'_>) -> Result<Option<Value>, EvalError> {
    let mut last = None;
    for out in outputs {
        last = Some(out?);
    }
    Ok(last)
}

// ─── introspection ──────────────────────────────────────────────────────────

fn keys(input: &Value) -> ValueResult {
    match input {
        Value::Object(map) => Ok(Value::Array(map.keys().map(|k| Value::from(k.as_str())).collect())),
        Value::Array(items) => Ok(Value::Array((0..items.len()).map(Value::from).collect())),
        other => Err(EvalError::msg(format!("{} has no keys", other.describe()))),
    }
}

fn has(container: &Value, key: &Value) -> ValueResult {
    match (container, key) {
        (Value::Object(map), Value::String(k)) => Ok(Value::Bool(map.contains_key(k))),
        (Value::Array(items), Value::Number(n)) => {
            Ok(Value::Bool(*n >= 0.0 && *n < items.len() as f64))
        }
        (container, key) => Err(EvalError::msg(format!(
            "Cannot check whether {} has a {} key",
            container.type_name(),
            key.type_name()
        ))),
    }
}

fn contains(container: &Value, other: &Value) -> ValueResult {
    if container.type_name() != other.type_name() {
        return Err(EvalError::msg(format!(
            "{} and {} cannot have their containment checked",
            container.describe(),
            other.describe()
        )));
    }
    Ok(Value::Bool(container.contains(other)))
}

// ─── collections ────────────────────────────────────────────────────────────

fn array_input(input: Value, action: &str) -> Result<Vec<Value>, EvalError> {
    match input {
        Value::Array(items) => Ok(items),
        other => Err(EvalError::msg(format!(
            "{} cannot be {}, as it is not an array",
            other.describe(),
            action
        ))),
    }
}

fn add(input: Value) -> ValueResult {
    let items = match input {
        Value::Null => return Ok(Value::Null),
        Value::Array(items) => items,
        Value::Object(map) => map.into_values().collect(),
        other => return Err(cannot_iterate(&other)),
    };
    items.into_iter().try_fold(Value::Null, ops::add)
}

fn sorted(input: Value) -> Result<Vec<Value>, EvalError> {
    let mut items = array_input(input, "sorted")?;
    items.sort();
    Ok(items)
}

/// Pair each element with `[f]` and stable-sort on that key.
fn sort_by_keys(input: Value, f: &Filter, env: &Env) -> Result<Vec<(Value, Value)>, EvalError> {
    let items = array_input(input, "sorted")?;
    let mut pairs = items
        .into_iter()
        .map(|item| -> Result<(Value, Value), EvalError> {
            let key = collect(eval(f, env, item.clone()))?;
            Ok((Value::Array(key), item))
        })
        .collect::<Result<Vec<_>, _>>()?;
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(pairs)
}

/// `min` keeps the first minimum, `max` the last maximum.
fn extreme(input: Value, want: Ordering) -> ValueResult {
    let items = array_input(input, "iterated over")?;
    Ok(pick_extreme(items.into_iter().map(|v| (v.clone(), v)), want).unwrap_or_default())
}

fn extreme_by(input: Value, f: &Filter, env: &Env, want: Ordering) -> ValueResult {
    let items = array_input(input, "iterated over")?;
    let keyed = items
        .into_iter()
        .map(|item| -> Result<(Value, Value), EvalError> {
            Ok((Value::Array(collect(eval(f, env, item.clone()))?), item))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pick_extreme(keyed.into_iter(), want).unwrap_or_default())
}

fn pick_extreme(items: impl Iterator<Item = (Value, Value)>, want: Ordering) -> Option<Value> {
    let mut best: Option<(Value, Value)> = None;
    for (key, item) in items {
        let replace = match &best {
            None => true,
            Some((best_key, _)) => {
                let ord = key.cmp(best_key);
                ord == want || (want == Ordering::Greater && ord == Ordering::Equal)
            }
        };
        if replace {
            best = Some((key, item));
        }
    }
    best.map(|(_, item)| item)
}

fn reverse(input: Value) -> ValueResult {
    match input {
        Value::Null => Ok(Value::Array(Vec::new())),
        Value::Array(mut items) => {
            items.reverse();
            Ok(Value::Array(items))
        }
        Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
        other => Err(EvalError::msg(format!(
            "{} cannot be reversed, as it is not an array",
            other.describe()
        ))),
    }
}

fn flatten(input: Value, depth: f64) -> ValueResult {
    fn go(items: Vec<Value>, depth: f64, out: &mut Vec<Value>) {
        for item in items {
            match item {
                Value::Array(inner) if depth > 0.0 => go(inner, depth - 1.0, out),
                other => out.push(other),
            }
        }
    }
    match input {
        Value::Array(items) => {
            let mut out = Vec::new();
            go(items, depth, &mut out);
            Ok(Value::Array(out))
        }
        other => Err(cannot_iterate(&other)),
    }
}

fn range<'a>(from: Value, to: Value, by: Value) -> Outputs<'a> {
    let (Value::Number(from), Value::Number(to), Value::Number(by)) = (from, to, by) else {
        return err(EvalError::msg("Range bounds must be numeric"));
    };
    if by == 0.0 || by.is_nan() {
        return empty();
    }
    let values = iter::successors(Some(from), move |n| Some(n + by))
        .take_while(move |n| if by > 0.0 { *n < to } else { *n > to })
        .map(|n| Ok(Value::Number(n)));
    Box::new(values)
}

/// One step of a loop builtin: a value to yield, or a value whose
/// successors are visited next.
enum Visit {
    Yield(Value),
    Expand(Value),
}

type Visits<'a> = Box<dyn Iterator<Item = Result<Visit, EvalError>> + 'a>;

fn visits<'a, F>(outputs: Outputs<'a>, mut f: F) -> Visits<'a>
where
    F: FnMut(Value) -> Visits<'a> + 'a,
{
    Box::new(outputs.flat_map(move |result| -> Visits<'a> {
        match result {
            Ok(value) => f(value),
            Err(e) => Box::new(iter::once(Err(e))),
        }
    }))
}

fn yield_then_expand<'a>(value: Value) -> Visits<'a> {
    let steps = [Visit::Yield(value.clone()), Visit::Expand(value)];
    Box::new(steps.into_iter().map(Ok::<_, EvalError>))
}

/// Yields `value` once per truthy output of `cond`, expanding after each.
fn gate<'a>(cond: &'a Filter, env: &Env, value: Value) -> Visits<'a> {
    visits(eval(cond, env, value.clone()), move |c| -> Visits<'a> {
        if c.is_truthy() {
            yield_then_expand(value.clone())
        } else {
            Box::new(iter::empty())
        }
    })
}

/// Depth-first driver for the loop builtins. Pending streams sit on an
/// explicit stack, so the number of iterations never becomes call depth.
struct Unfold<'a, F> {
    stack: Vec<Visits<'a>>,
    expand: F,
}

impl<'a, F> Iterator for Unfold<'a, F>
where
    F: FnMut(Value) -> Visits<'a>,
{
    type Item = ValueResult;

    fn next(&mut self) -> Option<ValueResult> {
        loop {
            let visit = self.stack.last_mut()?.next();
            match visit {
                None => {
                    self.stack.pop();
                }
                Some(Ok(Visit::Yield(value))) => return Some(Ok(value)),
                Some(Ok(Visit::Expand(value))) => {
                    let successors = (self.expand)(value);
                    self.stack.push(successors);
                }
                Some(Err(e)) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

fn unfold<'a, F>(root: Visits<'a>, expand: F) -> Outputs<'a>
where
    F: FnMut(Value) -> Visits<'a> + 'a,
{
    Box::new(Unfold {
        stack: vec![root],
        expand,
    })
}

fn until<'a>(cond: &'a Filter, update: &'a Filter, env: Env, input: Value) -> Outputs<'a> {
    fn check<'a>(cond: &'a Filter, env: &Env, value: Value) -> Visits<'a> {
        visits(eval(cond, env, value.clone()), move |c| -> Visits<'a> {
            let visit = if c.is_truthy() {
                Visit::Yield(value.clone())
            } else {
                Visit::Expand(value.clone())
            };
            Box::new(iter::once(Ok::<_, EvalError>(visit)))
        })
    }
    let root = check(cond, &env, input);
    unfold(root, move |value| {
        let env2 = env.clone();
        visits(eval(update, &env, value), move |next| check(cond, &env2, next))
    })
}

fn while_loop<'a>(cond: &'a Filter, update: &'a Filter, env: Env, input: Value) -> Outputs<'a> {
    let root = gate(cond, &env, input);
    unfold(root, move |value| {
        let env2 = env.clone();
        visits(eval(update, &env, value), move |next| gate(cond, &env2, next))
    })
}

fn repeat<'a>(f: &'a Filter, env: Env, input: Value) -> Outputs<'a> {
    unfold(yield_then_expand(input), move |value| {
        visits(eval(f, &env, value), |next| yield_then_expand(next))
    })
}

fn recurse<'a>(f: &'a Filter, cond: Option<&'a Filter>, env: Env, input: Value) -> Outputs<'a> {
    unfold(yield_then_expand(input), move |value| match cond {
        None => visits(eval(f, &env, value), |next| yield_then_expand(next)),
        Some(cond) => {
            let env2 = env.clone();
            visits(eval(f, &env, value), move |next| gate(cond, &env2, next))
        }
    })
}

/// Short-circuiting `any`/`all` over `items`, tested with `cond` or
/// truthiness.
fn quantify(items: Outputs<'_>, cond: Option<&Filter>, env: &Env, any: bool) -> ValueResult {
    for item in items {
        let item = item?;
        let verdicts: Outputs<'_> = match cond {
            Some(cond) => eval(cond, env, item),
            None => ok(item),
        };
        for verdict in verdicts {
            if verdict?.is_truthy() == any {
                return Ok(Value::Bool(any));
            }
        }
    }
    Ok(Value::Bool(!any))
}

fn transpose(input: Value) -> ValueResult {
    let rows = array_input(input, "transposed")?
        .into_iter()
        .map(|row| match row {
            Value::Array(items) => Ok(items),
            other => Err(EvalError::msg(format!(
                "Cannot transpose {}",
                other.describe()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let columns = (0..width)
        .map(|i| {
            Value::Array(
                rows.iter()
                    .map(|row| row.get(i).cloned().unwrap_or_default())
                    .collect(),
            )
        })
        .collect();
    Ok(Value::Array(columns))
}

/// Positions of `target` in `input`: code-point offsets for strings,
/// element offsets for arrays.
fn indices(input: &Value, target: &Value) -> ValueResult {
    match (input, target) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(haystack), Value::String(needle)) => {
            if needle.is_empty() {
                return Ok(Value::Null);
            }
            let hay: Vec<char> = haystack.chars().collect();
            let pin: Vec<char> = needle.chars().collect();
            let found = hay
                .windows(pin.len())
                .enumerate()
                .filter(|(_, w)| *w == pin.as_slice())
                .map(|(i, _)| Value::from(i))
                .collect();
            Ok(Value::Array(found))
        }
        (Value::Array(_), Value::Array(_)) => input.index(target),
        (Value::Array(_), single) => input.index(&Value::Array(vec![single.clone()])),
        (input, target) => Err(EvalError::msg(format!(
            "Cannot determine indices of {} in {}",
            target.describe(),
            input.describe()
        ))),
    }
}

// ─── objects ────────────────────────────────────────────────────────────────

fn entry(key: Value, value: Value) -> Value {
    let mut map = Map::new();
    map.insert("key".to_string(), key);
    map.insert("value".to_string(), value);
    Value::Object(map)
}

fn to_entries(input: Value) -> ValueResult {
    match input {
        Value::Object(map) => Ok(Value::Array(
            map.into_iter()
                .map(|(k, v)| entry(Value::String(k), v))
                .collect(),
        )),
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| entry(Value::from(i), v))
                .collect(),
        )),
        other => Err(EvalError::msg(format!("{} has no keys", other.describe()))),
    }
}

fn from_entries(input: Value) -> ValueResult {
    const KEY_FIELDS: [&str; 6] = ["key", "k", "name", "Name", "Key", "K"];
    const VALUE_FIELDS: [&str; 4] = ["value", "v", "Value", "V"];
    let items = match input {
        Value::Array(items) => items,
        Value::Object(map) => map.into_values().collect(),
        other => return Err(cannot_iterate(&other)),
    };
    let mut out = Map::new();
    for item in items {
        let Value::Object(fields) = item else {
            return Err(EvalError::msg(format!(
                "Cannot use {} as object entry",
                item.describe()
            )));
        };
        let key = KEY_FIELDS
            .iter()
            .filter_map(|f| fields.get(*f))
            .find(|v| v.is_truthy())
            .cloned()
            .unwrap_or_default();
        let value = VALUE_FIELDS
            .iter()
            .find_map(|f| fields.get(*f))
            .cloned()
            .unwrap_or_default();
        let key = match key {
            Value::String(s) => s,
            other => other.to_string(),
        };
        out.insert(key, value);
    }
    Ok(Value::Object(out))
}

/// `.[] |= f`: first output replaces each child, no output deletes it.
fn map_values(input: Value, f: &Filter, env: &Env) -> ValueResult {
    match input {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(v) = eval(f, env, item).next() {
                    out.push(v?);
                }
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, item) in map {
                if let Some(v) = eval(f, env, item).next() {
                    out.insert(k, v?);
                }
            }
            Ok(Value::Object(out))
        }
        other => Err(cannot_iterate(&other)),
    }
}

/// Rebuild bottom-up, applying `f` to every node after its children. Array
/// elements keep every output of the walk; object values keep the first and
/// are dropped when there is none.
fn walk<'a>(input: Value, f: &'a Filter, env: &Env) -> Outputs<'a> {
    let rebuilt = match input {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                for walked in walk(item, f, env) {
                    match walked {
                        Ok(v) => out.push(v),
                        Err(e) => return err(e),
                    }
                }
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, item) in map {
                match walk(item, f, env).next() {
                    Some(Ok(v)) => {
                        out.insert(k, v);
                    }
                    Some(Err(e)) => return err(e),
                    None => {}
                }
            }
            Value::Object(out)
        }
        scalar => scalar,
    };
    eval(f, env, rebuilt)
}
