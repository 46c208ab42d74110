//! Path-mode evaluation and assignment.
//!
//! In path mode a filter yields `(path, value)` pairs instead of bare values:
//! the location of each output inside the input document, alongside the
//! output itself. `path(f)`, `paths`, `del(f)` and every assignment operator
//! are built on this. Only filters that navigate the input have a path;
//! anything else fails with "Invalid path expression".

use std::iter;

use crate::ast::{AssignOp, Filter};
use crate::error::{EvalError, ValueResult};
use crate::eval::{defer, eval, flat_map_ok, once, Env, Outputs, UntilError};
use crate::ops;
use crate::value::Value;

pub(crate) type Path = Vec<Value>;
pub(crate) type PathResult = Result<(Path, Value), EvalError>;
pub(crate) type PathOutputs<'a> = Box<dyn Iterator<Item = PathResult> + 'a>;

fn single<'a>(path: Path, value: Value) -> PathOutputs<'a> {
    Box::new(iter::once(Ok((path, value))))
}

fn fail<'a>(error: EvalError) -> PathOutputs<'a> {
    Box::new(iter::once(Err(error)))
}

fn nothing<'a>() -> PathOutputs<'a> {
    Box::new(iter::empty())
}

fn flat_map_paths<'a, F>(outputs: PathOutputs<'a>, mut f: F) -> PathOutputs<'a>
where
    F: FnMut(Path, Value) -> PathOutputs<'a> + 'a,
{
    let flattened = outputs.flat_map(move |result| match result {
        Ok((path, value)) => f(path, value),
        Err(e) => fail(e),
    });
    Box::new(UntilError::new(flattened))
}

/// Map ordinary outputs to path outputs, sharing one location.
fn with_values<'a, F>(outputs: Outputs<'a>, mut f: F) -> PathOutputs<'a>
where
    F: FnMut(Value) -> PathOutputs<'a> + 'a,
{
    let flattened = outputs.flat_map(move |result| match result {
        Ok(value) => f(value),
        Err(e) => fail(e),
    });
    Box::new(UntilError::new(flattened))
}

fn invalid_path(value: &Value) -> EvalError {
    let mut rendered = value.to_string();
    if rendered.len() > 11 {
        let mut cut = 11;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        rendered.truncate(cut);
        rendered.push_str("...");
    }
    EvalError::msg(format!("Invalid path expression with result {}", rendered))
}

fn extend(path: &Path, component: Value) -> Path {
    let mut next = Vec::with_capacity(path.len() + 1);
    next.extend(path.iter().cloned());
    next.push(component);
    next
}

/// Evaluate `filter` in path mode, starting from `value` found at `path`.
pub(crate) fn eval_paths<'a>(
    filter: &'a Filter,
    env: &Env,
    path: Path,
    value: Value,
) -> PathOutputs<'a> {
    match filter {
        Filter::Identity => single(path, value),
        Filter::RecurseDefault => recurse(Step::Children, env.clone(), path, value),
        Filter::Index(target, key) => {
            let env = env.clone();
            let keys = eval(key, &env, value.clone());
            with_values(keys, move |key| {
                let targets = eval_paths(target, &env, path.clone(), value.clone());
                flat_map_paths(targets, move |p, v| index_step(p, v, key.clone()))
            })
        }
        Filter::Slice(target, from, to) => {
            let env = env.clone();
            let bounds = slice_objects(from.as_deref(), to.as_deref(), &env, value.clone());
            with_values(bounds, move |bounds| {
                let targets = eval_paths(target, &env, path.clone(), value.clone());
                flat_map_paths(targets, move |p, v| {
                    let (start, end) = match &bounds {
                        Value::Object(m) => (
                            m.get("start").cloned().unwrap_or_default(),
                            m.get("end").cloned().unwrap_or_default(),
                        ),
                        _ => (Value::Null, Value::Null),
                    };
                    match v.slice(&start, &end) {
                        Ok(sliced) => single(extend(&p, bounds.clone()), sliced),
                        Err(e) => fail(e),
                    }
                })
            })
        }
        Filter::Iterate(target) => {
            flat_map_paths(eval_paths(target, env, path, value), children)
        }
        Filter::Pipe(lhs, rhs) => {
            let env = env.clone();
            flat_map_paths(eval_paths(lhs, &env, path, value), move |p, v| {
                eval_paths(rhs, &env, p, v)
            })
        }
        Filter::Comma(lhs, rhs) => {
            let env = env.clone();
            let first = eval_paths(lhs, &env, path.clone(), value.clone());
            let rest = iter::once_with(move || eval_paths(rhs, &env, path, value)).flatten();
            Box::new(UntilError::new(first.chain(rest)))
        }
        Filter::Literal(Value::Null) => single(path, Value::Null),
        Filter::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let env = env.clone();
            with_values(eval(cond, &env, value.clone()), move |c| {
                if c.is_truthy() {
                    eval_paths(then_branch, &env, path.clone(), value.clone())
                } else {
                    match else_branch {
                        Some(branch) => eval_paths(branch, &env, path.clone(), value.clone()),
                        None => single(path.clone(), value.clone()),
                    }
                }
            })
        }
        Filter::Alternative(lhs, rhs) => {
            let mut truthy: Vec<PathResult> = Vec::new();
            for result in eval_paths(lhs, env, path.clone(), value.clone()) {
                match result {
                    Ok((p, v)) if v.is_truthy() => truthy.push(Ok((p, v))),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            if truthy.is_empty() {
                eval_paths(rhs, env, path, value)
            } else {
                Box::new(truthy.into_iter())
            }
        }
        Filter::Try { body, handler } => {
            let mut body = eval_paths(body, env, path, value);
            let env = env.clone();
            let mut caught: Option<PathOutputs<'a>> = None;
            let mut done = false;
            Box::new(iter::from_fn(move || {
                if let Some(outputs) = caught.as_mut() {
                    return outputs.next();
                }
                if done {
                    return None;
                }
                match body.next()? {
                    Ok(pair) => Some(Ok(pair)),
                    Err(error) => {
                        done = true;
                        let handler = handler.as_deref()?;
                        let outputs = eval(handler, &env, error.into_value());
                        let mut outputs = with_values(outputs, |v| fail(invalid_path(&v)));
                        let first = outputs.next();
                        caught = Some(outputs);
                        first
                    }
                }
            }))
        }
        Filter::Call { name, args } => call_paths(name, args, env, path, value),
        other => with_values(eval(other, env, value), |v| fail(invalid_path(&v))),
    }
}

fn index_step<'a>(path: Path, value: Value, key: Value) -> PathOutputs<'a> {
    if value.is_null() {
        return single(extend(&path, key), Value::Null);
    }
    match value.index(&key) {
        Ok(found) => single(extend(&path, key), found),
        Err(e) => fail(e),
    }
}

fn children<'a>(path: Path, value: Value) -> PathOutputs<'a> {
    match value {
        Value::Array(items) => Box::new(
            items
                .into_iter()
                .enumerate()
                .map(move |(i, item)| Ok((extend(&path, Value::from(i)), item))),
        ),
        Value::Object(map) => Box::new(
            map.into_iter()
                .map(move |(k, item)| Ok((extend(&path, Value::String(k)), item))),
        ),
        other => fail(crate::eval::cannot_iterate(&other)),
    }
}

/// Slice bounds as `{"start", "end"}` path components.
fn slice_objects<'a>(
    from: Option<&'a Filter>,
    to: Option<&'a Filter>,
    env: &Env,
    input: Value,
) -> Outputs<'a> {
    let env = env.clone();
    let tos = match to {
        Some(f) => eval(f, &env, input.clone()),
        None => once(Ok(Value::Null)),
    };
    flat_map_ok(tos, move |end| {
        let froms = match from {
            Some(f) => eval(f, &env, input.clone()),
            None => once(Ok(Value::Null)),
        };
        flat_map_ok(froms, move |start| {
            let mut bounds = crate::value::Map::new();
            bounds.insert("start".to_string(), start);
            bounds.insert("end".to_string(), end.clone());
            once(Ok(Value::Object(bounds)))
        })
    })
}

/// How `recurse` steps from a value to its successors.
#[derive(Clone, Copy)]
pub(crate) enum Step<'a> {
    /// `.[]?`
    Children,
    /// `f`, optionally filtered by `cond`.
    Filter(&'a Filter, Option<&'a Filter>),
}

fn recurse<'a>(step: Step<'a>, env: Env, path: Path, value: Value) -> PathOutputs<'a> {
    Box::new(Recurse {
        stack: vec![single(path, value)],
        pending: None,
        step,
        env,
    })
}

/// Pre-order walk over `recurse` successors. The stack holds one stream per
/// level, so deep documents and long chains stay off the call stack.
struct Recurse<'a> {
    stack: Vec<PathOutputs<'a>>,
    /// The last yielded location, expanded on the next pull.
    pending: Option<(Path, Value)>,
    step: Step<'a>,
    env: Env,
}

impl<'a> Recurse<'a> {
    fn successors(&self, path: Path, value: Value) -> PathOutputs<'a> {
        match self.step {
            Step::Children if matches!(value, Value::Array(_) | Value::Object(_)) => {
                children(path, value)
            }
            Step::Children => nothing(),
            Step::Filter(f, None) => eval_paths(f, &self.env, path, value),
            Step::Filter(f, Some(cond)) => {
                let env = self.env.clone();
                flat_map_paths(eval_paths(f, &self.env, path, value), move |p, v| {
                    let keep = eval(cond, &env, v.clone());
                    with_values(keep, move |c| {
                        if c.is_truthy() {
                            single(p.clone(), v.clone())
                        } else {
                            nothing()
                        }
                    })
                })
            }
        }
    }
}

impl<'a> Iterator for Recurse<'a> {
    type Item = PathResult;

    fn next(&mut self) -> Option<PathResult> {
        if let Some((path, value)) = self.pending.take() {
            let successors = self.successors(path, value);
            self.stack.push(successors);
        }
        loop {
            let next = self.stack.last_mut()?.next();
            match next {
                None => {
                    self.stack.pop();
                }
                Some(Ok((path, value))) => {
                    self.pending = Some((path.clone(), value.clone()));
                    return Some(Ok((path, value)));
                }
                Some(Err(e)) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

fn call_paths<'a>(
    name: &'a str,
    args: &'a [Filter],
    env: &Env,
    path: Path,
    value: Value,
) -> PathOutputs<'a> {
    match (name, args) {
        ("empty", []) => nothing(),
        ("error", _) => with_values(crate::builtins::call(name, args, env, value), |v| {
            fail(invalid_path(&v))
        }),
        ("select", [cond]) => with_values(eval(cond, env, value.clone()), move |c| {
            if c.is_truthy() {
                single(path.clone(), value.clone())
            } else {
                nothing()
            }
        }),
        ("recurse", []) => recurse(Step::Children, env.clone(), path, value),
        ("recurse", [f]) => recurse(Step::Filter(f, None), env.clone(), path, value),
        ("recurse", [f, cond]) => recurse(Step::Filter(f, Some(cond)), env.clone(), path, value),
        ("first", []) => index_step(path, value, Value::from(0usize)),
        ("last", []) => index_step(path, value, Value::from(-1i64)),
        ("nth", [n]) => {
            let target = value.clone();
            with_values(eval(n, env, value), move |n| {
                index_step(path.clone(), target.clone(), n)
            })
        }
        ("first", [f]) => Box::new(eval_paths(f, env, path, value).take(1)),
        ("last", [f]) => {
            let mut last = None;
            for result in eval_paths(f, env, path, value) {
                match result {
                    Ok(pair) => last = Some(pair),
                    Err(e) => return fail(e),
                }
            }
            match last {
                Some((p, v)) => single(p, v),
                None => nothing(),
            }
        }
        ("limit", [n, f]) => {
            let env = env.clone();
            with_values(eval(n, &env, value.clone()), move |n| {
                let count = n.as_f64().unwrap_or(0.0);
                if count <= 0.0 {
                    return nothing();
                }
                Box::new(eval_paths(f, &env, path.clone(), value.clone()).take(count as usize))
            })
        }
        ("getpath", [p]) => with_values(eval(p, env, value.clone()), move |components| {
            match components {
                Value::Array(components) => {
                    let found = value.get_path(&components).unwrap_or(Value::Null);
                    let mut full = path.clone();
                    full.extend(components);
                    single(full, found)
                }
                _ => fail(EvalError::msg("Path must be specified as an array")),
            }
        }),
        _ => with_values(crate::builtins::call(name, args, env, value), |v| {
            fail(invalid_path(&v))
        }),
    }
}

/// Every path `filter` designates in `input`.
pub(crate) fn collect_paths(
    filter: &Filter,
    env: &Env,
    input: &Value,
) -> Result<Vec<Path>, EvalError> {
    eval_paths(filter, env, Vec::new(), input.clone())
        .map(|result| result.map(|(path, _)| path))
        .collect()
}

/// `path(f)` as a value stream.
pub(crate) fn path_values<'a>(filter: &'a Filter, env: &Env, input: Value) -> Outputs<'a> {
    Box::new(
        eval_paths(filter, env, Vec::new(), input)
            .map(|result| result.map(|(path, _)| Value::Array(path))),
    )
}

/// Non-root paths in pre-order, each with the value found there.
pub(crate) fn all_paths<'a>(input: Value) -> PathOutputs<'a> {
    Box::new(recurse(Step::Children, Env::default(), Vec::new(), input).skip(1))
}

pub(crate) fn assign<'a>(
    op: AssignOp,
    lhs: &'a Filter,
    rhs: &'a Filter,
    env: &Env,
    input: Value,
) -> Outputs<'a> {
    let env = env.clone();
    match op {
        AssignOp::Update => defer(move || once(update(lhs, rhs, &env, input))),
        AssignOp::Set => {
            let values = eval(rhs, &env, input.clone());
            flat_map_ok(values, move |v| {
                once(modify(lhs, &env, input.clone(), |_| Ok(v.clone())))
            })
        }
        AssignOp::Arith(arith) => {
            let values = eval(rhs, &env, input.clone());
            flat_map_ok(values, move |v| {
                once(modify(lhs, &env, input.clone(), |old| {
                    ops::arith(arith, old, v.clone())
                }))
            })
        }
        AssignOp::Alternative => {
            let values = eval(rhs, &env, input.clone());
            flat_map_ok(values, move |v| {
                once(modify(lhs, &env, input.clone(), |old| {
                    Ok(if old.is_truthy() { old } else { v.clone() })
                }))
            })
        }
    }
}

/// Replace the value at every path of `lhs` with `f(old)`.
fn modify<F>(lhs: &Filter, env: &Env, input: Value, mut f: F) -> ValueResult
where
    F: FnMut(Value) -> ValueResult,
{
    let paths = collect_paths(lhs, env, &input)?;
    paths.into_iter().try_fold(input, |acc, path| {
        let old = acc.get_path(&path)?;
        acc.set_path(&path, f(old)?)
    })
}

/// `lhs |= rhs`: the first output of `rhs` replaces each value; paths where
/// `rhs` is empty are deleted.
fn update(lhs: &Filter, rhs: &Filter, env: &Env, input: Value) -> ValueResult {
    let paths = collect_paths(lhs, env, &input)?;
    let mut doomed = Vec::new();
    let mut acc = input;
    for path in paths {
        let old = acc.get_path(&path)?;
        match eval(rhs, env, old).next() {
            Some(new) => acc = acc.set_path(&path, new?)?,
            None => doomed.push(Value::Array(path)),
        }
    }
    acc.delete_paths(&doomed)
}
