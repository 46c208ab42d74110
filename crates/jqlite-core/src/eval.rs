//! Lazy tree-walking evaluator.
//!
//! Every filter maps one input value to an [`Outputs`] stream. Streams are
//! boxed iterators, so nothing is computed until the consumer pulls: `first`,
//! `limit` and `isempty` stop early without running the rest of the
//! producer. A runtime error is an `Err` item; producers built with
//! [`flat_map_ok`] end right after yielding one.

use std::iter;
use std::rc::Rc;

use crate::ast::{Filter, ObjectKey, StringPart};
use crate::builtins;
use crate::error::{EvalError, Result, ValueResult};
use crate::format;
use crate::ops;
use crate::parser;
use crate::paths;
use crate::value::{Map, Value};

/// A lazy stream of filter results.
pub type Outputs<'a> = Box<dyn Iterator<Item = ValueResult> + 'a>;

/// Variable bindings as a persistent linked list. Binding never disturbs the
/// environment other branches of the evaluation still hold.
#[derive(Clone, Default)]
pub struct Env(Option<Rc<Frame>>);

struct Frame {
    name: String,
    value: Value,
    parent: Env,
}

impl Env {
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Env {
        Env(Some(Rc::new(Frame {
            name: name.into(),
            value,
            parent: self.clone(),
        })))
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut env = self;
        while let Some(frame) = &env.0 {
            if frame.name == name {
                return Some(&frame.value);
            }
            env = &frame.parent;
        }
        None
    }
}

// ─── stream helpers ─────────────────────────────────────────────────────────

pub(crate) fn once<'a>(result: ValueResult) -> Outputs<'a> {
    Box::new(iter::once(result))
}

pub(crate) fn ok<'a>(value: Value) -> Outputs<'a> {
    once(Ok(value))
}

pub(crate) fn err<'a>(error: EvalError) -> Outputs<'a> {
    once(Err(error))
}

pub(crate) fn empty<'a>() -> Outputs<'a> {
    Box::new(iter::empty())
}

/// Build the stream only when it is first pulled.
pub(crate) fn defer<'a, F>(make: F) -> Outputs<'a>
where
    F: FnOnce() -> Outputs<'a> + 'a,
{
    Box::new(iter::once_with(make).flatten())
}

/// Feed every value of `outputs` through `f`, concatenating the streams.
/// Errors pass through and end the stream.
pub(crate) fn flat_map_ok<'a, F>(outputs: Outputs<'a>, mut f: F) -> Outputs<'a>
where
    F: FnMut(Value) -> Outputs<'a> + 'a,
{
    let flattened = outputs.flat_map(move |result| match result {
        Ok(value) => f(value),
        Err(e) => err(e),
    });
    Box::new(UntilError::new(flattened))
}

/// Ends a stream after its first error.
pub(crate) struct UntilError<I> {
    inner: I,
    failed: bool,
}

impl<I> UntilError<I> {
    pub(crate) fn new(inner: I) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl<T, I: Iterator<Item = std::result::Result<T, EvalError>>> Iterator for UntilError<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next()?;
        self.failed = item.is_err();
        Some(item)
    }
}

/// Collect a stream, failing on its first error.
pub(crate) fn collect(outputs: Outputs<'_>) -> std::result::Result<Vec<Value>, EvalError> {
    outputs.collect()
}

// ─── evaluation ─────────────────────────────────────────────────────────────

/// Evaluate `filter` against `input`.
pub fn eval<'a>(filter: &'a Filter, env: &Env, input: Value) -> Outputs<'a> {
    match filter {
        Filter::Identity => ok(input),
        Filter::RecurseDefault => recurse_values(input),
        Filter::Index(target, key) => {
            let env = env.clone();
            let keys = eval(key, &env, input.clone());
            flat_map_ok(keys, move |key| {
                flat_map_ok(eval(target, &env, input.clone()), move |base| {
                    once(base.index(&key))
                })
            })
        }
        Filter::Slice(target, from, to) => {
            let env = env.clone();
            let bounds = slice_bounds(from.as_deref(), to.as_deref(), &env, input.clone());
            flat_map_ok(bounds, move |bounds| {
                let (start, end) = split_bounds(bounds);
                flat_map_ok(eval(target, &env, input.clone()), move |base| {
                    once(base.slice(&start, &end))
                })
            })
        }
        Filter::Iterate(target) => flat_map_ok(eval(target, env, input), iterate),
        Filter::Pipe(lhs, rhs) => {
            let env = env.clone();
            flat_map_ok(eval(lhs, &env, input), move |v| eval(rhs, &env, v))
        }
        Filter::Comma(lhs, rhs) => {
            let env = env.clone();
            let first = eval(lhs, &env, input.clone());
            Box::new(UntilError::new(
                first.chain(defer(move || eval(rhs, &env, input))),
            ))
        }
        Filter::Literal(value) => ok(value.clone()),
        Filter::Str(parts, fmt) => interpolate(parts, fmt.as_deref(), env.clone(), input, String::new()),
        Filter::Format(name) => once(format::apply(name, &input).map(Value::String)),
        Filter::Array(None) => ok(Value::Array(Vec::new())),
        Filter::Array(Some(inner)) => {
            let env = env.clone();
            defer(move || once(collect(eval(inner, &env, input)).map(Value::Array)))
        }
        Filter::Object(entries) => {
            let env = env.clone();
            defer(move || match build_objects(entries, &env, &input) {
                Ok(objects) => Box::new(objects.into_iter().map(|m| Ok(Value::Object(m)))),
                Err(e) => err(e),
            })
        }
        Filter::Neg(inner) => flat_map_ok(eval(inner, env, input), |v| match v {
            Value::Number(n) => ok(Value::Number(-n)),
            other => err(EvalError::msg(format!("{} cannot be negated", other.describe()))),
        }),
        Filter::Arith(op, lhs, rhs) => {
            let op = *op;
            binary(lhs, rhs, env, input, move |l, r| ops::arith(op, l, r))
        }
        Filter::Compare(op, lhs, rhs) => {
            let op = *op;
            binary(lhs, rhs, env, input, move |l, r| {
                Ok(Value::Bool(ops::compare(op, &l, &r)))
            })
        }
        Filter::And(lhs, rhs) => {
            let env = env.clone();
            flat_map_ok(eval(lhs, &env, input.clone()), move |l| {
                if !l.is_truthy() {
                    return ok(Value::Bool(false));
                }
                flat_map_ok(eval(rhs, &env, input.clone()), |r| {
                    ok(Value::Bool(r.is_truthy()))
                })
            })
        }
        Filter::Or(lhs, rhs) => {
            let env = env.clone();
            flat_map_ok(eval(lhs, &env, input.clone()), move |l| {
                if l.is_truthy() {
                    return ok(Value::Bool(true));
                }
                flat_map_ok(eval(rhs, &env, input.clone()), |r| {
                    ok(Value::Bool(r.is_truthy()))
                })
            })
        }
        Filter::Alternative(lhs, rhs) => alternative(lhs, rhs, env.clone(), input),
        Filter::Assign(op, lhs, rhs) => paths::assign(*op, lhs, rhs, env, input),
        Filter::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let env = env.clone();
            flat_map_ok(eval(cond, &env, input.clone()), move |c| {
                if c.is_truthy() {
                    eval(then_branch, &env, input.clone())
                } else {
                    match else_branch {
                        Some(branch) => eval(branch, &env, input.clone()),
                        None => ok(input.clone()),
                    }
                }
            })
        }
        Filter::Try { body, handler } => {
            try_catch(eval(body, env, input), handler.as_deref(), env.clone())
        }
        Filter::Reduce {
            source,
            var,
            init,
            update,
        } => {
            let env = env.clone();
            flat_map_ok(eval(init, &env, input.clone()), move |acc| {
                once(reduce(source, var, update, &env, input.clone(), acc))
            })
        }
        Filter::Foreach {
            source,
            var,
            init,
            update,
            extract,
        } => {
            let env = env.clone();
            flat_map_ok(eval(init, &env, input.clone()), move |acc| {
                let state = Foreach {
                    source: eval(source, &env, input.clone()),
                    var,
                    update,
                    extract: extract.as_deref(),
                    env: env.clone(),
                    acc,
                    updates: None,
                    pending: empty(),
                    failed: false,
                };
                Box::new(state)
            })
        }
        Filter::Var(name) => match env.lookup(name) {
            Some(value) => ok(value.clone()),
            None => err(EvalError::msg(format!("${} is not defined", name))),
        },
        Filter::Call { name, args } => builtins::call(name, args, env, input),
    }
}

/// Evaluate both operands against `input` with the right-hand side in the
/// outer loop, so `(1,2) + (10,20)` yields 11, 12, 21, 22.
fn binary<'a, F>(
    lhs: &'a Filter,
    rhs: &'a Filter,
    env: &Env,
    input: Value,
    op: F,
) -> Outputs<'a>
where
    F: Fn(Value, Value) -> ValueResult + Clone + 'a,
{
    let env = env.clone();
    flat_map_ok(eval(rhs, &env, input.clone()), move |r| {
        let op = op.clone();
        flat_map_ok(eval(lhs, &env, input.clone()), move |l| {
            once(op(l, r.clone()))
        })
    })
}

/// Children of an array or object, in order.
pub(crate) fn iterate<'a>(value: Value) -> Outputs<'a> {
    match value {
        Value::Array(items) => Box::new(items.into_iter().map(Ok)),
        Value::Object(map) => Box::new(map.into_values().map(Ok)),
        other => err(cannot_iterate(&other)),
    }
}

pub(crate) fn cannot_iterate(value: &Value) -> EvalError {
    match value {
        Value::Null => EvalError::msg("Cannot iterate over null"),
        other => EvalError::msg(format!("Cannot iterate over {}", other.describe())),
    }
}

/// `..`: the input and all its descendants, pre-order.
pub(crate) fn recurse_values<'a>(input: Value) -> Outputs<'a> {
    Box::new(RecurseValues { stack: vec![input] })
}

struct RecurseValues {
    stack: Vec<Value>,
}

impl Iterator for RecurseValues {
    type Item = ValueResult;

    fn next(&mut self) -> Option<ValueResult> {
        let value = self.stack.pop()?;
        match &value {
            Value::Array(items) => self.stack.extend(items.iter().rev().cloned()),
            Value::Object(map) => self.stack.extend(map.values().rev().cloned()),
            _ => {}
        }
        Some(Ok(value))
    }
}

/// Every combination of slice bounds, as a `[from, to]` pair.
fn slice_bounds<'a>(
    from: Option<&'a Filter>,
    to: Option<&'a Filter>,
    env: &Env,
    input: Value,
) -> Outputs<'a> {
    let env = env.clone();
    let tos = match to {
        Some(f) => eval(f, &env, input.clone()),
        None => ok(Value::Null),
    };
    flat_map_ok(tos, move |end| {
        let froms = match from {
            Some(f) => eval(f, &env, input.clone()),
            None => ok(Value::Null),
        };
        flat_map_ok(froms, move |start| ok(Value::Array(vec![start, end.clone()])))
    })
}

fn split_bounds(bounds: Value) -> (Value, Value) {
    match bounds {
        Value::Array(mut pair) if pair.len() == 2 => {
            let end = pair.pop().unwrap_or_default();
            let start = pair.pop().unwrap_or_default();
            (start, end)
        }
        _ => (Value::Null, Value::Null),
    }
}

fn interpolate<'a>(
    parts: &'a [StringPart],
    fmt: Option<&'a str>,
    env: Env,
    input: Value,
    prefix: String,
) -> Outputs<'a> {
    let Some((first, rest)) = parts.split_first() else {
        return ok(Value::String(prefix));
    };
    match first {
        StringPart::Literal(text) => interpolate(rest, fmt, env, input, prefix + text),
        StringPart::Interp(filter) => {
            let values = eval(filter, &env, input.clone());
            flat_map_ok(values, move |value| {
                let rendered = match fmt {
                    Some(name) => format::apply(name, &value),
                    None => Ok(match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    }),
                };
                match rendered {
                    Ok(text) => {
                        interpolate(rest, fmt, env.clone(), input.clone(), format!("{prefix}{text}"))
                    }
                    Err(e) => err(e),
                }
            })
        }
    }
}

/// All objects an object constructor produces; the leftmost entry varies
/// slowest.
fn build_objects(
    entries: &[(ObjectKey, Filter)],
    env: &Env,
    input: &Value,
) -> std::result::Result<Vec<Map>, EvalError> {
    let mut objects = vec![Map::new()];
    for (key, value) in entries {
        let keys = match key {
            ObjectKey::Literal(name) => vec![name.clone()],
            ObjectKey::Dynamic(filter) => collect(eval(filter, env, input.clone()))?
                .into_iter()
                .map(|k| match k {
                    Value::String(s) => Ok(s),
                    other => Err(EvalError::msg(format!(
                        "Object keys must be strings, got {}",
                        other.describe()
                    ))),
                })
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        let values = collect(eval(value, env, input.clone()))?;
        let mut next = Vec::with_capacity(objects.len() * keys.len() * values.len());
        for object in &objects {
            for k in &keys {
                for v in &values {
                    let mut object = object.clone();
                    object.insert(k.clone(), v.clone());
                    next.push(object);
                }
            }
        }
        objects = next;
    }
    Ok(objects)
}

/// `lhs // rhs`: the truthy outputs of `lhs`, or all of `rhs` when there are
/// none. Errors on the left are swallowed.
fn alternative<'a>(lhs: &'a Filter, rhs: &'a Filter, env: Env, input: Value) -> Outputs<'a> {
    let mut left = eval(lhs, &env, input.clone());
    let mut left_done = false;
    let mut any = false;
    let mut right: Option<Outputs<'a>> = None;
    Box::new(iter::from_fn(move || loop {
        if let Some(right) = right.as_mut() {
            return right.next();
        }
        if !left_done {
            match left.next() {
                Some(Ok(v)) if v.is_truthy() => {
                    any = true;
                    return Some(Ok(v));
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => left_done = true,
            }
        }
        if any {
            return None;
        }
        right = Some(eval(rhs, &env, input.clone()));
    }))
}

fn try_catch<'a>(mut body: Outputs<'a>, handler: Option<&'a Filter>, env: Env) -> Outputs<'a> {
    let mut caught: Option<Outputs<'a>> = None;
    let mut done = false;
    Box::new(iter::from_fn(move || {
        if let Some(handler_outputs) = caught.as_mut() {
            return handler_outputs.next();
        }
        if done {
            return None;
        }
        match body.next()? {
            Ok(value) => Some(Ok(value)),
            Err(error) => {
                done = true;
                let handler = handler?;
                let mut outputs = eval(handler, &env, error.into_value());
                let first = outputs.next();
                caught = Some(outputs);
                first
            }
        }
    }))
}

fn reduce(
    source: &Filter,
    var: &str,
    update: &Filter,
    env: &Env,
    input: Value,
    init: Value,
) -> ValueResult {
    let mut acc = init;
    for item in eval(source, env, input) {
        let scoped = env.bind(var, item?);
        let mut last = None;
        for out in eval(update, &scoped, acc) {
            last = Some(out?);
        }
        acc = last.unwrap_or(Value::Null);
    }
    Ok(acc)
}

/// State of a running `foreach`.
struct Foreach<'a> {
    source: Outputs<'a>,
    var: &'a str,
    update: &'a Filter,
    extract: Option<&'a Filter>,
    env: Env,
    acc: Value,
    /// Update outputs for the current source item, with its bindings.
    updates: Option<(Outputs<'a>, Env)>,
    /// Extract outputs for the latest state.
    pending: Outputs<'a>,
    failed: bool,
}

impl Iterator for Foreach<'_> {
    type Item = ValueResult;

    fn next(&mut self) -> Option<ValueResult> {
        loop {
            if let Some(out) = self.pending.next() {
                if out.is_err() {
                    self.failed = true;
                }
                return Some(out);
            }
            if self.failed {
                return None;
            }
            if let Some((updates, scoped)) = self.updates.as_mut() {
                match updates.next() {
                    Some(Ok(state)) => {
                        self.acc = state.clone();
                        self.pending = match self.extract {
                            Some(extract) => eval(extract, scoped, state),
                            None => ok(state),
                        };
                        continue;
                    }
                    Some(Err(e)) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                    None => self.updates = None,
                }
            }
            match self.source.next()? {
                Ok(item) => {
                    let scoped = self.env.bind(self.var, item);
                    let updates = eval(self.update, &scoped, self.acc.clone());
                    self.updates = Some((updates, scoped));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// The process environment as an object.
pub(crate) fn environment() -> Value {
    let vars = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, Value::String(v.into_string().ok()?))))
        .collect::<Map>();
    Value::Object(vars)
}

// ─── programs ───────────────────────────────────────────────────────────────

/// A compiled filter, reusable across inputs.
pub struct Program {
    filter: Filter,
    globals: Env,
}

impl Program {
    /// Run the filter on one input.
    pub fn run(&self, input: Value) -> Outputs<'_> {
        tracing::trace!(input_type = input.type_name(), "evaluating filter");
        Box::new(UntilError::new(eval(&self.filter, &self.globals, input)))
    }

    /// Run the filter and collect every output, failing on the first error.
    pub fn run_collect(&self, input: Value) -> std::result::Result<Vec<Value>, EvalError> {
        self.run(input).collect()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

/// Compile filter source with only `$ENV` predefined.
pub fn compile(source: &str) -> Result<Program> {
    compile_with_vars(source, &[])
}

/// Compile filter source with extra global variables (`--arg` style).
pub fn compile_with_vars(source: &str, vars: &[(String, Value)]) -> Result<Program> {
    let names: Vec<&str> = vars.iter().map(|(name, _)| name.as_str()).collect();
    let filter = parser::parse_with_globals(source, &names)?;
    let globals = vars
        .iter()
        .fold(Env::default().bind("ENV", environment()), |env, (name, value)| {
            env.bind(name.as_str(), value.clone())
        });
    tracing::debug!(source, globals = vars.len(), "compiled filter");
    Ok(Program { filter, globals })
}
