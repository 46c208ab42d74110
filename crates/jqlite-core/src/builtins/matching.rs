//! Regular-expression builtins: `test`, `match`, `capture`, `scan`,
//! `split/2`, `splits`, `sub` and `gsub`.
//!
//! Patterns use the `regex` crate's syntax. Offsets and lengths reported in
//! match objects count code points, not bytes.

use regex::{Captures, Regex, RegexBuilder};

use super::{with_arg, with_args2};
use crate::ast::Filter;
use crate::error::{EvalError, ValueResult};
use crate::eval::{collect, defer, err, eval, flat_map_ok, iterate, once, Env, Outputs};
use crate::ops;
use crate::value::{Map, Value};

pub(super) fn call<'a>(
    name: &str,
    args: &'a [Filter],
    env: &Env,
    input: &Value,
) -> Option<Outputs<'a>> {
    let outputs = match (name, args) {
        ("test", [re]) => regex_call(re, None, env, input, test),
        ("test", [re, flags]) => regex_call(re, Some(flags), env, input, test),
        ("match", [re]) => spread(regex_call(re, None, env, input, match_all)),
        ("match", [re, flags]) => spread(regex_call(re, Some(flags), env, input, match_all)),
        ("capture", [re]) => spread(regex_call(re, None, env, input, capture)),
        ("capture", [re, flags]) => spread(regex_call(re, Some(flags), env, input, capture)),
        ("scan", [re]) => spread(regex_call(re, None, env, input, scan)),
        ("scan", [re, flags]) => spread(regex_call(re, Some(flags), env, input, scan)),
        ("split", [re, flags]) => regex_call(re, Some(flags), env, input, split),
        ("splits", [re]) => spread(regex_call(re, None, env, input, split)),
        ("splits", [re, flags]) => spread(regex_call(re, Some(flags), env, input, split)),
        ("sub", [re, replacement]) => substitute(re, replacement, None, false, env, input),
        ("sub", [re, replacement, flags]) => {
            substitute(re, replacement, Some(flags), false, env, input)
        }
        ("gsub", [re, replacement]) => substitute(re, replacement, None, true, env, input),
        ("gsub", [re, replacement, flags]) => {
            substitute(re, replacement, Some(flags), true, env, input)
        }
        _ => return None,
    };
    Some(outputs)
}

/// A compiled pattern with its jq modifier flags applied.
struct Matcher {
    regex: Regex,
    global: bool,
    skip_empty: bool,
}

impl Matcher {
    /// `pattern` is a string or a `[pattern, flags]` array.
    fn new(pattern: &Value, flags: &Value, force_global: bool) -> Result<Self, EvalError> {
        let (pattern, flags) = match (pattern, flags) {
            (Value::Array(parts), Value::Null) => match parts.as_slice() {
                [pattern] => (pattern, flags),
                [pattern, flags] => (pattern, flags),
                _ => (pattern, flags),
            },
            _ => (pattern, flags),
        };
        let Value::String(pattern) = pattern else {
            return Err(EvalError::msg(format!(
                "{} cannot be matched, as it is not a string",
                pattern.describe()
            )));
        };
        let flags = match flags {
            Value::Null => "",
            Value::String(f) => f.as_str(),
            other => {
                return Err(EvalError::msg(format!("{} is not a string", other.describe())));
            }
        };
        let mut builder = RegexBuilder::new(pattern);
        let mut global = force_global;
        let mut skip_empty = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' => {
                    builder.case_insensitive(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'n' => skip_empty = true,
                'p' => {
                    builder.dot_matches_new_line(true);
                    skip_empty = true;
                }
                // Leftmost-longest is not available; leftmost-first stands in.
                'l' => {}
                _ => {
                    return Err(EvalError::msg(format!(
                        "{} is not a valid modifier string",
                        flags
                    )));
                }
            }
        }
        let regex = builder.build().map_err(|e| {
            EvalError::msg(format!("{} (at offset 0) is not a valid regex: {}", pattern, e))
        })?;
        Ok(Self {
            regex,
            global,
            skip_empty,
        })
    }

    fn captures<'s>(&self, text: &'s str) -> Vec<Captures<'s>> {
        let found = self
            .regex
            .captures_iter(text)
            .filter(|caps| !(self.skip_empty && caps.get(0).is_some_and(|m| m.is_empty())));
        if self.global {
            found.collect()
        } else {
            found.take(1).collect()
        }
    }
}

fn subject(input: &Value) -> Result<&str, EvalError> {
    match input {
        Value::String(s) => Ok(s),
        other => Err(EvalError::msg(format!(
            "{} cannot be matched, as it is not a string",
            other.describe()
        ))),
    }
}

/// Evaluate the pattern and flag arguments, then run `op` per combination.
fn regex_call<'a>(
    re: &'a Filter,
    flags: Option<&'a Filter>,
    env: &Env,
    input: &Value,
    op: fn(&str, &Matcher) -> ValueResult,
) -> Outputs<'a> {
    let run = move |input: &Value, re: Value, flags: Value| {
        let text = subject(input)?;
        let matcher = Matcher::new(&re, &flags, false)?;
        op(text, &matcher)
    };
    match flags {
        Some(flags) => with_args2(re, flags, env, input.clone(), run),
        None => with_arg(re, env, input.clone(), move |input, re| {
            run(&input, re, Value::Null)
        }),
    }
}

/// Emit the elements of each array result.
fn spread(outputs: Outputs<'_>) -> Outputs<'_> {
    flat_map_ok(outputs, iterate)
}

fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

fn test(text: &str, matcher: &Matcher) -> ValueResult {
    Ok(Value::Bool(!matcher.captures(text).is_empty()))
}

fn match_all(text: &str, matcher: &Matcher) -> ValueResult {
    let names: Vec<Option<&str>> = matcher.regex.capture_names().collect();
    let objects = matcher
        .captures(text)
        .iter()
        .map(|caps| match_object(text, caps, &names))
        .collect();
    Ok(Value::Array(objects))
}

fn match_object(text: &str, caps: &Captures<'_>, names: &[Option<&str>]) -> Value {
    let whole = caps.get(0);
    let mut object = span_object(text, whole.map(|m| (m.start(), m.as_str())));
    let captures = (1..caps.len())
        .map(|i| {
            let mut group = span_object(text, caps.get(i).map(|m| (m.start(), m.as_str())));
            let name = names
                .get(i)
                .copied()
                .flatten()
                .map_or(Value::Null, Value::from);
            group.insert("name".to_string(), name);
            Value::Object(group)
        })
        .collect();
    object.insert("captures".to_string(), Value::Array(captures));
    Value::Object(object)
}

fn span_object(text: &str, span: Option<(usize, &str)>) -> Map {
    let mut object = Map::new();
    match span {
        Some((start, matched)) => {
            object.insert("offset".to_string(), Value::from(char_offset(text, start)));
            object.insert("length".to_string(), Value::from(matched.chars().count()));
            object.insert("string".to_string(), Value::from(matched));
        }
        None => {
            object.insert("offset".to_string(), Value::from(-1i64));
            object.insert("length".to_string(), Value::from(0usize));
            object.insert("string".to_string(), Value::Null);
        }
    }
    object
}

/// Named groups of one match as an object.
fn capture_object(matcher: &Matcher, caps: &Captures<'_>) -> Value {
    let object = matcher
        .regex
        .capture_names()
        .enumerate()
        .filter_map(|(i, name)| {
            let name = name?;
            let value = caps.get(i).map_or(Value::Null, |m| Value::from(m.as_str()));
            Some((name.to_string(), value))
        })
        .collect::<Map>();
    Value::Object(object)
}

fn capture(text: &str, matcher: &Matcher) -> ValueResult {
    let objects = matcher
        .captures(text)
        .iter()
        .map(|caps| capture_object(matcher, caps))
        .collect();
    Ok(Value::Array(objects))
}

fn scan(text: &str, matcher: &Matcher) -> ValueResult {
    let global = Matcher {
        regex: matcher.regex.clone(),
        global: true,
        skip_empty: matcher.skip_empty,
    };
    let found = global
        .captures(text)
        .iter()
        .map(|caps| {
            if caps.len() > 1 {
                Value::Array(
                    (1..caps.len())
                        .map(|i| caps.get(i).map_or(Value::Null, |m| Value::from(m.as_str())))
                        .collect(),
                )
            } else {
                caps.get(0).map_or(Value::Null, |m| Value::from(m.as_str()))
            }
        })
        .collect();
    Ok(Value::Array(found))
}

fn split(text: &str, matcher: &Matcher) -> ValueResult {
    let global = Matcher {
        regex: matcher.regex.clone(),
        global: true,
        skip_empty: matcher.skip_empty,
    };
    let mut pieces = Vec::new();
    let mut previous = 0;
    for caps in global.captures(text) {
        if let Some(m) = caps.get(0) {
            pieces.push(Value::from(&text[previous..m.start()]));
            previous = m.end();
        }
    }
    pieces.push(Value::from(&text[previous..]));
    Ok(Value::Array(pieces))
}

/// `sub`/`gsub`: the replacement filter runs on each match's capture
/// object; several replacement outputs yield several results.
fn substitute<'a>(
    re: &'a Filter,
    replacement: &'a Filter,
    flags: Option<&'a Filter>,
    global: bool,
    env: &Env,
    input: &Value,
) -> Outputs<'a> {
    let env = env.clone();
    let input = input.clone();
    flat_map_ok(eval(re, &env, input.clone()), move |re| {
        let flag_values = match flags {
            Some(flags) => eval(flags, &env, input.clone()),
            None => once(Ok(Value::Null)),
        };
        let env = env.clone();
        let input = input.clone();
        flat_map_ok(flag_values, move |flags| {
            let env = env.clone();
            let input = input.clone();
            let re = re.clone();
            defer(move || -> Outputs<'a> {
                match replace_all(&input, &re, &flags, global, replacement, &env) {
                    Ok(results) => Box::new(results.into_iter().map(Ok)),
                    Err(e) => err(e),
                }
            })
        })
    })
}

fn replace_all(
    input: &Value,
    re: &Value,
    flags: &Value,
    global: bool,
    replacement: &Filter,
    env: &Env,
) -> Result<Vec<Value>, EvalError> {
    let text = subject(input)?;
    let matcher = Matcher::new(re, flags, global)?;
    let mut results = vec![Value::String(String::new())];
    let mut previous = 0;
    for caps in matcher.captures(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let gap = Value::from(&text[previous..whole.start()]);
        let inserts = collect(eval(replacement, env, capture_object(&matcher, &caps)))?;
        let mut next = Vec::with_capacity(results.len() * inserts.len());
        for prefix in &results {
            for insert in &inserts {
                let joined = ops::add(prefix.clone(), gap.clone())?;
                next.push(ops::add(joined, insert.clone())?);
            }
        }
        results = next;
        previous = whole.end();
    }
    let tail = Value::from(&text[previous..]);
    results
        .into_iter()
        .map(|prefix| ops::add(prefix, tail.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::eval::compile;
    use crate::value::Value;

    fn run(filter: &str, input: &str) -> Vec<String> {
        let input = Value::from_json(input).unwrap();
        compile(filter)
            .unwrap()
            .run_collect(input)
            .unwrap()
            .iter()
            .map(Value::to_string)
            .collect()
    }

    #[test]
    fn match_offsets_count_code_points() {
        let out = run(r#"match("b+")"#, r#""äbb""#);
        assert_eq!(
            out,
            vec![r#"{"captures":[],"length":2,"offset":1,"string":"bb"}"#]
        );
    }

    #[test]
    fn unmatched_optional_group_is_reported() {
        let out = run(r#"match("(a)?(?<n>b)") | .captures"#, r#""b""#);
        assert_eq!(
            out,
            vec![
                r#"[{"length":0,"name":null,"offset":-1,"string":null},{"length":1,"name":"n","offset":0,"string":"b"}]"#
            ]
        );
    }

    #[test]
    fn flags_control_case_and_globality() {
        assert_eq!(run(r#"[match("A"; "gi") | .offset]"#, r#""aXa""#), vec!["[0,2]"]);
        assert_eq!(run(r#"test("A")"#, r#""a""#), vec!["false"]);
        let bad = crate::eval::compile(r#"test("a"; "q")"#)
            .unwrap()
            .run_collect(Value::from("a"));
        assert!(bad.unwrap_err().to_string().contains("is not a valid modifier string"));
    }

    #[test]
    fn pattern_and_flags_as_one_array() {
        assert_eq!(run(r#"test(["A", "i"])"#, r#""a""#), vec!["true"]);
        assert_eq!(run(r#"test(["A"])"#, r#""a""#), vec!["false"]);
        assert_eq!(run(r#"[match(["a", "g"]) | .offset]"#, r#""aba""#), vec!["[0,2]"]);
        let bad = crate::eval::compile(r#"test(["a", "i", "x"])"#)
            .unwrap()
            .run_collect(Value::from("a"));
        assert!(bad.unwrap_err().to_string().contains("cannot be matched, as it is not a string"));
    }

    #[test]
    fn sub_with_multiple_replacement_outputs() {
        assert_eq!(
            run(r#"[sub("(?<x>a)"; "\(.x)1", "\(.x)2")]"#, r#""ba""#),
            vec![r#"["ba1","ba2"]"#]
        );
        assert_eq!(run(r#"gsub("\\s+"; "-")"#, r#""a  b c""#), vec![r#""a-b-c""#]);
    }

    #[test]
    fn scan_and_split() {
        assert_eq!(run(r#"[scan("c")]"#, r#""abcdc""#), vec![r#"["c","c"]"#]);
        assert_eq!(run(r#"[scan("(a)(b)")]"#, r#""abab""#), vec![r#"[["a","b"],["a","b"]]"#]);
        assert_eq!(run(r#"split(", *"; null)"#, r#""a, b,c""#), vec![r#"["a","b","c"]"#]);
    }

    #[test]
    fn non_string_input_cannot_be_matched() {
        let result = crate::eval::compile(r#"test("a")"#)
            .unwrap()
            .run_collect(Value::from(1i64));
        assert_eq!(
            result.unwrap_err().to_string(),
            "number (1) cannot be matched, as it is not a string"
        );
    }
}
