//! The standard library.
//!
//! Every builtin receives its already-evaluated arguments as a mutable slice.
//! Builtins listed with var positions in [`BUILTINS`] (`add`, `pop`, …)
//! mutate `args[0]` in place; the interpreter copies it back into the
//! caller's variable.  [`install`] binds all of them, plus `echo`/`print`
//! and the math constants, into an environment.

use std::collections::BTreeMap;
use std::f64::consts;

use super::env::Env;
use super::error::RuntimeError;
use super::interp::{compare, contains, map_key};
use super::native::{arg, arg_f64, arg_int, arg_items, arg_str, check_arity, native_fn, Output};
use super::parser::parse_int_lexeme;
use super::value::{Range, Value};

/// Builtin names and the argument positions they write back.
pub const BUILTINS: &[(&str, &[usize])] = &[
    // sequences
    ("len", &[]),
    ("add", &[0]),
    ("pop", &[0]),
    ("insert", &[0]),
    ("delete", &[0]),
    ("contains", &[]),
    ("find", &[]),
    ("reversed", &[]),
    ("reverse", &[0]),
    ("sorted", &[]),
    ("sort", &[0]),
    ("keys", &[]),
    ("values", &[]),
    ("hasKey", &[]),
    ("sum", &[]),
    ("newSeq", &[]),
    ("range", &[]),
    ("high", &[]),
    ("low", &[]),
    // strings
    ("toUpper", &[]),
    ("toLower", &[]),
    ("strip", &[]),
    ("split", &[]),
    ("join", &[]),
    ("replace", &[]),
    ("startsWith", &[]),
    ("endsWith", &[]),
    ("repeat", &[]),
    // math
    ("sin", &[]),
    ("cos", &[]),
    ("tan", &[]),
    ("asin", &[]),
    ("acos", &[]),
    ("atan", &[]),
    ("atan2", &[]),
    ("sinh", &[]),
    ("cosh", &[]),
    ("tanh", &[]),
    ("sqrt", &[]),
    ("pow", &[]),
    ("exp", &[]),
    ("ln", &[]),
    ("log", &[]),
    ("log10", &[]),
    ("log2", &[]),
    ("floor", &[]),
    ("ceil", &[]),
    ("round", &[]),
    ("trunc", &[]),
    ("abs", &[]),
    ("min", &[]),
    ("max", &[]),
    ("clamp", &[]),
    ("sgn", &[]),
    ("degToRad", &[]),
    ("radToDeg", &[]),
    // conversion
    ("int", &[]),
    ("float", &[]),
    ("str", &[]),
    ("bool", &[]),
    ("parseInt", &[]),
    ("parseFloat", &[]),
    ("typeof", &[]),
    ("chr", &[]),
    ("ord", &[]),
];

pub const CONSTANTS: &[(&str, f64)] = &[("PI", consts::PI), ("TAU", consts::TAU), ("E", consts::E)];

/// Bind the whole standard library into `env`; `echo`/`print` write to `out`.
pub fn install(env: &Env, out: &Output) {
    for &(name, var_params) in BUILTINS {
        env.define(
            name,
            native_fn(name, var_params, move |_, args| {
                call_builtin(name, args)
                    .unwrap_or_else(|| Err(RuntimeError::Undefined(name.to_string())))
            }),
        );
    }
    for &(name, value) in CONSTANTS {
        env.define(name, Value::Float(value));
    }

    let sink = out.clone();
    env.define(
        "echo",
        native_fn("echo", &[], move |_, args| {
            sink.emit(args.iter().map(|a| a.to_string()).collect());
            Ok(Value::Nil)
        }),
    );
    let sink = out.clone();
    env.define(
        "print",
        native_fn("print", &[], move |_, args| {
            let words: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            sink.emit(words.join(" "));
            Ok(Value::Nil)
        }),
    );
}

/// Dispatch a builtin call.
///
/// Returns `None` if `name` is not a builtin.
pub fn call_builtin(name: &str, args: &mut [Value]) -> Option<Result<Value, RuntimeError>> {
    fn inner(name: &str, args: &mut [Value]) -> Result<Option<Value>, RuntimeError> {
        Ok(Some(match name {
            // ── Sequences ────────────────────────────────────────────────────
            "len" => {
                check_arity(name, args, 1, 1)?;
                let n = match &args[0] {
                    Value::Str(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Map(m) => m.len(),
                    Value::Range(r) => r.len(),
                    other => return Err(unsupported(name, other)),
                };
                Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
            }
            "add" => {
                check_arity(name, args, 2, usize::MAX)?;
                let (target, rest) = args.split_at_mut(1);
                match &mut target[0] {
                    Value::Array(items) => items.extend(rest.iter().cloned()),
                    Value::Str(s) => {
                        for v in rest.iter() {
                            s.push_str(&v.to_string());
                        }
                    }
                    other => return Err(unsupported(name, other)),
                }
                Value::Nil
            }
            "pop" => {
                check_arity(name, args, 1, 1)?;
                match &mut args[0] {
                    Value::Array(items) => items
                        .pop()
                        .ok_or_else(|| RuntimeError::native("pop from an empty sequence"))?,
                    other => return Err(unsupported(name, other)),
                }
            }
            "insert" => {
                check_arity(name, args, 2, 3)?;
                let at = if args.len() == 3 { arg_int(args, 2, name)? } else { 0 };
                let item = args[1].clone();
                match &mut args[0] {
                    Value::Array(items) => {
                        if at < 0 || at as usize > items.len() {
                            return Err(RuntimeError::IndexOutOfBounds {
                                index: at,
                                len: items.len(),
                            });
                        }
                        items.insert(at as usize, item);
                    }
                    other => return Err(unsupported(name, other)),
                }
                Value::Nil
            }
            "delete" => {
                check_arity(name, args, 2, 2)?;
                let key = args[1].clone();
                match &mut args[0] {
                    Value::Array(items) => {
                        let i = key.as_i64().unwrap_or(-1);
                        if i < 0 || i as usize >= items.len() {
                            return Err(RuntimeError::IndexOutOfBounds {
                                index: i,
                                len: items.len(),
                            });
                        }
                        items.remove(i as usize);
                    }
                    Value::Map(m) => {
                        m.remove(&map_key(&key));
                    }
                    other => return Err(unsupported(name, other)),
                }
                Value::Nil
            }
            "contains" => {
                check_arity(name, args, 2, 2)?;
                Value::Bool(contains(&args[0], &args[1])?)
            }
            "find" => {
                check_arity(name, args, 2, 2)?;
                let pos = match (&args[0], &args[1]) {
                    (Value::Str(s), Value::Str(needle)) => {
                        s.find(needle.as_str()).map(|b| s[..b].chars().count())
                    }
                    (Value::Array(items), needle) => items.iter().position(|v| v == needle),
                    (other, _) => return Err(unsupported(name, other)),
                };
                Value::Int(pos.map_or(-1, |p| p as i64))
            }
            "reversed" => {
                check_arity(name, args, 1, 1)?;
                match &args[0] {
                    Value::Str(s) => Value::Str(s.chars().rev().collect()),
                    _ => {
                        let mut items = arg_items(args, 0, name)?;
                        items.reverse();
                        Value::Array(items)
                    }
                }
            }
            "reverse" => {
                check_arity(name, args, 1, 1)?;
                match &mut args[0] {
                    Value::Array(items) => items.reverse(),
                    other => return Err(unsupported(name, other)),
                }
                Value::Nil
            }
            "sorted" => {
                check_arity(name, args, 1, 1)?;
                let mut items = arg_items(args, 0, name)?;
                sort_values(&mut items)?;
                Value::Array(items)
            }
            "sort" => {
                check_arity(name, args, 1, 1)?;
                match &mut args[0] {
                    Value::Array(items) => sort_values(items)?,
                    other => return Err(unsupported(name, other)),
                }
                Value::Nil
            }
            "keys" | "values" => {
                check_arity(name, args, 1, 1)?;
                match &args[0] {
                    Value::Map(m) if name == "keys" => {
                        Value::Array(m.keys().cloned().map(Value::Str).collect())
                    }
                    Value::Map(m) => Value::Array(m.values().cloned().collect()),
                    other => return Err(unsupported(name, other)),
                }
            }
            "hasKey" => {
                check_arity(name, args, 2, 2)?;
                match &args[0] {
                    Value::Map(m) => Value::Bool(m.contains_key(&map_key(&args[1]))),
                    other => return Err(unsupported(name, other)),
                }
            }
            "sum" => {
                check_arity(name, args, 1, 1)?;
                let items = arg_items(args, 0, name)?;
                if items.iter().all(|v| matches!(v, Value::Int(_))) {
                    Value::Int(items.iter().filter_map(Value::as_i64).fold(0, i64::wrapping_add))
                } else {
                    let mut total = 0.0;
                    for v in &items {
                        total += v.as_f64().ok_or_else(|| unsupported(name, v))?;
                    }
                    Value::Float(total)
                }
            }
            "newSeq" => {
                check_arity(name, args, 0, 1)?;
                let n = if args.is_empty() { 0 } else { arg_int(args, 0, name)?.max(0) };
                Value::Array(vec![Value::Nil; n as usize])
            }
            "range" => {
                check_arity(name, args, 1, 3)?;
                let (start, end) = if args.len() == 1 {
                    (0, arg_int(args, 0, name)?)
                } else {
                    (arg_int(args, 0, name)?, arg_int(args, 1, name)?)
                };
                let step = if args.len() == 3 { arg_int(args, 2, name)? } else { 1 };
                match step {
                    0 => return Err(RuntimeError::native("range: step must not be zero")),
                    1 => Value::Range(Range::new(start, end, false)),
                    _ => {
                        let mut items = Vec::new();
                        let mut i = start;
                        while (step > 0 && i < end) || (step < 0 && i > end) {
                            items.push(Value::Int(i));
                            i += step;
                        }
                        Value::Array(items)
                    }
                }
            }
            "high" | "low" => {
                check_arity(name, args, 1, 1)?;
                let (lo, hi) = match &args[0] {
                    Value::Array(items) => (0, items.len() as i64 - 1),
                    Value::Str(s) => (0, s.chars().count() as i64 - 1),
                    Value::Range(r) => (r.start, r.end_exclusive().saturating_sub(1)),
                    Value::Function(f) if f.name() == "int" => (i64::MIN, i64::MAX),
                    other => return Err(unsupported(name, other)),
                };
                Value::Int(if name == "high" { hi } else { lo })
            }

            // ── Strings ──────────────────────────────────────────────────────
            "toUpper" => Value::Str(arg_str(args, 0, name)?.to_uppercase()),
            "toLower" => Value::Str(arg_str(args, 0, name)?.to_lowercase()),
            "strip" => Value::Str(arg_str(args, 0, name)?.trim().to_string()),
            "split" => {
                check_arity(name, args, 1, 2)?;
                let s = arg_str(args, 0, name)?;
                let parts: Vec<Value> = if args.len() == 2 {
                    let sep = arg_str(args, 1, name)?;
                    if sep.is_empty() {
                        return Err(RuntimeError::native("split: empty separator"));
                    }
                    s.split(sep.as_str()).map(Value::str).collect()
                } else {
                    s.split_whitespace().map(Value::str).collect()
                };
                Value::Array(parts)
            }
            "join" => {
                check_arity(name, args, 1, 2)?;
                let items = arg_items(args, 0, name)?;
                let sep = if args.len() == 2 { arg_str(args, 1, name)? } else { String::new() };
                let words: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                Value::Str(words.join(&sep))
            }
            "replace" => {
                check_arity(name, args, 3, 3)?;
                let s = arg_str(args, 0, name)?;
                let from = arg_str(args, 1, name)?;
                let to = arg_str(args, 2, name)?;
                if from.is_empty() {
                    Value::Str(s)
                } else {
                    Value::Str(s.replace(&from, &to))
                }
            }
            "startsWith" => {
                check_arity(name, args, 2, 2)?;
                Value::Bool(arg_str(args, 0, name)?.starts_with(&arg_str(args, 1, name)?))
            }
            "endsWith" => {
                check_arity(name, args, 2, 2)?;
                Value::Bool(arg_str(args, 0, name)?.ends_with(&arg_str(args, 1, name)?))
            }
            "repeat" => {
                check_arity(name, args, 2, 2)?;
                let n = arg_int(args, 1, name)?.max(0) as usize;
                match &args[0] {
                    Value::Str(s) => Value::Str(s.repeat(n)),
                    other => Value::Array(vec![other.clone(); n]),
                }
            }

            // ── Math ─────────────────────────────────────────────────────────
            "sin" => float1(args, name, f64::sin)?,
            "cos" => float1(args, name, f64::cos)?,
            "tan" => float1(args, name, f64::tan)?,
            "asin" => float1(args, name, f64::asin)?,
            "acos" => float1(args, name, f64::acos)?,
            "atan" => float1(args, name, f64::atan)?,
            "sinh" => float1(args, name, f64::sinh)?,
            "cosh" => float1(args, name, f64::cosh)?,
            "tanh" => float1(args, name, f64::tanh)?,
            "sqrt" => float1(args, name, f64::sqrt)?,
            "exp" => float1(args, name, f64::exp)?,
            "ln" => float1(args, name, f64::ln)?,
            "log10" => float1(args, name, f64::log10)?,
            "log2" => float1(args, name, f64::log2)?,
            "floor" => float1(args, name, f64::floor)?,
            "ceil" => float1(args, name, f64::ceil)?,
            "round" => float1(args, name, f64::round)?,
            "trunc" => float1(args, name, f64::trunc)?,
            "degToRad" => float1(args, name, f64::to_radians)?,
            "radToDeg" => float1(args, name, f64::to_degrees)?,
            "atan2" => {
                check_arity(name, args, 2, 2)?;
                Value::Float(arg_f64(args, 0, name)?.atan2(arg_f64(args, 1, name)?))
            }
            "pow" => {
                check_arity(name, args, 2, 2)?;
                Value::Float(arg_f64(args, 0, name)?.powf(arg_f64(args, 1, name)?))
            }
            "log" => {
                check_arity(name, args, 1, 2)?;
                let x = arg_f64(args, 0, name)?;
                if args.len() == 2 {
                    Value::Float(x.log(arg_f64(args, 1, name)?))
                } else {
                    Value::Float(x.ln())
                }
            }
            "abs" => {
                check_arity(name, args, 1, 1)?;
                match &args[0] {
                    Value::Int(n) => Value::Int(n.wrapping_abs()),
                    Value::Float(x) => Value::Float(x.abs()),
                    other => return Err(unsupported(name, other)),
                }
            }
            "min" | "max" => {
                check_arity(name, args, 1, usize::MAX)?;
                let items = if args.len() == 1 {
                    arg_items(args, 0, name)?
                } else {
                    args.to_vec()
                };
                let mut best: Option<Value> = None;
                for v in items {
                    best = Some(match best {
                        None => v,
                        Some(b) => {
                            let ord = compare(&v, &b).ok_or_else(|| unsupported(name, &v))?;
                            let better = if name == "min" { ord.is_lt() } else { ord.is_gt() };
                            if better {
                                v
                            } else {
                                b
                            }
                        }
                    });
                }
                best.ok_or_else(|| RuntimeError::native(format!("{name}: empty sequence")))?
            }
            "clamp" => {
                check_arity(name, args, 3, 3)?;
                match (&args[0], &args[1], &args[2]) {
                    (Value::Int(x), Value::Int(lo), Value::Int(hi)) => Value::Int(*x.max(lo).min(hi)),
                    _ => {
                        let x = arg_f64(args, 0, name)?;
                        let lo = arg_f64(args, 1, name)?;
                        let hi = arg_f64(args, 2, name)?;
                        Value::Float(x.max(lo).min(hi))
                    }
                }
            }
            "sgn" => {
                check_arity(name, args, 1, 1)?;
                let x = arg_f64(args, 0, name)?;
                Value::Int(if x > 0.0 {
                    1
                } else if x < 0.0 {
                    -1
                } else {
                    0
                })
            }

            // ── Conversion ───────────────────────────────────────────────────
            "int" => {
                check_arity(name, args, 1, 1)?;
                match &args[0] {
                    Value::Int(n) => Value::Int(*n),
                    Value::Float(x) => Value::Int(*x as i64),
                    Value::Bool(b) => Value::Int(i64::from(*b)),
                    Value::Str(s) => match parse_int(s).or_else(|| parse_float(s).map(|x| x as i64)) {
                        Some(n) => Value::Int(n),
                        None => return Err(RuntimeError::native(format!("int: cannot convert {s:?}"))),
                    },
                    other => return Err(unsupported(name, other)),
                }
            }
            "float" => {
                check_arity(name, args, 1, 1)?;
                match &args[0] {
                    Value::Str(s) => match parse_float(s) {
                        Some(x) => Value::Float(x),
                        None => {
                            return Err(RuntimeError::native(format!("float: cannot convert {s:?}")))
                        }
                    },
                    other => Value::Float(other.as_f64().ok_or_else(|| unsupported(name, other))?),
                }
            }
            "str" => {
                check_arity(name, args, 1, 1)?;
                Value::Str(args[0].to_string())
            }
            "bool" => {
                check_arity(name, args, 1, 1)?;
                Value::Bool(args[0].truthy())
            }
            "parseInt" => {
                check_arity(name, args, 1, 1)?;
                let s = arg_str(args, 0, name)?;
                Value::Int(parse_int(&s).ok_or_else(|| {
                    RuntimeError::native(format!("parseInt: invalid integer {s:?}"))
                })?)
            }
            "parseFloat" => {
                check_arity(name, args, 1, 1)?;
                match arg(args, 0, name)? {
                    Value::Str(s) => Value::Float(parse_float(s).ok_or_else(|| {
                        RuntimeError::native(format!("parseFloat: invalid number {s:?}"))
                    })?),
                    other => Value::Float(other.as_f64().ok_or_else(|| unsupported(name, other))?),
                }
            }
            "typeof" => {
                check_arity(name, args, 1, 1)?;
                Value::str(args[0].type_name())
            }
            "chr" => {
                check_arity(name, args, 1, 1)?;
                let code = arg_int(args, 0, name)?;
                let c = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| RuntimeError::native(format!("chr: invalid code point {code}")))?;
                Value::Str(c.to_string())
            }
            "ord" => {
                check_arity(name, args, 1, 1)?;
                let s = arg_str(args, 0, name)?;
                let c = s
                    .chars()
                    .next()
                    .ok_or_else(|| RuntimeError::native("ord: empty string"))?;
                Value::Int(c as i64)
            }

            _ => return Ok(None),
        }))
    }
    inner(name, args).transpose()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn unsupported(name: &str, v: &Value) -> RuntimeError {
    RuntimeError::type_error(format!("{name}: unsupported argument of type {}", v.type_name()))
}

fn float1(args: &[Value], name: &str, f: fn(f64) -> f64) -> Result<Value, RuntimeError> {
    check_arity(name, args, 1, 1)?;
    Ok(Value::Float(f(arg_f64(args, 0, name)?)))
}

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (n, suffix) = parse_int_lexeme(digits)?;
    if suffix.is_some() {
        return None;
    }
    Some(if negative { n.wrapping_neg() } else { n })
}

fn parse_float(s: &str) -> Option<f64> {
    s.trim().replace('_', "").parse().ok()
}

fn sort_values(items: &mut [Value]) -> Result<(), RuntimeError> {
    for pair in items.windows(2) {
        if compare(&pair[0], &pair[1]).is_none() {
            return Err(RuntimeError::type_error(format!(
                "sort: cannot compare {} and {}",
                pair[0].type_name(),
                pair[1].type_name()
            )));
        }
    }
    items.sort_by(|a, b| compare(a, b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(())
}

/// Map with string keys built from `(key, value)` pairs.
pub fn map_of<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Value {
    Value::Map(
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::Function;

    fn call(name: &str, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
        call_builtin(name, &mut args).expect("not a builtin")
    }

    fn ints(ns: &[i64]) -> Value {
        Value::Array(ns.iter().map(|&n| Value::Int(n)).collect())
    }

    #[test]
    fn unknown_names_are_not_builtins() {
        assert!(call_builtin("frobnicate", &mut []).is_none());
    }

    #[test]
    fn every_table_entry_dispatches() {
        for (name, _) in BUILTINS {
            assert!(
                call_builtin(name, &mut []).is_some(),
                "{name} is listed but not dispatched"
            );
        }
    }

    #[test]
    fn sequence_mutation_in_place() {
        let mut args = vec![ints(&[1]), Value::Int(2), Value::Int(3)];
        call_builtin("add", &mut args).unwrap().unwrap();
        assert_eq!(args[0], ints(&[1, 2, 3]));

        let mut args = vec![ints(&[1, 2])];
        assert_eq!(call_builtin("pop", &mut args).unwrap(), Ok(Value::Int(2)));
        assert_eq!(args[0], ints(&[1]));

        let mut args = vec![ints(&[3, 1, 2])];
        call_builtin("sort", &mut args).unwrap().unwrap();
        assert_eq!(args[0], ints(&[1, 2, 3]));

        let mut args = vec![ints(&[1, 2]), Value::Int(5)];
        assert!(matches!(
            call_builtin("delete", &mut args).unwrap(),
            Err(RuntimeError::IndexOutOfBounds { index: 5, len: 2 })
        ));
    }

    #[test]
    fn pop_empty_is_an_error() {
        assert!(call("pop", vec![ints(&[])]).is_err());
    }

    #[test]
    fn sequence_queries() {
        assert_eq!(call("len", vec![Value::str("héllo")]), Ok(Value::Int(5)));
        assert_eq!(call("find", vec![ints(&[4, 5]), Value::Int(5)]), Ok(Value::Int(1)));
        assert_eq!(call("find", vec![Value::str("abc"), Value::str("z")]), Ok(Value::Int(-1)));
        assert_eq!(call("sum", vec![ints(&[1, 2, 3])]), Ok(Value::Int(6)));
        assert_eq!(call("sum", vec![Value::Array(vec![Value::Int(1), Value::Float(0.5)])]), Ok(Value::Float(1.5)));
        assert_eq!(call("sorted", vec![ints(&[2, 1])]), Ok(ints(&[1, 2])));
        assert!(call("sorted", vec![Value::Array(vec![Value::Int(1), Value::str("a")])]).is_err());
        assert_eq!(call("range", vec![Value::Int(0), Value::Int(6), Value::Int(2)]), Ok(ints(&[0, 2, 4])));
        assert_eq!(call("high", vec![ints(&[1, 2, 3])]), Ok(Value::Int(2)));
    }

    #[test]
    fn maps() {
        let m = map_of([("b", Value::Int(2)), ("a", Value::Int(1))]);
        assert_eq!(call("keys", vec![m.clone()]), Ok(Value::Array(vec![Value::str("a"), Value::str("b")])));
        assert_eq!(call("hasKey", vec![m.clone(), Value::str("a")]), Ok(Value::Bool(true)));
        let mut args = vec![m, Value::str("a")];
        call_builtin("delete", &mut args).unwrap().unwrap();
        assert_eq!(args[0], map_of([("b", Value::Int(2))]));
    }

    #[test]
    fn strings() {
        assert_eq!(
            call("split", vec![Value::str("a,b"), Value::str(",")]),
            Ok(Value::Array(vec![Value::str("a"), Value::str("b")]))
        );
        assert_eq!(call("join", vec![ints(&[1, 2]), Value::str("-")]), Ok(Value::str("1-2")));
        assert_eq!(call("repeat", vec![Value::str("ab"), Value::Int(2)]), Ok(Value::str("abab")));
        assert_eq!(call("strip", vec![Value::str("  x ")]), Ok(Value::str("x")));
        assert!(call("toUpper", vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn math() {
        assert_eq!(call("abs", vec![Value::Int(-3)]), Ok(Value::Int(3)));
        assert_eq!(call("max", vec![Value::Int(1), Value::Int(7), Value::Int(3)]), Ok(Value::Int(7)));
        assert_eq!(call("min", vec![ints(&[4, 2])]), Ok(Value::Int(2)));
        assert_eq!(call("clamp", vec![Value::Int(12), Value::Int(0), Value::Int(10)]), Ok(Value::Int(10)));
        assert_eq!(call("sgn", vec![Value::Float(-0.5)]), Ok(Value::Int(-1)));
        assert_eq!(call("floor", vec![Value::Float(2.7)]), Ok(Value::Float(2.0)));
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(10)]), Ok(Value::Float(1024.0)));
    }

    #[test]
    fn conversions() {
        assert_eq!(call("int", vec![Value::Float(3.9)]), Ok(Value::Int(3)));
        assert_eq!(call("int", vec![Value::str("42")]), Ok(Value::Int(42)));
        assert_eq!(call("parseInt", vec![Value::str(" -0x10 ")]), Ok(Value::Int(-16)));
        assert!(call("parseInt", vec![Value::str("4.5")]).is_err());
        assert_eq!(call("parseFloat", vec![Value::str("2.5")]), Ok(Value::Float(2.5)));
        assert_eq!(call("typeof", vec![ints(&[])]), Ok(Value::str("array")));
        assert_eq!(call("chr", vec![Value::Int(65)]), Ok(Value::str("A")));
        assert_eq!(call("ord", vec![Value::str("a")]), Ok(Value::Int(97)));
        assert_eq!(call("str", vec![Value::Float(2.0)]), Ok(Value::str("2.0")));
    }

    #[test]
    fn install_binds_output_and_constants() {
        let env = Env::root();
        let out = Output::capture();
        install(&env, &out);
        let echo = env.get("echo").unwrap();
        let print = env.get("print").unwrap();
        let mut args = vec![Value::str("a"), Value::Int(1)];
        for f in [echo, print] {
            let Value::Function(f) = f else { panic!("not a function") };
            let Function::Native(n) = f.as_ref() else {
                panic!("not native")
            };
            (n.func)(&env, &mut args).unwrap();
        }
        assert_eq!(out.take(), vec!["a1", "a 1"]);
        assert!(matches!(env.get("PI"), Some(Value::Float(x)) if x == std::f64::consts::PI));
        assert!(env.get("sqrt").is_some());
    }
}
