//! The native-function bridge.
//!
//! Host functions are plain closures `(env, args) -> Result<Value, _>`
//! wrapped in a [`NativeFn`].  The bridge itself validates nothing; the
//! argument helpers here are what natives use to check their own inputs.

use std::cell::RefCell;
use std::rc::Rc;

use super::env::Env;
use super::error::RuntimeError;
use super::value::{Function, NativeFn, Value};

/// Build a native function value.
///
/// `var_params` lists argument positions that are copied back into the
/// caller's variable when the argument is a bare identifier.
pub fn native_fn(
    name: impl Into<String>,
    var_params: &[usize],
    func: impl Fn(&Env, &mut [Value]) -> Result<Value, RuntimeError> + 'static,
) -> Value {
    Value::Function(Rc::new(Function::Native(NativeFn {
        name: name.into(),
        var_params: var_params.to_vec(),
        func: Rc::new(func),
    })))
}

// ── Argument helpers ──────────────────────────────────────────────────────────

pub fn check_arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(RuntimeError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn missing(name: &str, idx: usize, got: usize) -> RuntimeError {
    RuntimeError::Arity {
        name: name.to_string(),
        expected: format!("at least {}", idx + 1),
        got,
    }
}

pub fn arg<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a Value, RuntimeError> {
    args.get(idx).ok_or_else(|| missing(name, idx, args.len()))
}

pub fn arg_str(args: &[Value], idx: usize, name: &str) -> Result<String, RuntimeError> {
    match arg(args, idx, name)? {
        Value::Str(s) => Ok(s.clone()),
        other => Err(RuntimeError::type_error(format!(
            "{name}: argument {} must be a string, got {}",
            idx + 1,
            other.type_name()
        ))),
    }
}

pub fn arg_int(args: &[Value], idx: usize, name: &str) -> Result<i64, RuntimeError> {
    let v = arg(args, idx, name)?;
    v.as_i64().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{name}: argument {} must be a number, got {}",
            idx + 1,
            v.type_name()
        ))
    })
}

pub fn arg_f64(args: &[Value], idx: usize, name: &str) -> Result<f64, RuntimeError> {
    let v = arg(args, idx, name)?;
    v.as_f64().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{name}: argument {} must be a number, got {}",
            idx + 1,
            v.type_name()
        ))
    })
}

/// An array argument; ranges and strings are materialized.
pub fn arg_items(args: &[Value], idx: usize, name: &str) -> Result<Vec<Value>, RuntimeError> {
    let v = arg(args, idx, name)?;
    v.to_items().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{name}: argument {} must be a sequence, got {}",
            idx + 1,
            v.type_name()
        ))
    })
}

// ── Output sink ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct OutputState {
    lines: Vec<String>,
    passthrough: bool,
}

/// Where `echo`/`print` write: captured lines, or straight to stdout.
#[derive(Clone, Default)]
pub struct Output(Rc<RefCell<OutputState>>);

impl Output {
    /// Collect lines for [`Output::take`].
    pub fn capture() -> Self {
        Output::default()
    }

    /// Write lines to stdout as they are produced.
    pub fn stdout() -> Self {
        Output(Rc::new(RefCell::new(OutputState {
            lines: Vec::new(),
            passthrough: true,
        })))
    }

    pub fn emit(&self, line: String) {
        let mut state = self.0.borrow_mut();
        if state.passthrough {
            println!("{line}");
        } else {
            state.lines.push(line);
        }
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.0.borrow_mut().lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_messages() {
        let args = [Value::Int(1)];
        let err = check_arity("f", &args, 2, 2).unwrap_err();
        assert_eq!(err.to_string(), "f: expected 2 argument(s), got 1");
        let err = check_arity("g", &args, 2, usize::MAX).unwrap_err();
        assert_eq!(err.to_string(), "g: expected at least 2 argument(s), got 1");
        assert!(check_arity("h", &args, 0, 1).is_ok());
    }

    #[test]
    fn typed_argument_access() {
        let args = [Value::str("x"), Value::Float(2.7)];
        assert_eq!(arg_str(&args, 0, "f").unwrap(), "x");
        assert_eq!(arg_int(&args, 1, "f").unwrap(), 2);
        assert!(arg_str(&args, 1, "f").is_err());
        assert!(arg_f64(&args, 2, "f").is_err());
    }

    #[test]
    fn native_values_carry_var_params() {
        let f = native_fn("bump", &[0], |_, args| {
            args[0] = Value::Int(1);
            Ok(Value::Nil)
        });
        let func = f.as_function().unwrap();
        assert!(func.is_var_param(0));
        assert!(!func.is_var_param(1));
    }

    #[test]
    fn captured_output() {
        let out = Output::capture();
        out.emit("a".into());
        out.emit("b".into());
        assert_eq!(out.take(), vec!["a", "b"]);
        assert!(out.take().is_empty());
    }
}
