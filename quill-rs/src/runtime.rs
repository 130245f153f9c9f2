//! The host-owned engine instance.
//!
//! A [`Runtime`] owns a root environment, an interpreter, the output sink
//! `echo`/`print` write to, and the extension registry.  Independent
//! runtimes share nothing.

use tracing::debug;

use crate::error::Result;
use crate::frontend::{compile, Dialect};
use crate::plugin::{Extension, Registry};
use crate::script::builtins;
use crate::script::native::{native_fn, Output};
use crate::script::{Env, Interpreter, Program, RuntimeError, Value};

pub struct Runtime {
    root: Env,
    interp: Interpreter,
    output: Output,
    registry: Registry,
    stdlib: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A runtime with the standard library installed and captured output.
    pub fn new() -> Self {
        Self::with_output(Output::capture())
    }

    /// A runtime with the standard library writing to `output`.
    pub fn with_output(output: Output) -> Self {
        let mut rt = Self::bare_with_output(output);
        rt.init_stdlib();
        rt
    }

    /// A runtime with an empty root environment.
    pub fn bare() -> Self {
        Self::bare_with_output(Output::capture())
    }

    fn bare_with_output(output: Output) -> Self {
        Runtime {
            root: Env::root(),
            interp: Interpreter::new(),
            output,
            registry: Registry::new(),
            stdlib: false,
        }
    }

    pub fn set_max_call_depth(&mut self, depth: usize) {
        self.interp = Interpreter::with_max_depth(depth);
    }

    pub fn max_call_depth(&self) -> usize {
        self.interp.max_depth()
    }

    /// Install the standard library into the root environment.  Calling it
    /// again does nothing.
    pub fn init_stdlib(&mut self) {
        if self.stdlib {
            return;
        }
        builtins::install(&self.root, &self.output);
        self.stdlib = true;
    }

    // ── Environments and bindings ─────────────────────────────────────────────

    pub fn root(&self) -> &Env {
        &self.root
    }

    /// A fresh child of `parent`, or of the root environment.
    pub fn new_env(&self, parent: Option<&Env>) -> Env {
        parent.unwrap_or(&self.root).child()
    }

    pub fn register_native(
        &mut self,
        name: &str,
        func: impl Fn(&Env, &mut [Value]) -> std::result::Result<Value, RuntimeError> + 'static,
    ) {
        self.root.define(name, native_fn(name, &[], func));
    }

    /// Like [`register_native`](Self::register_native), with `var` argument
    /// positions that are copied back into identifier arguments.
    pub fn register_native_var(
        &mut self,
        name: &str,
        var_params: &[usize],
        func: impl Fn(&Env, &mut [Value]) -> std::result::Result<Value, RuntimeError> + 'static,
    ) {
        self.root.define(name, native_fn(name, var_params, func));
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) {
        self.root.define(name, value.into());
    }

    pub fn set_int(&mut self, name: &str, value: i64) {
        self.set_global(name, value);
    }

    pub fn set_float(&mut self, name: &str, value: f64) {
        self.set_global(name, value);
    }

    pub fn set_str(&mut self, name: &str, value: &str) {
        self.set_global(name, value);
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set_global(name, value);
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.root.get(name)
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    pub fn exec_program(&mut self, program: &Program, env: &Env) -> Result<()> {
        self.interp.exec_program(program, env)?;
        Ok(())
    }

    /// Compile and run `source` directly in the root environment, so its
    /// declarations persist.
    pub fn run(&mut self, source: &str, dialect: Option<Dialect>) -> Result<()> {
        let env = self.root.clone();
        self.run_in(source, dialect, &env)
    }

    /// Compile and run `source` in `env`.
    pub fn run_in(&mut self, source: &str, dialect: Option<Dialect>, env: &Env) -> Result<()> {
        let program = compile(source, dialect)?;
        debug!(statements = program.stmts.len(), "running fragment");
        self.exec_program(&program, env)
    }

    /// Compile and run `source` in the root environment, returning the value
    /// of its trailing expression.
    pub fn eval(&mut self, source: &str, dialect: Option<Dialect>) -> Result<Value> {
        let program = compile(source, dialect)?;
        Ok(self.interp.eval_program(&program, &self.root)?)
    }

    /// Call the global function `name`.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let func = self
            .root
            .get(name)
            .ok_or_else(|| RuntimeError::Undefined(name.to_string()))?;
        Ok(self.interp.call_value(&func, args, &self.root)?)
    }

    // ── Extensions ────────────────────────────────────────────────────────────

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn register_extension(&mut self, ext: Extension) -> Result<()> {
        Ok(self.registry.register(ext)?)
    }

    pub fn load_extension(&mut self, name: &str) -> Result<()> {
        Ok(self.registry.load(name, &self.root)?)
    }

    pub fn unload_extension(&mut self, name: &str) -> Result<()> {
        Ok(self.registry.unload(name, &self.root)?)
    }

    /// Register `ext` and load it straight away.
    pub fn add_extension(&mut self, ext: Extension) -> Result<()> {
        let name = ext.name().to_string();
        self.register_extension(ext)?;
        self.load_extension(&name)
    }

    // ── Output ────────────────────────────────────────────────────────────────

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Drain the lines written by `echo`/`print` so far.
    pub fn take_output(&mut self) -> Vec<String> {
        self.output.take()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::QuillError;

    #[test]
    fn root_declarations_persist_child_ones_do_not() {
        let mut rt = Runtime::new();
        rt.run("var kept = 1", None).unwrap();
        let scratch = rt.new_env(None);
        rt.run_in("var temp = 2\nkept = kept + 10", None, &scratch).unwrap();
        assert_eq!(rt.get_global("kept"), Some(Value::Int(11)));
        assert_eq!(rt.get_global("temp"), None);
    }

    #[test]
    fn typed_setters_and_eval() {
        let mut rt = Runtime::new();
        rt.set_int("n", 4);
        rt.set_float("f", 0.5);
        rt.set_str("s", "ab");
        rt.set_bool("b", true);
        assert_eq!(rt.eval("n * 2", None).unwrap(), Value::Int(8));
        assert_eq!(rt.eval("f + 1", None).unwrap(), Value::Float(1.5));
        assert_eq!(rt.eval("s & \"c\"", None).unwrap(), Value::str("abc"));
        assert_eq!(rt.eval("not b", None).unwrap(), Value::Bool(false));
    }

    #[test]
    fn native_functions_receive_arguments() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&calls);
        let mut rt = Runtime::new();
        rt.register_native("report", move |_, args| {
            seen.borrow_mut().push(args.to_vec());
            Ok(Value::Nil)
        });
        rt.run("report(1, \"x\")", None).unwrap();
        assert_eq!(*calls.borrow(), vec![vec![Value::Int(1), Value::str("x")]]);
    }

    #[test]
    fn errors_do_not_poison_the_runtime() {
        let mut rt = Runtime::new();
        assert!(matches!(rt.run("echo(nope)", None), Err(QuillError::Runtime(_))));
        assert!(matches!(rt.run("var = 1", None), Err(QuillError::Parse(_))));
        rt.run("echo(\"still fine\")", None).unwrap();
        assert_eq!(rt.take_output(), vec!["still fine"]);
    }

    #[test]
    fn call_global_function() {
        let mut rt = Runtime::new();
        rt.run("proc sq(x: int): int = x * x", None).unwrap();
        assert_eq!(rt.call("sq", vec![Value::Int(7)]).unwrap(), Value::Int(49));
        assert!(rt.call("missing", vec![]).is_err());
    }

    #[test]
    fn bare_runtime_has_no_stdlib() {
        let mut rt = Runtime::bare();
        assert!(rt.get_global("echo").is_none());
        rt.init_stdlib();
        rt.init_stdlib();
        assert!(rt.get_global("echo").is_some());
    }

    #[test]
    fn call_depth_is_configurable() {
        let mut rt = Runtime::new();
        rt.set_max_call_depth(8);
        assert_eq!(rt.max_call_depth(), 8);
        let err = rt.run("proc f(n) = f(n + 1)\nf(0)", None).unwrap_err();
        assert!(matches!(err, QuillError::Runtime(RuntimeError::CallDepth(8))));
    }

    #[test]
    fn extensions_load_into_root() {
        let mut rt = Runtime::new();
        rt.add_extension(Extension::new("units").constant("METRE", 1.0)).unwrap();
        assert_eq!(rt.eval("METRE * 3", None).unwrap(), Value::Float(3.0));
        rt.unload_extension("units").unwrap();
        assert!(rt.get_global("METRE").is_some());
        assert!(rt.load_extension("other").is_err());
    }
}
