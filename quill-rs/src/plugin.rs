//! Extensions: named bundles of native functions, constants, load/unload
//! hooks and per-backend code generation mappings.
//!
//! A [`Registry`] keeps extensions in registration order.  Loading runs the
//! extension's `on_load` hook and then binds its functions and constants
//! into the target environment.  Unloading runs `on_unload` and marks the
//! extension disabled; bindings already made stay in place so closures that
//! captured them keep working.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::trace;

use crate::codegen::BackendKind;
use crate::script::native::native_fn;
use crate::script::{Env, RuntimeError, Value};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unknown extension '{0}'")]
    Unknown(String),
    #[error("extension '{0}' is already registered")]
    Duplicate(String),
    #[error("extension '{0}' is already loaded")]
    AlreadyLoaded(String),
    #[error("extension '{0}' is not loaded")]
    NotLoaded(String),
    #[error("extension '{name}' {hook} hook failed: {source}")]
    Hook {
        name: String,
        hook: Hook,
        #[source]
        source: RuntimeError,
    },
}

/// Lifecycle hook of an [`Extension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Load,
    Unload,
}

impl Hook {
    pub fn name(self) -> &'static str {
        match self {
            Hook::Load => "on_load",
            Hook::Unload => "on_unload",
        }
    }
}

impl std::fmt::Display for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What an extension's hooks can see.
pub struct ExtensionContext<'a> {
    pub env: &'a Env,
}

type HookFn = Box<dyn Fn(&ExtensionContext<'_>) -> Result<(), RuntimeError>>;

/// How one backend spells an extension's names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodegenMapping {
    /// Modules the generated program must import.
    pub imports: Vec<String>,
    /// DSL function name → target expression (callee text).
    pub functions: BTreeMap<String, String>,
    /// DSL constant name → target literal.
    pub constants: BTreeMap<String, String>,
}

impl CodegenMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(mut self, module: impl Into<String>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn function(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.functions.insert(name.into(), target.into());
        self
    }

    pub fn constant(mut self, name: impl Into<String>, literal: impl Into<String>) -> Self {
        self.constants.insert(name.into(), literal.into());
        self
    }
}

// ── Extension ─────────────────────────────────────────────────────────────────

pub struct Extension {
    name: String,
    functions: Vec<(String, Value)>,
    constants: Vec<(String, Value)>,
    on_load: Option<HookFn>,
    on_unload: Option<HookFn>,
    codegen: BTreeMap<BackendKind, CodegenMapping>,
}

impl Extension {
    pub fn new(name: impl Into<String>) -> Self {
        Extension {
            name: name.into(),
            functions: Vec::new(),
            constants: Vec::new(),
            on_load: None,
            on_unload: None,
            codegen: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a native function.  `var_params` are copied back into identifier
    /// arguments after each call.
    pub fn function(
        mut self,
        name: impl Into<String>,
        var_params: &[usize],
        func: impl Fn(&Env, &mut [Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        let name = name.into();
        let value = native_fn(name.clone(), var_params, func);
        self.functions.push((name, value));
        self
    }

    pub fn constant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constants.push((name.into(), value.into()));
        self
    }

    pub fn on_load(
        mut self,
        hook: impl Fn(&ExtensionContext<'_>) -> Result<(), RuntimeError> + 'static,
    ) -> Self {
        self.on_load = Some(Box::new(hook));
        self
    }

    pub fn on_unload(
        mut self,
        hook: impl Fn(&ExtensionContext<'_>) -> Result<(), RuntimeError> + 'static,
    ) -> Self {
        self.on_unload = Some(Box::new(hook));
        self
    }

    pub fn codegen(mut self, backend: BackendKind, mapping: CodegenMapping) -> Self {
        self.codegen.insert(backend, mapping);
        self
    }

    pub fn mapping(&self, backend: BackendKind) -> Option<&CodegenMapping> {
        self.codegen.get(&backend)
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|(n, _)| n.as_str())
    }

    pub fn constant_names(&self) -> impl Iterator<Item = &str> {
        self.constants.iter().map(|(n, _)| n.as_str())
    }

    fn run_hook(&self, hook: Hook, env: &Env) -> Result<(), PluginError> {
        let f = match hook {
            Hook::Load => &self.on_load,
            Hook::Unload => &self.on_unload,
        };
        match f {
            Some(f) => f(&ExtensionContext { env }).map_err(|source| PluginError::Hook {
                name: self.name.clone(),
                hook,
                source,
            }),
            None => Ok(()),
        }
    }

    fn bind(&self, env: &Env) {
        for (name, value) in self.functions.iter().chain(&self.constants) {
            env.define(name.clone(), value.clone());
        }
    }
}

impl std::fmt::Debug for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name)
            .field("functions", &self.function_names().collect::<Vec<_>>())
            .field("constants", &self.constant_names().collect::<Vec<_>>())
            .finish()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Registered,
    Loaded,
    Disabled,
}

#[derive(Debug)]
struct Entry {
    ext: Extension,
    state: State,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ext: Extension) -> Result<(), PluginError> {
        if self.get(ext.name()).is_some() {
            return Err(PluginError::Duplicate(ext.name));
        }
        trace!(extension = ext.name(), "registered");
        self.entries.push(Entry {
            ext,
            state: State::Registered,
        });
        Ok(())
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut Entry, PluginError> {
        self.entries
            .iter_mut()
            .find(|e| e.ext.name == name)
            .ok_or_else(|| PluginError::Unknown(name.to_string()))
    }

    /// Run `on_load`, then bind the extension's names into `env`.
    pub fn load(&mut self, name: &str, env: &Env) -> Result<(), PluginError> {
        let entry = self.entry_mut(name)?;
        if entry.state == State::Loaded {
            return Err(PluginError::AlreadyLoaded(name.to_string()));
        }
        entry.ext.run_hook(Hook::Load, env)?;
        entry.ext.bind(env);
        entry.state = State::Loaded;
        trace!(extension = name, "loaded");
        Ok(())
    }

    /// Run `on_unload` and disable the extension.  Bindings are kept.
    pub fn unload(&mut self, name: &str, env: &Env) -> Result<(), PluginError> {
        let entry = self.entry_mut(name)?;
        if entry.state != State::Loaded {
            return Err(PluginError::NotLoaded(name.to_string()));
        }
        entry.ext.run_hook(Hook::Unload, env)?;
        entry.state = State::Disabled;
        trace!(extension = name, "unloaded");
        Ok(())
    }

    /// Load every registered, not yet loaded extension in registration order.
    pub fn load_all(&mut self, env: &Env) -> Result<(), PluginError> {
        let pending: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.state == State::Registered)
            .map(|e| e.ext.name.clone())
            .collect();
        for name in pending {
            self.load(&name, env)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.entries.iter().find(|e| e.ext.name == name).map(|e| &e.ext)
    }

    pub fn state(&self, name: &str) -> Option<State> {
        self.entries.iter().find(|e| e.ext.name == name).map(|e| e.state)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.ext.name.as_str()).collect()
    }

    /// Loaded extensions, in registration order.
    pub fn loaded(&self) -> impl Iterator<Item = &Extension> {
        self.entries
            .iter()
            .filter(|e| e.state == State::Loaded)
            .map(|e| &e.ext)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn sample(log: Rc<RefCell<Vec<String>>>) -> Extension {
        let on_load = Rc::clone(&log);
        let on_unload = Rc::clone(&log);
        Extension::new("geo")
            .function("double", &[], |_, args| match args.first() {
                Some(Value::Int(n)) => Ok(Value::Int(n * 2)),
                _ => Err(RuntimeError::native("double: expected an int")),
            })
            .constant("ORIGIN", 0i64)
            .on_load(move |ctx| {
                on_load.borrow_mut().push(format!("load {}", ctx.env.get("ORIGIN").is_some()));
                Ok(())
            })
            .on_unload(move |_| {
                on_unload.borrow_mut().push("unload".into());
                Ok(())
            })
            .codegen(
                BackendKind::Python,
                CodegenMapping::new().import("math").function("double", "geo.double"),
            )
    }

    #[test]
    fn load_runs_hook_before_binding() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reg = Registry::new();
        reg.register(sample(Rc::clone(&log))).unwrap();
        let env = Env::root();
        reg.load("geo", &env).unwrap();
        assert_eq!(*log.borrow(), vec!["load false"]);
        assert_eq!(env.get("ORIGIN"), Some(Value::Int(0)));
        assert!(env.get("double").is_some());
        assert_eq!(reg.state("geo"), Some(State::Loaded));
    }

    #[test]
    fn unload_keeps_bindings() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reg = Registry::new();
        reg.register(sample(Rc::clone(&log))).unwrap();
        let env = Env::root();
        reg.load("geo", &env).unwrap();
        reg.unload("geo", &env).unwrap();
        assert_eq!(log.borrow().last().map(String::as_str), Some("unload"));
        assert!(env.get("double").is_some());
        assert_eq!(reg.state("geo"), Some(State::Disabled));
        assert_eq!(reg.loaded().count(), 0);
    }

    #[test]
    fn registry_errors() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reg = Registry::new();
        let env = Env::root();
        reg.register(sample(Rc::clone(&log))).unwrap();
        assert!(matches!(reg.register(sample(log)), Err(PluginError::Duplicate(_))));
        assert!(matches!(reg.load("nope", &env), Err(PluginError::Unknown(_))));
        assert!(matches!(reg.unload("geo", &env), Err(PluginError::NotLoaded(_))));
        reg.load("geo", &env).unwrap();
        assert!(matches!(reg.load("geo", &env), Err(PluginError::AlreadyLoaded(_))));
    }

    #[test]
    fn failing_hook_binds_nothing() {
        let mut reg = Registry::new();
        reg.register(
            Extension::new("broken")
                .constant("X", 1i64)
                .on_load(|_| Err(RuntimeError::native("no device"))),
        )
        .unwrap();
        let env = Env::root();
        let err = reg.load("broken", &env).unwrap_err();
        assert_eq!(err.to_string(), "extension 'broken' on_load hook failed: no device");
        assert!(matches!(err, PluginError::Hook { hook: Hook::Load, .. }));
        assert!(env.get("X").is_none());
    }

    #[test]
    fn failing_unload_names_its_hook() {
        let mut reg = Registry::new();
        reg.register(Extension::new("sticky").on_unload(|_| Err(RuntimeError::native("busy"))))
            .unwrap();
        let env = Env::root();
        reg.load("sticky", &env).unwrap();
        let err = reg.unload("sticky", &env).unwrap_err();
        assert!(matches!(err, PluginError::Hook { hook: Hook::Unload, .. }));
        assert_eq!(err.to_string(), "extension 'sticky' on_unload hook failed: busy");
    }

    #[test]
    fn load_all_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut reg = Registry::new();
        for name in ["b", "a", "c"] {
            let order = Rc::clone(&order);
            reg.register(Extension::new(name).on_load(move |_| {
                order.borrow_mut().push(name);
                Ok(())
            }))
            .unwrap();
        }
        reg.load_all(&Env::root()).unwrap();
        assert_eq!(*order.borrow(), vec!["b", "a", "c"]);
        assert_eq!(reg.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn mappings_by_backend() {
        let ext = sample(Rc::new(RefCell::new(Vec::new())));
        let py = ext.mapping(BackendKind::Python).unwrap();
        assert_eq!(py.imports, vec!["math"]);
        assert_eq!(py.functions["double"], "geo.double");
        assert!(ext.mapping(BackendKind::Nim).is_none());
    }
}
