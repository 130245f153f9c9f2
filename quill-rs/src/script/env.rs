//! Lexical environments.
//!
//! An [`Env`] is one scope frame: its own bindings, a link to its parent,
//! and the statements `defer`red while it was active.  Cloning an `Env`
//! clones the handle, not the frame.
//!
//! Scoping is two-tier:
//!
//! - declarations (`var`/`let`/`const`) always bind in the current frame;
//! - plain assignment mutates the nearest frame that already has the name,
//!   or creates the binding in the current frame when none does.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::ast::Block;
use super::value::Value;

#[derive(Default)]
struct Scope {
    bindings: HashMap<String, Value>,
    parent: Option<Env>,
    defers: Vec<Block>,
}

#[derive(Clone, Default)]
pub struct Env(Rc<RefCell<Scope>>);

impl Env {
    /// A fresh root environment with no parent.
    pub fn root() -> Self {
        Env::default()
    }

    /// A new child frame of `self`.
    pub fn child(&self) -> Self {
        Env(Rc::new(RefCell::new(Scope {
            parent: Some(self.clone()),
            ..Scope::default()
        })))
    }

    pub fn parent(&self) -> Option<Env> {
        self.0.borrow().parent.clone()
    }

    /// Read `name`, walking outwards through parent frames.
    pub fn get(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        match scope.bindings.get(name) {
            Some(v) => Some(v.clone()),
            None => scope.parent.as_ref()?.get(name),
        }
    }

    /// The frame that binds `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<Env> {
        if self.0.borrow().bindings.contains_key(name) {
            return Some(self.clone());
        }
        let parent = self.0.borrow().parent.clone();
        parent?.lookup(name)
    }

    /// Whether `name` is bound in this frame (not its parents).
    pub fn has_local(&self, name: &str) -> bool {
        self.0.borrow().bindings.contains_key(name)
    }

    /// Bind `name` in this frame, shadowing any outer binding.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Mutate the nearest existing binding of `name`, or create it here.
    pub fn assign(&self, name: &str, value: Value) {
        match self.lookup(name) {
            Some(owner) => owner.define(name, value),
            None => self.define(name, value),
        }
    }

    /// Run `f` against the nearest binding of `name` in place.
    pub fn with_binding_mut<R>(&self, name: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let owner = self.lookup(name)?;
        let mut scope = owner.0.borrow_mut();
        scope.bindings.get_mut(name).map(f)
    }

    /// Names bound in this frame, sorted.
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.borrow().bindings.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn push_defer(&self, body: Block) {
        self.0.borrow_mut().defers.push(body);
    }

    /// Remove this frame's deferred blocks, most recent first.
    pub fn take_defers(&self) -> Vec<Block> {
        let mut defers = std::mem::take(&mut self.0.borrow_mut().defers);
        defers.reverse();
        defers
    }

    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("names", &self.local_names())
            .field("has_parent", &self.0.borrow().parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_walks_parents() {
        let root = Env::root();
        root.define("x", Value::Int(1));
        let child = root.child().child();
        assert_eq!(child.get("x"), Some(Value::Int(1)));
        assert_eq!(child.get("y"), None);
    }

    #[test]
    fn declaration_shadows_in_current_frame() {
        let root = Env::root();
        root.define("x", Value::Int(1));
        let child = root.child();
        child.define("x", Value::Int(3));
        assert_eq!(child.get("x"), Some(Value::Int(3)));
        assert_eq!(root.get("x"), Some(Value::Int(1)));
    }

    #[test]
    fn assignment_mutates_owner_or_creates_locally() {
        let root = Env::root();
        root.define("x", Value::Int(1));
        let child = root.child();
        child.assign("x", Value::Int(2));
        child.assign("fresh", Value::Int(9));
        assert_eq!(root.get("x"), Some(Value::Int(2)));
        assert!(!child.has_local("x"));
        assert!(child.has_local("fresh"));
        assert_eq!(root.get("fresh"), None);
    }

    #[test]
    fn in_place_mutation() {
        let root = Env::root();
        root.define("xs", Value::Array(vec![]));
        let child = root.child();
        child.with_binding_mut("xs", |v| {
            if let Value::Array(a) = v {
                a.push(Value::Int(5));
            }
        });
        assert_eq!(root.get("xs"), Some(Value::Array(vec![Value::Int(5)])));
    }

    #[test]
    fn defers_come_back_lifo() {
        let env = Env::root();
        env.push_defer(vec![]);
        env.push_defer(vec![crate::script::ast::Stmt::Break(None)]);
        let defers = env.take_defers();
        assert_eq!(defers.len(), 2);
        assert_eq!(defers[0].len(), 1);
        assert!(env.take_defers().is_empty());
    }
}
