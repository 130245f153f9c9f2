//! Tree-walking interpreter.
//!
//! The [`Interpreter`] executes parsed [`Stmt`] trees against an [`Env`].
//! Statement execution yields a [`Flow`] value so that `return`, `break`
//! and `continue` unwind through ordinary returns; errors unwind through
//! `Result` and never take the host down.
//!
//! Every `if`/`case` branch, loop iteration and explicit block runs in a
//! fresh child environment.  Deferred blocks run when the frame that
//! registered them is left, most recent first, whether it is left normally
//! or with an error.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::trace;

use super::ast::{BinOp, Block, DeclKind, Expr, ProcDef, Program, Stmt, TypeNode, UnaryOp};
use super::builtins::call_builtin;
use super::env::Env;
use super::error::RuntimeError;
use super::value::{Function, Pointer, Range, UserFn, Value};
use crate::methods;

type RResult<T> = Result<T, RuntimeError>;

/// Default bound on nested calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Remaining stack below which recursion moves onto a fresh heap segment.
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each segment added by [`stacker::maybe_grow`].
const STACK_GROW_SIZE: usize = 2 * 1024 * 1024;

// ── Flow ──────────────────────────────────────────────────────────────────────

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    /// `return` with or without a value.
    Return(Option<Value>),
    Break(Option<String>),
    Continue(Option<String>),
}

/// What a loop does after one iteration.
enum LoopStep {
    Next,
    Exit,
    Propagate(Flow),
}

fn label_matches(flow_label: &Option<String>, own: &Option<String>) -> bool {
    flow_label.is_none() || flow_label == own
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter {
    depth: usize,
    max_depth: usize,
    /// Declared `type`s, used for object construction defaults.
    types: HashMap<String, TypeNode>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_CALL_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Interpreter {
            depth: 0,
            max_depth,
            types: HashMap::new(),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    // ── Entry points ──────────────────────────────────────────────────────────

    /// Execute `program` directly in `env` (no child frame is created, so
    /// top-level declarations land in `env`).
    pub fn exec_program(&mut self, program: &Program, env: &Env) -> RResult<()> {
        self.eval_program(program, env).map(|_| ())
    }

    /// Like [`exec_program`](Self::exec_program), but yields the value of a
    /// trailing expression statement or of a top-level `return`.
    pub fn eval_program(&mut self, program: &Program, env: &Env) -> RResult<Value> {
        let (flow, last) = self.exec_scoped(&program.stmts, env)?;
        match flow {
            Flow::Normal => Ok(last.unwrap_or_default()),
            Flow::Return(v) => Ok(v.unwrap_or_default()),
            Flow::Break(_) => Err(RuntimeError::StrayControl("break".into())),
            Flow::Continue(_) => Err(RuntimeError::StrayControl("continue".into())),
        }
    }

    /// Call a function value from the host.  No copy-back happens since
    /// there are no caller-side variables.
    pub fn call_value(&mut self, func: &Value, mut args: Vec<Value>, env: &Env) -> RResult<Value> {
        match func {
            Value::Function(f) => self.invoke(f, &mut args, env),
            other => Err(RuntimeError::NotCallable(other.type_name().into())),
        }
    }

    // ── Blocks ────────────────────────────────────────────────────────────────

    /// Run `stmts` in `env`, then `env`'s deferred blocks.  Returns the flow
    /// and, when the last executed statement was an expression, its value.
    fn exec_scoped(&mut self, stmts: &[Stmt], env: &Env) -> RResult<(Flow, Option<Value>)> {
        let result = self.exec_seq(stmts, env);
        let deferred = self.run_defers(env);
        let outcome = result?;
        deferred?;
        Ok(outcome)
    }

    fn exec_seq(&mut self, stmts: &[Stmt], env: &Env) -> RResult<(Flow, Option<Value>)> {
        let mut last = None;
        for stmt in stmts {
            let (flow, value) = self.run_stmt(stmt, env)?;
            if flow != Flow::Normal {
                return Ok((flow, None));
            }
            last = value;
        }
        Ok((Flow::Normal, last))
    }

    /// Run `stmts` in a new child of `parent`.
    pub fn exec_block(&mut self, stmts: &[Stmt], parent: &Env) -> RResult<Flow> {
        Ok(self.branch(stmts, parent)?.0)
    }

    fn branch(&mut self, stmts: &[Stmt], parent: &Env) -> RResult<(Flow, Option<Value>)> {
        let env = parent.child();
        self.exec_scoped(stmts, &env)
    }

    fn run_defers(&mut self, env: &Env) -> RResult<()> {
        let mut first_err = None;
        for body in env.take_defers() {
            if let Err(e) = self.exec_block(&body, env) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // ── Statements ────────────────────────────────────────────────────────────

    pub fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> RResult<Flow> {
        Ok(self.run_stmt(stmt, env)?.0)
    }

    /// Execute one statement.  Expression statements, and `if`/`case`/
    /// `block` whose taken branch ends in one, also yield a value.
    fn run_stmt(&mut self, stmt: &Stmt, env: &Env) -> RResult<(Flow, Option<Value>)> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.run_stmt_inner(stmt, env))
    }

    fn run_stmt_inner(&mut self, stmt: &Stmt, env: &Env) -> RResult<(Flow, Option<Value>)> {
        match stmt {
            Stmt::Expr(e) => Ok((Flow::Normal, Some(self.eval(e, env)?))),

            Stmt::If {
                branches,
                else_body,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond, env)?.truthy() {
                        return self.branch(body, env);
                    }
                }
                match else_body {
                    Some(body) => self.branch(body, env),
                    None => Ok((Flow::Normal, None)),
                }
            }

            Stmt::Case {
                subject,
                branches,
                elifs,
                else_body,
            } => {
                let subject = self.eval(subject, env)?;
                for branch in branches {
                    for v in &branch.values {
                        let candidate = self.eval(v, env)?;
                        if case_matches(&subject, &candidate) {
                            return self.branch(&branch.body, env);
                        }
                    }
                }
                for (cond, body) in elifs {
                    if self.eval(cond, env)?.truthy() {
                        return self.branch(body, env);
                    }
                }
                match else_body {
                    Some(body) => self.branch(body, env),
                    None => Err(RuntimeError::NonExhaustiveCase(format!("{subject:?}"))),
                }
            }

            Stmt::Block { label, body } => match self.branch(body, env)? {
                (Flow::Break(l), _) if label_matches(&l, label) => Ok((Flow::Normal, None)),
                outcome => Ok(outcome),
            },

            other => Ok((self.exec_simple(other, env)?, None)),
        }
    }

    fn exec_simple(&mut self, stmt: &Stmt, env: &Env) -> RResult<Flow> {
        match stmt {
            Stmt::Expr(_) | Stmt::If { .. } | Stmt::Case { .. } | Stmt::Block { .. } => {
                self.exec_stmt(stmt, env)
            }

            Stmt::Decl {
                kind,
                names,
                unpack,
                ty,
                value,
            } => {
                self.declare(*kind, names, *unpack, ty.as_ref(), value.as_ref(), env)?;
                Ok(Flow::Normal)
            }

            Stmt::Assign { target, op, value } => {
                let rhs = self.eval(value, env)?;
                let v = match op {
                    Some(op) => {
                        let current = self.eval(target, env)?;
                        binary_op(*op, current, rhs)?
                    }
                    None => rhs,
                };
                self.assign_to(target, v, env)?;
                Ok(Flow::Normal)
            }

            Stmt::For {
                label,
                vars,
                iter,
                body,
            } => self.exec_for(label, vars, iter, body, env),

            Stmt::While { label, cond, body } => {
                while self.eval(cond, env)?.truthy() {
                    let flow = self.exec_block(body, env)?;
                    match loop_step(flow, label) {
                        LoopStep::Next => {}
                        LoopStep::Exit => break,
                        LoopStep::Propagate(flow) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::Proc(def) => {
                let name = def.display_name().to_string();
                env.define(name, self.make_closure(def, env));
                Ok(Flow::Normal)
            }

            Stmt::Return(value) => {
                let v = match value {
                    Some(e) => Some(self.eval(e, env)?),
                    None => None,
                };
                Ok(Flow::Return(v))
            }

            Stmt::Defer(body) => {
                env.push_defer(body.clone());
                Ok(Flow::Normal)
            }

            Stmt::Type(defs) => {
                for def in defs {
                    if let TypeNode::Enum(variants) = &def.ty {
                        let mut members = BTreeMap::new();
                        for (name, ord) in variants {
                            env.define(name.clone(), Value::Int(*ord));
                            members.insert(name.clone(), Value::Int(*ord));
                        }
                        env.define(def.name.clone(), Value::Map(members));
                    }
                    self.types.insert(def.name.clone(), def.ty.clone());
                }
                Ok(Flow::Normal)
            }

            Stmt::Break(label) => Ok(Flow::Break(label.clone())),
            Stmt::Continue(label) => Ok(Flow::Continue(label.clone())),

            Stmt::Discard(value) => {
                if let Some(e) = value {
                    self.eval(e, env)?;
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn declare(
        &mut self,
        kind: DeclKind,
        names: &[String],
        unpack: bool,
        ty: Option<&TypeNode>,
        value: Option<&Expr>,
        env: &Env,
    ) -> RResult<()> {
        let v = match value {
            Some(e) => self.eval(e, env)?,
            None => ty.map(|t| self.zero_value(t)).unwrap_or_default(),
        };
        if unpack {
            let items = match v {
                Value::Array(items) if items.len() == names.len() => items,
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "cannot unpack {} into {} names",
                        describe_len(&other),
                        names.len()
                    )))
                }
            };
            for (name, item) in names.iter().zip(items) {
                env.define(name.clone(), item);
            }
        } else {
            for name in names {
                env.define(name.clone(), v.clone());
            }
        }
        trace!(kind = kind.keyword(), ?names, "declared");
        Ok(())
    }

    fn exec_for(
        &mut self,
        label: &Option<String>,
        vars: &[String],
        iter: &Expr,
        body: &Block,
        env: &Env,
    ) -> RResult<Flow> {
        let iterable = self.eval(iter, env)?;
        let run = |this: &mut Self, bindings: Vec<Value>| -> RResult<LoopStep> {
            let scope = env.child();
            bind_loop_vars(&scope, vars, bindings)?;
            let (flow, _) = this.exec_scoped(body, &scope)?;
            Ok(loop_step(flow, label))
        };

        macro_rules! step {
            ($bindings:expr) => {
                match run(self, $bindings)? {
                    LoopStep::Next => {}
                    LoopStep::Exit => break,
                    LoopStep::Propagate(flow) => return Ok(flow),
                }
            };
        }

        let pair = vars.len() == 2;
        match iterable {
            Value::Range(r) => {
                for (i, n) in r.iter().enumerate() {
                    if pair {
                        step!(vec![Value::Int(i as i64), Value::Int(n)]);
                    } else {
                        step!(vec![Value::Int(n)]);
                    }
                }
            }
            Value::Array(items) => {
                for (i, item) in items.into_iter().enumerate() {
                    if pair {
                        step!(vec![Value::Int(i as i64), item]);
                    } else {
                        step!(vec![item]);
                    }
                }
            }
            Value::Str(s) => {
                for (i, c) in s.chars().enumerate() {
                    let ch = Value::Str(c.to_string());
                    if pair {
                        step!(vec![Value::Int(i as i64), ch]);
                    } else {
                        step!(vec![ch]);
                    }
                }
            }
            Value::Map(m) => {
                for (k, v) in m {
                    if pair {
                        step!(vec![Value::Str(k), v]);
                    } else {
                        step!(vec![Value::Str(k)]);
                    }
                }
            }
            other => {
                return Err(RuntimeError::type_error(format!(
                    "cannot iterate over {}",
                    other.type_name()
                )))
            }
        }
        Ok(Flow::Normal)
    }

    // ── Assignment ────────────────────────────────────────────────────────────

    fn assign_to(&mut self, target: &Expr, value: Value, env: &Env) -> RResult<()> {
        match target {
            Expr::Ident(name) => {
                env.assign(name, value);
                Ok(())
            }
            Expr::Tuple(targets) => match value {
                Value::Array(items) if items.len() == targets.len() => {
                    for (t, v) in targets.iter().zip(items) {
                        self.assign_to(t, v, env)?;
                    }
                    Ok(())
                }
                other => Err(RuntimeError::type_error(format!(
                    "cannot unpack {} into {} targets",
                    describe_len(&other),
                    targets.len()
                ))),
            },
            _ => {
                let mut value = Some(value);
                self.mutate_place(target, env, &mut |slot| {
                    *slot = value.take().unwrap_or_default();
                    Ok(())
                })
            }
        }
    }

    /// Apply `f` to the storage location `place` denotes.  Index and field
    /// operands are evaluated before the owning binding is borrowed.
    fn mutate_place(
        &mut self,
        place: &Expr,
        env: &Env,
        f: &mut dyn FnMut(&mut Value) -> RResult<()>,
    ) -> RResult<()> {
        match place {
            Expr::Ident(name) => env
                .with_binding_mut(name, |v| f(v))
                .unwrap_or_else(|| Err(RuntimeError::Undefined(name.clone()))),

            Expr::Index { target, index } => {
                let idx = self.eval(index, env)?;
                self.mutate_place(target, env, &mut |container| match container {
                    Value::Array(items) => {
                        let i = array_index(&idx, items.len())?;
                        f(&mut items[i])
                    }
                    Value::Map(m) => f(m.entry(map_key(&idx)).or_default()),
                    other => Err(RuntimeError::type_error(format!(
                        "cannot assign into an element of {}",
                        other.type_name()
                    ))),
                })
            }

            Expr::Dot { target, field } => {
                self.mutate_place(target, env, &mut |container| match container {
                    Value::Map(m) => f(m.entry(field.clone()).or_default()),
                    other => Err(RuntimeError::type_error(format!(
                        "cannot set field '{field}' on {}",
                        other.type_name()
                    ))),
                })
            }

            Expr::Deref(inner) => match self.eval(inner, env)? {
                Value::Pointer(Pointer::Cell(cell)) => f(&mut cell.borrow_mut()),
                other => Err(RuntimeError::type_error(format!(
                    "cannot dereference {}",
                    other.type_name()
                ))),
            },

            other => Err(RuntimeError::InvalidTarget(format!("{other:?}"))),
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    pub fn eval(&mut self, expr: &Expr, env: &Env) -> RResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env))
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Env) -> RResult<Value> {
        match expr {
            Expr::Int { value, .. } => Ok(Value::Int(*value)),
            Expr::Float { value, .. } => Ok(Value::Float(*value)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Nil => Ok(Value::Nil),

            Expr::Ident(name) => env
                .get(name)
                .ok_or_else(|| RuntimeError::Undefined(name.clone())),

            Expr::Unary(op, operand) => {
                let v = self.eval(operand, env)?;
                match op {
                    UnaryOp::Neg => match v {
                        Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
                        Value::Float(x) => Ok(Value::Float(-x)),
                        other => Err(RuntimeError::type_error(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
                    UnaryOp::Stringify => Ok(Value::Str(v.to_string())),
                }
            }

            Expr::Binary(BinOp::And, lhs, rhs) => {
                if !self.eval(lhs, env)?.truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(rhs, env)?.truthy()))
            }
            Expr::Binary(BinOp::Or, lhs, rhs) => {
                if self.eval(lhs, env)?.truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(rhs, env)?.truthy()))
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs, env)?;
                let r = self.eval(rhs, env)?;
                binary_op(*op, l, r)
            }

            Expr::Call { callee, args } => self.eval_call(callee, args, env),

            Expr::Array(items) | Expr::Tuple(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval(e, env))
                    .collect::<RResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }

            Expr::Map(entries) => {
                let mut m = BTreeMap::new();
                for (k, v) in entries {
                    let key = map_key(&self.eval(k, env)?);
                    m.insert(key, self.eval(v, env)?);
                }
                Ok(Value::Map(m))
            }

            Expr::NamedTuple(fields) => {
                let mut m = BTreeMap::new();
                for (name, e) in fields {
                    m.insert(name.clone(), self.eval(e, env)?);
                }
                Ok(Value::Map(m))
            }

            Expr::Object { ty, fields } => {
                let mut m = match self.types.get(ty).cloned() {
                    Some(decl) => match self.zero_value(&decl) {
                        Value::Map(defaults) => defaults,
                        _ => BTreeMap::new(),
                    },
                    None => BTreeMap::new(),
                };
                for (name, e) in fields {
                    m.insert(name.clone(), self.eval(e, env)?);
                }
                Ok(Value::Map(m))
            }

            Expr::Index { target, index } => {
                let t = self.eval(target, env)?;
                let i = self.eval(index, env)?;
                index_value(&t, &i)
            }

            Expr::Slice {
                target,
                start,
                end,
                inclusive,
            } => {
                let t = self.eval(target, env)?;
                let lo = int_operand(&self.eval(start, env)?, "slice start")?;
                let hi = int_operand(&self.eval(end, env)?, "slice end")?;
                slice_value(&t, Range::new(lo, hi, *inclusive))
            }

            Expr::Cast { ty, expr } => {
                let v = self.eval(expr, env)?;
                cast_value(ty, v)
            }

            Expr::Addr(inner) => {
                let v = self.eval(inner, env)?;
                Ok(Value::Pointer(Pointer::Cell(Rc::new(RefCell::new(v)))))
            }

            Expr::Deref(inner) => match self.eval(inner, env)? {
                Value::Pointer(Pointer::Cell(cell)) => Ok(cell.borrow().clone()),
                other => Err(RuntimeError::type_error(format!(
                    "cannot dereference {}",
                    other.type_name()
                ))),
            },

            Expr::Dot { target, field } => {
                let recv = self.eval(target, env)?;
                self.eval_field(recv, field, target, env)
            }

            Expr::Lambda(def) => Ok(self.make_closure(def, env)),
        }
    }

    /// `recv.field` without a call: a map field, a zero-argument
    /// pseudo-method or UFCS call, or `nil` for a missing map key.
    fn eval_field(&mut self, recv: Value, field: &str, target: &Expr, env: &Env) -> RResult<Value> {
        if let Value::Map(m) = &recv {
            if let Some(v) = m.get(field) {
                return Ok(v.clone());
            }
        }
        if let Some(pm) = methods::lookup(field) {
            let mut args = vec![recv];
            return builtin(pm.builtin, &mut args);
        }
        if let Some(Value::Function(f)) = env.get(field) {
            return self.call_function(&f, vec![(recv, Some(target))], env);
        }
        match recv {
            Value::Map(_) => Ok(Value::Nil),
            other => Err(RuntimeError::type_error(format!(
                "{} has no field '{field}'",
                other.type_name()
            ))),
        }
    }

    fn eval_call(&mut self, callee: &Expr, arg_exprs: &[Expr], env: &Env) -> RResult<Value> {
        // Method-call syntax: map field, pseudo-method, then UFCS.
        if let Expr::Dot { target, field } = callee {
            let recv = self.eval(target, env)?;
            if let Value::Map(m) = &recv {
                if let Some(Value::Function(f)) = m.get(field) {
                    let f = f.clone();
                    let args = self.eval_args(arg_exprs, env)?;
                    return self.call_function(&f, args, env);
                }
            }
            if let Some(pm) = methods::lookup(field) {
                let mut args = vec![recv];
                for e in arg_exprs {
                    args.push(self.eval(e, env)?);
                }
                return builtin(pm.builtin, &mut args);
            }
            return match env.get(field) {
                Some(Value::Function(f)) => {
                    let mut args = vec![(recv, Some(target.as_ref()))];
                    args.extend(self.eval_args(arg_exprs, env)?);
                    self.call_function(&f, args, env)
                }
                Some(_) => Err(RuntimeError::NotCallable(field.to_string())),
                None => Err(RuntimeError::Undefined(field.to_string())),
            };
        }

        // `newSeq[int](3)`: the generic argument is ignored.
        let callee_value = match callee {
            Expr::Index { target, .. } if is_generic_callee(callee, env) => self.eval(target, env)?,
            _ => self.eval(callee, env)?,
        };
        let Value::Function(func) = callee_value else {
            return Err(RuntimeError::NotCallable(callee_name(callee)));
        };
        let args = self.eval_args(arg_exprs, env)?;
        self.call_function(&func, args, env)
    }

    fn eval_args<'e>(
        &mut self,
        arg_exprs: &'e [Expr],
        env: &Env,
    ) -> RResult<Vec<(Value, Option<&'e Expr>)>> {
        arg_exprs
            .iter()
            .map(|e| Ok((self.eval(e, env)?, Some(e))))
            .collect()
    }

    /// Call `func`, then copy `var` parameters back into identifier
    /// arguments.  Non-identifier arguments are not written back.
    fn call_function(
        &mut self,
        func: &Rc<Function>,
        args: Vec<(Value, Option<&Expr>)>,
        env: &Env,
    ) -> RResult<Value> {
        let (mut values, sources): (Vec<Value>, Vec<Option<&Expr>>) = args.into_iter().unzip();
        let result = self.invoke(func, &mut values, env)?;
        for (i, (value, source)) in values.into_iter().zip(sources).enumerate() {
            if !func.is_var_param(i) {
                continue;
            }
            if let Some(Expr::Ident(name)) = source {
                env.assign(name, value);
            }
        }
        Ok(result)
    }

    fn invoke(&mut self, func: &Function, args: &mut [Value], env: &Env) -> RResult<Value> {
        match func {
            Function::Native(n) => (n.func)(env, args),
            Function::User(u) => {
                if self.depth >= self.max_depth {
                    return Err(RuntimeError::CallDepth(self.max_depth));
                }
                self.depth += 1;
                trace!(name = u.def.display_name(), depth = self.depth, "call");
                let result =
                    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.call_user(u, args));
                self.depth -= 1;
                result
            }
        }
    }

    fn call_user(&mut self, func: &UserFn, args: &mut [Value]) -> RResult<Value> {
        let def = &func.def;
        let required = def.params.iter().filter(|p| p.default.is_none()).count();
        if args.len() < required || args.len() > def.params.len() {
            let expected = if required == def.params.len() {
                required.to_string()
            } else {
                format!("{required} to {}", def.params.len())
            };
            return Err(RuntimeError::Arity {
                name: def.display_name().to_string(),
                expected,
                got: args.len(),
            });
        }

        let scope = func.closure.child();
        for (i, param) in def.params.iter().enumerate() {
            let v = match args.get(i) {
                Some(v) => v.clone(),
                None => match &param.default {
                    Some(d) => self.eval(d, &scope)?,
                    None => Value::Nil,
                },
            };
            scope.define(param.name.clone(), v);
        }
        if let Some(ret) = &def.ret {
            scope.define("result", self.zero_value(ret));
        }

        let (flow, last) = self.exec_scoped(&def.body, &scope)?;

        for (i, param) in def.params.iter().enumerate() {
            if param.is_var && i < args.len() {
                if let Some(v) = scope.get(&param.name) {
                    args[i] = v;
                }
            }
        }

        match flow {
            Flow::Return(Some(v)) => Ok(v),
            Flow::Return(None) => Ok(self.implicit_result(def, &scope, None)),
            Flow::Normal => Ok(self.implicit_result(def, &scope, last)),
            Flow::Break(_) => Err(RuntimeError::StrayControl("break".into())),
            Flow::Continue(_) => Err(RuntimeError::StrayControl("continue".into())),
        }
    }

    /// The value of a procedure that finished without `return value`.
    fn implicit_result(&self, def: &ProcDef, scope: &Env, last: Option<Value>) -> Value {
        if def.ret.is_none() {
            return Value::Nil;
        }
        last.or_else(|| scope.get("result")).unwrap_or_default()
    }

    fn make_closure(&self, def: &Rc<ProcDef>, env: &Env) -> Value {
        Value::Function(Rc::new(Function::User(UserFn {
            def: Rc::clone(def),
            closure: env.clone(),
        })))
    }

    /// The zero value for a declared type.
    pub fn zero_value(&self, ty: &TypeNode) -> Value {
        if ty.is_int() {
            return Value::Int(0);
        }
        if ty.is_float() {
            return Value::Float(0.0);
        }
        match ty {
            TypeNode::Name(n) => match n.as_str() {
                "string" | "cstring" | "char" => Value::Str(String::new()),
                "bool" => Value::Bool(false),
                other => match self.types.get(other) {
                    Some(decl @ TypeNode::Object(_)) => self.zero_value(decl),
                    _ => Value::Nil,
                },
            },
            TypeNode::Generic { name, .. } => match name.as_str() {
                "seq" | "array" | "openArray" | "tuple" => Value::Array(Vec::new()),
                "Table" | "TableRef" | "OrderedTable" => Value::Map(BTreeMap::new()),
                _ => Value::Nil,
            },
            TypeNode::Object(fields) => Value::Map(
                fields
                    .iter()
                    .map(|(name, fty)| (name.clone(), self.zero_value(fty)))
                    .collect(),
            ),
            _ => Value::Nil,
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn loop_step(flow: Flow, label: &Option<String>) -> LoopStep {
    match flow {
        Flow::Normal => LoopStep::Next,
        Flow::Continue(l) if label_matches(&l, label) => LoopStep::Next,
        Flow::Break(l) if label_matches(&l, label) => LoopStep::Exit,
        other => LoopStep::Propagate(other),
    }
}

fn bind_loop_vars(scope: &Env, vars: &[String], bindings: Vec<Value>) -> RResult<()> {
    if vars.len() == bindings.len() {
        for (name, v) in vars.iter().zip(bindings) {
            scope.define(name.clone(), v);
        }
        return Ok(());
    }
    // `for a, b, c in rows`: destructure each element.
    match bindings.into_iter().last() {
        Some(Value::Array(items)) if items.len() == vars.len() => {
            for (name, v) in vars.iter().zip(items) {
                scope.define(name.clone(), v);
            }
            Ok(())
        }
        _ => Err(RuntimeError::type_error(format!(
            "cannot bind {} loop variables",
            vars.len()
        ))),
    }
}

fn builtin(name: &str, args: &mut [Value]) -> RResult<Value> {
    call_builtin(name, args).unwrap_or_else(|| Err(RuntimeError::Undefined(name.to_string())))
}

fn is_generic_callee(callee: &Expr, env: &Env) -> bool {
    match callee {
        Expr::Index { target, .. } => match target.as_ref() {
            Expr::Ident(name) => matches!(env.get(name), Some(Value::Function(_))),
            _ => false,
        },
        _ => false,
    }
}

fn callee_name(callee: &Expr) -> String {
    match callee {
        Expr::Ident(n) => n.clone(),
        Expr::Dot { field, .. } => field.clone(),
        Expr::Index { target, .. } => callee_name(target),
        other => format!("{other:?}"),
    }
}

fn describe_len(v: &Value) -> String {
    match v {
        Value::Array(items) => format!("a {}-element array", items.len()),
        other => other.type_name().to_string(),
    }
}

fn case_matches(subject: &Value, candidate: &Value) -> bool {
    match (subject, candidate) {
        (Value::Int(n), Value::Range(r)) => r.contains(*n),
        (Value::Float(x), Value::Range(r)) => {
            x.fract() == 0.0 && r.contains(*x as i64)
        }
        _ => subject.scalar_eq(candidate),
    }
}

/// String key for a map access.
pub fn map_key(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn int_operand(v: &Value, what: &str) -> RResult<i64> {
    match v {
        Value::Int(n) => Ok(*n),
        Value::Float(x) => Ok(*x as i64),
        other => Err(RuntimeError::type_error(format!(
            "{what} must be a number, got {}",
            other.type_name()
        ))),
    }
}

fn array_index(idx: &Value, len: usize) -> RResult<usize> {
    let i = int_operand(idx, "index")?;
    if i < 0 || i as usize >= len {
        return Err(RuntimeError::IndexOutOfBounds { index: i, len });
    }
    Ok(i as usize)
}

pub fn index_value(target: &Value, idx: &Value) -> RResult<Value> {
    if let Value::Range(r) = idx {
        return slice_value(target, *r);
    }
    match target {
        Value::Array(items) => Ok(items[array_index(idx, items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = array_index(idx, chars.len())?;
            Ok(Value::Str(chars[i].to_string()))
        }
        Value::Map(m) => Ok(m.get(&map_key(idx)).cloned().unwrap_or_default()),
        Value::Range(r) => {
            let i = array_index(idx, r.len())?;
            Ok(Value::Int(r.start + i as i64))
        }
        other => Err(RuntimeError::type_error(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}

pub fn slice_value(target: &Value, range: Range) -> RResult<Value> {
    match target {
        Value::Array(items) => Ok(Value::Array(items[range.clamp_to(items.len())].to_vec())),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[range.clamp_to(chars.len())].iter().collect()))
        }
        other => Err(RuntimeError::type_error(format!(
            "cannot slice {}",
            other.type_name()
        ))),
    }
}

fn cast_value(ty: &TypeNode, v: Value) -> RResult<Value> {
    if ty.is_int() {
        let mut args = [v];
        return builtin("int", &mut args);
    }
    if ty.is_float() {
        let mut args = [v];
        return builtin("float", &mut args);
    }
    match ty.base_name() {
        Some("string" | "cstring") => Ok(Value::Str(v.to_string())),
        Some("bool") => Ok(Value::Bool(v.truthy())),
        _ => Ok(v),
    }
}

/// Apply a (non-short-circuit) binary operator.
pub fn binary_op(op: BinOp, l: Value, r: Value) -> RResult<Value> {
    use Value::{Array, Int, Str};

    let mismatch = |l: &Value, r: &Value| {
        RuntimeError::type_error(format!(
            "unsupported operands for '{op}': {} and {}",
            l.type_name(),
            r.type_name()
        ))
    };

    match op {
        BinOp::Add => match (&l, &r) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_add(*b))),
            (Str(a), Str(b)) => Ok(Str(format!("{a}{b}"))),
            _ => float_op(&l, &r, |a, b| a + b).ok_or_else(|| mismatch(&l, &r)),
        },
        BinOp::Sub => match (&l, &r) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_sub(*b))),
            _ => float_op(&l, &r, |a, b| a - b).ok_or_else(|| mismatch(&l, &r)),
        },
        BinOp::Mul => match (&l, &r) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_mul(*b))),
            _ => float_op(&l, &r, |a, b| a * b).ok_or_else(|| mismatch(&l, &r)),
        },
        BinOp::Div => match (&l, &r) {
            (Int(_), Int(0)) => Err(RuntimeError::DivisionByZero),
            (Int(a), Int(b)) => Ok(Int(a.wrapping_div(*b))),
            _ => float_op(&l, &r, |a, b| a / b).ok_or_else(|| mismatch(&l, &r)),
        },
        BinOp::IntDiv => {
            let (a, b) = int_pair(&l, &r).ok_or_else(|| mismatch(&l, &r))?;
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(Int(a.wrapping_div(b)))
        }
        BinOp::Mod => match (&l, &r) {
            (Int(_), Int(0)) => Err(RuntimeError::DivisionByZero),
            (Int(a), Int(b)) => Ok(Int(a.wrapping_rem(*b))),
            _ => float_op(&l, &r, |a, b| a % b).ok_or_else(|| mismatch(&l, &r)),
        },
        BinOp::Shl | BinOp::Shr => {
            let (a, b) = int_pair(&l, &r).ok_or_else(|| mismatch(&l, &r))?;
            let shift = (b & 63) as u32;
            Ok(Int(if op == BinOp::Shl {
                a.wrapping_shl(shift)
            } else {
                a.wrapping_shr(shift)
            }))
        }
        BinOp::Concat => match (l, r) {
            (Array(mut a), Array(b)) => {
                a.extend(b);
                Ok(Array(a))
            }
            (l, r) => Ok(Str(format!("{l}{r}"))),
        },
        BinOp::Eq => Ok(Value::Bool(l == r)),
        BinOp::Ne => Ok(Value::Bool(l != r)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = compare(&l, &r).ok_or_else(|| mismatch(&l, &r))?;
            let result = match op {
                BinOp::Lt => ord.is_lt(),
                BinOp::Le => ord.is_le(),
                BinOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::In => contains(&r, &l).map(Value::Bool),
        BinOp::NotIn => contains(&r, &l).map(|b| Value::Bool(!b)),
        BinOp::Range | BinOp::RangeExcl => {
            let lo = int_operand(&l, "range start")?;
            let hi = int_operand(&r, "range end")?;
            Ok(Value::Range(Range::new(lo, hi, op == BinOp::Range)))
        }
        BinOp::And => Ok(Value::Bool(l.truthy() && r.truthy())),
        BinOp::Or => Ok(Value::Bool(l.truthy() || r.truthy())),
    }
}

fn float_op(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
    if !(l.is_number() && r.is_number()) {
        return None;
    }
    Some(Value::Float(f(l.as_f64()?, r.as_f64()?)))
}

fn int_pair(l: &Value, r: &Value) -> Option<(i64, i64)> {
    if !(l.is_number() && r.is_number()) {
        return None;
    }
    Some((l.as_i64()?, r.as_i64()?))
}

/// Ordering for `<`-family operators: numbers through f64, strings
/// lexicographically.
pub fn compare(l: &Value, r: &Value) -> Option<std::cmp::Ordering> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (a, b) if a.is_number() && b.is_number() => a.as_f64()?.partial_cmp(&b.as_f64()?),
        _ => None,
    }
}

/// Membership for `in`: array element, map key, substring, or range member.
pub fn contains(haystack: &Value, needle: &Value) -> RResult<bool> {
    match haystack {
        Value::Array(items) => Ok(items.contains(needle)),
        Value::Map(m) => Ok(m.contains_key(&map_key(needle))),
        Value::Str(s) => match needle {
            Value::Str(n) => Ok(s.contains(n.as_str())),
            other => Err(RuntimeError::type_error(format!(
                "cannot search a string for {}",
                other.type_name()
            ))),
        },
        Value::Range(r) => match needle {
            Value::Int(n) => Ok(r.contains(*n)),
            Value::Float(x) => Ok(*x >= r.start as f64 && *x < r.end_exclusive() as f64),
            _ => Ok(false),
        },
        other => Err(RuntimeError::type_error(format!(
            "'in' is not supported on {}",
            other.type_name()
        ))),
    }
}
