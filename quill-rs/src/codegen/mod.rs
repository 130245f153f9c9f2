//! Retargetable code generation.
//!
//! [`generate_code`] walks a [`Program`] once and asks a [`Backend`] how to
//! spell each literal, expression and statement.  The walk itself, and every
//! lowering that does not depend on the target's syntax, lives here in
//! [`Generator`]:
//!
//! - `case` becomes an `if`/`elif` chain over a temp;
//! - `defer` becomes `try`/`finally` around the rest of its block, unless
//!   the backend has a native `defer`;
//! - labeled loops follow the backend's [`LabelStyle`];
//! - implicit `result` is declared and returned explicitly for backends
//!   that lack it;
//! - block-bodied lambdas are hoisted into a local named procedure.
//!
//! Backends only produce text.  Imports and helper definitions they need
//! are recorded in the [`Context`] while the body is generated and emitted
//! afterwards.

pub mod context;
mod javascript;
mod nim;
mod python;

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::methods::{self, PseudoMethod};
use crate::script::ast::{BinOp, DeclKind, Expr, Param, ProcDef, Stmt, TypeNode, UnaryOp};
use crate::script::Program;

pub use context::{Context, NumKind};

// ── BackendKind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    Nim,
    Python,
    JavaScript,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Nim, BackendKind::Python, BackendKind::JavaScript];

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Nim => "nim",
            BackendKind::Python => "python",
            BackendKind::JavaScript => "javascript",
        }
    }

    /// Conventional file extension of the generated source.
    pub fn extension(self) -> &'static str {
        match self {
            BackendKind::Nim => "nim",
            BackendKind::Python => "py",
            BackendKind::JavaScript => "js",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nim" => Ok(BackendKind::Nim),
            "python" | "py" => Ok(BackendKind::Python),
            "javascript" | "js" => Ok(BackendKind::JavaScript),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CodegenError {
    #[error("context was built for {context}, not {requested}")]
    BackendMismatch {
        context: BackendKind,
        requested: BackendKind,
    },
    #[error("{backend} backend cannot express {what}")]
    Unsupported { backend: BackendKind, what: String },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

// ── Backend contract ──────────────────────────────────────────────────────────

/// A rendered procedure parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamText {
    pub name: String,
    pub ty: Option<TypeNode>,
    pub is_var: bool,
    pub default: Option<String>,
}

/// The iterable of a `for` loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ForIter {
    Range {
        start: String,
        end: String,
        inclusive: bool,
    },
    Items(String),
}

/// How a backend expresses `break label` / `continue label`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    /// The target language has labeled loops.
    Native,
    /// `block label:` around the loop, `block label_continue:` around the
    /// body; both targets are reached with `break`.
    Blocks,
    /// One exception class per label and direction, caught around the loop
    /// and around the body.
    Exceptions,
}

/// Per-target spelling.  Statement methods return one line without
/// indentation (or several lines separated by `\n`, indented relative to
/// the first); the generator handles nesting.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    // Literals

    fn int_literal(&self, value: i64, _suffix: Option<&str>) -> String {
        value.to_string()
    }

    fn float_literal(&self, value: f64, _suffix: Option<&str>) -> String {
        float_text(value)
    }

    fn str_literal(&self, value: &str) -> String {
        quote(value)
    }

    fn bool_literal(&self, value: bool) -> String;
    fn nil_literal(&self) -> String;

    // Expressions

    fn unary(&self, op: UnaryOp, operand: &str) -> String;

    /// `kinds` are the inferred numeric kinds of the two operands.
    fn binary(&self, ctx: &mut Context, op: BinOp, lhs: &str, rhs: &str, kinds: [NumKind; 2]) -> String;

    fn call(&self, callee: &str, args: &[String]) -> String {
        format!("{callee}({})", args.join(", "))
    }

    /// `echo(args…)`: concatenate without separators.
    fn echo(&self, callee: &str, args: &[String]) -> String {
        self.call(callee, args)
    }

    /// `recv.name(args…)` for a name that is not a pseudo-method.
    fn method_call(&self, recv: &str, name: &str, args: &[String]) -> String {
        let mut all = vec![recv.to_string()];
        all.extend_from_slice(args);
        self.call(name, &all)
    }

    fn array(&self, items: &[String]) -> String {
        format!("[{}]", items.join(", "))
    }

    fn map(&self, ctx: &mut Context, entries: &[(String, String)]) -> String;
    fn tuple(&self, items: &[String]) -> String;
    fn named_tuple(&self, ctx: &mut Context, fields: &[(String, String)]) -> String;

    fn index(&self, target: &str, index: &str) -> String {
        format!("{target}[{index}]")
    }

    fn slice(&self, target: &str, start: &str, end: &str, inclusive: bool) -> String;
    fn cast(&self, ty: &TypeNode, expr: &str) -> String;
    fn addr(&self, expr: &str) -> String;
    fn deref(&self, expr: &str) -> String;
    fn object(&self, ty: &str, fields: &[(String, String)]) -> String;

    fn field(&self, target: &str, field: &str) -> String {
        format!("{target}.{field}")
    }

    /// An expression-bodied lambda.
    fn lambda(&self, params: &[ParamText], body: &str) -> String;

    // Statements

    fn expr_stmt(&self, expr: &str) -> String {
        expr.to_string()
    }

    fn decl(&self, kind: DeclKind, name: &str, ty: Option<&TypeNode>, value: Option<&str>) -> String;
    fn unpack(&self, kind: DeclKind, names: &[String], value: &str) -> String;

    /// `op` is the compound operator from [`compound_op`](Self::compound_op).
    fn assign(&self, target: &str, op: Option<&str>, value: &str) -> String;

    /// Spelling of `target op= value`, or `None` to expand it.
    fn compound_op(&self, op: BinOp) -> Option<&'static str>;

    fn if_head(&self, cond: &str) -> String;
    fn elif_head(&self, cond: &str) -> String;
    fn else_head(&self) -> String;
    fn while_head(&self, label: Option<&str>, cond: &str) -> String;
    fn for_head(&self, ctx: &mut Context, label: Option<&str>, vars: &[String], iter: ForIter) -> String;
    fn proc_head(&self, name: &str, params: &[ParamText], ret: Option<&TypeNode>, returns_value: bool) -> String;
    fn return_stmt(&self, value: Option<&str>) -> String;
    fn break_stmt(&self, label: Option<&str>) -> String;
    fn continue_stmt(&self, label: Option<&str>) -> String;
    fn discard(&self, value: Option<&str>) -> String;
    fn block_head(&self, label: Option<&str>) -> String;
    fn try_head(&self) -> String;
    fn finally_head(&self) -> String;

    fn except_head(&self, exception: &str) -> String {
        format!("except {exception}:")
    }

    fn raise_stmt(&self, exception: &str) -> String {
        format!("raise {exception}()")
    }

    fn exception_class(&self, name: &str) -> String {
        format!("class {name}(Exception):\n    pass")
    }

    /// Line required in an otherwise empty body.
    fn empty_body(&self) -> Option<String>;

    /// Line closing a block, for brace backends.
    fn block_end(&self) -> Option<String> {
        None
    }

    fn comment(&self, text: &str) -> String;
    fn import(&self, module: &str) -> String;
    fn enum_type(&self, ctx: &mut Context, name: &str, variants: &[(String, i64)]) -> String;

    /// `fields` carry `(name, type, zero literal)`.
    fn object_type(&self, ctx: &mut Context, name: &str, fields: &[(String, TypeNode, String)]) -> String;
    fn alias_type(&self, name: &str, ty: &TypeNode) -> String;

    fn header(&self, ctx: &Context) -> Vec<String> {
        let mut lines: Vec<String> = ctx
            .header()
            .map(|h| h.lines().map(|l| self.comment(l)).collect())
            .unwrap_or_default();
        lines.push(self.comment(&format!("Generated by quill ({} backend)", self.kind())));
        lines
    }

    fn footer(&self, _ctx: &Context) -> Vec<String> {
        Vec::new()
    }

    // Lowering switches

    fn label_style(&self) -> LabelStyle;

    /// `Some("defer:")` when the target has a native `defer`.
    fn defer_head(&self) -> Option<String> {
        None
    }

    /// Whether procedures have an implicit `result` variable.
    fn implicit_result(&self) -> bool {
        false
    }

    /// Whether a typed declaration without a value is zero-initialised.
    fn zero_initializes(&self) -> bool {
        false
    }
}

fn backend_for(kind: BackendKind) -> &'static dyn Backend {
    match kind {
        BackendKind::Nim => &nim::Nim,
        BackendKind::Python => &python::Python,
        BackendKind::JavaScript => &javascript::JavaScript,
    }
}

/// Double-quoted string literal understood by all three targets.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A float literal that always reads back as a float.
pub fn float_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Half-open bounds for a zero-based slice.  Literal bounds are folded and
/// negative literals clamped to 0, as slicing does at run time.
fn slice_bounds(start: &str, end: &str, inclusive: bool) -> (String, String) {
    let start = match start.parse::<i64>() {
        Ok(n) => n.max(0).to_string(),
        Err(_) => start.to_string(),
    };
    let end = match (end.parse::<i64>(), inclusive) {
        (Ok(n), true) => n.saturating_add(1).max(0).to_string(),
        (Ok(n), false) => n.max(0).to_string(),
        (Err(_), true) => format!("{end} + 1"),
        (Err(_), false) => end.to_string(),
    };
    (start, end)
}

/// Whether `text` is a non-negative integer literal.
fn is_natural_literal(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// `{label}_continue`: the inner block of a [`LabelStyle::Blocks`] loop.
fn continue_label(label: &str) -> String {
    format!("{label}_continue")
}

fn exception_name(label: &str, direction: &str) -> String {
    format!("Quill{direction}_{label}")
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Generate source text for `program`.  Pass a [`Context`] to pre-load
/// extension mappings or to change indentation; it must have been built
/// for `backend`.
pub fn generate_code(program: &Program, backend: BackendKind, ctx: Option<&mut Context>) -> CodegenResult<String> {
    let mut fresh;
    let ctx = match ctx {
        Some(ctx) if ctx.backend() != backend => {
            return Err(CodegenError::BackendMismatch {
                context: ctx.backend(),
                requested: backend,
            })
        }
        Some(ctx) => ctx,
        None => {
            fresh = Context::new(backend);
            &mut fresh
        }
    };
    let emitter = backend_for(backend);

    let mut gen = Generator::new(emitter, ctx);
    gen.block(&program.stmts)?;
    let body = gen.finish();

    let mut out = String::new();
    let mut section = |lines: Vec<String>| {
        if lines.is_empty() {
            return;
        }
        for l in lines {
            out.push_str(&l);
            out.push('\n');
        }
        out.push('\n');
    };
    section(emitter.header(ctx));
    section(ctx.imports().map(|m| emitter.import(m)).collect());
    section(ctx.helpers().map(str::to_string).collect());
    out.push_str(&body);
    for l in emitter.footer(ctx) {
        out.push_str(&l);
        out.push('\n');
    }
    debug!(%backend, bytes = out.len(), statements = program.stmts.len(), "generated code");
    Ok(out)
}

// ── Generator ─────────────────────────────────────────────────────────────────

/// Binding power of a unary operator, above every binary level.
const UNARY_PREC: u8 = 6;

/// Remaining stack below which the walk moves onto a fresh heap segment.
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

pub(crate) struct Generator<'a> {
    backend: &'a dyn Backend,
    ctx: &'a mut Context,
    out: String,
    /// Labels of the enclosing loops, innermost last.
    loops: Vec<Option<String>>,
    /// User-defined procedure names; these never resolve to pseudo-methods.
    procs: HashSet<String>,
    /// Declared object types, for zero values.
    objects: HashSet<String>,
    /// Inside a procedure whose `result` is an ordinary local.
    explicit_result: bool,
}

impl<'a> Generator<'a> {
    fn new(backend: &'a dyn Backend, ctx: &'a mut Context) -> Self {
        Generator {
            backend,
            ctx,
            out: String::new(),
            loops: Vec::new(),
            procs: HashSet::new(),
            objects: HashSet::new(),
            explicit_result: false,
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        let pad = self.ctx.indentation();
        for l in text.lines() {
            if !l.is_empty() {
                self.out.push_str(&pad);
                self.out.push_str(l);
            }
            self.out.push('\n');
        }
    }

    fn close_block(&mut self) {
        if let Some(end) = self.backend.block_end() {
            self.line(&end);
        }
    }

    /// An indented body.
    fn body(&mut self, stmts: &[Stmt]) -> CodegenResult<()> {
        self.ctx.indent();
        if stmts.is_empty() {
            if let Some(filler) = self.backend.empty_body() {
                self.line(&filler);
            }
        }
        let r = self.block(stmts);
        self.ctx.dedent();
        r
    }

    /// A statement sequence at the current indentation.
    fn block(&mut self, stmts: &[Stmt]) -> CodegenResult<()> {
        let b = self.backend;
        for (i, stmt) in stmts.iter().enumerate() {
            if let Stmt::Defer(deferred) = stmt {
                if let Some(head) = b.defer_head() {
                    self.line(&head);
                    self.body(deferred)?;
                    self.close_block();
                    continue;
                }
                self.line(&b.try_head());
                self.body(&stmts[i + 1..])?;
                self.line(&b.finally_head());
                self.body(deferred)?;
                self.close_block();
                return Ok(());
            }
            self.stmt(stmt)?;
        }
        Ok(())
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.stmt_inner(stmt))
    }

    fn stmt_inner(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        let b = self.backend;
        match stmt {
            Stmt::Expr(e) => {
                let text = self.expr(e)?;
                self.line(&b.expr_stmt(&text));
            }
            Stmt::Decl {
                kind,
                names,
                unpack,
                ty,
                value,
            } => self.decl(*kind, names, *unpack, ty.as_ref(), value.as_ref())?,
            Stmt::Assign { target, op, value } => self.assign(target, *op, value)?,
            Stmt::If { branches, else_body } => self.if_chain(branches, else_body.as_deref())?,
            Stmt::Case {
                subject,
                branches,
                elifs,
                else_body,
            } => {
                let tmp = self.ctx.fresh_temp("case");
                self.decl(DeclKind::Let, std::slice::from_ref(&tmp), false, None, Some(subject))?;
                let mut chain: Vec<(Expr, Vec<Stmt>)> = branches
                    .iter()
                    .map(|br| (of_condition(&tmp, &br.values), br.body.clone()))
                    .collect();
                chain.extend(elifs.iter().cloned());
                if chain.is_empty() {
                    if let Some(body) = else_body {
                        self.block(body)?;
                    }
                } else {
                    self.if_chain(&chain, else_body.as_deref())?;
                }
            }
            Stmt::For {
                label,
                vars,
                iter,
                body,
            } => {
                let iter = match iter {
                    Expr::Binary(op @ (BinOp::Range | BinOp::RangeExcl), start, end) => {
                        for v in vars {
                            self.ctx.note_numeric(v, NumKind::Int);
                        }
                        ForIter::Range {
                            start: self.expr(start)?,
                            end: self.expr(end)?,
                            inclusive: *op == BinOp::Range,
                        }
                    }
                    other => ForIter::Items(self.expr(other)?),
                };
                for v in vars {
                    self.ctx.shadow(v);
                }
                let native = self.native_label(label.as_deref());
                let head = b.for_head(self.ctx, native, vars, iter);
                self.labeled_loop(label.as_deref(), head, body)?;
            }
            Stmt::While { label, cond, body } => {
                let cond = self.expr(cond)?;
                let head = b.while_head(self.native_label(label.as_deref()), &cond);
                self.labeled_loop(label.as_deref(), head, body)?;
            }
            Stmt::Proc(def) => self.proc_def(def)?,
            Stmt::Return(value) => {
                let value = match value {
                    Some(v) => Some(self.expr(v)?),
                    None if self.explicit_result => Some("result".to_string()),
                    None => None,
                };
                self.line(&b.return_stmt(value.as_deref()));
            }
            Stmt::Block { label, body } => match (b.label_style(), label) {
                (LabelStyle::Exceptions, Some(label)) => {
                    let brk = self.exception(label, "Break");
                    self.line(&b.try_head());
                    self.body(body)?;
                    self.line(&b.except_head(&brk));
                    self.body(&[])?;
                }
                _ => {
                    self.line(&b.block_head(label.as_deref()));
                    self.body(body)?;
                    self.close_block();
                }
            },
            Stmt::Defer(body) => {
                // Only reached for a defer outside `block`, e.g. a lone
                // statement body; it runs at the end of that body.
                self.block(body)?;
            }
            Stmt::Type(defs) => {
                for def in defs {
                    self.ctx.shadow(&def.name);
                    let text = match &def.ty {
                        TypeNode::Object(fields) => {
                            self.objects.insert(def.name.clone());
                            let fields: Vec<(String, TypeNode, String)> = fields
                                .iter()
                                .map(|(n, t)| (n.clone(), t.clone(), self.zero(Some(t))))
                                .collect();
                            b.object_type(self.ctx, &def.name, &fields)
                        }
                        TypeNode::Enum(variants) => b.enum_type(self.ctx, &def.name, variants),
                        other => b.alias_type(&def.name, other),
                    };
                    self.line(&text);
                }
            }
            Stmt::Break(label) => {
                let text = match (b.label_style(), label) {
                    (LabelStyle::Exceptions, Some(l)) => b.raise_stmt(&self.exception(l, "Break")),
                    (LabelStyle::Blocks, None) => match self.loops.last() {
                        Some(Some(l)) => b.break_stmt(Some(l)),
                        _ => b.break_stmt(None),
                    },
                    (_, label) => b.break_stmt(label.as_deref()),
                };
                self.line(&text);
            }
            Stmt::Continue(label) => {
                let text = match (b.label_style(), label) {
                    (LabelStyle::Exceptions, Some(l)) => b.raise_stmt(&self.exception(l, "Continue")),
                    (LabelStyle::Blocks, Some(l)) => b.break_stmt(Some(&continue_label(l))),
                    (_, label) => b.continue_stmt(label.as_deref()),
                };
                self.line(&text);
            }
            Stmt::Discard(value) => {
                let value = value.as_ref().map(|v| self.expr(v)).transpose()?;
                self.line(&b.discard(value.as_deref()));
            }
        }
        Ok(())
    }

    fn decl(
        &mut self,
        kind: DeclKind,
        names: &[String],
        unpack: bool,
        ty: Option<&TypeNode>,
        value: Option<&Expr>,
    ) -> CodegenResult<()> {
        let b = self.backend;
        if unpack {
            let value = match value {
                Some(v) => self.expr(v)?,
                None => b.nil_literal(),
            };
            for n in names {
                self.ctx.shadow(n);
            }
            self.line(&b.unpack(kind, names, &value));
            return Ok(());
        }
        let num = match ty {
            Some(t) if t.is_int() => NumKind::Int,
            Some(t) if t.is_float() => NumKind::Float,
            _ => value.map_or(NumKind::Unknown, |v| self.num_kind(v)),
        };
        for name in names {
            let text = match value {
                Some(v) => Some(self.expr(v)?),
                None if ty.is_some() && b.zero_initializes() => None,
                None => Some(self.zero(ty)),
            };
            self.ctx.shadow(name);
            self.ctx.note_numeric(name, num);
            self.line(&b.decl(kind, name, ty, text.as_deref()));
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, op: Option<BinOp>, value: &Expr) -> CodegenResult<()> {
        let b = self.backend;
        let t = self.expr(target)?;
        let text = match op {
            None => b.assign(&t, None, &self.expr(value)?),
            Some(op) => match b.compound_op(op) {
                Some(sym) => b.assign(&t, Some(sym), &self.expr(value)?),
                None => {
                    let combined = self.binary(op, target, value)?;
                    b.assign(&t, None, &combined)
                }
            },
        };
        self.line(&text);
        Ok(())
    }

    fn if_chain(&mut self, branches: &[(Expr, Vec<Stmt>)], else_body: Option<&[Stmt]>) -> CodegenResult<()> {
        let b = self.backend;
        let Some(((cond, body), rest)) = branches.split_first() else {
            return Ok(());
        };
        let cond = self.expr(cond)?;
        self.line(&b.if_head(&cond));
        self.body(body)?;
        for (cond, body) in rest {
            let cond = self.expr(cond)?;
            self.line(&b.elif_head(&cond));
            self.body(body)?;
        }
        if let Some(body) = else_body {
            self.line(&b.else_head());
            self.body(body)?;
        }
        self.close_block();
        Ok(())
    }

    /// The label to hand to a loop head: only native-label backends see it.
    fn native_label<'l>(&self, label: Option<&'l str>) -> Option<&'l str> {
        label.filter(|_| self.backend.label_style() == LabelStyle::Native)
    }

    fn labeled_loop(&mut self, label: Option<&str>, head: String, body: &[Stmt]) -> CodegenResult<()> {
        let b = self.backend;
        let style = b.label_style();
        let lowered = label.filter(|_| style != LabelStyle::Native);
        let Some(label) = lowered else {
            self.line(&head);
            self.loops.push(label.map(str::to_string));
            let r = self.body(body);
            self.loops.pop();
            r?;
            self.close_block();
            return Ok(());
        };

        let needs_continue = continues_to(body, label);
        match style {
            LabelStyle::Blocks => {
                self.line(&b.block_head(Some(label)));
                self.ctx.indent();
                self.line(&head);
                self.loops.push(Some(label.to_string()));
                let r = if needs_continue {
                    self.ctx.indent();
                    self.line(&b.block_head(Some(&continue_label(label))));
                    let r = self.body(body);
                    self.ctx.dedent();
                    r
                } else {
                    self.body(body)
                };
                self.loops.pop();
                self.ctx.dedent();
                r
            }
            _ => {
                let brk = self.exception(label, "Break");
                self.line(&b.try_head());
                self.ctx.indent();
                self.line(&head);
                self.loops.push(Some(label.to_string()));
                let r = if needs_continue {
                    let cont = self.exception(label, "Continue");
                    self.ctx.indent();
                    self.line(&b.try_head());
                    let r = self.body(body);
                    self.line(&b.except_head(&cont));
                    let filler = self.body(&[]);
                    self.ctx.dedent();
                    r.and(filler)
                } else {
                    self.body(body)
                };
                self.loops.pop();
                self.ctx.dedent();
                self.line(&b.except_head(&brk));
                self.body(&[])?;
                r
            }
        }
    }

    /// Name of the exception class for `label`, hoisted on first use.
    fn exception(&mut self, label: &str, direction: &str) -> String {
        let name = exception_name(label, direction);
        let class = self.backend.exception_class(&name);
        self.ctx.add_helper(&name, &class);
        name
    }

    fn params(&mut self, params: &[Param]) -> CodegenResult<Vec<ParamText>> {
        params
            .iter()
            .map(|p| {
                if let Some(t) = &p.ty {
                    if t.is_int() {
                        self.ctx.note_numeric(&p.name, NumKind::Int);
                    } else if t.is_float() {
                        self.ctx.note_numeric(&p.name, NumKind::Float);
                    }
                }
                self.ctx.shadow(&p.name);
                Ok(ParamText {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    is_var: p.is_var,
                    default: p.default.as_ref().map(|d| self.expr(d)).transpose()?,
                })
            })
            .collect()
    }

    fn proc_def(&mut self, def: &ProcDef) -> CodegenResult<()> {
        let b = self.backend;
        let name = match &def.name {
            Some(n) => n.clone(),
            None => self.ctx.fresh_temp("lambda"),
        };
        self.ctx.shadow(&name);
        self.procs.insert(name.clone());

        let params = self.params(&def.params)?;
        let uses_result = mentions_result(&def.body);
        let returns_value = def.ret.is_some() || uses_result || returns_something(&def.body);
        self.line(&b.proc_head(&name, &params, def.ret.as_ref(), returns_value));

        let mut body = def.body.clone();
        if !b.implicit_result() && !uses_result && def.ret.is_some() {
            if let Some(Stmt::Expr(last)) = body.last().cloned() {
                body.pop();
                body.push(Stmt::Return(Some(last)));
            }
        }

        let saved_loops = std::mem::take(&mut self.loops);
        let explicit_result = uses_result && !b.implicit_result();
        let saved_result = std::mem::replace(&mut self.explicit_result, explicit_result);
        self.ctx.indent();
        let r = self.proc_body(&body, def.ret.as_ref(), explicit_result);
        self.ctx.dedent();
        self.loops = saved_loops;
        self.explicit_result = saved_result;
        r?;
        self.close_block();
        Ok(())
    }

    fn proc_body(&mut self, body: &[Stmt], ret: Option<&TypeNode>, explicit_result: bool) -> CodegenResult<()> {
        let b = self.backend;
        if explicit_result {
            let zero = self.zero(ret);
            self.line(&b.decl(DeclKind::Var, "result", ret, Some(&zero)));
        } else if body.is_empty() {
            if let Some(filler) = b.empty_body() {
                self.line(&filler);
            }
        }
        self.block(body)?;
        if explicit_result {
            self.line(&b.return_stmt(Some("result")));
        }
        Ok(())
    }

    /// Zero value for a declared type.
    fn zero(&mut self, ty: Option<&TypeNode>) -> String {
        let b = self.backend;
        let Some(ty) = ty else {
            return b.nil_literal();
        };
        if ty.is_int() {
            return b.int_literal(0, None);
        }
        if ty.is_float() {
            return b.float_literal(0.0, None);
        }
        match ty.base_name() {
            Some("string") => b.str_literal(""),
            Some("bool") => b.bool_literal(false),
            Some("seq" | "array") => b.array(&[]),
            Some("Table" | "TableRef") => b.map(self.ctx, &[]),
            Some(name) if self.objects.contains(name) => b.object(name, &[]),
            _ => b.nil_literal(),
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    fn expr(&mut self, e: &Expr) -> CodegenResult<String> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.expr_inner(e))
    }

    fn expr_inner(&mut self, e: &Expr) -> CodegenResult<String> {
        let b = self.backend;
        Ok(match e {
            Expr::Int { value, suffix } => b.int_literal(*value, suffix.as_deref()),
            Expr::Float { value, suffix } => b.float_literal(*value, suffix.as_deref()),
            Expr::Str(s) => b.str_literal(s),
            Expr::Bool(v) => b.bool_literal(*v),
            Expr::Nil => b.nil_literal(),
            Expr::Ident(name) => self.ctx.remap_constant(name).unwrap_or_else(|| name.clone()),
            Expr::Unary(op, operand) => {
                let inner = self.operand(operand, UNARY_PREC, false)?;
                b.unary(*op, &inner)
            }
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs)?,
            Expr::Call { callee, args } => self.call(callee, args)?,
            Expr::Array(items) => {
                let items = self.exprs(items)?;
                b.array(&items)
            }
            Expr::Map(entries) => {
                let entries = entries
                    .iter()
                    .map(|(k, v)| Ok((self.expr(k)?, self.expr(v)?)))
                    .collect::<CodegenResult<Vec<_>>>()?;
                b.map(self.ctx, &entries)
            }
            Expr::Tuple(items) => {
                let items = self.exprs(items)?;
                b.tuple(&items)
            }
            Expr::NamedTuple(fields) => {
                let fields = self.fields(fields)?;
                b.named_tuple(self.ctx, &fields)
            }
            Expr::Index { target, index } => {
                let t = self.postfix_operand(target)?;
                b.index(&t, &self.expr(index)?)
            }
            Expr::Slice {
                target,
                start,
                end,
                inclusive,
            } => {
                let t = self.postfix_operand(target)?;
                let s = self.expr(start)?;
                let e = self.expr(end)?;
                b.slice(&t, &s, &e, *inclusive)
            }
            Expr::Cast { ty, expr } => {
                let inner = self.expr(expr)?;
                b.cast(ty, &inner)
            }
            Expr::Addr(inner) => {
                let inner = self.postfix_operand(inner)?;
                b.addr(&inner)
            }
            Expr::Deref(inner) => {
                let inner = self.postfix_operand(inner)?;
                b.deref(&inner)
            }
            Expr::Object { ty, fields } => {
                let fields = self.fields(fields)?;
                b.object(ty, &fields)
            }
            Expr::Dot { target, field } => {
                let t = self.postfix_operand(target)?;
                match methods::lookup(field) {
                    Some(m) => match self.pseudo(m, &t, &[])? {
                        Some(text) => text,
                        None => b.field(&t, field),
                    },
                    None => b.field(&t, field),
                }
            }
            Expr::Lambda(def) => self.lambda(def)?,
        })
    }

    fn exprs(&mut self, items: &[Expr]) -> CodegenResult<Vec<String>> {
        items.iter().map(|e| self.expr(e)).collect()
    }

    fn fields(&mut self, fields: &[(String, Expr)]) -> CodegenResult<Vec<(String, String)>> {
        fields
            .iter()
            .map(|(n, e)| Ok((n.clone(), self.expr(e)?)))
            .collect()
    }

    /// Render an operand of a binary or unary operator, parenthesized when
    /// it binds looser than its parent.
    fn operand(&mut self, e: &Expr, parent_prec: u8, right: bool) -> CodegenResult<String> {
        let text = self.expr(e)?;
        let wrap = match e {
            Expr::Binary(op, ..) => {
                let p = op.precedence();
                p < parent_prec || (right && p == parent_prec)
            }
            Expr::Unary(UnaryOp::Not, _) => parent_prec < UNARY_PREC,
            _ => false,
        };
        Ok(if wrap { format!("({text})") } else { text })
    }

    /// Receiver of an index, slice, call or field access.
    fn postfix_operand(&mut self, e: &Expr) -> CodegenResult<String> {
        let text = self.expr(e)?;
        Ok(match e {
            Expr::Binary(..) | Expr::Unary(..) | Expr::Lambda(_) | Expr::Cast { .. } => format!("({text})"),
            _ => text,
        })
    }

    fn binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> CodegenResult<String> {
        let prec = op.precedence();
        let l = self.operand(lhs, prec, false)?;
        let r = self.operand(rhs, prec, true)?;
        let kinds = [self.num_kind(lhs), self.num_kind(rhs)];
        Ok(self.backend.binary(self.ctx, op, &l, &r, kinds))
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> CodegenResult<String> {
        let b = self.backend;
        match callee {
            Expr::Ident(name) => {
                let rendered = self.exprs(args)?;
                if !self.procs.contains(name) {
                    if let Some(target) = self.ctx.remap_function(name) {
                        return Ok(if name == "echo" {
                            b.echo(&target, &rendered)
                        } else {
                            b.call(&target, &rendered)
                        });
                    }
                    if let (Some(m), Some((recv, rest))) = (methods::lookup(name), rendered.split_first()) {
                        if let Some(text) = self.pseudo(m, recv, rest)? {
                            return Ok(text);
                        }
                    }
                }
                Ok(b.call(name, &rendered))
            }
            Expr::Dot { target, field } => {
                let recv = self.postfix_operand(target)?;
                let rendered = self.exprs(args)?;
                if let Some(m) = methods::lookup(field) {
                    return self.pseudo(m, &recv, &rendered)?.ok_or_else(|| CodegenError::Unsupported {
                        backend: b.kind(),
                        what: format!("'{field}' with {} argument(s)", rendered.len()),
                    });
                }
                Ok(b.method_call(&recv, field, &rendered))
            }
            other => {
                let c = self.postfix_operand(other)?;
                let rendered = self.exprs(args)?;
                Ok(b.call(&c, &rendered))
            }
        }
    }

    fn pseudo(&mut self, m: &PseudoMethod, recv: &str, args: &[String]) -> CodegenResult<Option<String>> {
        let kind = self.backend.kind();
        let text = m.render(kind, recv, args);
        if text.is_some() && kind == BackendKind::Nim {
            if let Some(module) = m.nim_import {
                self.ctx.add_import(module);
            }
        }
        Ok(text)
    }

    fn lambda(&mut self, def: &Rc<ProcDef>) -> CodegenResult<String> {
        if let [Stmt::Return(Some(body))] = def.body.as_slice() {
            let params = self.params(&def.params)?;
            let body = self.expr(body)?;
            return Ok(self.backend.lambda(&params, &body));
        }
        // A block body becomes a local procedure defined just before the
        // statement that uses it.
        let name = self.ctx.fresh_temp("lambda");
        let named = ProcDef {
            name: Some(name.clone()),
            ..ProcDef::clone(def)
        };
        self.proc_def(&named)?;
        Ok(name)
    }

    fn num_kind(&self, e: &Expr) -> NumKind {
        match e {
            Expr::Int { .. } => NumKind::Int,
            Expr::Float { .. } => NumKind::Float,
            Expr::Ident(n) => self.ctx.numeric_kind(n),
            Expr::Unary(UnaryOp::Neg, inner) => self.num_kind(inner),
            Expr::Binary(BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Mod | BinOp::Div, l, r) => {
                self.num_kind(l).join(self.num_kind(r))
            }
            Expr::Binary(BinOp::IntDiv | BinOp::Shl | BinOp::Shr, ..) => NumKind::Int,
            Expr::Call { callee, .. } => match callee.as_ident() {
                Some("int" | "parseInt" | "len" | "ord" | "high" | "low") => NumKind::Int,
                Some(
                    "float" | "parseFloat" | "sqrt" | "sin" | "cos" | "tan" | "pow" | "exp" | "ln" | "log10"
                    | "log2" | "degToRad" | "radToDeg",
                ) => NumKind::Float,
                _ => NumKind::Unknown,
            },
            Expr::Dot { field, .. } if field == "len" => NumKind::Int,
            Expr::Cast { ty, .. } if ty.is_int() => NumKind::Int,
            Expr::Cast { ty, .. } if ty.is_float() => NumKind::Float,
            _ => NumKind::Unknown,
        }
    }
}

// ── AST queries ───────────────────────────────────────────────────────────────

/// `tmp == v` for each `of` value (`lo <= tmp <= hi` for a range), or'ed.
fn of_condition(tmp: &str, values: &[Expr]) -> Expr {
    let subject = || Expr::ident(tmp);
    values
        .iter()
        .map(|v| match v {
            Expr::Binary(op @ (BinOp::Range | BinOp::RangeExcl), lo, hi) => {
                let upper = if *op == BinOp::Range { BinOp::Le } else { BinOp::Lt };
                Expr::binary(
                    BinOp::And,
                    Expr::binary(BinOp::Ge, subject(), (**lo).clone()),
                    Expr::binary(upper, subject(), (**hi).clone()),
                )
            }
            other => Expr::binary(BinOp::Eq, subject(), other.clone()),
        })
        .reduce(|acc, c| Expr::binary(BinOp::Or, acc, c))
        .unwrap_or(Expr::Bool(false))
}

/// Visit every statement, not descending into nested procedures.
fn any_stmt(stmts: &[Stmt], f: &mut dyn FnMut(&Stmt) -> bool) -> bool {
    stmts.iter().any(|s| {
        if f(s) {
            return true;
        }
        match s {
            Stmt::If { branches, else_body } => {
                branches.iter().any(|(_, b)| any_stmt(b, f)) || else_body.as_deref().is_some_and(|b| any_stmt(b, f))
            }
            Stmt::Case {
                branches,
                elifs,
                else_body,
                ..
            } => {
                branches.iter().any(|br| any_stmt(&br.body, f))
                    || elifs.iter().any(|(_, b)| any_stmt(b, f))
                    || else_body.as_deref().is_some_and(|b| any_stmt(b, f))
            }
            Stmt::For { body, .. } | Stmt::While { body, .. } | Stmt::Block { body, .. } | Stmt::Defer(body) => {
                any_stmt(body, f)
            }
            _ => false,
        }
    })
}

fn continues_to(body: &[Stmt], label: &str) -> bool {
    any_stmt(body, &mut |s| matches!(s, Stmt::Continue(Some(l)) if l == label))
}

fn returns_something(body: &[Stmt]) -> bool {
    any_stmt(body, &mut |s| matches!(s, Stmt::Return(Some(_))))
}

fn expr_mentions(e: &Expr, name: &str) -> bool {
    let m = |e: &Expr| expr_mentions(e, name);
    match e {
        Expr::Ident(n) => n == name,
        Expr::Unary(_, x) | Expr::Addr(x) | Expr::Deref(x) | Expr::Cast { expr: x, .. } => m(x),
        Expr::Binary(_, l, r) => m(l) || m(r),
        Expr::Call { callee, args } => m(callee) || args.iter().any(m),
        Expr::Array(items) | Expr::Tuple(items) => items.iter().any(m),
        Expr::Map(entries) => entries.iter().any(|(k, v)| m(k) || m(v)),
        Expr::NamedTuple(fields) | Expr::Object { fields, .. } => fields.iter().any(|(_, v)| m(v)),
        Expr::Index { target, index } => m(target) || m(index),
        Expr::Slice { target, start, end, .. } => m(target) || m(start) || m(end),
        Expr::Dot { target, .. } => m(target),
        _ => false,
    }
}

/// Whether a procedure body reads or writes `result`.
fn mentions_result(body: &[Stmt]) -> bool {
    let m = |e: &Expr| expr_mentions(e, "result");
    any_stmt(body, &mut |s| match s {
        Stmt::Expr(e) | Stmt::Return(Some(e)) | Stmt::Discard(Some(e)) => m(e),
        Stmt::Assign { target, value, .. } => m(target) || m(value),
        Stmt::Decl { value, .. } => value.as_ref().is_some_and(m),
        Stmt::If { branches, .. } => branches.iter().any(|(c, _)| m(c)),
        Stmt::Case { subject, elifs, .. } => m(subject) || elifs.iter().any(|(c, _)| m(c)),
        Stmt::For { iter, .. } => m(iter),
        Stmt::While { cond, .. } => m(cond),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::compile;
    use crate::frontend::Dialect;

    fn gen(src: &str, backend: BackendKind) -> String {
        let program = compile(src, Some(Dialect::Canonical)).expect("compile failed");
        generate_code(&program, backend, None).expect("codegen failed")
    }

    #[test]
    fn backend_names_parse() {
        for b in BackendKind::ALL {
            assert_eq!(b.name().parse::<BackendKind>(), Ok(b));
        }
        assert_eq!("js".parse::<BackendKind>(), Ok(BackendKind::JavaScript));
        assert!("cobol".parse::<BackendKind>().is_err());
    }

    #[test]
    fn quoting_and_floats() {
        assert_eq!(quote("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
        assert_eq!(float_text(2.0), "2.0");
        assert_eq!(float_text(0.25), "0.25");
    }

    #[test]
    fn mismatched_context_is_rejected() {
        let program = compile("echo(1)", None).unwrap();
        let mut ctx = Context::new(BackendKind::Nim);
        let err = generate_code(&program, BackendKind::Python, Some(&mut ctx)).unwrap_err();
        assert_eq!(
            err,
            CodegenError::BackendMismatch {
                context: BackendKind::Nim,
                requested: BackendKind::Python
            }
        );
    }

    #[test]
    fn case_lowers_to_if_chain() {
        let src = "case n\nof 1, 2: echo(\"low\")\nof 3..5: echo(\"mid\")\nelse: echo(\"high\")\n";
        let py = gen(src, BackendKind::Python);
        assert!(py.contains("caseTmp1 = n"), "{py}");
        assert!(py.contains("if caseTmp1 == 1 or caseTmp1 == 2:"), "{py}");
        assert!(py.contains("elif caseTmp1 >= 3 and caseTmp1 <= 5:"), "{py}");
        assert!(py.contains("else:"), "{py}");
    }

    #[test]
    fn parenthesizes_by_precedence() {
        let py = gen("echo((1 + 2) * 3)\necho(1 - (2 - 3))\necho(1 + 2 * 3)", BackendKind::Python);
        assert!(py.contains("print((1 + 2) * 3)"), "{py}");
        assert!(py.contains("print(1 - (2 - 3))"), "{py}");
        assert!(py.contains("print(1 + 2 * 3)"), "{py}");
    }

    #[test]
    fn unused_imports_are_not_emitted() {
        let py = gen("echo(1)", BackendKind::Python);
        assert!(!py.contains("import"), "{py}");
        let py = gen("echo(sqrt(2.0))", BackendKind::Python);
        assert!(py.contains("import math\n"), "{py}");
        assert!(py.contains("print(math.sqrt(2.0))"), "{py}");
    }

    #[test]
    fn user_procs_shadow_stdlib_names() {
        let js = gen("proc sqrt(x: int): int = x\necho(sqrt(4))", BackendKind::JavaScript);
        assert!(js.contains("console.log(sqrt(4));"), "{js}");
        assert!(!js.contains("Math.sqrt"), "{js}");
    }

    #[test]
    fn ast_queries() {
        let program = compile("proc f(): int =\n  result = 1\n  while true:\n    continue outer\n", None).unwrap();
        let Stmt::Proc(def) = &program.stmts[0] else {
            panic!("expected a proc");
        };
        assert!(mentions_result(&def.body));
        assert!(continues_to(&def.body, "outer"));
        assert!(!continues_to(&def.body, "inner"));
        assert!(!returns_something(&def.body));
    }
}
