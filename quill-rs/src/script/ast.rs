//! Abstract syntax tree.
//!
//! One closed node set serves every dialect and both consumers (the
//! interpreter and the code generator).  Procedure definitions are shared
//! behind `Rc` so that closures can hold onto their body without cloning it.

use std::fmt;
use std::rc::Rc;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A type annotation.  Never enforced; the interpreter only uses a declared
/// return type to seed `result` with a zero value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    /// `int`, `string`, `Point`, …
    Name(String),
    /// `ptr T` / `ref T`
    Pointer(Box<TypeNode>),
    /// `seq[int]`, `Table[string, int]`
    Generic { name: String, params: Vec<TypeNode> },
    /// `proc(int, string): bool`
    Proc {
        params: Vec<TypeNode>,
        ret: Option<Box<TypeNode>>,
    },
    /// `object` with named fields.
    Object(Vec<(String, TypeNode)>),
    /// `enum` with `name → ordinal`.
    Enum(Vec<(String, i64)>),
}

impl TypeNode {
    pub fn name(s: impl Into<String>) -> Self {
        TypeNode::Name(s.into())
    }

    /// The bare type name for `Name` and `Generic` annotations.
    pub fn base_name(&self) -> Option<&str> {
        match self {
            TypeNode::Name(n) | TypeNode::Generic { name: n, .. } => Some(n),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self.base_name(), Some("float" | "float32" | "float64"))
    }

    pub fn is_int(&self) -> bool {
        matches!(
            self.base_name(),
            Some("int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "byte")
        )
    }
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeNode::Name(n) => f.write_str(n),
            TypeNode::Pointer(inner) => write!(f, "ptr {inner}"),
            TypeNode::Generic { name, params } => {
                write!(f, "{name}[")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str("]")
            }
            TypeNode::Proc { params, ret } => {
                f.write_str("proc(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")?;
                if let Some(r) = ret {
                    write!(f, ": {r}")?;
                }
                Ok(())
            }
            TypeNode::Object(fields) => {
                f.write_str("object(")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                f.write_str(")")
            }
            TypeNode::Enum(variants) => {
                f.write_str("enum(")?;
                for (i, (name, ord)) in variants.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} = {ord}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ── Operators ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    /// `$x`: convert to string.
    Stringify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    /// `div`
    IntDiv,
    /// `mod` / `%`
    Mod,
    Shl,
    Shr,
    /// `&`
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
    NotIn,
    /// `a..b`
    Range,
    /// `a..<b`
    RangeExcl,
}

impl BinOp {
    /// Binding power used by the precedence-climbing parser.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq
            | BinOp::Ne
            | BinOp::Lt
            | BinOp::Le
            | BinOp::Gt
            | BinOp::Ge
            | BinOp::In
            | BinOp::NotIn
            | BinOp::Range
            | BinOp::RangeExcl => 3,
            BinOp::Add | BinOp::Sub | BinOp::Concat => 4,
            BinOp::Mul | BinOp::Div | BinOp::IntDiv | BinOp::Mod | BinOp::Shl | BinOp::Shr => 5,
        }
    }

    /// Canonical-dialect spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "div",
            BinOp::Mod => "mod",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Concat => "&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::In => "in",
            BinOp::NotIn => "notin",
            BinOp::Range => "..",
            BinOp::RangeExcl => "..<",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ── Procedures ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeNode>,
    /// `var` parameter: written back to an identifier argument after the call.
    pub is_var: bool,
    pub default: Option<Expr>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Param {
            name: name.into(),
            ty: None,
            is_var: false,
            default: None,
        }
    }
}

/// A named procedure or a lambda.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcDef {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub ret: Option<TypeNode>,
    pub body: Block,
}

impl ProcDef {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

// ── Expressions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int { value: i64, suffix: Option<String> },
    Float { value: f64, suffix: Option<String> },
    Str(String),
    Bool(bool),
    Nil,
    Ident(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Array(Vec<Expr>),
    /// `{key: value, …}`; a bare identifier key is a string key.
    Map(Vec<(Expr, Expr)>),
    Tuple(Vec<Expr>),
    /// `(name: value, …)`
    NamedTuple(Vec<(String, Expr)>),
    Index { target: Box<Expr>, index: Box<Expr> },
    /// `a[lo..hi]` / `a[lo..<hi]`
    Slice {
        target: Box<Expr>,
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    /// `cast[T](x)`
    Cast { ty: TypeNode, expr: Box<Expr> },
    /// `addr x`
    Addr(Box<Expr>),
    /// `p[]`
    Deref(Box<Expr>),
    /// `Point(x: 1, y: 2)`
    Object { ty: String, fields: Vec<(String, Expr)> },
    Dot { target: Box<Expr>, field: String },
    Lambda(Rc<ProcDef>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn int(value: i64) -> Self {
        Expr::Int {
            value,
            suffix: None,
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(n) => Some(n),
            _ => None,
        }
    }
}

// ── Statements ────────────────────────────────────────────────────────────────

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

impl DeclKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DeclKind::Var => "var",
            DeclKind::Let => "let",
            DeclKind::Const => "const",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfBranch {
    pub values: Vec<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub ty: TypeNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `var x = 1`, `let a, b: int`, `var (a, b) = pair`
    Decl {
        kind: DeclKind,
        names: Vec<String>,
        /// Tuple-unpacking form.
        unpack: bool,
        ty: Option<TypeNode>,
        value: Option<Expr>,
    },
    /// `target = value` or `target op= value`.
    Assign {
        target: Expr,
        op: Option<BinOp>,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Block)>,
        else_body: Option<Block>,
    },
    Case {
        subject: Expr,
        branches: Vec<OfBranch>,
        elifs: Vec<(Expr, Block)>,
        else_body: Option<Block>,
    },
    For {
        label: Option<String>,
        vars: Vec<String>,
        iter: Expr,
        body: Block,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Block,
    },
    Proc(Rc<ProcDef>),
    Return(Option<Expr>),
    Block {
        label: Option<String>,
        body: Block,
    },
    Defer(Block),
    Type(Vec<TypeDef>),
    Break(Option<String>),
    Continue(Option<String>),
    Discard(Option<Expr>),
}

/// The parse root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}
