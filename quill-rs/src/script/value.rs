//! Runtime value type.
//!
//! Quill is dynamically typed.  Int and Float are separate variants so that
//! formatting never loses the distinction, while arithmetic promotes through
//! [`Value::as_f64`] whenever either side is a float.  Arrays and maps have
//! value semantics: cloning a `Value` copies the collection.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::ast::ProcDef;
use super::env::Env;
use super::error::RuntimeError;

// ── Range ─────────────────────────────────────────────────────────────────────

/// Largest range [`Value::to_items`] will turn into an array.
pub const MAX_RANGE_ITEMS: usize = 1 << 24;

/// `start..end` or `start..<end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub end: i64,
    pub inclusive: bool,
}

impl Range {
    pub fn new(start: i64, end: i64, inclusive: bool) -> Self {
        Range {
            start,
            end,
            inclusive,
        }
    }

    /// One past the last value.
    pub fn end_exclusive(&self) -> i64 {
        if self.inclusive {
            self.end.saturating_add(1)
        } else {
            self.end
        }
    }

    pub fn contains(&self, n: i64) -> bool {
        n >= self.start && n < self.end_exclusive()
    }

    /// Number of values, saturating at `usize::MAX` for ranges wider than
    /// the address space.
    pub fn len(&self) -> usize {
        let span = (i128::from(self.end_exclusive()) - i128::from(self.start)).max(0);
        usize::try_from(span).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        self.start..self.end_exclusive()
    }

    /// Clamp to `[0, len]` for slicing a collection of length `len`.
    pub fn clamp_to(&self, len: usize) -> std::ops::Range<usize> {
        let len = len as i64;
        let lo = self.start.clamp(0, len);
        let hi = self.end_exclusive().clamp(lo, len);
        lo as usize..hi as usize
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.inclusive { ".." } else { "..<" };
        write!(f, "{}{op}{}", self.start, self.end)
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Signature of a host function.
pub type NativeImpl = dyn Fn(&Env, &mut [Value]) -> Result<Value, RuntimeError>;

/// A host callable visible to scripts.
#[derive(Clone)]
pub struct NativeFn {
    pub name: String,
    /// Argument positions written back to identifier arguments after the call.
    pub var_params: Vec<usize>,
    pub func: Rc<NativeImpl>,
}

/// A script-defined procedure together with its definition-time scope.
#[derive(Clone)]
pub struct UserFn {
    pub def: Rc<ProcDef>,
    pub closure: Env,
}

#[derive(Clone)]
pub enum Function {
    Native(NativeFn),
    User(UserFn),
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Native(n) => &n.name,
            Function::User(u) => u.def.display_name(),
        }
    }

    /// Whether argument `index` is a `var` parameter.
    pub fn is_var_param(&self, index: usize) -> bool {
        match self {
            Function::Native(n) => n.var_params.contains(&index),
            Function::User(u) => u.def.params.get(index).is_some_and(|p| p.is_var),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native(n) => write!(f, "Native({})", n.name),
            Function::User(u) => write!(f, "User({})", u.def.display_name()),
        }
    }
}

// ── Pointer ───────────────────────────────────────────────────────────────────

/// Either a mutable cell produced by `addr`, or an opaque host handle.
#[derive(Clone)]
pub enum Pointer {
    Cell(Rc<RefCell<Value>>),
    Host(Rc<dyn Any>),
}

impl Pointer {
    pub fn host<T: Any>(value: T) -> Self {
        Pointer::Host(Rc::new(value))
    }

    pub fn downcast<T: Any>(&self) -> Option<&T> {
        match self {
            Pointer::Host(h) => h.downcast_ref::<T>(),
            Pointer::Cell(_) => None,
        }
    }

    fn ptr_eq(&self, other: &Pointer) -> bool {
        match (self, other) {
            (Pointer::Cell(a), Pointer::Cell(b)) => Rc::ptr_eq(a, b),
            (Pointer::Host(a), Pointer::Host(b)) => {
                std::ptr::eq(Rc::as_ptr(a) as *const u8, Rc::as_ptr(b) as *const u8)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::Cell(c) => write!(f, "Cell({:?})", c.borrow()),
            Pointer::Host(_) => f.write_str("Host(..)"),
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Function(Rc<Function>),
    Map(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Range(Range),
    Pointer(Pointer),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&Env, &mut [Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Self {
        Value::Function(Rc::new(Function::Native(NativeFn {
            name: name.into(),
            var_params: Vec::new(),
            func: Rc::new(func),
        })))
    }

    /// Name of the value's kind, as reported by `typeof`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Function(_) => "proc",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
            Value::Range(_) => "range",
            Value::Pointer(_) => "pointer",
        }
    }

    /// Truthiness: `nil`, `false`, `0`, `0.0`, `""` and empty collections are
    /// false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::Function(_) | Value::Pointer(_) => true,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(x) => Some(*x as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Materialize a range into an array; arrays pass through.  Ranges
    /// longer than [`MAX_RANGE_ITEMS`] are not materialized.
    pub fn to_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(a) => Some(a.clone()),
            Value::Range(r) if r.len() <= MAX_RANGE_ITEMS => Some(r.iter().map(Value::Int).collect()),
            Value::Str(s) => Some(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            _ => None,
        }
    }

    /// Equality used by `case`: only scalars can match.
    pub fn scalar_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            _ => false,
        }
    }

    /// Display form used for string conversion inside collections: strings
    /// are quoted.
    fn write_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => write!(f, "{other}"),
        }
    }
}

/// Structural equality: numbers compare by value across Int/Float,
/// collections element-wise, functions and pointers by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Pointer(a), Value::Pointer(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() && x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => f.write_str(s),
            Value::Function(func) => write!(f, "<proc {}>", func.name()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    v.write_nested(f)?;
                }
                f.write_str("]")
            }
            Value::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: ")?;
                    v.write_nested(f)?;
                }
                f.write_str("}")
            }
            Value::Range(r) => write!(f, "{r}"),
            Value::Pointer(_) => f.write_str("<pointer>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Function(func) => write!(f, "{func:?}"),
            Value::Pointer(p) => write!(f, "{p:?}"),
            other => write!(f, "{other}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Range> for Value {
    fn from(r: Range) -> Self {
        Value::Range(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::str("hi").to_string(), "hi");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::str("a")]).to_string(),
            "[1, \"a\"]"
        );
        let mut m = BTreeMap::new();
        m.insert("k".to_string(), Value::Bool(true));
        assert_eq!(Value::Map(m).to_string(), "{\"k\": true}");
        assert_eq!(Value::Range(Range::new(1, 3, false)).to_string(), "1..<3");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(!Value::str("").truthy());
        assert!(!Value::Array(vec![]).truthy());
        assert!(Value::str("0").truthy());
        assert!(Value::Int(-1).truthy());
    }

    #[test]
    fn structural_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Int(2)]),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
        assert_ne!(Value::str("1"), Value::Int(1));
        let f = Value::native("f", |_, _| Ok(Value::Nil));
        assert_eq!(f, f.clone());
        assert_ne!(f, Value::native("f", |_, _| Ok(Value::Nil)));
    }

    #[test]
    fn case_equality_is_scalar_only() {
        assert!(Value::Int(1).scalar_eq(&Value::Float(1.0)));
        assert!(Value::str("a").scalar_eq(&Value::str("a")));
        let arr = Value::Array(vec![Value::Int(1)]);
        assert!(!arr.scalar_eq(&arr.clone()));
    }

    #[test]
    fn range_semantics() {
        let r = Range::new(0, 3, false);
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(r.contains(2));
        assert!(!r.contains(3));
        let r = Range::new(1, 2, true);
        assert_eq!(r.clamp_to(4), 1..3);
        assert_eq!(Range::new(-5, 100, true).clamp_to(4), 0..4);
        assert_eq!(Range::new(3, 1, true).clamp_to(4), 3..3);
    }

    #[test]
    fn full_width_ranges_do_not_overflow() {
        let r = Range::new(i64::MIN, i64::MAX - 1, true);
        assert_eq!(r.len(), usize::try_from(u64::MAX).unwrap_or(usize::MAX));
        assert!(!r.is_empty());
        assert!(Value::Range(r).truthy());
        assert_eq!(Value::Range(r).to_items(), None);
        assert!(Range::new(i64::MAX, i64::MIN, false).is_empty());
        assert_eq!(Value::Range(Range::new(0, 3, false)).to_items().map(|v| v.len()), Some(3));
    }

    #[test]
    fn host_pointer_downcast() {
        let p = Pointer::host(17u32);
        assert_eq!(p.downcast::<u32>(), Some(&17));
        assert_eq!(p.downcast::<i64>(), None);
    }
}
