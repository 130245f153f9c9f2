//! Error types for the lexer, parser and interpreter.
//!
//! Lexical and parse errors carry the 1-based line/column where they were
//! detected.  Runtime errors describe what went wrong; the host decides
//! whether a failed fragment aborts anything beyond itself.

use thiserror::Error;

/// A lexical error: the source could not be split into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{col}: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: usize,
    pub col: usize,
}

impl LexError {
    pub fn new(kind: LexErrorKind, line: usize, col: usize) -> Self {
        Self { kind, line, col }
    }
}

/// The kind of lexical error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unterminated block comment")]
    UnterminatedComment,

    #[error("illegal character '{0}'")]
    IllegalChar(char),

    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),

    #[error("dedent to width {0} matches no enclosing indentation level")]
    InconsistentDedent(usize),

    #[error("unbalanced '{0}'")]
    Unbalanced(char),
}

/// A parse error: the token stream does not form a valid program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{col}: {message} (found {found})")]
pub struct ParseError {
    pub message: String,
    /// Printable form of the offending token.
    pub found: String,
    pub line: usize,
    pub col: usize,
}

/// An error raised while executing a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("undefined variable '{0}'")]
    Undefined(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("'{0}' is not callable")]
    NotCallable(String),

    #[error("{name}: expected {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("no case branch matches {0}")]
    NonExhaustiveCase(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("call depth limit of {0} exceeded")]
    CallDepth(usize),

    #[error("`{0}` outside of a loop or block")]
    StrayControl(String),

    #[error("invalid assignment target: {0}")]
    InvalidTarget(String),

    /// Raised by a native function.
    #[error("{0}")]
    Native(String),
}

impl RuntimeError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        RuntimeError::Type(msg.into())
    }

    pub fn native(msg: impl Into<String>) -> Self {
        RuntimeError::Native(msg.into())
    }
}
