//! The Quill scripting engine.
//!
//! Source text goes through [`lexer::tokenize`] and [`parser::parse`] into a
//! [`Program`], which the tree-walking [`Interpreter`] executes against an
//! [`Env`].  Hosts extend the language with native functions built by
//! [`native_fn`]; the standard library in [`builtins`] is built the same way.
//!
//! # Quick start
//!
//! ```rust
//! use quill::script::{builtins, lexer, parser, Env, Interpreter, Output};
//! use quill::Dialect;
//!
//! let env = Env::root();
//! let out = Output::capture();
//! builtins::install(&env, &out);
//!
//! let tokens = lexer::tokenize("echo(\"n = \", 6 * 7)", Dialect::Canonical).unwrap();
//! let program = parser::parse(&tokens).unwrap();
//! Interpreter::new().exec_program(&program, &env).unwrap();
//! assert_eq!(out.take(), vec!["n = 42"]);
//! ```

pub mod ast;
pub mod builtins;
pub mod env;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod native;
pub mod parser;
pub mod token;
pub mod value;

pub use ast::{Expr, Program, Stmt};
pub use env::Env;
pub use error::{LexError, ParseError, RuntimeError};
pub use interp::{Flow, Interpreter};
pub use native::{native_fn, Output};
pub use token::{Token, TokenKind};
pub use value::{Function, Pointer, Range, Value};
