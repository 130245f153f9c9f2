//! Quill: an embeddable, dynamically-typed scripting engine.
//!
//! A host application hands Quill small source fragments (tagged with a
//! lifecycle label), and Quill tokenizes, parses and executes them against
//! live state exposed through native functions.  The same fragments can be
//! exported offline to Nim, Python or JavaScript source text.
//!
//! Three surface syntaxes are accepted and normalized onto one token
//! vocabulary: the indentation-based canonical dialect, a Python-flavoured
//! dialect, and a brace-delimited JS-flavoured dialect.
//!
//! # Quick start
//!
//! ```rust
//! use quill::Runtime;
//!
//! let mut rt = Runtime::new();
//! rt.run("var x = 6\necho(x * 7)", None).unwrap();
//! assert_eq!(rt.take_output(), vec!["42"]);
//! ```

pub mod cli;
pub mod codegen;
pub mod config;
pub mod error;
pub mod frontend;
pub mod lifecycle;
pub mod methods;
pub mod plugin;
pub mod runtime;
pub mod script;

pub use codegen::{generate_code, BackendKind, Context};
pub use error::QuillError;
pub use frontend::{compile, Dialect};
pub use lifecycle::{FragmentSet, Lifecycle};
pub use plugin::{Extension, Hook, Registry};
pub use runtime::Runtime;
pub use script::{Env, Program, Value};
