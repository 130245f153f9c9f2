//! Top-level error type.
//!
//! Each layer has its own `thiserror` enum; [`QuillError`] unifies them for
//! entry points that span several layers (compile-and-run, export, CLI).

use std::path::PathBuf;

use thiserror::Error;

use crate::codegen::CodegenError;
use crate::config::ConfigError;
use crate::plugin::PluginError;
use crate::script::error::{LexError, ParseError, RuntimeError};

#[derive(Debug, Error)]
pub enum QuillError {
    #[error("lex error at {0}")]
    Lex(#[from] LexError),

    #[error("parse error at {0}")]
    Parse(#[from] ParseError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QuillError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QuillError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = QuillError> = std::result::Result<T, E>;
