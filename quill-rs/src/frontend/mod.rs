//! Dialect selection and the `tokenize → parse` pipeline.
//!
//! Every dialect is lexed by [`crate::script::lexer`]; the alternate dialects
//! then run a token-level remap onto the canonical vocabulary so that a single
//! parser serves all three.

pub mod detect;
mod javascript;
mod python;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{QuillError, Result};
use crate::script::error::{LexError, ParseError};
use crate::script::token::Token;
use crate::script::{lexer, parser, Program};

pub use detect::detect;

/// One of the accepted surface syntaxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// Indentation-based, Nim-like.
    #[default]
    Canonical,
    /// Indentation-based, Python-like.
    Python,
    /// Brace-delimited, JavaScript-like.
    JavaScript,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Canonical, Dialect::Python, Dialect::JavaScript];

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Canonical => "canonical",
            Dialect::Python => "python",
            Dialect::JavaScript => "javascript",
        }
    }

    /// Whether leading whitespace produces INDENT/DEDENT tokens.
    pub fn indentation_significant(self) -> bool {
        !self.brace_blocks()
    }

    /// Whether blocks are delimited by `{ … }`.
    pub fn brace_blocks(self) -> bool {
        self == Dialect::JavaScript
    }

    /// Pick a dialect from a file extension, if it is one we recognise.
    pub fn from_extension(path: &Path) -> Option<Dialect> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "quill" | "ql" | "nim" => Some(Dialect::Canonical),
            "py" | "pyq" => Some(Dialect::Python),
            "js" | "jsq" => Some(Dialect::JavaScript),
            _ => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "canonical" | "quill" | "nim" => Ok(Dialect::Canonical),
            "python" | "py" => Ok(Dialect::Python),
            "javascript" | "js" => Ok(Dialect::JavaScript),
            other => Err(format!("unknown dialect '{other}'")),
        }
    }
}

/// Lex `source` and, for the alternate dialects, remap the tokens onto the
/// canonical vocabulary.
pub fn tokenize(source: &str, dialect: Dialect) -> std::result::Result<Vec<Token>, LexError> {
    let raw = lexer::tokenize(source, dialect)?;
    let tokens = match dialect {
        Dialect::Canonical => raw,
        Dialect::Python => python::remap(raw),
        Dialect::JavaScript => javascript::remap(raw),
    };
    Ok(tokens)
}

/// Parse canonical tokens.
pub fn parse(tokens: &[Token]) -> std::result::Result<Program, ParseError> {
    parser::parse(tokens)
}

/// Tokenize and parse `source`; when `dialect` is `None` it is guessed from
/// the source text.
pub fn compile(source: &str, dialect: Option<Dialect>) -> Result<Program> {
    let dialect = dialect.unwrap_or_else(|| detect(source, None));
    let tokens = tokenize(source, dialect)?;
    let program = parse(&tokens)?;
    debug!(%dialect, statements = program.stmts.len(), "compiled source");
    Ok(program)
}

/// Read and compile a file, selecting the dialect by extension first and by
/// content second unless `dialect` is given.
pub fn compile_file(path: &Path, dialect: Option<Dialect>) -> Result<(Dialect, Program)> {
    let source = std::fs::read_to_string(path).map_err(|e| QuillError::io(path, e))?;
    let dialect = dialect.unwrap_or_else(|| detect(&source, Some(path)));
    let program = compile(&source, Some(dialect))?;
    Ok((dialect, program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_names_parse() {
        for d in Dialect::ALL {
            assert_eq!(d.name().parse::<Dialect>(), Ok(d));
        }
        assert_eq!("JS".parse::<Dialect>(), Ok(Dialect::JavaScript));
        assert!("ruby".parse::<Dialect>().is_err());
    }

    #[test]
    fn dialect_from_extension() {
        assert_eq!(Dialect::from_extension(Path::new("a/b.quill")), Some(Dialect::Canonical));
        assert_eq!(Dialect::from_extension(Path::new("x.PY")), Some(Dialect::Python));
        assert_eq!(Dialect::from_extension(Path::new("x.js")), Some(Dialect::JavaScript));
        assert_eq!(Dialect::from_extension(Path::new("x.txt")), None);
        assert_eq!(Dialect::from_extension(Path::new("noext")), None);
    }

    #[test]
    fn compile_reports_lex_errors() {
        let err = compile("var s = \"open", Some(Dialect::Canonical)).unwrap_err();
        assert!(matches!(err, QuillError::Lex(_)));
    }

    #[test]
    fn compile_reports_parse_errors() {
        let err = compile("var = 3", Some(Dialect::Canonical)).unwrap_err();
        assert!(matches!(err, QuillError::Parse(_)));
    }
}
