//! Token vocabulary shared by all three dialects.
//!
//! The canonical parser only understands the canonical subset; the
//! alternate frontends rewrite dialect-only tokens (`&&`, `===`, `++`, …)
//! into it before parsing.

use std::fmt;
use std::str::FromStr;

// ── Keyword ───────────────────────────────────────────────────────────────────

/// A reserved word of the canonical dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Addr,
    And,
    Block,
    Break,
    Case,
    Cast,
    Const,
    Continue,
    Defer,
    Discard,
    Div,
    Elif,
    Else,
    Enum,
    False,
    For,
    Func,
    If,
    In,
    Let,
    Mod,
    Nil,
    Not,
    Notin,
    Object,
    Of,
    Or,
    Proc,
    Ptr,
    Ref,
    Return,
    Shl,
    Shr,
    True,
    Type,
    Var,
    While,
}

impl Keyword {
    pub const ALL: &'static [Keyword] = &[
        Keyword::Addr,
        Keyword::And,
        Keyword::Block,
        Keyword::Break,
        Keyword::Case,
        Keyword::Cast,
        Keyword::Const,
        Keyword::Continue,
        Keyword::Defer,
        Keyword::Discard,
        Keyword::Div,
        Keyword::Elif,
        Keyword::Else,
        Keyword::Enum,
        Keyword::False,
        Keyword::For,
        Keyword::Func,
        Keyword::If,
        Keyword::In,
        Keyword::Let,
        Keyword::Mod,
        Keyword::Nil,
        Keyword::Not,
        Keyword::Notin,
        Keyword::Object,
        Keyword::Of,
        Keyword::Or,
        Keyword::Proc,
        Keyword::Ptr,
        Keyword::Ref,
        Keyword::Return,
        Keyword::Shl,
        Keyword::Shr,
        Keyword::True,
        Keyword::Type,
        Keyword::Var,
        Keyword::While,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Addr => "addr",
            Keyword::And => "and",
            Keyword::Block => "block",
            Keyword::Break => "break",
            Keyword::Case => "case",
            Keyword::Cast => "cast",
            Keyword::Const => "const",
            Keyword::Continue => "continue",
            Keyword::Defer => "defer",
            Keyword::Discard => "discard",
            Keyword::Div => "div",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::Enum => "enum",
            Keyword::False => "false",
            Keyword::For => "for",
            Keyword::Func => "func",
            Keyword::If => "if",
            Keyword::In => "in",
            Keyword::Let => "let",
            Keyword::Mod => "mod",
            Keyword::Nil => "nil",
            Keyword::Not => "not",
            Keyword::Notin => "notin",
            Keyword::Object => "object",
            Keyword::Of => "of",
            Keyword::Or => "or",
            Keyword::Proc => "proc",
            Keyword::Ptr => "ptr",
            Keyword::Ref => "ref",
            Keyword::Return => "return",
            Keyword::Shl => "shl",
            Keyword::Shr => "shr",
            Keyword::True => "true",
            Keyword::Type => "type",
            Keyword::Var => "var",
            Keyword::While => "while",
        }
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Keyword::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── TokenKind ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    /// Lexeme holds the digits, optionally followed by `'suffix`.
    Int,
    Float,
    /// Lexeme holds the decoded string contents.
    Str,
    Ident,
    Keyword(Keyword),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    AmpAssign,
    DotDot,
    DotDotLt,
    Dollar,
    At,

    // Brackets and punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,

    // Alternate-dialect operators (rewritten before parsing)
    AndAnd,
    OrOr,
    Bang,
    StrictEq,
    StrictNotEq,
    PlusPlus,
    MinusMinus,
    SlashSlash,
    Arrow,

    // Layout
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    /// A short printable description used in parse errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Int => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::Str => "string literal",
            TokenKind::Ident => "identifier",
            TokenKind::Keyword(k) => k.as_str(),
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Amp => "'&'",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::Assign => "'='",
            TokenKind::PlusAssign => "'+='",
            TokenKind::MinusAssign => "'-='",
            TokenKind::StarAssign => "'*='",
            TokenKind::SlashAssign => "'/='",
            TokenKind::AmpAssign => "'&='",
            TokenKind::DotDot => "'..'",
            TokenKind::DotDotLt => "'..<'",
            TokenKind::Dollar => "'$'",
            TokenKind::At => "'@'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::AndAnd => "'&&'",
            TokenKind::OrOr => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::StrictEq => "'==='",
            TokenKind::StrictNotEq => "'!=='",
            TokenKind::PlusPlus => "'++'",
            TokenKind::MinusMinus => "'--'",
            TokenKind::SlashSlash => "'//'",
            TokenKind::Arrow => "'=>'",
            TokenKind::Newline => "newline",
            TokenKind::Indent => "indent",
            TokenKind::Dedent => "dedent",
            TokenKind::Eof => "end of input",
        }
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, col: usize) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            line,
            col,
        }
    }

    /// A synthetic token (produced by a remap pass) positioned at `at`.
    pub fn synthetic(kind: TokenKind, lexeme: impl Into<String>, at: &Token) -> Self {
        Token::new(kind, lexeme, at.line, at.col)
    }

    pub fn keyword(kw: Keyword, at: &Token) -> Self {
        Token::synthetic(TokenKind::Keyword(kw), kw.as_str(), at)
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.kind == TokenKind::Keyword(kw)
    }

    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.lexeme == name
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Int | TokenKind::Float | TokenKind::Ident => {
                write!(f, "'{}'", self.lexeme)
            }
            TokenKind::Str => write!(f, "{:?}", self.lexeme),
            kind => f.write_str(kind.describe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_round_trips_through_str() {
        for kw in Keyword::ALL {
            assert_eq!(kw.as_str().parse::<Keyword>(), Ok(*kw));
        }
        assert!("def".parse::<Keyword>().is_err());
    }

    #[test]
    fn token_display() {
        let t = Token::new(TokenKind::Ident, "counter", 1, 1);
        assert_eq!(t.to_string(), "'counter'");
        let t = Token::new(TokenKind::Keyword(Keyword::Proc), "proc", 1, 1);
        assert_eq!(t.to_string(), "proc");
        let t = Token::new(TokenKind::Str, "a\"b", 1, 1);
        assert_eq!(t.to_string(), "\"a\\\"b\"");
    }
}
