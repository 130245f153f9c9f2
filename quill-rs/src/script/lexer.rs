//! Indentation-aware lexer for all three dialects.
//!
//! The canonical and Python-flavoured dialects are indentation-sensitive:
//! leading whitespace is measured against an explicit indent-width stack and
//! turned into INDENT/DEDENT tokens.  The JS-flavoured dialect is
//! brace-delimited: a `{` that opens a block becomes `:` NEWLINE INDENT and
//! its `}` becomes NEWLINE DEDENT, so the parser sees one layout shape.
//!
//! Newlines (and indentation) inside `(…)`, `[…]` and literal `{…}` are
//! insignificant, which gives implicit line continuation.

use tracing::debug;

use super::error::{LexError, LexErrorKind};
use super::token::{Keyword, Token, TokenKind};
use crate::frontend::Dialect;

/// Words the Python-flavoured lexer treats as keywords; everything else is an
/// identifier until the remap pass looks at it.
const PYTHON_KEYWORDS: &[&str] = &[
    "and", "break", "continue", "elif", "else", "for", "if", "in", "not", "or", "return", "while",
];

const JS_KEYWORDS: &[&str] = &["break", "continue", "else", "for", "if", "in", "return", "while"];

/// Columns a tab advances the indentation width by.
const TAB_WIDTH: usize = 4;

/// Tokenize `source` in the given dialect.
///
/// This is the raw lexing step; alternate dialects still need their remap
/// pass (see [`crate::frontend::tokenize`]) before the canonical parser can
/// consume the result.
pub fn tokenize(source: &str, dialect: Dialect) -> Result<Vec<Token>, LexError> {
    let tokens = Lexer::new(source, dialect).run()?;
    debug!(dialect = %dialect, count = tokens.len(), "tokenized source");
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Paren,
    Bracket,
    Brace,
    /// A brace-dialect block; layout is significant inside it.
    Block,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    dialect: Dialect,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    frames: Vec<Frame>,
    at_line_start: bool,
}

impl Lexer {
    fn new(source: &str, dialect: Dialect) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            dialect,
            tokens: Vec::new(),
            indents: vec![0],
            frames: Vec::new(),
            at_line_start: true,
        }
    }

    // ── Cursor ────────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn err(&self, kind: LexErrorKind, line: usize, col: usize) -> LexError {
        LexError::new(kind, line, col)
    }

    // ── Emission ──────────────────────────────────────────────────────────────

    fn push(&mut self, kind: TokenKind, lexeme: impl Into<String>, line: usize, col: usize) {
        self.tokens.push(Token::new(kind, lexeme, line, col));
    }

    fn last_kind(&self) -> Option<TokenKind> {
        self.tokens.last().map(|t| t.kind)
    }

    /// Layout (newlines, indentation) matters unless we're inside an open
    /// paren, bracket or literal brace.
    fn layout_active(&self) -> bool {
        matches!(self.frames.last(), None | Some(Frame::Block))
    }

    /// Emit a NEWLINE unless one would be redundant.
    fn push_newline(&mut self, line: usize, col: usize) {
        if !matches!(
            self.last_kind(),
            None | Some(TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
        ) {
            self.push(TokenKind::Newline, "", line, col);
        }
    }

    // ── Main loop ─────────────────────────────────────────────────────────────

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        loop {
            if self.at_line_start {
                self.at_line_start = false;
                if self.dialect.indentation_significant() && self.layout_active() {
                    self.measure_indent()?;
                }
            }
            self.skip_inline_ws();
            let Some(c) = self.peek() else { break };
            let (line, col) = (self.line, self.col);
            match c {
                '\n' => {
                    self.advance();
                    if self.layout_active() {
                        self.push_newline(line, col);
                    }
                    self.at_line_start = true;
                }
                '#' if !self.dialect.brace_blocks() => self.hash_comment()?,
                '/' if self.dialect.brace_blocks() && self.peek_at(1) == Some('/') => {
                    self.skip_to_eol();
                }
                '/' if self.dialect.brace_blocks() && self.peek_at(1) == Some('*') => {
                    self.c_block_comment()?;
                }
                '0'..='9' => self.number(),
                '"' | '\'' | '`' => self.string(c)?,
                c if c.is_alphabetic() || c == '_' => self.word(),
                _ => self.operator()?,
            }
        }
        self.finish()
    }

    fn finish(mut self) -> Result<Vec<Token>, LexError> {
        if let Some(frame) = self.frames.last() {
            let c = match frame {
                Frame::Paren => '(',
                Frame::Bracket => '[',
                Frame::Brace | Frame::Block => '{',
            };
            return Err(self.err(LexErrorKind::Unbalanced(c), self.line, self.col));
        }
        let (line, col) = (self.line, self.col);
        self.push_newline(line, col);
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, "", line, col);
        }
        self.push(TokenKind::Eof, "", line, col);
        Ok(self.tokens)
    }

    fn skip_inline_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.advance();
        }
    }

    fn skip_to_eol(&mut self) {
        while !matches!(self.peek(), None | Some('\n')) {
            self.advance();
        }
    }

    /// Measure leading whitespace and emit INDENT/DEDENT tokens.
    ///
    /// Blank and comment-only lines leave the indentation stack untouched.
    fn measure_indent(&mut self) -> Result<(), LexError> {
        let mut width = 0;
        loop {
            match self.peek() {
                Some(' ') => width += 1,
                Some('\t') => width += TAB_WIDTH,
                Some('\r') => {}
                _ => break,
            }
            self.advance();
        }
        if matches!(self.peek(), None | Some('\n' | '#')) {
            return Ok(());
        }

        let (line, col) = (self.line, self.col);
        let top = self.indents.last().copied().unwrap_or(0);
        if width > top {
            self.indents.push(width);
            self.push(TokenKind::Indent, "", line, col);
        } else if width < top {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent, "", line, col);
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.err(LexErrorKind::InconsistentDedent(width), line, col));
            }
        }
        Ok(())
    }

    // ── Comments ──────────────────────────────────────────────────────────────

    /// `# …` line comment, or `#[ … ]#` (nestable) in the canonical dialect.
    fn hash_comment(&mut self) -> Result<(), LexError> {
        if self.dialect == Dialect::Canonical && self.peek_at(1) == Some('[') {
            let (line, col) = (self.line, self.col);
            self.advance();
            self.advance();
            let mut depth = 1;
            while depth > 0 {
                match self.advance() {
                    None => return Err(self.err(LexErrorKind::UnterminatedComment, line, col)),
                    Some('#') if self.peek() == Some('[') => {
                        self.advance();
                        depth += 1;
                    }
                    Some(']') if self.peek() == Some('#') => {
                        self.advance();
                        depth -= 1;
                    }
                    Some(_) => {}
                }
            }
            return Ok(());
        }
        self.skip_to_eol();
        Ok(())
    }

    fn c_block_comment(&mut self) -> Result<(), LexError> {
        let (line, col) = (self.line, self.col);
        self.advance();
        self.advance();
        loop {
            match self.advance() {
                None => return Err(self.err(LexErrorKind::UnterminatedComment, line, col)),
                Some('*') if self.peek() == Some('/') => {
                    self.advance();
                    return Ok(());
                }
                Some(_) => {}
            }
        }
    }

    // ── Literals and words ────────────────────────────────────────────────────

    fn number(&mut self) {
        let (line, col) = (self.line, self.col);
        let mut s = String::new();
        let mut is_float = false;

        let radix_prefix = self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefix {
            s.push(self.advance().unwrap_or('0'));
            s.push(self.advance().unwrap_or('x'));
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit() || *c == '_') {
                s.push(c);
                self.advance();
            }
        } else {
            self.digits(&mut s);
            if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                s.push('.');
                self.advance();
                self.digits(&mut s);
            }
            let exp_follows = match self.peek_at(1) {
                Some(c) if c.is_ascii_digit() => true,
                Some('+' | '-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                _ => false,
            };
            if matches!(self.peek(), Some('e' | 'E')) && exp_follows {
                is_float = true;
                s.push('e');
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    s.push(sign);
                    self.advance();
                }
                self.digits(&mut s);
            }
        }

        // `'i32`, `'f64`, … type suffix
        if self.peek() == Some('\'') && self.peek_at(1).is_some_and(|c| c.is_ascii_alphabetic()) {
            s.push('\'');
            self.advance();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric()) {
                s.push(c);
                self.advance();
            }
        }

        let kind = if is_float { TokenKind::Float } else { TokenKind::Int };
        self.push(kind, s, line, col);
    }

    fn digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit() || *c == '_') {
            out.push(c);
            self.advance();
        }
    }

    fn string(&mut self, quote: char) -> Result<(), LexError> {
        let (line, col) = (self.line, self.col);
        self.advance();

        if quote == '"' && self.peek() == Some('"') && self.peek_at(1) == Some('"') {
            self.advance();
            self.advance();
            return self.triple_quoted(line, col);
        }

        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(self.err(LexErrorKind::UnterminatedString, line, col)),
                Some('\n') if quote != '`' => {
                    return Err(self.err(LexErrorKind::UnterminatedString, line, col))
                }
                Some('\\') => {
                    let (eline, ecol) = (self.line, self.col);
                    let escaped = match self.advance() {
                        None => return Err(self.err(LexErrorKind::UnterminatedString, line, col)),
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('`') => '`',
                        Some('x') => self.hex_escape(eline, ecol)?,
                        Some(c) => return Err(self.err(LexErrorKind::InvalidEscape(c), eline, ecol)),
                    };
                    s.push(escaped);
                }
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        self.push(TokenKind::Str, s, line, col);
        Ok(())
    }

    fn hex_escape(&mut self, line: usize, col: usize) -> Result<char, LexError> {
        let hi = self.advance().and_then(|c| c.to_digit(16));
        let lo = self.advance().and_then(|c| c.to_digit(16));
        match (hi, lo) {
            (Some(h), Some(l)) => char::from_u32(h * 16 + l)
                .ok_or_else(|| self.err(LexErrorKind::InvalidEscape('x'), line, col)),
            _ => Err(self.err(LexErrorKind::InvalidEscape('x'), line, col)),
        }
    }

    /// `"""…"""`: raw, may span lines.
    fn triple_quoted(&mut self, line: usize, col: usize) -> Result<(), LexError> {
        let mut s = String::new();
        loop {
            if self.peek() == Some('"') && self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"')
            {
                self.advance();
                self.advance();
                self.advance();
                break;
            }
            match self.advance() {
                None => return Err(self.err(LexErrorKind::UnterminatedString, line, col)),
                Some(c) => s.push(c),
            }
        }
        self.push(TokenKind::Str, s, line, col);
        Ok(())
    }

    fn word(&mut self) {
        let (line, col) = (self.line, self.col);
        let mut s = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            s.push(c);
            self.advance();
        }
        let kind = match self.keyword(&s) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident,
        };
        self.push(kind, s, line, col);
    }

    fn keyword(&self, word: &str) -> Option<Keyword> {
        let reserved = match self.dialect {
            Dialect::Canonical => true,
            Dialect::Python => PYTHON_KEYWORDS.contains(&word),
            Dialect::JavaScript => JS_KEYWORDS.contains(&word),
        };
        if reserved {
            word.parse().ok()
        } else {
            None
        }
    }

    // ── Operators and punctuation ─────────────────────────────────────────────

    fn operator(&mut self) -> Result<(), LexError> {
        let (line, col) = (self.line, self.col);
        let Some(c) = self.advance() else {
            return Ok(());
        };
        let js = self.dialect == Dialect::JavaScript;
        let kind = match c {
            '+' => {
                if self.eat('=') {
                    TokenKind::PlusAssign
                } else if js && self.eat('+') {
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('=') {
                    TokenKind::MinusAssign
                } else if js && self.eat('-') {
                    TokenKind::MinusMinus
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.eat('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '/' => {
                if self.eat('=') {
                    TokenKind::SlashAssign
                } else if self.dialect == Dialect::Python && self.eat('/') {
                    TokenKind::SlashSlash
                } else {
                    TokenKind::Slash
                }
            }
            '%' => TokenKind::Percent,
            '&' => {
                if self.eat('&') {
                    TokenKind::AndAnd
                } else if self.eat('=') {
                    TokenKind::AmpAssign
                } else {
                    TokenKind::Amp
                }
            }
            '|' if self.eat('|') => TokenKind::OrOr,
            '=' => {
                if self.eat('=') {
                    if js && self.eat('=') {
                        TokenKind::StrictEq
                    } else {
                        TokenKind::EqEq
                    }
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    if js && self.eat('=') {
                        TokenKind::StrictNotEq
                    } else {
                        TokenKind::NotEq
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '.' => {
                if self.eat('.') {
                    if self.eat('<') {
                        TokenKind::DotDotLt
                    } else {
                        TokenKind::DotDot
                    }
                } else {
                    TokenKind::Dot
                }
            }
            '$' => TokenKind::Dollar,
            '@' => TokenKind::At,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => {
                if js && self.layout_active() {
                    self.push_newline(line, col);
                    return Ok(());
                }
                TokenKind::Semicolon
            }
            '(' => {
                self.frames.push(Frame::Paren);
                TokenKind::LParen
            }
            '[' => {
                self.frames.push(Frame::Bracket);
                TokenKind::LBracket
            }
            ')' => {
                self.close(Frame::Paren, ')', line, col)?;
                TokenKind::RParen
            }
            ']' => {
                self.close(Frame::Bracket, ']', line, col)?;
                TokenKind::RBracket
            }
            '{' => {
                if js && self.opens_block() {
                    self.frames.push(Frame::Block);
                    self.push(TokenKind::Colon, ":", line, col);
                    self.push(TokenKind::Newline, "", line, col);
                    self.push(TokenKind::Indent, "", line, col);
                    return Ok(());
                }
                self.frames.push(Frame::Brace);
                TokenKind::LBrace
            }
            '}' => {
                match self.frames.pop() {
                    Some(Frame::Block) => {
                        self.push_newline(line, col);
                        self.push(TokenKind::Dedent, "", line, col);
                        return Ok(());
                    }
                    Some(Frame::Brace) => {}
                    _ => return Err(self.err(LexErrorKind::Unbalanced('}'), line, col)),
                }
                TokenKind::RBrace
            }
            other => return Err(self.err(LexErrorKind::IllegalChar(other), line, col)),
        };
        let lexeme: String = self.chars[self.pos - (self.col - col)..self.pos].iter().collect();
        self.push(kind, lexeme, line, col);
        Ok(())
    }

    fn close(&mut self, expected: Frame, c: char, line: usize, col: usize) -> Result<(), LexError> {
        if self.frames.pop() == Some(expected) {
            Ok(())
        } else {
            Err(self.err(LexErrorKind::Unbalanced(c), line, col))
        }
    }

    /// Whether a `{` in the brace dialect opens a statement block rather than
    /// an object literal.
    fn opens_block(&self) -> bool {
        match self.tokens.last() {
            Some(t) => {
                matches!(
                    t.kind,
                    TokenKind::RParen | TokenKind::Arrow | TokenKind::Keyword(Keyword::Else)
                ) || matches!(t.lexeme.as_str(), "do" | "try" | "finally")
                    && t.kind == TokenKind::Ident
            }
            None => true,
        }
    }
}
