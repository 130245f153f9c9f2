//! Recursive-descent parser for canonical tokens.
//!
//! Statements are dispatched on their leading keyword; expressions use
//! precedence climbing over [`BinOp::precedence`].  Unary operators bind
//! tighter than any binary operator, and postfix call/index/dot/deref bind
//! tighter still.
//!
//! Layout arrives pre-digested from the lexer: a block is `:` NEWLINE INDENT
//! … DEDENT, or a single statement on the same line after the `:`.

use std::rc::Rc;

use tracing::debug;

use super::ast::{
    BinOp, Block, DeclKind, Expr, OfBranch, Param, ProcDef, Program, Stmt, TypeDef, TypeNode,
    UnaryOp,
};
use super::error::ParseError;
use super::token::{Keyword, Token, TokenKind};

type PResult<T> = Result<T, ParseError>;

/// Deepest nesting of expressions and blocks the parser accepts.  Each
/// level costs several stack frames here and again in every tree walker.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Remaining stack below which parsing moves onto a fresh heap segment.
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 1024 * 1024;

/// Parse a canonical token stream into a [`Program`].
pub fn parse(tokens: &[Token]) -> PResult<Program> {
    let mut p = Parser::new(tokens);
    let program = p.program()?;
    debug!(statements = program.stmts.len(), "parsed program");
    Ok(program)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// Non-zero while parsing an `if`/`while`/`for`/`case` head, where a
    /// trailing `:` belongs to the statement rather than to a call.
    no_block_sugar: usize,
    /// Current expression and block nesting.
    depth: usize,
    eof: Token,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let (line, col) = tokens.last().map(|t| (t.line, t.col)).unwrap_or((1, 1));
        Parser {
            tokens,
            pos: 0,
            no_block_sugar: 0,
            depth: 0,
            eof: Token::new(TokenKind::Eof, "", line, col),
        }
    }

    // ── Cursor ────────────────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.eof)
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn previous_kind(&self) -> Option<TokenKind> {
        self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)).map(|t| t.kind)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn check_kw(&self, kw: Keyword) -> bool {
        self.peek().is_keyword(kw)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        self.eat(TokenKind::Keyword(kw))
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {}", kind.describe())))
        }
    }

    fn expect_kw(&mut self, kw: Keyword) -> PResult<()> {
        self.expect(TokenKind::Keyword(kw)).map(|_| ())
    }

    fn expect_ident(&mut self) -> PResult<String> {
        if self.check(TokenKind::Ident) {
            Ok(self.advance().lexeme)
        } else {
            Err(self.error("expected identifier"))
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.kind(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let tok = self.peek();
        ParseError {
            message: message.into(),
            found: tok.to_string(),
            line: tok.line,
            col: tok.col,
        }
    }

    /// Whether the current token ends a simple statement.
    fn at_terminator(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Dedent | TokenKind::Eof
        )
    }

    /// Consume the end of a simple statement.
    fn end_statement(&mut self) -> PResult<()> {
        if self.eat(TokenKind::Newline) || self.eat(TokenKind::Semicolon) {
            return Ok(());
        }
        // A nested single-line body may already have consumed it.
        if matches!(self.kind(), TokenKind::Dedent | TokenKind::Eof)
            || matches!(
                self.previous_kind(),
                Some(TokenKind::Dedent | TokenKind::Newline | TokenKind::Semicolon)
            )
        {
            return Ok(());
        }
        Err(self.error("expected end of statement"))
    }

    fn head_expr(&mut self) -> PResult<Expr> {
        self.no_block_sugar += 1;
        let e = self.expr();
        self.no_block_sugar -= 1;
        e
    }

    // ── Program and blocks ────────────────────────────────────────────────────

    fn program(&mut self) -> PResult<Program> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(TokenKind::Eof) {
                break;
            }
            self.statement(&mut stmts)?;
        }
        Ok(Program { stmts })
    }

    /// Parse a block body after its opening `:` or `=` has been consumed.
    fn block(&mut self) -> PResult<Block> {
        let mut body = Vec::new();
        if self.eat(TokenKind::Newline) {
            if !self.eat(TokenKind::Indent) {
                return Err(self.error("expected an indented block"));
            }
            loop {
                self.skip_newlines();
                if self.eat(TokenKind::Dedent) {
                    break;
                }
                if self.check(TokenKind::Eof) {
                    return Err(self.error("unterminated block"));
                }
                self.statement(&mut body)?;
            }
            return Ok(body);
        }

        // Single-line body: `if x: a; b`
        loop {
            if self.at_terminator() {
                return Err(self.error("expected a statement"));
            }
            self.statement(&mut body)?;
            let more = self.previous_kind() == Some(TokenKind::Semicolon)
                && !matches!(
                    self.kind(),
                    TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
                );
            if !more {
                break;
            }
        }
        Ok(body)
    }

    /// Run `f` one nesting level deeper, failing past [`MAX_NESTING_DEPTH`].
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(format!("nesting is too deep (maximum {MAX_NESTING_DEPTH} levels)")));
        }
        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || f(self));
        self.depth -= 1;
        result
    }

    fn colon_block(&mut self) -> PResult<Block> {
        self.expect(TokenKind::Colon)?;
        self.block()
    }

    /// Skip newlines looking for `kw`; rewind if it isn't there.
    fn continues_with(&mut self, kw: Keyword) -> bool {
        let save = self.pos;
        while self.check(TokenKind::Newline) {
            self.advance();
        }
        if self.check_kw(kw) {
            true
        } else {
            self.pos = save;
            false
        }
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn statement(&mut self, out: &mut Block) -> PResult<()> {
        self.nested(|p| p.statement_inner(out))
    }

    fn statement_inner(&mut self, out: &mut Block) -> PResult<()> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Keyword(Keyword::Var) => self.declaration(DeclKind::Var, out),
            TokenKind::Keyword(Keyword::Let) => self.declaration(DeclKind::Let, out),
            TokenKind::Keyword(Keyword::Const) => self.declaration(DeclKind::Const, out),
            TokenKind::Keyword(Keyword::If) => {
                out.push(self.if_stmt()?);
                Ok(())
            }
            TokenKind::Keyword(Keyword::Case) => {
                out.push(self.case_stmt()?);
                Ok(())
            }
            TokenKind::Keyword(Keyword::For) => {
                out.push(self.for_stmt(None)?);
                Ok(())
            }
            TokenKind::Keyword(Keyword::While) => {
                out.push(self.while_stmt(None)?);
                Ok(())
            }
            TokenKind::Keyword(Keyword::Proc | Keyword::Func)
                if self.peek_at(1).kind == TokenKind::Ident =>
            {
                out.push(self.proc_stmt()?);
                Ok(())
            }
            TokenKind::Keyword(Keyword::Block) => {
                self.advance();
                let label = if self.check(TokenKind::Ident) {
                    Some(self.advance().lexeme)
                } else {
                    None
                };
                let body = self.colon_block()?;
                out.push(Stmt::Block { label, body });
                Ok(())
            }
            TokenKind::Keyword(Keyword::Defer) => {
                self.advance();
                let body = if self.eat(TokenKind::Colon) {
                    self.block()?
                } else {
                    let mut body = Vec::new();
                    self.statement(&mut body)?;
                    body
                };
                out.push(Stmt::Defer(body));
                Ok(())
            }
            TokenKind::Keyword(Keyword::Type) => {
                out.push(self.type_section()?);
                Ok(())
            }
            TokenKind::Ident
                if self.peek_at(1).kind == TokenKind::Colon
                    && matches!(
                        self.peek_at(2).kind,
                        TokenKind::Keyword(Keyword::For | Keyword::While)
                    ) =>
            {
                let label = self.advance().lexeme;
                self.advance();
                let stmt = if self.check_kw(Keyword::For) {
                    self.for_stmt(Some(label))?
                } else {
                    self.while_stmt(Some(label))?
                };
                out.push(stmt);
                Ok(())
            }
            _ => {
                let stmt = self.simple_statement()?;
                self.end_statement()?;
                out.push(stmt);
                Ok(())
            }
        }
    }

    /// Statements that end at a terminator rather than a block.
    fn simple_statement(&mut self) -> PResult<Stmt> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.at_terminator() {
                    None
                } else {
                    Some(self.expr()?)
                };
                Ok(Stmt::Return(value))
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                Ok(Stmt::Break(self.optional_label()))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                Ok(Stmt::Continue(self.optional_label()))
            }
            TokenKind::Keyword(Keyword::Discard) => {
                self.advance();
                let value = if self.at_terminator() {
                    None
                } else {
                    Some(self.expr()?)
                };
                Ok(Stmt::Discard(value))
            }
            _ => self.expression_statement(),
        }
    }

    fn optional_label(&mut self) -> Option<String> {
        if self.check(TokenKind::Ident) {
            Some(self.advance().lexeme)
        } else {
            None
        }
    }

    fn expression_statement(&mut self) -> PResult<Stmt> {
        let start = self.peek().clone();
        let expr = self.expr()?;

        let op = match self.kind() {
            TokenKind::Assign => Some(None),
            TokenKind::PlusAssign => Some(Some(BinOp::Add)),
            TokenKind::MinusAssign => Some(Some(BinOp::Sub)),
            TokenKind::StarAssign => Some(Some(BinOp::Mul)),
            TokenKind::SlashAssign => Some(Some(BinOp::Div)),
            TokenKind::AmpAssign => Some(Some(BinOp::Concat)),
            _ => None,
        };
        if let Some(op) = op {
            if !is_assignable(&expr) {
                return Err(ParseError {
                    message: "invalid assignment target".into(),
                    found: start.to_string(),
                    line: start.line,
                    col: start.col,
                });
            }
            self.advance();
            let value = self.expr()?;
            return Ok(Stmt::Assign {
                target: expr,
                op,
                value,
            });
        }

        // Command syntax: `echo "hi", x`
        if matches!(expr, Expr::Ident(_)) && self.starts_command_argument() {
            let mut args = vec![self.expr()?];
            while self.eat(TokenKind::Comma) {
                args.push(self.expr()?);
            }
            return Ok(Stmt::Expr(Expr::call(expr, args)));
        }

        Ok(Stmt::Expr(expr))
    }

    fn starts_command_argument(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Int
                | TokenKind::Float
                | TokenKind::Str
                | TokenKind::Ident
                | TokenKind::Dollar
                | TokenKind::At
                | TokenKind::Keyword(
                    Keyword::True | Keyword::False | Keyword::Nil | Keyword::Not | Keyword::Addr
                )
        )
    }

    // ── Declarations ──────────────────────────────────────────────────────────

    fn declaration(&mut self, kind: DeclKind, out: &mut Block) -> PResult<()> {
        self.advance();
        if self.eat(TokenKind::Newline) {
            if !self.eat(TokenKind::Indent) {
                return Err(self.error("expected indented declarations"));
            }
            loop {
                self.skip_newlines();
                if self.eat(TokenKind::Dedent) {
                    break;
                }
                out.push(self.declaration_item(kind)?);
                self.end_statement()?;
            }
            return Ok(());
        }
        out.push(self.declaration_item(kind)?);
        self.end_statement()
    }

    fn declaration_item(&mut self, kind: DeclKind) -> PResult<Stmt> {
        if self.eat(TokenKind::LParen) {
            let mut names = vec![self.expect_ident()?];
            while self.eat(TokenKind::Comma) {
                if self.check(TokenKind::RParen) {
                    break;
                }
                names.push(self.expect_ident()?);
            }
            self.expect(TokenKind::RParen)?;
            let ty = self.optional_annotation()?;
            self.expect(TokenKind::Assign)?;
            let value = self.expr()?;
            return Ok(Stmt::Decl {
                kind,
                names,
                unpack: true,
                ty,
                value: Some(value),
            });
        }

        let mut names = vec![self.decl_name()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.decl_name()?);
        }
        let ty = self.optional_annotation()?;
        let value = if self.eat(TokenKind::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Stmt::Decl {
            kind,
            names,
            unpack: false,
            ty,
            value,
        })
    }

    /// A declared name, ignoring a trailing `*` export marker.
    fn decl_name(&mut self) -> PResult<String> {
        let name = self.expect_ident()?;
        self.eat(TokenKind::Star);
        Ok(name)
    }

    fn optional_annotation(&mut self) -> PResult<Option<TypeNode>> {
        if self.eat(TokenKind::Colon) {
            Ok(Some(self.type_expr()?))
        } else {
            Ok(None)
        }
    }

    // ── Control flow ──────────────────────────────────────────────────────────

    fn if_stmt(&mut self) -> PResult<Stmt> {
        self.expect_kw(Keyword::If)?;
        let cond = self.head_expr()?;
        let body = self.colon_block()?;
        let mut branches = vec![(cond, body)];
        let mut else_body = None;
        loop {
            if self.continues_with(Keyword::Elif) {
                self.advance();
                let cond = self.head_expr()?;
                let body = self.colon_block()?;
                branches.push((cond, body));
            } else if self.continues_with(Keyword::Else) {
                self.advance();
                else_body = Some(self.colon_block()?);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If {
            branches,
            else_body,
        })
    }

    fn case_stmt(&mut self) -> PResult<Stmt> {
        self.expect_kw(Keyword::Case)?;
        let subject = self.head_expr()?;
        self.eat(TokenKind::Colon);
        self.skip_newlines();
        let indented = self.eat(TokenKind::Indent);

        let mut branches = Vec::new();
        let mut elifs = Vec::new();
        let mut else_body = None;
        loop {
            if self.continues_with(Keyword::Of) {
                self.advance();
                self.no_block_sugar += 1;
                let mut values = vec![self.expr()?];
                while self.eat(TokenKind::Comma) {
                    values.push(self.expr()?);
                }
                self.no_block_sugar -= 1;
                let body = self.colon_block()?;
                branches.push(OfBranch { values, body });
            } else if self.continues_with(Keyword::Elif) {
                self.advance();
                let cond = self.head_expr()?;
                let body = self.colon_block()?;
                elifs.push((cond, body));
            } else if self.continues_with(Keyword::Else) {
                self.advance();
                else_body = Some(self.colon_block()?);
                break;
            } else {
                break;
            }
        }

        if branches.is_empty() {
            return Err(self.error("expected at least one 'of' branch"));
        }
        if indented {
            self.skip_newlines();
            self.expect(TokenKind::Dedent)?;
        }
        Ok(Stmt::Case {
            subject,
            branches,
            elifs,
            else_body,
        })
    }

    fn for_stmt(&mut self, label: Option<String>) -> PResult<Stmt> {
        self.expect_kw(Keyword::For)?;
        let parenthesized = self.eat(TokenKind::LParen);
        let mut vars = vec![self.expect_ident()?];
        while self.eat(TokenKind::Comma) {
            vars.push(self.expect_ident()?);
        }
        if parenthesized {
            self.expect(TokenKind::RParen)?;
        }
        self.expect_kw(Keyword::In)?;
        let iter = self.head_expr()?;
        let body = self.colon_block()?;
        Ok(Stmt::For {
            label,
            vars,
            iter,
            body,
        })
    }

    fn while_stmt(&mut self, label: Option<String>) -> PResult<Stmt> {
        self.expect_kw(Keyword::While)?;
        let cond = self.head_expr()?;
        let body = self.colon_block()?;
        Ok(Stmt::While { label, cond, body })
    }

    // ── Procedures ────────────────────────────────────────────────────────────

    fn proc_stmt(&mut self) -> PResult<Stmt> {
        self.advance();
        let name = self.decl_name()?;
        if self.check(TokenKind::LBracket) {
            self.skip_generic_params()?;
        }
        let def = self.proc_rest(Some(name))?;
        Ok(Stmt::Proc(Rc::new(def)))
    }

    /// `[T, U]` on a generic procedure; the interpreter is untyped.
    fn skip_generic_params(&mut self) -> PResult<()> {
        self.expect(TokenKind::LBracket)?;
        let mut depth = 1;
        while depth > 0 {
            match self.advance().kind {
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => depth -= 1,
                TokenKind::Eof => return Err(self.error("unterminated generic parameters")),
                _ => {}
            }
        }
        Ok(())
    }

    /// Parameters, return type and body of a procedure or lambda.
    fn proc_rest(&mut self, name: Option<String>) -> PResult<ProcDef> {
        let params = if self.check(TokenKind::LParen) {
            self.params()?
        } else {
            Vec::new()
        };

        let mut ret = None;
        if self.check(TokenKind::Colon) && self.peek_at(1).kind != TokenKind::Newline {
            self.advance();
            ret = Some(self.type_expr()?);
        }

        if !(self.eat(TokenKind::Assign) || self.eat(TokenKind::Colon)) {
            return Err(self.error("expected '=' or ':' before procedure body"));
        }
        // An inline lambda body may sit inside a call's parentheses, so it
        // ends at the expression rather than at a newline.
        let body = if name.is_none() && !self.check(TokenKind::Newline) {
            vec![self.simple_statement()?]
        } else {
            self.block()?
        };

        Ok(ProcDef {
            name,
            params,
            ret,
            body,
        })
    }

    fn params(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        let mut pending: Vec<Param> = Vec::new();
        while !self.check(TokenKind::RParen) {
            let mut param = Param::new("");
            param.is_var = self.eat_kw(Keyword::Var);
            param.name = self.expect_ident()?;
            pending.push(param);

            if self.eat(TokenKind::Colon) {
                let is_var = self.eat_kw(Keyword::Var);
                let ty = self.type_expr()?;
                for p in &mut pending {
                    p.ty = Some(ty.clone());
                    p.is_var |= is_var;
                }
            }
            if self.eat(TokenKind::Assign) {
                let default = self.expr()?;
                for p in &mut pending {
                    p.default = Some(default.clone());
                }
            }
            let group_done = pending.last().is_some_and(|p| p.ty.is_some() || p.default.is_some());
            if group_done {
                params.append(&mut pending);
            }

            if !(self.eat(TokenKind::Comma) || self.eat(TokenKind::Semicolon)) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        params.append(&mut pending);
        Ok(params)
    }

    fn lambda(&mut self) -> PResult<Expr> {
        self.advance();
        let mut def = self.proc_rest(None)?;
        if let [Stmt::Expr(_)] = def.body.as_slice() {
            if let Some(Stmt::Expr(e)) = def.body.pop() {
                def.body.push(Stmt::Return(Some(e)));
            }
        }
        Ok(Expr::Lambda(Rc::new(def)))
    }

    // ── Types ─────────────────────────────────────────────────────────────────

    fn type_section(&mut self) -> PResult<Stmt> {
        self.expect_kw(Keyword::Type)?;
        let mut defs = Vec::new();
        if self.eat(TokenKind::Newline) {
            if !self.eat(TokenKind::Indent) {
                return Err(self.error("expected indented type declarations"));
            }
            loop {
                self.skip_newlines();
                if self.eat(TokenKind::Dedent) {
                    break;
                }
                defs.push(self.type_def()?);
                self.end_statement()?;
            }
        } else {
            defs.push(self.type_def()?);
            self.end_statement()?;
        }
        Ok(Stmt::Type(defs))
    }

    fn type_def(&mut self) -> PResult<TypeDef> {
        let name = self.decl_name()?;
        if self.check(TokenKind::LBracket) {
            self.skip_generic_params()?;
        }
        self.expect(TokenKind::Assign)?;
        let ty = self.type_expr()?;
        Ok(TypeDef { name, ty })
    }

    fn type_expr(&mut self) -> PResult<TypeNode> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Keyword(Keyword::Ptr | Keyword::Ref) => {
                self.advance();
                Ok(TypeNode::Pointer(Box::new(self.type_expr()?)))
            }
            TokenKind::Keyword(Keyword::Var) => {
                self.advance();
                self.type_expr()
            }
            TokenKind::Keyword(Keyword::Proc) => {
                self.advance();
                let mut params = Vec::new();
                self.expect(TokenKind::LParen)?;
                while !self.check(TokenKind::RParen) {
                    if self.check(TokenKind::Ident) && self.peek_at(1).kind == TokenKind::Colon {
                        self.advance();
                        self.advance();
                    }
                    params.push(self.type_expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
                let ret = if self.eat(TokenKind::Colon) {
                    Some(Box::new(self.type_expr()?))
                } else {
                    None
                };
                Ok(TypeNode::Proc { params, ret })
            }
            TokenKind::Keyword(Keyword::Object) => {
                self.advance();
                self.object_fields()
            }
            TokenKind::Keyword(Keyword::Enum) => {
                self.advance();
                self.enum_variants()
            }
            TokenKind::LParen => {
                self.advance();
                let mut params = Vec::new();
                while !self.check(TokenKind::RParen) {
                    params.push(self.type_expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen)?;
                Ok(TypeNode::Generic {
                    name: "tuple".into(),
                    params,
                })
            }
            TokenKind::Ident => {
                let name = self.advance().lexeme;
                if !self.eat(TokenKind::LBracket) {
                    return Ok(TypeNode::Name(name));
                }
                let mut params = Vec::new();
                while !self.check(TokenKind::RBracket) {
                    let mut ty = self.type_expr()?;
                    // named tuple field `tuple[x: int]`
                    if self.eat(TokenKind::Colon) {
                        ty = self.type_expr()?;
                    }
                    params.push(ty);
                    if !(self.eat(TokenKind::Comma) || self.eat(TokenKind::Semicolon)) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(TypeNode::Generic { name, params })
            }
            _ => Err(self.error("expected a type")),
        }
    }

    fn object_fields(&mut self) -> PResult<TypeNode> {
        let mut fields = Vec::new();
        if !(self.check(TokenKind::Newline) && self.peek_at(1).kind == TokenKind::Indent) {
            return Ok(TypeNode::Object(fields));
        }
        self.advance();
        self.advance();
        loop {
            self.skip_newlines();
            if self.eat(TokenKind::Dedent) {
                break;
            }
            let mut names = vec![self.decl_name()?];
            while self.eat(TokenKind::Comma) {
                names.push(self.decl_name()?);
            }
            self.expect(TokenKind::Colon)?;
            let ty = self.type_expr()?;
            fields.extend(names.into_iter().map(|n| (n, ty.clone())));
            self.end_statement()?;
        }
        Ok(TypeNode::Object(fields))
    }

    fn enum_variants(&mut self) -> PResult<TypeNode> {
        let mut variants = Vec::new();
        let mut next = 0i64;
        let indented = self.check(TokenKind::Newline) && self.peek_at(1).kind == TokenKind::Indent;
        if indented {
            self.advance();
            self.advance();
        }
        loop {
            if indented {
                self.skip_newlines();
                if self.eat(TokenKind::Dedent) {
                    break;
                }
            }
            let name = self.expect_ident()?;
            if self.eat(TokenKind::Assign) {
                let tok = self.expect(TokenKind::Int)?;
                next = parse_int_lexeme(&tok.lexeme)
                    .map(|(v, _)| v)
                    .ok_or_else(|| self.error("invalid enum ordinal"))?;
            }
            variants.push((name, next));
            next += 1;
            if self.eat(TokenKind::Comma) {
                continue;
            }
            if !indented {
                break;
            }
        }
        if variants.is_empty() {
            return Err(self.error("enum needs at least one variant"));
        }
        Ok(TypeNode::Enum(variants))
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    fn expr(&mut self) -> PResult<Expr> {
        self.binary(1)
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.unary()?;
        while let Some((op, width)) = self.peek_binop() {
            if op.precedence() < min_prec {
                break;
            }
            for _ in 0..width {
                self.advance();
            }
            let rhs = self.binary(op.precedence() + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    /// The binary operator at the cursor and how many tokens spell it.
    fn peek_binop(&self) -> Option<(BinOp, usize)> {
        let op = match self.kind() {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::Amp => BinOp::Concat,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::DotDot => BinOp::Range,
            TokenKind::DotDotLt => BinOp::RangeExcl,
            TokenKind::Keyword(Keyword::And) => BinOp::And,
            TokenKind::Keyword(Keyword::Or) => BinOp::Or,
            TokenKind::Keyword(Keyword::Div) => BinOp::IntDiv,
            TokenKind::Keyword(Keyword::Mod) => BinOp::Mod,
            TokenKind::Keyword(Keyword::Shl) => BinOp::Shl,
            TokenKind::Keyword(Keyword::Shr) => BinOp::Shr,
            TokenKind::Keyword(Keyword::In) => BinOp::In,
            TokenKind::Keyword(Keyword::Notin) => BinOp::NotIn,
            TokenKind::Keyword(Keyword::Not) if self.peek_at(1).is_keyword(Keyword::In) => {
                return Some((BinOp::NotIn, 2));
            }
            _ => return None,
        };
        Some((op, 1))
    }

    fn unary(&mut self) -> PResult<Expr> {
        self.nested(Self::unary_inner)
    }

    fn unary_inner(&mut self) -> PResult<Expr> {
        match self.kind() {
            TokenKind::Minus => {
                self.advance();
                let operand = self.unary()?;
                Ok(match operand {
                    Expr::Int { value, suffix } => Expr::Int {
                        value: -value,
                        suffix,
                    },
                    Expr::Float { value, suffix } => Expr::Float {
                        value: -value,
                        suffix,
                    },
                    other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
                })
            }
            TokenKind::Keyword(Keyword::Not) => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            TokenKind::Dollar => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Stringify, Box::new(self.unary()?)))
            }
            TokenKind::Keyword(Keyword::Addr) => {
                self.advance();
                Ok(Expr::Addr(Box::new(self.unary()?)))
            }
            _ => {
                let primary = self.primary()?;
                self.postfix(primary)
            }
        }
    }

    fn postfix(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            match self.kind() {
                TokenKind::LParen => {
                    self.advance();
                    expr = self.call_or_object(expr)?;
                    if self.no_block_sugar == 0
                        && self.check(TokenKind::Colon)
                        && self.peek_at(1).kind == TokenKind::Newline
                    {
                        self.advance();
                        let body = self.block()?;
                        let lambda = Expr::Lambda(Rc::new(ProcDef {
                            name: None,
                            params: Vec::new(),
                            ret: None,
                            body,
                        }));
                        if let Expr::Call { args, .. } = &mut expr {
                            args.push(lambda);
                        }
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    if self.eat(TokenKind::RBracket) {
                        expr = Expr::Deref(Box::new(expr));
                        continue;
                    }
                    let index = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = match index {
                        Expr::Binary(op @ (BinOp::Range | BinOp::RangeExcl), start, end) => {
                            Expr::Slice {
                                target: Box::new(expr),
                                start,
                                end,
                                inclusive: op == BinOp::Range,
                            }
                        }
                        index => Expr::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let field = match self.kind() {
                        TokenKind::Ident => self.advance().lexeme,
                        // `x.type`, `x.len` … allow keyword-named fields
                        TokenKind::Keyword(_) => self.advance().lexeme,
                        _ => return Err(self.error("expected field name after '.'")),
                    };
                    expr = Expr::Dot {
                        target: Box::new(expr),
                        field,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    /// After `callee(`: either a call or, for `Name(field: …)`, an object
    /// construction.
    fn call_or_object(&mut self, callee: Expr) -> PResult<Expr> {
        if let Expr::Ident(ty) = &callee {
            if self.check(TokenKind::Ident) && self.peek_at(1).kind == TokenKind::Colon {
                let ty = ty.clone();
                let fields = self.named_fields(TokenKind::RParen)?;
                return Ok(Expr::Object { ty, fields });
            }
        }
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) {
            args.push(self.expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::call(callee, args))
    }

    /// `name: expr, …` up to and including `close`.
    fn named_fields(&mut self, close: TokenKind) -> PResult<Vec<(String, Expr)>> {
        let mut fields = Vec::new();
        while !self.check(close) {
            let name = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            fields.push((name, self.expr()?));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(fields)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Int => {
                self.advance();
                let (value, suffix) = parse_int_lexeme(&tok.lexeme)
                    .ok_or_else(|| literal_error(&tok, "integer literal out of range"))?;
                // `1'f32` is a float literal
                if suffix.as_deref().is_some_and(|s| s.starts_with('f')) {
                    return Ok(Expr::Float {
                        value: value as f64,
                        suffix,
                    });
                }
                Ok(Expr::Int { value, suffix })
            }
            TokenKind::Float => {
                self.advance();
                let (digits, suffix) = split_suffix(&tok.lexeme);
                let value = digits
                    .replace('_', "")
                    .parse::<f64>()
                    .map_err(|_| literal_error(&tok, "invalid float literal"))?;
                Ok(Expr::Float { value, suffix })
            }
            TokenKind::Str => {
                self.advance();
                Ok(Expr::Str(tok.lexeme))
            }
            TokenKind::Ident => {
                self.advance();
                Ok(Expr::Ident(tok.lexeme))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Keyword(Keyword::Nil) => {
                self.advance();
                Ok(Expr::Nil)
            }
            TokenKind::Keyword(Keyword::Proc | Keyword::Func) => self.lambda(),
            TokenKind::Keyword(Keyword::Cast) => {
                self.advance();
                self.expect(TokenKind::LBracket)?;
                let ty = self.type_expr()?;
                self.expect(TokenKind::RBracket)?;
                self.expect(TokenKind::LParen)?;
                let expr = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Cast {
                    ty,
                    expr: Box::new(expr),
                })
            }
            TokenKind::LParen => {
                self.advance();
                self.paren_expr()
            }
            TokenKind::At => {
                self.advance();
                if !self.check(TokenKind::LBracket) {
                    return Err(self.error("expected '[' after '@'"));
                }
                self.primary()
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(TokenKind::RBracket) {
                    items.push(self.expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::Array(items))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.check(TokenKind::RBrace) {
                    let key = if self.check(TokenKind::Ident)
                        && self.peek_at(1).kind == TokenKind::Colon
                    {
                        Expr::Str(self.advance().lexeme)
                    } else {
                        self.expr()?
                    };
                    self.expect(TokenKind::Colon)?;
                    entries.push((key, self.expr()?));
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Expr::Map(entries))
            }
            _ => Err(self.error("expected expression")),
        }
    }

    /// After `(`: empty tuple, named tuple, tuple, or grouping.
    fn paren_expr(&mut self) -> PResult<Expr> {
        if self.eat(TokenKind::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        if self.check(TokenKind::Ident) && self.peek_at(1).kind == TokenKind::Colon {
            return Ok(Expr::NamedTuple(self.named_fields(TokenKind::RParen)?));
        }
        let first = self.expr()?;
        if !self.eat(TokenKind::Comma) {
            self.expect(TokenKind::RParen)?;
            return Ok(first);
        }
        let mut items = vec![first];
        while !self.check(TokenKind::RParen) {
            items.push(self.expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Tuple(items))
    }
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) | Expr::Index { .. } | Expr::Dot { .. } | Expr::Deref(_) => true,
        Expr::Tuple(items) => !items.is_empty() && items.iter().all(is_assignable),
        _ => false,
    }
}

fn literal_error(tok: &Token, message: &str) -> ParseError {
    ParseError {
        message: message.into(),
        found: tok.to_string(),
        line: tok.line,
        col: tok.col,
    }
}

/// Split `1.5'f32` into `("1.5", Some("f32"))`.
fn split_suffix(lexeme: &str) -> (&str, Option<String>) {
    match lexeme.split_once('\'') {
        Some((digits, suffix)) => (digits, Some(suffix.to_string())),
        None => (lexeme, None),
    }
}

/// Decode an integer lexeme (decimal/hex/octal/binary, `_` separators,
/// optional suffix).
pub(crate) fn parse_int_lexeme(lexeme: &str) -> Option<(i64, Option<String>)> {
    let (digits, suffix) = split_suffix(lexeme);
    let digits = digits.replace('_', "");
    let (radix, body) = match digits.get(..2) {
        Some("0x" | "0X") => (16, &digits[2..]),
        Some("0o" | "0O") => (8, &digits[2..]),
        Some("0b" | "0B") => (2, &digits[2..]),
        _ => (10, digits.as_str()),
    };
    i64::from_str_radix(body, radix).ok().map(|v| (v, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::Dialect;
    use crate::script::lexer::tokenize;

    fn parse_src(src: &str) -> Program {
        let tokens = tokenize(src, Dialect::Canonical).expect("lex failed");
        parse(&tokens).expect("parse failed")
    }

    fn parse_err(src: &str) -> ParseError {
        let tokens = tokenize(src, Dialect::Canonical).expect("lex failed");
        parse(&tokens).expect_err("expected parse error")
    }

    fn single_expr(src: &str) -> Expr {
        match parse_src(src).stmts.into_iter().next() {
            Some(Stmt::Expr(e)) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_climbing() {
        let e = single_expr("1 + 2 * 3");
        assert_eq!(
            e,
            Expr::binary(
                BinOp::Add,
                Expr::int(1),
                Expr::binary(BinOp::Mul, Expr::int(2), Expr::int(3))
            )
        );
    }

    #[test]
    fn left_associative() {
        let e = single_expr("10 - 4 - 3");
        assert_eq!(
            e,
            Expr::binary(
                BinOp::Sub,
                Expr::binary(BinOp::Sub, Expr::int(10), Expr::int(4)),
                Expr::int(3)
            )
        );
    }

    #[test]
    fn logical_and_comparison_levels() {
        let e = single_expr("a < b and c or d");
        let Expr::Binary(BinOp::Or, lhs, _) = e else {
            panic!("expected or at the top");
        };
        let Expr::Binary(BinOp::And, cmp, _) = *lhs else {
            panic!("expected and under or");
        };
        assert!(matches!(*cmp, Expr::Binary(BinOp::Lt, _, _)));
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let e = single_expr("not a == b");
        assert!(matches!(e, Expr::Binary(BinOp::Eq, ref l, _) if matches!(**l, Expr::Unary(UnaryOp::Not, _))));
        assert_eq!(single_expr("-3"), Expr::int(-3));
    }

    #[test]
    fn range_and_membership() {
        assert!(matches!(single_expr("0 ..< n"), Expr::Binary(BinOp::RangeExcl, _, _)));
        assert!(matches!(single_expr("x in xs"), Expr::Binary(BinOp::In, _, _)));
        assert!(matches!(single_expr("x not in xs"), Expr::Binary(BinOp::NotIn, _, _)));
        assert!(matches!(single_expr("x notin xs"), Expr::Binary(BinOp::NotIn, _, _)));
    }

    #[test]
    fn tuples_and_grouping() {
        assert_eq!(single_expr("(1)"), Expr::int(1));
        assert_eq!(single_expr("(1, 2)"), Expr::Tuple(vec![Expr::int(1), Expr::int(2)]));
        assert_eq!(single_expr("()"), Expr::Tuple(vec![]));
        assert_eq!(
            single_expr("(x: 1, y: 2)"),
            Expr::NamedTuple(vec![("x".into(), Expr::int(1)), ("y".into(), Expr::int(2))])
        );
    }

    #[test]
    fn object_construction() {
        assert_eq!(
            single_expr("Point(x: 1, y: 2)"),
            Expr::Object {
                ty: "Point".into(),
                fields: vec![("x".into(), Expr::int(1)), ("y".into(), Expr::int(2))]
            }
        );
    }

    #[test]
    fn map_literal_bare_keys_are_strings() {
        assert_eq!(
            single_expr("{a: 1, \"b\": 2}"),
            Expr::Map(vec![
                (Expr::Str("a".into()), Expr::int(1)),
                (Expr::Str("b".into()), Expr::int(2))
            ])
        );
    }

    #[test]
    fn slices_index_and_deref() {
        assert!(matches!(single_expr("a[1..2]"), Expr::Slice { inclusive: true, .. }));
        assert!(matches!(single_expr("a[1..<2]"), Expr::Slice { inclusive: false, .. }));
        assert!(matches!(single_expr("a[0]"), Expr::Index { .. }));
        assert!(matches!(single_expr("p[]"), Expr::Deref(_)));
    }

    #[test]
    fn numeric_suffixes() {
        assert_eq!(
            single_expr("7'i32"),
            Expr::Int {
                value: 7,
                suffix: Some("i32".into())
            }
        );
        assert_eq!(
            single_expr("2'f32"),
            Expr::Float {
                value: 2.0,
                suffix: Some("f32".into())
            }
        );
        assert_eq!(single_expr("0x1F"), Expr::int(31));
    }

    #[test]
    fn command_syntax() {
        assert_eq!(
            single_expr("echo \"hi\", x"),
            Expr::call(Expr::ident("echo"), vec![Expr::Str("hi".into()), Expr::ident("x")])
        );
    }

    #[test]
    fn method_call_chain() {
        let e = single_expr("s.strip().toUpper()");
        let Expr::Call { callee, args } = e else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert!(matches!(*callee, Expr::Dot { ref field, .. } if field == "toUpper"));
    }

    #[test]
    fn declarations() {
        let p = parse_src("var x = 1\nlet a, b: int\nconst (p, q) = (1, 2)");
        assert_eq!(p.stmts.len(), 3);
        assert!(matches!(&p.stmts[1], Stmt::Decl { kind: DeclKind::Let, names, ty: Some(_), value: None, .. } if names.len() == 2));
        assert!(matches!(&p.stmts[2], Stmt::Decl { unpack: true, .. }));
    }

    #[test]
    fn declaration_block_form() {
        let p = parse_src("var\n  a = 1\n  b = 2\necho(a)");
        assert_eq!(p.stmts.len(), 3);
    }

    #[test]
    fn assignments() {
        let p = parse_src("x = 1\nx += 2\na[0] = 3\np.x = 4\n(a, b) = (b, a)\nr[] = 5");
        assert_eq!(p.stmts.len(), 6);
        assert!(matches!(&p.stmts[1], Stmt::Assign { op: Some(BinOp::Add), .. }));
        assert!(matches!(&p.stmts[4], Stmt::Assign { target: Expr::Tuple(_), .. }));
    }

    #[test]
    fn invalid_assignment_target() {
        let e = parse_err("1 + 2 = 3");
        assert_eq!(e.message, "invalid assignment target");
        assert_eq!((e.line, e.col), (1, 1));
    }

    #[test]
    fn if_elif_else() {
        let p = parse_src("if a:\n  x\nelif b:\n  y\nelse:\n  z\n");
        let Stmt::If { branches, else_body } = &p.stmts[0] else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert!(else_body.is_some());
    }

    #[test]
    fn single_line_bodies() {
        let p = parse_src("if a: x = 1\nwhile b: c(); d()\n");
        assert_eq!(p.stmts.len(), 2);
        let Stmt::While { body, .. } = &p.stmts[1] else {
            panic!("expected while");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn case_statement() {
        let src = "case x\nof 1, 2:\n  a\nof 3..5: b\nelif y: c\nelse:\n  d\n";
        let Stmt::Case {
            branches,
            elifs,
            else_body,
            ..
        } = &parse_src(src).stmts[0]
        else {
            panic!("expected case");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].values.len(), 2);
        assert_eq!(elifs.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn indented_case_branches() {
        let src = "case x:\n  of 1: a\n  else: b\necho(1)\n";
        assert_eq!(parse_src(src).stmts.len(), 2);
    }

    #[test]
    fn labeled_loops_and_blocks() {
        let src = "outer: for i in 0..<3:\n  while true:\n    break outer\nblock done:\n  continue\n";
        let p = parse_src(src);
        assert!(matches!(&p.stmts[0], Stmt::For { label: Some(l), .. } if l == "outer"));
        assert!(matches!(&p.stmts[1], Stmt::Block { label: Some(l), .. } if l == "done"));
    }

    #[test]
    fn for_with_two_bindings() {
        let p = parse_src("for i, x in xs:\n  echo(i)\n");
        assert!(matches!(&p.stmts[0], Stmt::For { vars, .. } if vars.len() == 2));
    }

    #[test]
    fn proc_definitions() {
        let src = "proc add(a, b: int; c = 1): int =\n  a + b + c\nproc bump(var x: int) =\n  x += 1\nproc inc(var y) = y += 1\n";
        let p = parse_src(src);
        let Stmt::Proc(def) = &p.stmts[0] else {
            panic!("expected proc");
        };
        assert_eq!(def.params.len(), 3);
        assert_eq!(def.params[0].ty, Some(TypeNode::name("int")));
        assert!(def.params[2].default.is_some());
        assert_eq!(def.ret, Some(TypeNode::name("int")));
        let Stmt::Proc(bump) = &p.stmts[1] else {
            panic!("expected proc");
        };
        assert!(bump.params[0].is_var);
        let Stmt::Proc(inc) = &p.stmts[2] else {
            panic!("expected proc");
        };
        assert!(inc.params[0].is_var);
    }

    #[test]
    fn lambda_expression_body_returns() {
        let e = single_expr("proc (x) = x * 2");
        let Expr::Lambda(def) = e else {
            panic!("expected lambda");
        };
        assert!(matches!(def.body.as_slice(), [Stmt::Return(Some(_))]));
    }

    #[test]
    fn trailing_block_sugar() {
        let p = parse_src("every(2):\n  tick()\n");
        let Stmt::Expr(Expr::Call { args, .. }) = &p.stmts[0] else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(&args[1], Expr::Lambda(def) if def.params.is_empty() && def.body.len() == 1));
    }

    #[test]
    fn trailing_block_sugar_disabled_in_heads() {
        let p = parse_src("if ready():\n  go()\n");
        let Stmt::If { branches, .. } = &p.stmts[0] else {
            panic!("expected if");
        };
        assert!(matches!(&branches[0].0, Expr::Call { args, .. } if args.is_empty()));
    }

    #[test]
    fn type_declarations() {
        let src = "type\n  Point = object\n    x, y: float\n  Color = enum\n    red, green = 5, blue\n  Ids = seq[int]\n  P = ref Point\n";
        let Stmt::Type(defs) = &parse_src(src).stmts[0] else {
            panic!("expected type");
        };
        assert_eq!(defs.len(), 4);
        assert!(matches!(&defs[0].ty, TypeNode::Object(f) if f.len() == 2));
        assert_eq!(
            defs[1].ty,
            TypeNode::Enum(vec![("red".into(), 0), ("green".into(), 5), ("blue".into(), 6)])
        );
        assert!(matches!(&defs[2].ty, TypeNode::Generic { name, .. } if name == "seq"));
        assert!(matches!(&defs[3].ty, TypeNode::Pointer(_)));
    }

    #[test]
    fn defer_and_discard() {
        let p = parse_src("defer: cleanup()\ndefer:\n  a()\n  b()\ndiscard f()\n");
        assert!(matches!(&p.stmts[0], Stmt::Defer(b) if b.len() == 1));
        assert!(matches!(&p.stmts[1], Stmt::Defer(b) if b.len() == 2));
        assert!(matches!(&p.stmts[2], Stmt::Discard(Some(_))));
    }

    #[test]
    fn cast_and_addr() {
        assert!(matches!(single_expr("cast[int](x)"), Expr::Cast { .. }));
        assert!(matches!(single_expr("addr x"), Expr::Addr(_)));
        assert!(matches!(single_expr("$x"), Expr::Unary(UnaryOp::Stringify, _)));
    }

    #[test]
    fn error_carries_position_and_token() {
        let e = parse_err("var x = 1\nif x\n  y\n");
        assert_eq!(e.line, 2);
        assert_eq!(e.message, "expected ':'");
        assert_eq!(e.found, "newline");
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let deep = format!("echo({}1{})", "(".repeat(10_000), ")".repeat(10_000));
        let e = parse_err(&deep);
        assert!(e.message.starts_with("nesting is too deep"), "{}", e.message);

        let mut blocks = String::new();
        for level in 0..MAX_NESTING_DEPTH + 1 {
            blocks.push_str(&format!("{}if true:\n", "  ".repeat(level)));
        }
        blocks.push_str(&format!("{}echo(1)\n", "  ".repeat(MAX_NESTING_DEPTH + 1)));
        assert!(parse_err(&blocks).message.starts_with("nesting is too deep"));

        let shallow = format!("echo({}1{})", "(".repeat(40), ")".repeat(40));
        assert_eq!(parse_src(&shallow).stmts.len(), 1);
    }

    #[test]
    fn missing_expression() {
        let e = parse_err("var x = ");
        assert_eq!(e.message, "expected expression");
    }

    #[test]
    fn parse_is_deterministic() {
        let src = "proc f(x: int): int =\n  result = x * 2\nfor i in 0..<3:\n  echo(f(i))\n";
        assert_eq!(parse_src(src), parse_src(src));
    }

    #[test]
    fn int_lexeme_decoding() {
        assert_eq!(parse_int_lexeme("1_000"), Some((1000, None)));
        assert_eq!(parse_int_lexeme("0b101"), Some((5, None)));
        assert_eq!(parse_int_lexeme("0o17'u8"), Some((15, Some("u8".into()))));
        assert_eq!(parse_int_lexeme("99999999999999999999"), None);
    }
}
