//! JS-flavoured dialect: token remap onto the canonical vocabulary.
//!
//! The lexer already turned block braces into `:` NEWLINE INDENT … DEDENT
//! and statement `;` into NEWLINE.  What is left runs as a few passes:
//!
//! 1. names and operators (`function`, `let`/`const`, `null`, `&&`, `===`,
//!    `console.log`, `Math.*`, method renames, `else if`);
//! 2. `for (…)` heads, both `of`/`in` and counting loops;
//! 3. arrow functions;
//! 4. parentheses around `if`/`elif`/`while` conditions, and braceless
//!    `else`;
//! 5. `++`/`--`.

use super::python::matching_close;
use crate::script::token::{Keyword, Token, TokenKind};

const METHOD_RENAMES: &[(&str, &str)] = &[
    ("length", "len"),
    ("push", "add"),
    ("toUpperCase", "toUpper"),
    ("toLowerCase", "toLower"),
    ("trim", "strip"),
    ("includes", "contains"),
    ("indexOf", "find"),
];

pub(super) fn remap(tokens: Vec<Token>) -> Vec<Token> {
    let tokens = rewrite_names(tokens);
    let tokens = rewrite_for_heads(tokens);
    let tokens = rewrite_arrows(tokens);
    let tokens = rewrite_conditions(tokens);
    rewrite_increments(tokens)
}

fn kind_at(tokens: &[Token], i: usize) -> Option<TokenKind> {
    tokens.get(i).map(|t| t.kind)
}

// ── Pass 1: names and operators ───────────────────────────────────────────────

fn rewrite_names(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        let member = |name: &str| {
            kind_at(&tokens, i + 1) == Some(TokenKind::Dot)
                && tokens.get(i + 2).is_some_and(|m| m.kind == TokenKind::Ident)
                && t.lexeme == name
        };
        let kw = |k: Keyword| Token::keyword(k, t);
        let op = |k: TokenKind, lexeme: &str| Token::synthetic(k, lexeme, t);

        let replacement = match t.kind {
            TokenKind::Ident if member("console") && tokens[i + 2].lexeme == "log" => {
                i += 2;
                Token::synthetic(TokenKind::Ident, "echo", t)
            }
            TokenKind::Ident if member("Math") => {
                i += 2;
                tokens[i].clone()
            }
            TokenKind::Ident => match t.lexeme.as_str() {
                "function" => kw(Keyword::Proc),
                "let" | "var" => kw(Keyword::Var),
                "const" => kw(Keyword::Let),
                "true" => kw(Keyword::True),
                "false" => kw(Keyword::False),
                "null" | "undefined" => kw(Keyword::Nil),
                "String" if kind_at(&tokens, i + 1) == Some(TokenKind::LParen) => {
                    Token::synthetic(TokenKind::Ident, "str", t)
                }
                "Number" if kind_at(&tokens, i + 1) == Some(TokenKind::LParen) => {
                    Token::synthetic(TokenKind::Ident, "parseFloat", t)
                }
                _ => t.clone(),
            },
            TokenKind::Dot => match tokens.get(i + 1) {
                Some(m) if m.kind == TokenKind::Ident => {
                    out.push(t.clone());
                    i += 1;
                    match METHOD_RENAMES.iter().find(|(from, _)| *from == m.lexeme) {
                        Some((_, to)) => Token::synthetic(TokenKind::Ident, *to, m),
                        None => m.clone(),
                    }
                }
                _ => t.clone(),
            },
            TokenKind::Keyword(Keyword::Else)
                if kind_at(&tokens, i + 1) == Some(TokenKind::Keyword(Keyword::If)) =>
            {
                i += 1;
                kw(Keyword::Elif)
            }
            TokenKind::AndAnd => kw(Keyword::And),
            TokenKind::OrOr => kw(Keyword::Or),
            TokenKind::Bang => kw(Keyword::Not),
            TokenKind::StrictEq => op(TokenKind::EqEq, "=="),
            TokenKind::StrictNotEq => op(TokenKind::NotEq, "!="),
            _ => t.clone(),
        };
        out.push(replacement);
        i += 1;
    }
    out
}

// ── Pass 2: for heads ─────────────────────────────────────────────────────────

fn rewrite_for_heads(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        if t.is_keyword(Keyword::For) && kind_at(&tokens, i + 1) == Some(TokenKind::LParen) {
            if let Some(close) = matching_close(&tokens, i + 1) {
                let head = &tokens[i + 2..close];
                let rewritten = iteration_head(head).or_else(|| counting_head(head));
                if let Some(mut head) = rewritten {
                    out.push(t.clone());
                    out.append(&mut head);
                    if kind_at(&tokens, close + 1) != Some(TokenKind::Colon) {
                        out.push(Token::synthetic(TokenKind::Colon, ":", &tokens[close]));
                    }
                    i = close + 1;
                    continue;
                }
            }
        }
        out.push(t.clone());
        i += 1;
    }
    out
}

fn skip_decl_keyword(head: &[Token]) -> &[Token] {
    match head.first() {
        Some(t) if t.is_keyword(Keyword::Var) || t.is_keyword(Keyword::Let) => &head[1..],
        _ => head,
    }
}

/// `const x of xs` / `let k in obj` → `x in xs`.
fn iteration_head(head: &[Token]) -> Option<Vec<Token>> {
    let head = skip_decl_keyword(head);
    let [var, sep, rest @ ..] = head else {
        return None;
    };
    if var.kind != TokenKind::Ident || rest.is_empty() {
        return None;
    }
    if !(sep.is_ident("of") || sep.is_keyword(Keyword::In)) {
        return None;
    }
    let mut out = vec![var.clone(), Token::keyword(Keyword::In, sep)];
    out.extend_from_slice(rest);
    Some(out)
}

/// `let i = a; i < b; i++` → `i in a ..< b` (`<=` gives `..`).
fn counting_head(head: &[Token]) -> Option<Vec<Token>> {
    let parts: Vec<&[Token]> = head.split(|t| t.kind == TokenKind::Semicolon).collect();
    let [init, cond, step] = parts.as_slice() else {
        return None;
    };

    let init = skip_decl_keyword(init);
    let [var, assign, start @ ..] = init else {
        return None;
    };
    if var.kind != TokenKind::Ident || assign.kind != TokenKind::Assign || start.is_empty() {
        return None;
    }

    let [cvar, cmp, end @ ..] = *cond else {
        return None;
    };
    if cvar.lexeme != var.lexeme || end.is_empty() {
        return None;
    }
    let range = match cmp.kind {
        TokenKind::Lt => Token::synthetic(TokenKind::DotDotLt, "..<", cmp),
        TokenKind::Le => Token::synthetic(TokenKind::DotDot, "..", cmp),
        _ => return None,
    };

    let steps_by_one = match *step {
        [a, b] => {
            (a.lexeme == var.lexeme && b.kind == TokenKind::PlusPlus)
                || (a.kind == TokenKind::PlusPlus && b.lexeme == var.lexeme)
        }
        [a, b, c] => {
            a.lexeme == var.lexeme && b.kind == TokenKind::PlusAssign && c.lexeme == "1"
        }
        _ => false,
    };
    if !steps_by_one {
        return None;
    }

    let mut out = vec![var.clone(), Token::keyword(Keyword::In, var)];
    out.extend_from_slice(start);
    out.push(range);
    out.extend_from_slice(end);
    Some(out)
}

// ── Pass 3: arrow functions ───────────────────────────────────────────────────

fn rewrite_arrows(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for (i, t) in tokens.iter().enumerate() {
        if t.kind != TokenKind::Arrow {
            out.push(t.clone());
            continue;
        }
        match out.last().map(|p| p.kind) {
            Some(TokenKind::RParen) => {
                if let Some(open) = matching_open(&out, out.len() - 1) {
                    out.insert(open, Token::keyword(Keyword::Proc, &out[open].clone()));
                }
            }
            Some(TokenKind::Ident) => {
                if let Some(param) = out.pop() {
                    out.push(Token::keyword(Keyword::Proc, &param));
                    out.push(Token::synthetic(TokenKind::LParen, "(", &param));
                    out.push(param.clone());
                    out.push(Token::synthetic(TokenKind::RParen, ")", &param));
                }
            }
            _ => {}
        }
        // A block body already starts with `:`.
        if kind_at(&tokens, i + 1) != Some(TokenKind::Colon) {
            out.push(Token::synthetic(TokenKind::Assign, "=", t));
        }
    }
    out
}

fn matching_open(tokens: &[Token], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        match tokens[i].kind {
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth += 1,
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Pass 4: condition parentheses ─────────────────────────────────────────────

fn starts_statement(t: &Token) -> bool {
    match t.kind {
        TokenKind::Ident => true,
        TokenKind::Keyword(k) => matches!(
            k,
            Keyword::Return
                | Keyword::Break
                | Keyword::Continue
                | Keyword::Var
                | Keyword::Let
                | Keyword::Const
                | Keyword::Discard
                | Keyword::If
                | Keyword::While
                | Keyword::For
        ),
        _ => false,
    }
}

fn rewrite_conditions(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        let is_head = t.is_keyword(Keyword::If) || t.is_keyword(Keyword::Elif) || t.is_keyword(Keyword::While);

        if is_head && kind_at(&tokens, i + 1) == Some(TokenKind::LParen) {
            if let Some(close) = matching_close(&tokens, i + 1) {
                match tokens.get(close + 1) {
                    Some(n) if n.kind == TokenKind::Colon => {
                        out.push(t.clone());
                        out.extend_from_slice(&tokens[i + 2..close]);
                        i = close + 1;
                        continue;
                    }
                    Some(n) if starts_statement(n) => {
                        out.push(t.clone());
                        out.extend_from_slice(&tokens[i + 2..close]);
                        out.push(Token::synthetic(TokenKind::Colon, ":", &tokens[close]));
                        i = close + 1;
                        continue;
                    }
                    _ => {}
                }
            }
        }

        out.push(t.clone());
        if t.is_keyword(Keyword::Else) && kind_at(&tokens, i + 1) != Some(TokenKind::Colon) {
            out.push(Token::synthetic(TokenKind::Colon, ":", t));
        }
        i += 1;
    }
    out
}

// ── Pass 5: increments ────────────────────────────────────────────────────────

fn rewrite_increments(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        let compound = match t.kind {
            TokenKind::PlusPlus => Some((TokenKind::PlusAssign, "+=")),
            TokenKind::MinusMinus => Some((TokenKind::MinusAssign, "-=")),
            _ => None,
        };
        let Some((kind, lexeme)) = compound else {
            out.push(t.clone());
            i += 1;
            continue;
        };
        // Prefix form: move the operand in front.
        if out.last().map(|p| p.kind) != Some(TokenKind::Ident) {
            if let Some(operand) = tokens.get(i + 1).filter(|n| n.kind == TokenKind::Ident) {
                out.push(operand.clone());
                i += 1;
            }
        }
        out.push(Token::synthetic(kind, lexeme, t));
        out.push(Token::synthetic(TokenKind::Int, "1", t));
        i += 1;
    }
    out
}
