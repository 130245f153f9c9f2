//! Python-flavoured dialect: token remap onto the canonical vocabulary.
//!
//! The lexer has already produced INDENT/DEDENT, so the rewrite is purely
//! lexical: `def` → `proc`, `->` → `:`, `True/False/None`, `pass` →
//! `discard`, `//` → `div`, `is`/`is not`, `lambda x: e` → `proc (x) = e`,
//! `a[i:j]` → `a[i ..< j]`, a handful of method renames, and
//! `"sep".join(xs)` → `join(xs, "sep")`.  `global`/`nonlocal` lines are
//! dropped since assignment already reaches outer bindings.

use crate::script::token::{Keyword, Token, TokenKind};

/// End bound used for an open-ended slice (`a[i:]`); slicing clamps it.
const OPEN_END: &str = "9223372036854775807";

const METHOD_RENAMES: &[(&str, &str)] = &[
    ("upper", "toUpper"),
    ("lower", "toLower"),
    ("append", "add"),
    ("startswith", "startsWith"),
    ("endswith", "endsWith"),
];

pub(super) fn remap(tokens: Vec<Token>) -> Vec<Token> {
    let tokens = drop_scope_declarations(tokens);
    let tokens = rewrite_calls(tokens);
    translate(tokens)
}

fn starts_line(prev: Option<&Token>) -> bool {
    matches!(
        prev.map(|t| t.kind),
        None | Some(TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
    )
}

/// Index of the token closing the bracket opened at `open`.
pub(super) fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        match t.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
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

fn drop_scope_declarations(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut skipping = false;
    for t in tokens {
        if skipping {
            if matches!(t.kind, TokenKind::Newline | TokenKind::Eof) {
                skipping = false;
                if t.kind == TokenKind::Eof {
                    out.push(t);
                }
            }
            continue;
        }
        if (t.is_ident("global") || t.is_ident("nonlocal")) && starts_line(out.last()) {
            skipping = true;
            continue;
        }
        out.push(t);
    }
    out
}

/// `"sep".join(xs)` → `join(xs, "sep")`; `enumerate(xs)` → `xs`.
fn rewrite_calls(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        let kind_at = |k: usize| tokens.get(k).map(|t| t.kind);

        if t.kind == TokenKind::Str
            && kind_at(i + 1) == Some(TokenKind::Dot)
            && tokens.get(i + 2).is_some_and(|t| t.is_ident("join"))
            && kind_at(i + 3) == Some(TokenKind::LParen)
        {
            if let Some(close) = matching_close(&tokens, i + 3) {
                out.push(tokens[i + 2].clone());
                out.push(tokens[i + 3].clone());
                out.extend(rewrite_calls(tokens[i + 4..close].to_vec()));
                out.push(Token::synthetic(TokenKind::Comma, ",", t));
                out.push(t.clone());
                out.push(tokens[close].clone());
                i = close + 1;
                continue;
            }
        }

        if t.is_ident("enumerate") && kind_at(i + 1) == Some(TokenKind::LParen) {
            if let Some(close) = matching_close(&tokens, i + 1) {
                out.extend(rewrite_calls(tokens[i + 2..close].to_vec()));
                i = close + 1;
                continue;
            }
        }

        out.push(t.clone());
        i += 1;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Open {
    Group,
    Index,
    Literal,
}

fn translate(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut opens: Vec<Open> = Vec::new();
    // Bracket depth at which each pending `lambda` waits for its `:`.
    let mut lambdas: Vec<usize> = Vec::new();
    let mut in_def_header = false;
    let mut i = 0;

    while i < tokens.len() {
        let t = &tokens[i];
        let next = tokens.get(i + 1);
        match t.kind {
            TokenKind::Ident => match t.lexeme.as_str() {
                "def" => {
                    in_def_header = true;
                    out.push(Token::keyword(Keyword::Proc, t));
                }
                "True" => out.push(Token::keyword(Keyword::True, t)),
                "False" => out.push(Token::keyword(Keyword::False, t)),
                "None" => out.push(Token::keyword(Keyword::Nil, t)),
                "pass" => out.push(Token::keyword(Keyword::Discard, t)),
                "is" => {
                    if next.is_some_and(|n| n.is_keyword(Keyword::Not)) {
                        out.push(Token::synthetic(TokenKind::NotEq, "!=", t));
                        i += 1;
                    } else {
                        out.push(Token::synthetic(TokenKind::EqEq, "==", t));
                    }
                }
                "lambda" => {
                    out.push(Token::keyword(Keyword::Proc, t));
                    out.push(Token::synthetic(TokenKind::LParen, "(", t));
                    lambdas.push(opens.len());
                }
                _ => out.push(t.clone()),
            },

            TokenKind::Minus if in_def_header && next.is_some_and(|n| n.kind == TokenKind::Gt) => {
                out.push(Token::synthetic(TokenKind::Colon, ":", t));
                i += 1;
            }

            TokenKind::SlashSlash => out.push(Token::keyword(Keyword::Div, t)),

            TokenKind::Newline => {
                in_def_header = false;
                out.push(t.clone());
            }

            TokenKind::LParen | TokenKind::LBrace => {
                opens.push(Open::Group);
                out.push(t.clone());
            }
            TokenKind::LBracket => {
                let indexes = matches!(
                    out.last().map(|p| p.kind),
                    Some(TokenKind::Ident | TokenKind::RParen | TokenKind::RBracket | TokenKind::Str)
                );
                opens.push(if indexes { Open::Index } else { Open::Literal });
                out.push(t.clone());
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                opens.pop();
                out.push(t.clone());
            }

            TokenKind::Colon if lambdas.last() == Some(&opens.len()) => {
                lambdas.pop();
                out.push(Token::synthetic(TokenKind::RParen, ")", t));
                out.push(Token::synthetic(TokenKind::Assign, "=", t));
            }

            TokenKind::Colon if opens.last() == Some(&Open::Index) => {
                if out.last().is_some_and(|p| p.kind == TokenKind::LBracket) {
                    out.push(Token::synthetic(TokenKind::Int, "0", t));
                }
                out.push(Token::synthetic(TokenKind::DotDotLt, "..<", t));
                if next.is_some_and(|n| n.kind == TokenKind::RBracket) {
                    out.push(Token::synthetic(TokenKind::Int, OPEN_END, t));
                }
            }

            TokenKind::Dot => {
                let method = next.filter(|n| n.kind == TokenKind::Ident);
                match method.map(|m| m.lexeme.as_str()) {
                    Some("items")
                        if tokens.get(i + 2).map(|t| t.kind) == Some(TokenKind::LParen)
                            && tokens.get(i + 3).map(|t| t.kind) == Some(TokenKind::RParen) =>
                    {
                        i += 4;
                        continue;
                    }
                    Some(name) => {
                        out.push(t.clone());
                        let renamed = METHOD_RENAMES
                            .iter()
                            .find(|(from, _)| *from == name)
                            .map_or(name, |(_, to)| *to);
                        out.push(Token::synthetic(TokenKind::Ident, renamed, &tokens[i + 1]));
                        i += 1;
                    }
                    None => out.push(t.clone()),
                }
            }

            _ => out.push(t.clone()),
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{tokenize, Dialect};

    fn lexemes(src: &str) -> Vec<String> {
        tokenize(src, Dialect::Python)
            .expect("lex failed")
            .into_iter()
            .filter(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Eof))
            .map(|t| t.lexeme)
            .collect()
    }

    #[test]
    fn def_and_return_annotation() {
        let toks = tokenize("def f(x: int) -> int:\n    return x\n", Dialect::Python).unwrap();
        assert!(toks[0].is_keyword(Keyword::Proc));
        let colons = toks.iter().filter(|t| t.kind == TokenKind::Colon).count();
        assert_eq!(colons, 3);
        assert!(!toks.iter().any(|t| t.kind == TokenKind::Gt));
    }

    #[test]
    fn constants_and_operators() {
        assert_eq!(
            lexemes("x = None if a is not b else True // 2"),
            vec!["x", "=", "nil", "if", "a", "!=", "b", "else", "true", "div", "2"]
        );
    }

    #[test]
    fn lambda_becomes_proc() {
        assert_eq!(
            lexemes("f = lambda a, b: a + b"),
            vec!["f", "=", "proc", "(", "a", ",", "b", ")", "=", "a", "+", "b"]
        );
    }

    #[test]
    fn slices() {
        assert_eq!(lexemes("a[1:3]"), vec!["a", "[", "1", "..<", "3", "]"]);
        assert_eq!(lexemes("a[:2]"), vec!["a", "[", "0", "..<", "2", "]"]);
        assert_eq!(lexemes("a[2:]"), vec!["a", "[", "2", "..<", OPEN_END, "]"]);
    }

    #[test]
    fn dict_colons_untouched() {
        assert_eq!(lexemes("[{1: 2}]"), vec!["[", "{", "1", ":", "2", "}", "]"]);
    }

    #[test]
    fn method_renames_and_join() {
        assert_eq!(lexemes("s.upper()"), vec!["s", ".", "toUpper", "(", ")"]);
        assert_eq!(lexemes("xs.append(1)"), vec!["xs", ".", "add", "(", "1", ")"]);
        assert_eq!(
            lexemes("\", \".join(xs)"),
            vec!["join", "(", "xs", ",", ", ", ")"]
        );
        assert_eq!(lexemes("for k, v in d.items():"), vec!["for", "k", ",", "v", "in", "d", ":"]);
        assert_eq!(lexemes("enumerate(xs)"), vec!["xs"]);
    }

    #[test]
    fn global_lines_are_dropped() {
        let toks = lexemes("def f():\n    global n\n    n = 1\n");
        assert!(!toks.iter().any(|l| l == "global"));
        assert!(toks.iter().any(|l| l == "n"));
    }
}
