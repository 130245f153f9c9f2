//! Nim backend.  The canonical dialect is close to Nim already, so most
//! constructs map one to one; `defer` and `result` are native, labeled
//! `continue` goes through a second `block`.

use super::{Backend, BackendKind, Context, ForIter, LabelStyle, NumKind, ParamText};
use crate::script::ast::{BinOp, DeclKind, TypeNode, UnaryOp};

pub(super) struct Nim;

fn params(params: &[ParamText]) -> String {
    params
        .iter()
        .map(|p| {
            let ty = p.ty.as_ref().map(TypeNode::to_string);
            let mut out = p.name.clone();
            match (&ty, &p.default, p.is_var) {
                (_, _, true) => out.push_str(&format!(": var {}", ty.as_deref().unwrap_or("auto"))),
                (Some(t), _, false) => out.push_str(&format!(": {t}")),
                (None, Some(_), false) => {}
                (None, None, false) => out.push_str(": auto"),
            }
            if let Some(d) = &p.default {
                out.push_str(&format!(" = {d}"));
            }
            out
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl Backend for Nim {
    fn kind(&self) -> BackendKind {
        BackendKind::Nim
    }

    fn int_literal(&self, value: i64, suffix: Option<&str>) -> String {
        match suffix {
            Some(s) => format!("{value}'{s}"),
            None => value.to_string(),
        }
    }

    fn float_literal(&self, value: f64, suffix: Option<&str>) -> String {
        let text = super::float_text(value);
        match suffix {
            Some(s) => format!("{text}'{s}"),
            None => text,
        }
    }

    fn bool_literal(&self, value: bool) -> String {
        value.to_string()
    }

    fn nil_literal(&self) -> String {
        "nil".into()
    }

    fn unary(&self, op: UnaryOp, operand: &str) -> String {
        match op {
            UnaryOp::Neg => format!("-{operand}"),
            UnaryOp::Not => format!("not {operand}"),
            UnaryOp::Stringify => format!("${operand}"),
        }
    }

    fn binary(&self, _ctx: &mut Context, op: BinOp, lhs: &str, rhs: &str, kinds: [NumKind; 2]) -> String {
        match op {
            BinOp::Div if kinds == [NumKind::Int, NumKind::Int] => format!("{lhs} div {rhs}"),
            BinOp::Range | BinOp::RangeExcl => format!("{lhs}{}{rhs}", op.symbol()),
            _ => format!("{lhs} {} {rhs}", op.symbol()),
        }
    }

    fn method_call(&self, recv: &str, name: &str, args: &[String]) -> String {
        format!("{recv}.{name}({})", args.join(", "))
    }

    fn array(&self, items: &[String]) -> String {
        format!("@[{}]", items.join(", "))
    }

    fn map(&self, ctx: &mut Context, entries: &[(String, String)]) -> String {
        ctx.add_import("tables");
        if entries.is_empty() {
            return "initTable[string, string]()".into();
        }
        let body: Vec<String> = entries.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        format!("{{{}}}.toTable", body.join(", "))
    }

    fn tuple(&self, items: &[String]) -> String {
        match items {
            [one] => format!("({one},)"),
            _ => format!("({})", items.join(", ")),
        }
    }

    fn named_tuple(&self, _ctx: &mut Context, fields: &[(String, String)]) -> String {
        let body: Vec<String> = fields.iter().map(|(n, v)| format!("{n}: {v}")).collect();
        format!("({})", body.join(", "))
    }

    fn slice(&self, target: &str, start: &str, end: &str, inclusive: bool) -> String {
        let op = if inclusive { ".." } else { "..<" };
        format!("{target}[{start}{op}{end}]")
    }

    fn cast(&self, ty: &TypeNode, expr: &str) -> String {
        format!("cast[{ty}]({expr})")
    }

    fn addr(&self, expr: &str) -> String {
        format!("addr {expr}")
    }

    fn deref(&self, expr: &str) -> String {
        format!("{expr}[]")
    }

    fn object(&self, ty: &str, fields: &[(String, String)]) -> String {
        let body: Vec<String> = fields.iter().map(|(n, v)| format!("{n}: {v}")).collect();
        format!("{ty}({})", body.join(", "))
    }

    fn lambda(&self, ps: &[ParamText], body: &str) -> String {
        format!("proc ({}): auto = {body}", params(ps))
    }

    fn decl(&self, kind: DeclKind, name: &str, ty: Option<&TypeNode>, value: Option<&str>) -> String {
        let mut out = format!("{} {name}", kind.keyword());
        if let Some(t) = ty {
            out.push_str(&format!(": {t}"));
        }
        if let Some(v) = value {
            out.push_str(&format!(" = {v}"));
        }
        out
    }

    fn unpack(&self, kind: DeclKind, names: &[String], value: &str) -> String {
        format!("{} ({}) = {value}", kind.keyword(), names.join(", "))
    }

    fn assign(&self, target: &str, op: Option<&str>, value: &str) -> String {
        format!("{target} {}= {value}", op.unwrap_or(""))
    }

    fn compound_op(&self, op: BinOp) -> Option<&'static str> {
        match op {
            BinOp::Add => Some("+"),
            BinOp::Sub => Some("-"),
            BinOp::Mul => Some("*"),
            BinOp::Concat => Some("&"),
            _ => None,
        }
    }

    fn if_head(&self, cond: &str) -> String {
        format!("if {cond}:")
    }

    fn elif_head(&self, cond: &str) -> String {
        format!("elif {cond}:")
    }

    fn else_head(&self) -> String {
        "else:".into()
    }

    fn while_head(&self, _label: Option<&str>, cond: &str) -> String {
        format!("while {cond}:")
    }

    fn for_head(&self, _ctx: &mut Context, _label: Option<&str>, vars: &[String], iter: ForIter) -> String {
        let vars_text = vars.join(", ");
        match iter {
            ForIter::Range { start, end, inclusive } => {
                let op = if inclusive { ".." } else { "..<" };
                format!("for {vars_text} in {start}{op}{end}:")
            }
            ForIter::Items(it) if vars.len() > 1 => format!("for {vars_text} in {it}.pairs:"),
            ForIter::Items(it) => format!("for {vars_text} in {it}:"),
        }
    }

    fn proc_head(&self, name: &str, ps: &[ParamText], ret: Option<&TypeNode>, returns_value: bool) -> String {
        let ret = match ret {
            Some(t) => format!(": {t}"),
            None if returns_value => ": auto".into(),
            None => String::new(),
        };
        format!("proc {name}({}){ret} =", params(ps))
    }

    fn return_stmt(&self, value: Option<&str>) -> String {
        match value {
            Some(v) => format!("return {v}"),
            None => "return".into(),
        }
    }

    fn break_stmt(&self, label: Option<&str>) -> String {
        match label {
            Some(l) => format!("break {l}"),
            None => "break".into(),
        }
    }

    fn continue_stmt(&self, _label: Option<&str>) -> String {
        "continue".into()
    }

    fn discard(&self, value: Option<&str>) -> String {
        match value {
            Some(v) => format!("discard {v}"),
            None => "discard".into(),
        }
    }

    fn block_head(&self, label: Option<&str>) -> String {
        match label {
            Some(l) => format!("block {l}:"),
            None => "block:".into(),
        }
    }

    fn try_head(&self) -> String {
        "try:".into()
    }

    fn finally_head(&self) -> String {
        "finally:".into()
    }

    fn empty_body(&self) -> Option<String> {
        Some("discard".into())
    }

    fn comment(&self, text: &str) -> String {
        format!("# {text}")
    }

    fn import(&self, module: &str) -> String {
        format!("import {module}")
    }

    fn enum_type(&self, ctx: &mut Context, name: &str, variants: &[(String, i64)]) -> String {
        let pad = " ".repeat(ctx.indent_width());
        let mut out = format!("type\n{pad}{name} = enum");
        for (v, ord) in variants {
            out.push_str(&format!("\n{pad}{pad}{v} = {ord}"));
        }
        out
    }

    fn object_type(&self, ctx: &mut Context, name: &str, fields: &[(String, TypeNode, String)]) -> String {
        let pad = " ".repeat(ctx.indent_width());
        let mut out = format!("type\n{pad}{name} = object");
        for (field, ty, _) in fields {
            out.push_str(&format!("\n{pad}{pad}{field}: {ty}"));
        }
        out
    }

    fn alias_type(&self, name: &str, ty: &TypeNode) -> String {
        format!("type {name} = {ty}")
    }

    fn label_style(&self) -> LabelStyle {
        LabelStyle::Blocks
    }

    fn defer_head(&self) -> Option<String> {
        Some("defer:".into())
    }

    fn implicit_result(&self) -> bool {
        true
    }

    fn zero_initializes(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::{generate_code, BackendKind};
    use crate::frontend::{compile, Dialect};

    fn nim(src: &str) -> String {
        let program = compile(src, Some(Dialect::Canonical)).expect("compile failed");
        generate_code(&program, BackendKind::Nim, None).expect("codegen failed")
    }

    #[test]
    fn procs_keep_native_result() {
        let out = nim("proc sq(x: int): int =\n  result = x * x\necho(sq(3))");
        assert!(out.contains("proc sq(x: int): int =\n    result = x * x\n"), "{out}");
        assert!(!out.contains("var result"), "{out}");
        assert!(out.contains("echo(sq(3))"), "{out}");
    }

    #[test]
    fn int_division_uses_div() {
        let out = nim("var a = 7\nvar b = 2\necho(a / b)\necho(7.0 / b)");
        assert!(out.contains("echo(a div b)"), "{out}");
        assert!(out.contains("echo(7.0 / b)"), "{out}");
    }

    #[test]
    fn labeled_continue_uses_block_pair() {
        let src = "outer: for i in 0..<3:\n  for j in 0..<3:\n    if j == 1: continue outer\n    echo(j)\n";
        let out = nim(src);
        assert!(out.contains("block outer:\n"), "{out}");
        assert!(out.contains("block outer_continue:\n"), "{out}");
        assert!(out.contains("break outer_continue"), "{out}");
        assert!(out.contains("for i in 0..<3:"), "{out}");
    }

    #[test]
    fn defer_is_native_and_seqs_are_prefixed() {
        let out = nim("var xs = [1, 2]\ndefer: echo(\"bye\")\necho(xs.len)");
        assert!(out.contains("var xs = @[1, 2]"), "{out}");
        assert!(out.contains("defer:\n    echo(\"bye\")"), "{out}");
        assert!(out.contains("echo(xs.len)"), "{out}");
    }

    #[test]
    fn pseudo_methods_import_strutils() {
        let out = nim("let s = \"a,b\"\necho(s.split(\",\").join(\"-\"))");
        assert!(out.contains("import strutils"), "{out}");
        assert!(out.contains("s.split(\",\").join(\"-\")"), "{out}");
    }

    #[test]
    fn type_sections() {
        let out = nim("type\n  Point = object\n    x, y: int\n  Color = enum\n    Red, Green\n");
        assert!(out.contains("Point = object\n        x: int\n        y: int"), "{out}");
        assert!(out.contains("Color = enum\n        Red = 0\n        Green = 1"), "{out}");
    }
}
