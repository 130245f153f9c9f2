//! Python backend.
//!
//! Python has no labeled loops and no `defer`, so labeled `break`/`continue`
//! go through hoisted exception classes and `defer` becomes `try`/`finally`
//! around the rest of the block.
//!
//! Python's `//` and `%` floor, while Quill truncates toward zero.  Integer
//! division and remainder therefore go through the `quill_idiv` and
//! `quill_mod` helpers unless both operands are non-negative literals;
//! division with operands of unknown kind goes through `quill_div`.

use super::{
    is_natural_literal, slice_bounds, Backend, BackendKind, Context, ForIter, LabelStyle, NumKind, ParamText,
};
use crate::script::ast::{BinOp, DeclKind, TypeNode, UnaryOp};

pub(super) struct Python;

/// Python spelling of a declared type, for annotations and aliases.
fn py_type(ty: &TypeNode) -> String {
    if ty.is_int() {
        return "int".into();
    }
    if ty.is_float() {
        return "float".into();
    }
    match ty.base_name() {
        Some("string" | "char") => "str".into(),
        Some("bool") => "bool".into(),
        Some("seq" | "array" | "openArray") => "list".into(),
        Some("Table" | "TableRef") => "dict".into(),
        Some("tuple") => "tuple".into(),
        Some(name) => name.to_string(),
        None => "object".into(),
    }
}

/// `end + 1`, folded when `end` is a literal.
fn inclusive_end(end: &str) -> String {
    match end.parse::<i64>() {
        Ok(n) => n.saturating_add(1).to_string(),
        Err(_) => format!("{end} + 1"),
    }
}

fn params(params: &[ParamText]) -> String {
    params
        .iter()
        .map(|p| match &p.default {
            Some(d) => format!("{}={d}", p.name),
            None => p.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl Backend for Python {
    fn kind(&self) -> BackendKind {
        BackendKind::Python
    }

    fn bool_literal(&self, value: bool) -> String {
        if value { "True" } else { "False" }.into()
    }

    fn nil_literal(&self) -> String {
        "None".into()
    }

    fn unary(&self, op: UnaryOp, operand: &str) -> String {
        match op {
            UnaryOp::Neg => format!("-{operand}"),
            UnaryOp::Not => format!("not {operand}"),
            UnaryOp::Stringify => format!("str({operand})"),
        }
    }

    fn binary(&self, ctx: &mut Context, op: BinOp, lhs: &str, rhs: &str, kinds: [NumKind; 2]) -> String {
        let natural = is_natural_literal(lhs) && is_natural_literal(rhs);
        let mut helper = |name: &str| format!("{}({lhs}, {rhs})", ctx.use_helper(name));
        let sym = match op {
            BinOp::Div => match kinds {
                _ if natural => "//",
                [NumKind::Int, NumKind::Int] => return helper("idiv"),
                [NumKind::Float, _] | [_, NumKind::Float] => "/",
                _ => return helper("div"),
            },
            BinOp::Range => return format!("range({lhs}, {})", inclusive_end(rhs)),
            BinOp::RangeExcl => return format!("range({lhs}, {rhs})"),
            BinOp::IntDiv if natural => "//",
            BinOp::IntDiv => return helper("idiv"),
            BinOp::Mod if natural => "%",
            BinOp::Mod => return helper("mod"),
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Concat => "+",
            BinOp::NotIn => "not in",
            other => other.symbol(),
        };
        format!("{lhs} {sym} {rhs}")
    }

    fn echo(&self, callee: &str, args: &[String]) -> String {
        if args.len() > 1 {
            format!("{callee}({}, sep=\"\")", args.join(", "))
        } else {
            self.call(callee, args)
        }
    }

    fn map(&self, _ctx: &mut Context, entries: &[(String, String)]) -> String {
        let body: Vec<String> = entries.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        format!("{{{}}}", body.join(", "))
    }

    fn tuple(&self, items: &[String]) -> String {
        match items {
            [one] => format!("({one},)"),
            _ => format!("({})", items.join(", ")),
        }
    }

    fn named_tuple(&self, ctx: &mut Context, fields: &[(String, String)]) -> String {
        ctx.add_import("types");
        let body: Vec<String> = fields.iter().map(|(n, v)| format!("{n}={v}")).collect();
        format!("types.SimpleNamespace({})", body.join(", "))
    }

    fn slice(&self, target: &str, start: &str, end: &str, inclusive: bool) -> String {
        let (start, end) = slice_bounds(start, end, inclusive);
        format!("{target}[{start}:{end}]")
    }

    fn cast(&self, ty: &TypeNode, expr: &str) -> String {
        match py_type(ty).as_str() {
            t @ ("int" | "float" | "str" | "bool") => format!("{t}({expr})"),
            _ => expr.to_string(),
        }
    }

    fn addr(&self, expr: &str) -> String {
        format!("[{expr}]")
    }

    fn deref(&self, expr: &str) -> String {
        format!("{expr}[0]")
    }

    fn object(&self, ty: &str, fields: &[(String, String)]) -> String {
        let body: Vec<String> = fields.iter().map(|(n, v)| format!("{n}={v}")).collect();
        format!("{ty}({})", body.join(", "))
    }

    fn lambda(&self, ps: &[ParamText], body: &str) -> String {
        if ps.is_empty() {
            format!("lambda: {body}")
        } else {
            format!("lambda {}: {body}", params(ps))
        }
    }

    fn decl(&self, _kind: DeclKind, name: &str, _ty: Option<&TypeNode>, value: Option<&str>) -> String {
        format!("{name} = {}", value.unwrap_or("None"))
    }

    fn unpack(&self, _kind: DeclKind, names: &[String], value: &str) -> String {
        format!("{} = {value}", names.join(", "))
    }

    fn assign(&self, target: &str, op: Option<&str>, value: &str) -> String {
        format!("{target} {}= {value}", op.unwrap_or(""))
    }

    fn compound_op(&self, op: BinOp) -> Option<&'static str> {
        match op {
            BinOp::Add | BinOp::Concat => Some("+"),
            BinOp::Sub => Some("-"),
            BinOp::Mul => Some("*"),
            BinOp::Mod => Some("%"),
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

    fn for_head(&self, ctx: &mut Context, _label: Option<&str>, vars: &[String], iter: ForIter) -> String {
        let vars_text = vars.join(", ");
        match iter {
            ForIter::Range { start, end, inclusive } => {
                let end = if inclusive { inclusive_end(&end) } else { end };
                format!("for {vars_text} in range({start}, {end}):")
            }
            ForIter::Items(it) if vars.len() > 1 => {
                let pairs = ctx.use_helper("pairs");
                format!("for {vars_text} in {pairs}({it}):")
            }
            ForIter::Items(it) => format!("for {vars_text} in {it}:"),
        }
    }

    fn proc_head(&self, name: &str, ps: &[ParamText], _ret: Option<&TypeNode>, _returns_value: bool) -> String {
        format!("def {name}({}):", params(ps))
    }

    fn return_stmt(&self, value: Option<&str>) -> String {
        match value {
            Some(v) => format!("return {v}"),
            None => "return".into(),
        }
    }

    fn break_stmt(&self, _label: Option<&str>) -> String {
        "break".into()
    }

    fn continue_stmt(&self, _label: Option<&str>) -> String {
        "continue".into()
    }

    fn discard(&self, value: Option<&str>) -> String {
        value.map_or_else(|| "pass".to_string(), str::to_string)
    }

    fn block_head(&self, _label: Option<&str>) -> String {
        "if True:".into()
    }

    fn try_head(&self) -> String {
        "try:".into()
    }

    fn finally_head(&self) -> String {
        "finally:".into()
    }

    fn empty_body(&self) -> Option<String> {
        Some("pass".into())
    }

    fn comment(&self, text: &str) -> String {
        format!("# {text}")
    }

    fn import(&self, module: &str) -> String {
        if module.starts_with("from ") || module.starts_with("import ") {
            module.to_string()
        } else {
            format!("import {module}")
        }
    }

    fn enum_type(&self, ctx: &mut Context, name: &str, variants: &[(String, i64)]) -> String {
        ctx.add_import("from enum import IntEnum");
        let pad = " ".repeat(ctx.indent_width());
        let mut out = format!("class {name}(IntEnum):");
        if variants.is_empty() {
            out.push_str(&format!("\n{pad}pass"));
        }
        for (v, ord) in variants {
            out.push_str(&format!("\n{pad}{v} = {ord}"));
        }
        // Canonical enums put their variants in scope unqualified.
        for (v, _) in variants {
            out.push_str(&format!("\n{v} = {name}.{v}"));
        }
        out
    }

    fn object_type(&self, ctx: &mut Context, name: &str, fields: &[(String, TypeNode, String)]) -> String {
        ctx.add_import("from dataclasses import dataclass, field");
        let pad = " ".repeat(ctx.indent_width());
        let mut out = format!("@dataclass\nclass {name}:");
        if fields.is_empty() {
            out.push_str(&format!("\n{pad}pass"));
        }
        for (f, ty, zero) in fields {
            let ty = py_type(ty);
            let default = match ty.as_str() {
                "list" | "dict" => format!("field(default_factory={ty})"),
                _ => zero.clone(),
            };
            out.push_str(&format!("\n{pad}{f}: {ty} = {default}"));
        }
        out
    }

    fn alias_type(&self, name: &str, ty: &TypeNode) -> String {
        format!("{name} = {}", py_type(ty))
    }

    fn label_style(&self) -> LabelStyle {
        LabelStyle::Exceptions
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::{generate_code, BackendKind};
    use crate::frontend::{compile, Dialect};

    fn py(src: &str) -> String {
        let program = compile(src, Some(Dialect::Canonical)).expect("compile failed");
        generate_code(&program, BackendKind::Python, None).expect("codegen failed")
    }

    #[test]
    fn division_follows_operand_kinds() {
        let out = py("var a = 7\nvar b = 2.0\nproc f(x, y: auto): auto = x / y\necho(a / 2)\necho(a / b)");
        assert!(out.contains("print(quill_idiv(a, 2))"), "{out}");
        assert!(out.contains("print(a / b)"), "{out}");
        assert!(out.contains("return quill_div(x, y)"), "{out}");
        assert!(out.contains("def quill_div(a, b):"), "{out}");
    }

    #[test]
    fn integer_division_and_remainder_truncate() {
        let out = py("var a = -7
var b = 2
echo(a / b)
echo(a div b)
echo(a mod b)
echo(7 div 2, 7 mod 2)");
        assert!(out.contains("print(quill_idiv(a, b))\nprint(quill_idiv(a, b))\nprint(quill_mod(a, b))"), "{out}");
        assert!(out.contains("print(7 // 2, 7 % 2, sep=\"\")"), "{out}");
        assert!(out.contains("def quill_idiv(a, b):\n    q = abs(a) // abs(b)\n    return q if (a < 0) == (b < 0) else -q"), "{out}");
        assert!(out.contains("def quill_mod(a, b):\n    r = abs(a) % abs(b)\n    return r if a >= 0 else -r"), "{out}");
        assert!(!out.contains("a // b") && !out.contains("a % b"), "{out}");
    }

    #[test]
    fn result_becomes_local() {
        let out = py("proc total(xs: seq[int]): int =\n  for x in xs:\n    result += x\n  return\n");
        assert!(out.contains("def total(xs):\n    result = 0\n"), "{out}");
        assert!(out.contains("        result += x\n"), "{out}");
        assert!(out.contains("    return result\n"), "{out}");
    }

    #[test]
    fn labeled_loops_raise_hoisted_exceptions() {
        let src = "outer: for i in 0..2:\n  for j in 0..2:\n    if j == 1: break outer\n";
        let out = py(src);
        assert!(out.contains("class QuillBreak_outer(Exception):"), "{out}");
        assert!(out.contains("raise QuillBreak_outer()"), "{out}");
        assert!(out.contains("except QuillBreak_outer:"), "{out}");
        assert!(out.contains("for i in range(0, 3):"), "{out}");
    }

    #[test]
    fn defer_wraps_rest_in_try_finally() {
        let out = py("proc f() =\n  defer: echo(\"done\")\n  echo(\"work\")\n");
        assert!(
            out.contains("def f():\n    try:\n        print(\"work\")\n    finally:\n        print(\"done\")\n"),
            "{out}"
        );
    }

    #[test]
    fn literals_and_collections() {
        let out = py("let t = (1,)\nlet n = nil\nlet ok = not false\nlet p = (x: 1, y: 2)\necho(\"a\", 1)");
        assert!(out.contains("t = (1,)"), "{out}");
        assert!(out.contains("n = None"), "{out}");
        assert!(out.contains("ok = not False"), "{out}");
        assert!(out.contains("p = types.SimpleNamespace(x=1, y=2)"), "{out}");
        assert!(out.contains("import types"), "{out}");
        assert!(out.contains("print(\"a\", 1, sep=\"\")"), "{out}");
    }

    #[test]
    fn objects_become_dataclasses() {
        let out = py("type\n  Point = object\n    x: int\n    tags: seq[string]\nlet p = Point(x: 1)\n");
        assert!(out.contains("from dataclasses import dataclass, field"), "{out}");
        assert!(out.contains("@dataclass\nclass Point:\n    x: int = 0\n    tags: list = field(default_factory=list)"), "{out}");
        assert!(out.contains("p = Point(x=1)"), "{out}");
    }

    #[test]
    fn inclusive_slices_fold_literals() {
        let out = py("let s = \"hello\"\necho(s[1..3])\nlet n = 2\necho(s[0..n])");
        assert!(out.contains("print(s[1:4])"), "{out}");
        assert!(out.contains("print(s[0:n + 1])"), "{out}");
        assert!(py("let s = \"hello\"\necho(s[-2..1])").contains("print(s[0:2])"));
    }
}
