//! JavaScript backend: brace-delimited blocks, native labels, and
//! `try`/`finally` for `defer`.

use super::{slice_bounds, Backend, BackendKind, Context, ForIter, LabelStyle, NumKind, ParamText};
use crate::script::ast::{BinOp, DeclKind, TypeNode, UnaryOp};

pub(super) struct JavaScript;

fn params(params: &[ParamText]) -> String {
    params
        .iter()
        .map(|p| match &p.default {
            Some(d) => format!("{} = {d}", p.name),
            None => p.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parenthesize an operand that is about to receive a method call.
fn receiver(text: &str) -> String {
    let simple = text
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '$'));
    if simple || (text.starts_with('"') && text.ends_with('"')) {
        text.to_string()
    } else {
        format!("({text})")
    }
}

fn labeled(label: Option<&str>, head: String) -> String {
    match label {
        Some(l) => format!("{l}: {head}"),
        None => head,
    }
}

fn entries(fields: &[(String, String)]) -> String {
    let body: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    if body.is_empty() {
        "{}".into()
    } else {
        format!("{{ {} }}", body.join(", "))
    }
}

impl Backend for JavaScript {
    fn kind(&self) -> BackendKind {
        BackendKind::JavaScript
    }

    fn bool_literal(&self, value: bool) -> String {
        value.to_string()
    }

    fn nil_literal(&self) -> String {
        "null".into()
    }

    fn unary(&self, op: UnaryOp, operand: &str) -> String {
        match op {
            UnaryOp::Neg => format!("-{operand}"),
            UnaryOp::Not => format!("!{operand}"),
            UnaryOp::Stringify => format!("String({operand})"),
        }
    }

    fn binary(&self, ctx: &mut Context, op: BinOp, lhs: &str, rhs: &str, kinds: [NumKind; 2]) -> String {
        let sym = match op {
            BinOp::Div => match kinds {
                [NumKind::Int, NumKind::Int] => return format!("Math.trunc({lhs} / {rhs})"),
                [NumKind::Float, _] | [_, NumKind::Float] => "/",
                _ => {
                    let helper = ctx.use_helper("div");
                    return format!("{helper}({lhs}, {rhs})");
                }
            },
            BinOp::IntDiv => return format!("Math.trunc({lhs} / {rhs})"),
            BinOp::Range | BinOp::RangeExcl => {
                let range = ctx.use_helper("range");
                let end = if op == BinOp::Range { format!("{rhs} + 1") } else { rhs.to_string() };
                return format!("{range}({lhs}, {end})");
            }
            BinOp::In => return format!("{}.includes({lhs})", receiver(rhs)),
            BinOp::NotIn => return format!("!{}.includes({lhs})", receiver(rhs)),
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Concat => "+",
            BinOp::Eq => "===",
            BinOp::Ne => "!==",
            BinOp::And => "&&",
            BinOp::Or => "||",
            other => other.symbol(),
        };
        format!("{lhs} {sym} {rhs}")
    }

    fn echo(&self, callee: &str, args: &[String]) -> String {
        if args.len() > 1 {
            format!("{callee}([{}].join(\"\"))", args.join(", "))
        } else {
            self.call(callee, args)
        }
    }

    fn map(&self, _ctx: &mut Context, items: &[(String, String)]) -> String {
        entries(items)
    }

    fn tuple(&self, items: &[String]) -> String {
        format!("[{}]", items.join(", "))
    }

    fn named_tuple(&self, _ctx: &mut Context, fields: &[(String, String)]) -> String {
        entries(fields)
    }

    fn slice(&self, target: &str, start: &str, end: &str, inclusive: bool) -> String {
        let (start, end) = slice_bounds(start, end, inclusive);
        format!("{target}.slice({start}, {end})")
    }

    fn cast(&self, ty: &TypeNode, expr: &str) -> String {
        if ty.is_int() {
            return format!("Math.trunc({expr})");
        }
        if ty.is_float() {
            return format!("Number({expr})");
        }
        match ty.base_name() {
            Some("string") => format!("String({expr})"),
            Some("bool") => format!("Boolean({expr})"),
            _ => expr.to_string(),
        }
    }

    fn addr(&self, expr: &str) -> String {
        format!("{{ value: {expr} }}")
    }

    fn deref(&self, expr: &str) -> String {
        format!("{expr}.value")
    }

    fn object(&self, ty: &str, fields: &[(String, String)]) -> String {
        if fields.is_empty() {
            format!("new {ty}()")
        } else {
            format!("new {ty}({})", entries(fields))
        }
    }

    fn lambda(&self, ps: &[ParamText], body: &str) -> String {
        let body = if body.starts_with('{') {
            format!("({body})")
        } else {
            body.to_string()
        };
        format!("({}) => {body}", params(ps))
    }

    fn expr_stmt(&self, expr: &str) -> String {
        format!("{expr};")
    }

    fn decl(&self, kind: DeclKind, name: &str, _ty: Option<&TypeNode>, value: Option<&str>) -> String {
        match (kind, value) {
            (DeclKind::Var, Some(v)) => format!("let {name} = {v};"),
            (_, Some(v)) => format!("const {name} = {v};"),
            (_, None) => format!("let {name};"),
        }
    }

    fn unpack(&self, kind: DeclKind, names: &[String], value: &str) -> String {
        let kw = if kind == DeclKind::Var { "let" } else { "const" };
        format!("{kw} [{}] = {value};", names.join(", "))
    }

    fn assign(&self, target: &str, op: Option<&str>, value: &str) -> String {
        format!("{target} {}= {value};", op.unwrap_or(""))
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
        format!("if ({cond}) {{")
    }

    fn elif_head(&self, cond: &str) -> String {
        format!("}} else if ({cond}) {{")
    }

    fn else_head(&self) -> String {
        "} else {".into()
    }

    fn while_head(&self, label: Option<&str>, cond: &str) -> String {
        labeled(label, format!("while ({cond}) {{"))
    }

    fn for_head(&self, ctx: &mut Context, label: Option<&str>, vars: &[String], iter: ForIter) -> String {
        let head = match iter {
            ForIter::Range { start, end, inclusive } => {
                let v = vars.first().map_or("i", String::as_str);
                let cmp = if inclusive { "<=" } else { "<" };
                format!("for (let {v} = {start}; {v} {cmp} {end}; {v}++) {{")
            }
            ForIter::Items(it) if vars.len() > 1 => {
                let pairs = ctx.use_helper("pairs");
                format!("for (const [{}] of {pairs}({it})) {{", vars.join(", "))
            }
            ForIter::Items(it) => format!("for (const {} of {it}) {{", vars.join(", ")),
        };
        labeled(label, head)
    }

    fn proc_head(&self, name: &str, ps: &[ParamText], _ret: Option<&TypeNode>, _returns_value: bool) -> String {
        format!("function {name}({}) {{", params(ps))
    }

    fn return_stmt(&self, value: Option<&str>) -> String {
        match value {
            Some(v) => format!("return {v};"),
            None => "return;".into(),
        }
    }

    fn break_stmt(&self, label: Option<&str>) -> String {
        match label {
            Some(l) => format!("break {l};"),
            None => "break;".into(),
        }
    }

    fn continue_stmt(&self, label: Option<&str>) -> String {
        match label {
            Some(l) => format!("continue {l};"),
            None => "continue;".into(),
        }
    }

    fn discard(&self, value: Option<&str>) -> String {
        match value {
            Some(v) => format!("{v};"),
            None => self.comment("discard"),
        }
    }

    fn block_head(&self, label: Option<&str>) -> String {
        labeled(label, "{".into())
    }

    fn try_head(&self) -> String {
        "try {".into()
    }

    fn finally_head(&self) -> String {
        "} finally {".into()
    }

    fn empty_body(&self) -> Option<String> {
        None
    }

    fn block_end(&self) -> Option<String> {
        Some("}".into())
    }

    fn comment(&self, text: &str) -> String {
        format!("// {text}")
    }

    fn import(&self, module: &str) -> String {
        let binding: String = module
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!("import * as {binding} from \"{module}\";")
    }

    fn enum_type(&self, _ctx: &mut Context, name: &str, variants: &[(String, i64)]) -> String {
        let body: Vec<String> = variants.iter().map(|(v, ord)| format!("{v}: {ord}")).collect();
        let names: Vec<&str> = variants.iter().map(|(v, _)| v.as_str()).collect();
        let mut out = format!("const {name} = Object.freeze({{ {} }});", body.join(", "));
        if !names.is_empty() {
            out.push_str(&format!("\nconst {{ {} }} = {name};", names.join(", ")));
        }
        out
    }

    fn object_type(&self, ctx: &mut Context, name: &str, fields: &[(String, TypeNode, String)]) -> String {
        let pad = " ".repeat(ctx.indent_width());
        let mut out = format!("class {name} {{");
        if fields.is_empty() {
            out.push_str("\n}");
            return out;
        }
        let defaults: Vec<String> = fields.iter().map(|(f, _, zero)| format!("{f} = {zero}")).collect();
        out.push_str(&format!("\n{pad}constructor({{ {} }} = {{}}) {{", defaults.join(", ")));
        for (f, _, _) in fields {
            out.push_str(&format!("\n{pad}{pad}this.{f} = {f};"));
        }
        out.push_str(&format!("\n{pad}}}\n}}"));
        out
    }

    fn alias_type(&self, name: &str, ty: &TypeNode) -> String {
        self.comment(&format!("type {name} = {ty}"))
    }

    fn header(&self, ctx: &Context) -> Vec<String> {
        let mut lines: Vec<String> = ctx
            .header()
            .map(|h| h.lines().map(|l| self.comment(l)).collect())
            .unwrap_or_default();
        lines.push(self.comment(&format!("Generated by quill ({} backend)", self.kind())));
        lines.push("\"use strict\";".into());
        lines
    }

    fn label_style(&self) -> LabelStyle {
        LabelStyle::Native
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::{generate_code, BackendKind};
    use crate::frontend::{compile, Dialect};

    fn js(src: &str) -> String {
        let program = compile(src, Some(Dialect::Canonical)).expect("compile failed");
        generate_code(&program, BackendKind::JavaScript, None).expect("codegen failed")
    }

    #[test]
    fn declarations_and_operators() {
        let out = js("var a = 7\nlet b = 2\nconst c = a == b and a != 3\necho(a / b)");
        assert!(out.starts_with("// Generated by quill (javascript backend)\n\"use strict\";\n"), "{out}");
        assert!(out.contains("let a = 7;"), "{out}");
        assert!(out.contains("const b = 2;"), "{out}");
        assert!(out.contains("const c = a === b && a !== 3;"), "{out}");
        assert!(out.contains("console.log(Math.trunc(a / b));"), "{out}");
    }

    #[test]
    fn loops_keep_native_labels() {
        let src = "outer: for i in 0..<3:\n  for x in [1, 2]:\n    if x == 2: continue outer\n    echo(i, x)\n";
        let out = js(src);
        assert!(out.contains("outer: for (let i = 0; i < 3; i++) {"), "{out}");
        assert!(out.contains("    for (const x of [1, 2]) {"), "{out}");
        assert!(out.contains("continue outer;"), "{out}");
        assert!(out.contains("console.log([i, x].join(\"\"));"), "{out}");
    }

    #[test]
    fn if_chain_braces() {
        let out = js("let n = 3\nif n < 2:\n  echo(\"small\")\nelif n < 5:\n  echo(\"mid\")\nelse:\n  echo(\"big\")\n");
        assert!(
            out.contains(
                "if (n < 2) {\n    console.log(\"small\");\n} else if (n < 5) {\n    console.log(\"mid\");\n} else {\n    console.log(\"big\");\n}\n"
            ),
            "{out}"
        );
    }

    #[test]
    fn procs_and_lambdas() {
        let out = js("proc add(a: int, b = 2): int =\n  a + b\nlet f = proc (x: int): int = x * 2\necho(add(1), f(3))");
        assert!(out.contains("function add(a, b = 2) {\n    return a + b;\n}"), "{out}");
        assert!(out.contains("const f = (x) => x * 2;"), "{out}");
    }

    #[test]
    fn membership_and_ranges() {
        let out = js("let xs = [1, 2]\necho(2 in xs)\nfor v in 1..3: echo(v)\nlet r = 0..<4");
        assert!(out.contains("console.log(xs.includes(2));"), "{out}");
        assert!(out.contains("for (let v = 1; v <= 3; v++) {"), "{out}");
        assert!(out.contains("const r = quill_range(0, 4);"), "{out}");
        assert!(out.contains("const quill_range = "), "{out}");
    }

    #[test]
    fn types_become_classes_and_frozen_enums() {
        let out = js("type\n  Point = object\n    x, y: int\n  Dir = enum\n    North, South\nlet p = Point(x: 1)\n");
        assert!(out.contains("class Point {\n    constructor({ x = 0, y = 0 } = {}) {\n        this.x = x;"), "{out}");
        assert!(out.contains("const Dir = Object.freeze({ North: 0, South: 1 });"), "{out}");
        assert!(out.contains("const { North, South } = Dir;"), "{out}");
        assert!(out.contains("const p = new Point({ x: 1 });"), "{out}");
    }

    #[test]
    fn defer_wraps_rest() {
        let out = js("proc f() =\n  defer: echo(\"done\")\n  echo(\"work\")\n");
        assert!(
            out.contains("function f() {\n    try {\n        console.log(\"work\");\n    } finally {\n        console.log(\"done\");\n    }\n}"),
            "{out}"
        );
    }
}
