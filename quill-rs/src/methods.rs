//! Pseudo-methods: fixed-name dot calls such as `s.len` or `xs.join(",")`.
//!
//! One table serves both consumers.  The interpreter resolves a
//! pseudo-method to the stdlib builtin it names; the code generator renders
//! it through the per-backend template for the call's argument count.
//!
//! Template placeholders: `{recv}` is the receiver, `{0}`, `{1}` … are the
//! arguments.

use crate::codegen::BackendKind;

/// One entry of the pseudo-method table.
#[derive(Debug)]
pub struct PseudoMethod {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    /// The stdlib builtin called with `(recv, args…)` by the interpreter.
    pub builtin: &'static str,
    nim: &'static [(usize, &'static str)],
    python: &'static [(usize, &'static str)],
    javascript: &'static [(usize, &'static str)],
    /// Module a Nim rendering needs.
    pub nim_import: Option<&'static str>,
}

impl PseudoMethod {
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }

    fn templates(&self, backend: BackendKind) -> &'static [(usize, &'static str)] {
        match backend {
            BackendKind::Nim => self.nim,
            BackendKind::Python => self.python,
            BackendKind::JavaScript => self.javascript,
        }
    }

    /// Render `recv.name(args…)` for `backend`, or `None` when the table has
    /// no template for this argument count.
    pub fn render(&self, backend: BackendKind, recv: &str, args: &[String]) -> Option<String> {
        let (_, template) = self
            .templates(backend)
            .iter()
            .find(|(arity, _)| *arity == args.len())?;
        let mut out = template.replace("{recv}", recv);
        for (i, a) in args.iter().enumerate() {
            out = out.replace(&format!("{{{i}}}"), a);
        }
        Some(out)
    }
}

pub static PSEUDO_METHODS: &[PseudoMethod] = &[
    PseudoMethod {
        name: "len",
        aliases: &["length"],
        builtin: "len",
        nim: &[(0, "{recv}.len")],
        python: &[(0, "len({recv})")],
        javascript: &[(0, "{recv}.length")],
        nim_import: None,
    },
    PseudoMethod {
        name: "toUpper",
        aliases: &[],
        builtin: "toUpper",
        nim: &[(0, "{recv}.toUpperAscii()")],
        python: &[(0, "{recv}.upper()")],
        javascript: &[(0, "{recv}.toUpperCase()")],
        nim_import: Some("strutils"),
    },
    PseudoMethod {
        name: "toLower",
        aliases: &[],
        builtin: "toLower",
        nim: &[(0, "{recv}.toLowerAscii()")],
        python: &[(0, "{recv}.lower()")],
        javascript: &[(0, "{recv}.toLowerCase()")],
        nim_import: Some("strutils"),
    },
    PseudoMethod {
        name: "strip",
        aliases: &["trim"],
        builtin: "strip",
        nim: &[(0, "{recv}.strip()")],
        python: &[(0, "{recv}.strip()")],
        javascript: &[(0, "{recv}.trim()")],
        nim_import: Some("strutils"),
    },
    PseudoMethod {
        name: "split",
        aliases: &[],
        builtin: "split",
        nim: &[(0, "{recv}.splitWhitespace()"), (1, "{recv}.split({0})")],
        python: &[(0, "{recv}.split()"), (1, "{recv}.split({0})")],
        javascript: &[(0, "{recv}.trim().split(/\\s+/)"), (1, "{recv}.split({0})")],
        nim_import: Some("strutils"),
    },
    PseudoMethod {
        name: "join",
        aliases: &[],
        builtin: "join",
        nim: &[(0, "{recv}.join()"), (1, "{recv}.join({0})")],
        python: &[
            (0, "\"\".join(map(str, {recv}))"),
            (1, "{0}.join(map(str, {recv}))"),
        ],
        javascript: &[(0, "{recv}.join(\"\")"), (1, "{recv}.join({0})")],
        nim_import: Some("strutils"),
    },
    PseudoMethod {
        name: "replace",
        aliases: &[],
        builtin: "replace",
        nim: &[(2, "{recv}.replace({0}, {1})")],
        python: &[(2, "{recv}.replace({0}, {1})")],
        javascript: &[(2, "{recv}.split({0}).join({1})")],
        nim_import: Some("strutils"),
    },
    PseudoMethod {
        name: "contains",
        aliases: &["includes"],
        builtin: "contains",
        nim: &[(1, "({0} in {recv})")],
        python: &[(1, "({0} in {recv})")],
        javascript: &[(1, "{recv}.includes({0})")],
        nim_import: Some("strutils"),
    },
    PseudoMethod {
        name: "startsWith",
        aliases: &[],
        builtin: "startsWith",
        nim: &[(1, "{recv}.startsWith({0})")],
        python: &[(1, "{recv}.startswith({0})")],
        javascript: &[(1, "{recv}.startsWith({0})")],
        nim_import: Some("strutils"),
    },
    PseudoMethod {
        name: "endsWith",
        aliases: &[],
        builtin: "endsWith",
        nim: &[(1, "{recv}.endsWith({0})")],
        python: &[(1, "{recv}.endswith({0})")],
        javascript: &[(1, "{recv}.endsWith({0})")],
        nim_import: Some("strutils"),
    },
];

/// Find the pseudo-method called `name` (including aliases).
pub fn lookup(name: &str) -> Option<&'static PseudoMethod> {
    PSEUDO_METHODS.iter().find(|m| m.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve() {
        assert_eq!(lookup("trim").map(|m| m.name), Some("strip"));
        assert_eq!(lookup("length").map(|m| m.builtin), Some("len"));
        assert!(lookup("frobnicate").is_none());
    }

    #[test]
    fn every_method_has_a_template_for_each_backend() {
        for m in PSEUDO_METHODS {
            for backend in BackendKind::ALL {
                assert!(
                    !m.templates(backend).is_empty(),
                    "{} has no {backend:?} template",
                    m.name
                );
            }
        }
    }

    #[test]
    fn render_by_arity() {
        let split = lookup("split").unwrap();
        let args = vec!["\",\"".to_string()];
        assert_eq!(
            split.render(BackendKind::Python, "s", &args).as_deref(),
            Some("s.split(\",\")")
        );
        assert_eq!(
            split.render(BackendKind::Nim, "s", &[]).as_deref(),
            Some("s.splitWhitespace()")
        );
        let len = lookup("len").unwrap();
        assert_eq!(len.render(BackendKind::JavaScript, "xs", &[]).as_deref(), Some("xs.length"));
        assert_eq!(len.render(BackendKind::JavaScript, "xs", &args), None);
    }

    #[test]
    fn join_puts_separator_first_in_python() {
        let join = lookup("join").unwrap();
        let out = join.render(BackendKind::Python, "xs", &["\", \"".to_string()]);
        assert_eq!(out.as_deref(), Some("\", \".join(map(str, xs))"));
    }
}
