//! Shared code-generation state.
//!
//! A [`Context`] lives for one `generate_code` call (or several, when the
//! host reuses it).  It owns everything the backends accumulate while the
//! body is generated: the import set, hoisted helper definitions, the
//! indentation level, the temp-name counter and the numeric kinds inferred
//! for declared names.  Imports and helpers are emitted after the body has
//! been walked, so only what is actually used ends up in the output.

use std::collections::{BTreeSet, HashMap};

use super::BackendKind;
use crate::plugin::Extension;

/// What the generator knows about a name's numeric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumKind {
    Int,
    Float,
    #[default]
    Unknown,
}

impl NumKind {
    /// Result kind of `+ - * mod` over two operands.
    pub fn join(self, other: NumKind) -> NumKind {
        match (self, other) {
            (NumKind::Int, NumKind::Int) => NumKind::Int,
            (NumKind::Float, _) | (_, NumKind::Float) => NumKind::Float,
            _ => NumKind::Unknown,
        }
    }
}

/// A remapped name plus the imports and helpers it pulls in when used.
#[derive(Debug, Clone, Default)]
struct Target {
    text: String,
    imports: Vec<String>,
    helper: Option<(String, String)>,
}

impl Target {
    fn plain(text: impl Into<String>) -> Self {
        Target {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// `(dsl name, nim, python, javascript)`.  A target written `module:name`
/// needs `module` imported; a target starting with `@` names a helper from
/// [`HELPERS`].
const STDLIB_FUNCTIONS: &[(&str, &str, &str, &str)] = &[
    ("echo", "echo", "print", "console.log"),
    ("print", "echo", "print", "console.log"),
    ("sqrt", "math:sqrt", "math:math.sqrt", "Math.sqrt"),
    ("sin", "math:sin", "math:math.sin", "Math.sin"),
    ("cos", "math:cos", "math:math.cos", "Math.cos"),
    ("tan", "math:tan", "math:math.tan", "Math.tan"),
    ("asin", "math:arcsin", "math:math.asin", "Math.asin"),
    ("acos", "math:arccos", "math:math.acos", "Math.acos"),
    ("atan", "math:arctan", "math:math.atan", "Math.atan"),
    ("atan2", "math:arctan2", "math:math.atan2", "Math.atan2"),
    ("sinh", "math:sinh", "math:math.sinh", "Math.sinh"),
    ("cosh", "math:cosh", "math:math.cosh", "Math.cosh"),
    ("tanh", "math:tanh", "math:math.tanh", "Math.tanh"),
    ("pow", "math:pow", "math:math.pow", "Math.pow"),
    ("exp", "math:exp", "math:math.exp", "Math.exp"),
    ("ln", "math:ln", "math:math.log", "Math.log"),
    ("log10", "math:log10", "math:math.log10", "Math.log10"),
    ("log2", "math:log2", "math:math.log2", "Math.log2"),
    ("floor", "math:floor", "math:math.floor", "Math.floor"),
    ("ceil", "math:ceil", "math:math.ceil", "Math.ceil"),
    ("round", "math:round", "round", "Math.round"),
    ("trunc", "math:trunc", "math:math.trunc", "Math.trunc"),
    ("abs", "abs", "abs", "Math.abs"),
    ("min", "min", "min", "Math.min"),
    ("max", "max", "max", "Math.max"),
    ("clamp", "clamp", "@clamp", "@clamp"),
    ("sgn", "math:sgn", "@sgn", "Math.sign"),
    ("degToRad", "math:degToRad", "math:math.radians", "@degToRad"),
    ("radToDeg", "math:radToDeg", "math:math.degrees", "@radToDeg"),
    ("sum", "math:sum", "sum", "@sum"),
    ("str", "$", "str", "String"),
    ("int", "int", "int", "Math.trunc"),
    ("float", "float", "float", "Number"),
    ("bool", "bool", "bool", "Boolean"),
    ("parseInt", "strutils:parseInt", "int", "parseInt"),
    ("parseFloat", "strutils:parseFloat", "float", "parseFloat"),
    ("chr", "chr", "chr", "String.fromCharCode"),
    ("ord", "ord", "ord", "@ord"),
    ("sorted", "algorithm:sorted", "sorted", "@sorted"),
    ("reversed", "algorithm:reversed", "@reversed", "@reversed"),
    ("keys", "keys", "@keys", "Object.keys"),
    ("values", "values", "@values", "Object.values"),
    ("hasKey", "tables:hasKey", "@hasKey", "@hasKey"),
    ("newSeq", "newSeq", "@newSeq", "@newSeq"),
    ("repeat", "strutils:repeat", "@repeat", "@repeat"),
    ("typeof", "typeof", "@typeof", "@typeof"),
];

/// `(dsl name, nim, python, javascript)`, same target syntax as above.
const STDLIB_CONSTANTS: &[(&str, &str, &str, &str)] = &[
    ("PI", "math:PI", "math:math.pi", "Math.PI"),
    ("TAU", "math:TAU", "math:math.tau", "(2 * Math.PI)"),
    ("E", "math:E", "math:math.e", "Math.E"),
];

/// `(backend, helper name, definition)`.
const HELPERS: &[(BackendKind, &str, &str)] = &[
    (BackendKind::Python, "clamp", "def quill_clamp(x, lo, hi):\n    return max(lo, min(x, hi))"),
    (BackendKind::Python, "sgn", "def quill_sgn(x):\n    return (x > 0) - (x < 0)"),
    (BackendKind::Python, "reversed", "def quill_reversed(xs):\n    return xs[::-1]"),
    (BackendKind::Python, "keys", "def quill_keys(d):\n    return list(d.keys())"),
    (BackendKind::Python, "values", "def quill_values(d):\n    return list(d.values())"),
    (BackendKind::Python, "hasKey", "def quill_hasKey(d, k):\n    return k in d"),
    (BackendKind::Python, "newSeq", "def quill_newSeq(n=0):\n    return [None] * n"),
    (BackendKind::Python, "repeat", "def quill_repeat(s, n):\n    return s * n"),
    (BackendKind::Python, "typeof", "def quill_typeof(x):\n    return type(x).__name__"),
    (
        BackendKind::Python,
        "div",
        "def quill_div(a, b):\n    if isinstance(a, int) and isinstance(b, int):\n        q = abs(a) // abs(b)\n        return q if (a < 0) == (b < 0) else -q\n    return a / b",
    ),
    (
        BackendKind::Python,
        "idiv",
        "def quill_idiv(a, b):\n    q = abs(a) // abs(b)\n    return q if (a < 0) == (b < 0) else -q",
    ),
    (
        BackendKind::Python,
        "mod",
        "def quill_mod(a, b):\n    r = abs(a) % abs(b)\n    return r if a >= 0 else -r",
    ),
    (
        BackendKind::Python,
        "pairs",
        "def quill_pairs(x):\n    return x.items() if isinstance(x, dict) else enumerate(x)",
    ),
    (BackendKind::JavaScript, "clamp", "const quill_clamp = (x, lo, hi) => Math.max(lo, Math.min(x, hi));"),
    (BackendKind::JavaScript, "degToRad", "const quill_degToRad = (d) => d * Math.PI / 180;"),
    (BackendKind::JavaScript, "radToDeg", "const quill_radToDeg = (r) => r * 180 / Math.PI;"),
    (BackendKind::JavaScript, "sum", "const quill_sum = (xs) => xs.reduce((a, b) => a + b, 0);"),
    (BackendKind::JavaScript, "ord", "const quill_ord = (s) => s.charCodeAt(0);"),
    (BackendKind::JavaScript, "sorted", "const quill_sorted = (xs) => [...xs].sort((a, b) => (a < b ? -1 : a > b ? 1 : 0));"),
    (BackendKind::JavaScript, "reversed", "const quill_reversed = (xs) => [...xs].reverse();"),
    (BackendKind::JavaScript, "hasKey", "const quill_hasKey = (d, k) => Object.prototype.hasOwnProperty.call(d, k);"),
    (BackendKind::JavaScript, "newSeq", "const quill_newSeq = (n = 0) => new Array(n).fill(null);"),
    (BackendKind::JavaScript, "repeat", "const quill_repeat = (s, n) => s.repeat(n);"),
    (BackendKind::JavaScript, "typeof", "const quill_typeof = (x) => (Array.isArray(x) ? \"array\" : typeof x);"),
    (
        BackendKind::JavaScript,
        "div",
        "const quill_div = (a, b) => (Number.isInteger(a) && Number.isInteger(b) ? Math.trunc(a / b) : a / b);",
    ),
    (
        BackendKind::JavaScript,
        "pairs",
        "const quill_pairs = (x) => (Array.isArray(x) ? x.entries() : Object.entries(x));",
    ),
    (
        BackendKind::JavaScript,
        "range",
        "const quill_range = (a, b) => Array.from({ length: Math.max(0, b - a) }, (_, i) => a + i);",
    ),
];

fn parse_target(backend: BackendKind, target: &str) -> Target {
    if let Some(helper) = target.strip_prefix('@') {
        let name = format!("quill_{helper}");
        let def = HELPERS
            .iter()
            .find(|(b, h, _)| *b == backend && *h == helper)
            .map(|(_, _, d)| d.to_string());
        return Target {
            text: name.clone(),
            imports: Vec::new(),
            helper: def.map(|d| (name, d)),
        };
    }
    match target.split_once(':') {
        Some((module, text)) if !module.is_empty() && !text.is_empty() => Target {
            text: text.to_string(),
            imports: vec![module.to_string()],
            helper: None,
        },
        _ => Target::plain(target),
    }
}

fn column(backend: BackendKind, row: &(&'static str, &'static str, &'static str, &'static str)) -> &'static str {
    match backend {
        BackendKind::Nim => row.1,
        BackendKind::Python => row.2,
        BackendKind::JavaScript => row.3,
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    backend: BackendKind,
    imports: BTreeSet<String>,
    functions: HashMap<String, Target>,
    constants: HashMap<String, Target>,
    helpers: Vec<(String, String)>,
    indent_level: usize,
    indent_width: usize,
    temp_counter: usize,
    numeric: HashMap<String, NumKind>,
    header: Option<String>,
}

impl Context {
    pub const DEFAULT_INDENT_WIDTH: usize = 4;

    /// A context seeded with the stdlib mappings for `backend`.
    pub fn new(backend: BackendKind) -> Self {
        let seed = |table: &[(&'static str, &'static str, &'static str, &'static str)]| {
            table
                .iter()
                .map(|row| (row.0.to_string(), parse_target(backend, column(backend, row))))
                .collect::<HashMap<_, _>>()
        };
        Context {
            backend,
            imports: BTreeSet::new(),
            functions: seed(STDLIB_FUNCTIONS),
            constants: seed(STDLIB_CONSTANTS),
            helpers: Vec::new(),
            indent_level: 0,
            indent_width: Self::DEFAULT_INDENT_WIDTH,
            temp_counter: 0,
            numeric: HashMap::new(),
            header: None,
        }
    }

    pub fn with_indent_width(mut self, width: usize) -> Self {
        self.indent_width = width.max(1);
        self
    }

    /// A comment placed at the top of the generated program.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Apply an extension's mapping for this backend, if it has one.
    /// Its functions and constants override stdlib entries of the same name;
    /// its imports are required unconditionally.
    pub fn with_extension(mut self, ext: &Extension) -> Self {
        self.load_extension(ext);
        self
    }

    pub fn load_extension(&mut self, ext: &Extension) {
        let Some(mapping) = ext.mapping(self.backend) else {
            return;
        };
        self.imports.extend(mapping.imports.iter().cloned());
        for (name, target) in &mapping.functions {
            self.functions.insert(name.clone(), Target::plain(target));
        }
        for (name, literal) in &mapping.constants {
            self.constants.insert(name.clone(), Target::plain(literal));
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    // ── Imports and helpers ───────────────────────────────────────────────────

    pub fn add_import(&mut self, module: impl Into<String>) {
        self.imports.insert(module.into());
    }

    /// Imports in sorted order.
    pub fn imports(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().map(String::as_str)
    }

    /// Register a helper definition once; later calls with the same name
    /// are ignored.
    pub fn add_helper(&mut self, name: &str, definition: &str) {
        if !self.helpers.iter().any(|(n, _)| n == name) {
            self.helpers.push((name.to_string(), definition.to_string()));
        }
    }

    /// Pull in a built-in helper (`div`, `pairs`, `range`, …) and return the
    /// name it is defined under.
    pub fn use_helper(&mut self, helper: &str) -> String {
        let target = parse_target(self.backend, &format!("@{helper}"));
        self.activate(&target)
    }

    /// Helper definitions in first-use order.
    pub fn helpers(&self) -> impl Iterator<Item = &str> {
        self.helpers.iter().map(|(_, d)| d.as_str())
    }

    fn activate(&mut self, target: &Target) -> String {
        self.imports.extend(target.imports.iter().cloned());
        if let Some((name, def)) = &target.helper {
            self.add_helper(name, def);
        }
        target.text.clone()
    }

    // ── Name remapping ────────────────────────────────────────────────────────

    /// Target spelling of the function `name`, recording what it needs.
    pub fn remap_function(&mut self, name: &str) -> Option<String> {
        let target = self.functions.get(name)?.clone();
        Some(self.activate(&target))
    }

    /// Target spelling of the constant `name`, recording what it needs.
    pub fn remap_constant(&mut self, name: &str) -> Option<String> {
        let target = self.constants.get(name)?.clone();
        Some(self.activate(&target))
    }

    /// Stop remapping `name`; a user definition shadows the stdlib.
    pub fn shadow(&mut self, name: &str) {
        self.functions.remove(name);
        self.constants.remove(name);
    }

    // ── Layout ────────────────────────────────────────────────────────────────

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    pub fn indent_level(&self) -> usize {
        self.indent_level
    }

    pub fn indent_width(&self) -> usize {
        self.indent_width
    }

    pub fn indentation(&self) -> String {
        " ".repeat(self.indent_level * self.indent_width)
    }

    /// A fresh identifier valid in every backend: `{prefix}Tmp{n}`.
    pub fn fresh_temp(&mut self, prefix: &str) -> String {
        self.temp_counter += 1;
        format!("{prefix}Tmp{}", self.temp_counter)
    }

    // ── Numeric inference ─────────────────────────────────────────────────────

    pub fn note_numeric(&mut self, name: &str, kind: NumKind) {
        self.numeric.insert(name.to_string(), kind);
    }

    pub fn numeric_kind(&self, name: &str) -> NumKind {
        self.numeric.get(name).copied().unwrap_or_default()
    }
}
