use quill::{compile, generate_code, BackendKind, Context, Dialect, Program, Runtime};

/// One of every statement kind.
const CORPUS: &str = "\
type
  Point = object
    x, y: int
  Color = enum
    Red, Green
const LIMIT = 3
let origin = Point(x: 1, y: 2)
var (a, b) = (1, 2)
var total = 0
proc add(p: int, q = 1): int =
  p + q
proc sumTo(n: int): int =
  for i in 0..<n:
    result = result + i
for i in 0..LIMIT:
  total += add(i)
var k = 0
while k < 3:
  k += 1
  if k == 2:
    continue
case k
of 1: echo(\"one\")
of 2, 3: echo(\"few\")
else: echo(\"many\")
block done:
  if total > 0:
    break done
  echo(\"never\")
outer: for i in 0..2:
  for j in 0..2:
    if j == 1: continue outer
    if i == 2: break outer
proc greet() =
  defer: echo(\"bye\")
  echo(\"hi\")
greet()
discard add(1)
let double = proc (x: int): int = x * 2
echo(double(a + b), \" \", $total, \" \", sumTo(4), \" \", origin.x)
";

fn corpus() -> Program {
    compile(CORPUS, Some(Dialect::Canonical)).expect("corpus must compile")
}

fn export(program: &Program, backend: BackendKind) -> String {
    generate_code(program, backend, None).unwrap_or_else(|e| panic!("{backend}: {e}"))
}

#[test]
fn corpus_runs_in_the_interpreter() {
    let mut rt = Runtime::new();
    rt.run(CORPUS, Some(Dialect::Canonical)).unwrap();
    assert_eq!(rt.take_output(), vec!["few", "hi", "bye", "6 10 6 1"]);
}

#[test]
fn backends_produce_distinct_output() {
    let program = corpus();
    let outputs: Vec<String> = BackendKind::ALL.iter().map(|&b| export(&program, b)).collect();
    assert_ne!(outputs[0], outputs[1]);
    assert_ne!(outputs[1], outputs[2]);
    assert_ne!(outputs[0], outputs[2]);
    for (backend, out) in BackendKind::ALL.iter().zip(&outputs) {
        assert!(out.contains(&format!("Generated by quill ({backend} backend)")), "{out}");
    }
}

#[test]
fn generation_is_deterministic() {
    let program = corpus();
    for backend in BackendKind::ALL {
        assert_eq!(export(&program, backend), export(&program, backend));
    }
}

#[test]
fn nim_corpus() {
    let out = export(&corpus(), BackendKind::Nim);
    for needle in [
        "Point = object",
        "const LIMIT = 3",
        "var (a, b) = (1, 2)",
        "proc add(p: int, q = 1): int =",
        "for i in 0..LIMIT:",
        "total += add(i)",
        "let caseTmp1 = k",
        "block done:",
        "block outer_continue:",
        "defer:",
        "discard add(1)",
        "let double = proc (x: int): auto = x * 2",
        "$total",
    ] {
        assert!(out.contains(needle), "missing {needle:?} in:\n{out}");
    }
}

#[test]
fn python_corpus() {
    let out = export(&corpus(), BackendKind::Python);
    for needle in [
        "@dataclass",
        "class Color(IntEnum):",
        "LIMIT = 3",
        "a, b = (1, 2)",
        "def add(p, q=1):\n    return p + q",
        "def sumTo(n):\n    result = 0",
        "for i in range(0, LIMIT + 1):",
        "caseTmp1 = k",
        "if caseTmp1 == 2 or caseTmp1 == 3:",
        "class QuillBreak_done(Exception):",
        "raise QuillContinue_outer()",
        "    try:\n        print(\"hi\")\n    finally:\n        print(\"bye\")",
        "double = lambda x: x * 2",
        "str(total)",
    ] {
        assert!(out.contains(needle), "missing {needle:?} in:\n{out}");
    }
}

#[test]
fn javascript_corpus() {
    let out = export(&corpus(), BackendKind::JavaScript);
    for needle in [
        "\"use strict\";",
        "class Point {",
        "const Color = Object.freeze({ Red: 0, Green: 1 });",
        "let [a, b] = [1, 2];",
        "function add(p, q = 1) {\n    return p + q;\n}",
        "for (let i = 0; i <= LIMIT; i++) {",
        "const caseTmp1 = k;",
        "done: {",
        "break done;",
        "continue outer;",
        "} finally {",
        "const double = (x) => x * 2;",
        "String(total)",
    ] {
        assert!(out.contains(needle), "missing {needle:?} in:\n{out}");
    }
}

#[test]
fn context_settings_apply() {
    let program = compile("if true:\n  echo(1)\n", Some(Dialect::Canonical)).unwrap();
    let mut ctx = Context::new(BackendKind::Python)
        .with_indent_width(2)
        .with_header("level one");
    let out = generate_code(&program, BackendKind::Python, Some(&mut ctx)).unwrap();
    assert!(out.starts_with("# level one\n# Generated by quill (python backend)\n"), "{out}");
    assert!(out.contains("if True:\n  print(1)\n"), "{out}");
}

#[test]
fn alternate_dialects_export_like_canonical() {
    let canonical = compile("var n = 2\nif n > 1:\n  echo(n)\n", Some(Dialect::Canonical)).unwrap();
    let python = compile("n = 2\nif n > 1:\n    print(n)\n", Some(Dialect::Python)).unwrap();
    let js = compile("let n = 2;\nif (n > 1) {\n  console.log(n);\n}\n", Some(Dialect::JavaScript)).unwrap();
    let target = export(&canonical, BackendKind::JavaScript);
    assert!(target.contains("if (n > 1) {\n    console.log(n);\n}"), "{target}");
    for program in [python, js] {
        let out = export(&program, BackendKind::JavaScript);
        assert!(out.contains("if (n > 1) {\n    console.log(n);\n}"), "{out}");
    }
}

/// Signed division, remainder and clamped slices.
const ARITHMETIC: &str = "\
var a = -7
var b = 2
var c = -2
echo(a / b)
echo(a div b)
echo(a mod b)
echo(7 mod c)
echo(a div c)
echo(7 div 2, \" \", 7 mod 2)
let s = \"hello\"
echo(s[1..3])
echo(s[-2..1])
echo(s[0..<2])
";

const ARITHMETIC_OUTPUT: [&str; 9] = ["-3", "-3", "-1", "1", "3", "3 1", "ell", "he", "he"];

/// Runs `source` with `program`, or returns None when it is not installed.
fn run_with(program: &str, file: &str, source: &str) -> Option<Vec<String>> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file);
    std::fs::write(&path, source).unwrap();
    let out = std::process::Command::new(program).arg(&path).output().ok()?;
    assert!(out.status.success(), "{program} failed:\n{}\n{source}", String::from_utf8_lossy(&out.stderr));
    Some(String::from_utf8_lossy(&out.stdout).lines().map(str::to_string).collect())
}

#[test]
fn arithmetic_runs_in_the_interpreter() {
    let mut rt = Runtime::new();
    rt.run(ARITHMETIC, Some(Dialect::Canonical)).unwrap();
    assert_eq!(rt.take_output(), ARITHMETIC_OUTPUT);
}

#[test]
fn arithmetic_exports_truncate_per_backend() {
    let program = compile(ARITHMETIC, Some(Dialect::Canonical)).unwrap();

    let nim = export(&program, BackendKind::Nim);
    for needle in ["echo(a div b)", "echo(a mod b)", "echo(7 mod c)", "s[1..3]"] {
        assert!(nim.contains(needle), "missing {needle:?} in:\n{nim}");
    }

    let py = export(&program, BackendKind::Python);
    for needle in [
        "print(quill_idiv(a, b))",
        "print(quill_mod(a, b))",
        "print(quill_mod(7, c))",
        "print(7 // 2, \" \", 7 % 2, sep=\"\")",
        "print(s[1:4])",
        "print(s[0:2])",
    ] {
        assert!(py.contains(needle), "missing {needle:?} in:\n{py}");
    }

    let js = export(&program, BackendKind::JavaScript);
    for needle in [
        "console.log(Math.trunc(a / b));",
        "console.log(a % b);",
        "console.log(Math.trunc(a / c));",
        "console.log(s.slice(1, 4));",
        "console.log(s.slice(0, 2));",
    ] {
        assert!(js.contains(needle), "missing {needle:?} in:\n{js}");
    }
}

#[test]
fn exported_arithmetic_matches_the_interpreter() {
    let program = compile(ARITHMETIC, Some(Dialect::Canonical)).unwrap();
    for (backend, interpreter, file) in [
        (BackendKind::Python, "python3", "arith.py"),
        (BackendKind::JavaScript, "node", "arith.js"),
    ] {
        let source = export(&program, backend);
        match run_with(interpreter, file, &source) {
            Some(lines) => assert_eq!(lines, ARITHMETIC_OUTPUT, "{backend}:\n{source}"),
            None => eprintln!("skipping {backend}: {interpreter} is not installed"),
        }
    }
}
