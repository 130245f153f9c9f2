use std::cell::RefCell;
use std::rc::Rc;

use quill::plugin::CodegenMapping;
use quill::script::RuntimeError;
use quill::{generate_code, BackendKind, Context, Dialect, Extension, FragmentSet, Lifecycle, QuillError, Runtime, Value};

fn output(rt: &mut Runtime, src: &str) -> Vec<String> {
    rt.run(src, Some(Dialect::Canonical))
        .unwrap_or_else(|e| panic!("script failed: {e}\n{src}"));
    rt.take_output()
}

fn eval(src: &str) -> Value {
    Runtime::new()
        .eval(src, Some(Dialect::Canonical))
        .unwrap_or_else(|e| panic!("eval failed: {e}\n{src}"))
}

// ── End to end ────────────────────────────────────────────────────────────────

#[test]
fn report_is_called_once_with_the_sum() {
    let mut rt = Runtime::new();
    let calls: Rc<RefCell<Vec<Vec<Value>>>> = Rc::default();
    let seen = Rc::clone(&calls);
    rt.register_native("report", move |_, args| {
        seen.borrow_mut().push(args.to_vec());
        Ok(Value::Nil)
    });

    rt.run(
        "var counter = 0\nfor i in 0..<5:\n  counter = counter + i\nreport(counter)",
        None,
    )
    .unwrap();

    assert_eq!(*calls.borrow(), vec![vec![Value::Int(10)]]);
}

// ── Scoping ───────────────────────────────────────────────────────────────────

#[test]
fn assignment_reaches_root_but_child_declarations_vanish() {
    let mut rt = Runtime::new();
    rt.run("var x = 1", None).unwrap();

    let child = rt.new_env(None);
    rt.run_in("x = 2", None, &child).unwrap();
    assert_eq!(rt.get_global("x"), Some(Value::Int(2)));

    let child = rt.new_env(None);
    rt.run_in("var x = 3\nx = 4", None, &child).unwrap();
    drop(child);
    assert_eq!(rt.get_global("x"), Some(Value::Int(2)));
}

#[test]
fn undeclared_assignment_in_child_stays_local() {
    let mut rt = Runtime::new();
    let child = rt.new_env(None);
    rt.run_in("fresh = 1", None, &child).unwrap();
    assert_eq!(rt.get_global("fresh"), None);
    assert_eq!(child.get("fresh"), Some(Value::Int(1)));
}

// ── Numbers, ranges and slices ────────────────────────────────────────────────

#[test]
fn numeric_semantics() {
    assert_eq!(eval("3 / 2 == 1"), Value::Bool(true));
    assert_eq!(eval("3.0 / 2 == 1.5"), Value::Bool(true));
    assert_eq!(eval("5 mod 2 == 1"), Value::Bool(true));
    assert_eq!(eval("3 / 2"), Value::Int(1));
    assert_eq!(eval("3.0 / 2"), Value::Float(1.5));
}

#[test]
fn slices_and_ranges() {
    let a = "let a = [10, 20, 30, 40]\n";
    assert_eq!(
        eval(&format!("{a}a[1..2]")),
        Value::Array(vec![Value::Int(20), Value::Int(30)])
    );
    assert_eq!(eval(&format!("{a}a[1..<2]")), Value::Array(vec![Value::Int(20)]));

    let mut rt = Runtime::new();
    assert_eq!(output(&mut rt, "for i in 0..<3:\n  echo(i)"), vec!["0", "1", "2"]);
}

// ── Control flow ──────────────────────────────────────────────────────────────

#[test]
fn labeled_break_leaves_the_outer_loop() {
    let src = "\
var hits = 0
var rounds = 0
outer: for i in 0..<5:
  rounds = rounds + 1
  var j = 0
  while true:
    j = j + 1
    if j > 2:
      break outer
    hits = hits + 1
echo(hits, \" \", rounds)
";
    let mut rt = Runtime::new();
    assert_eq!(output(&mut rt, src), vec!["2 1"]);
}

#[test]
fn var_params_copy_back_only_to_identifiers() {
    let src = "\
proc bump(x: var int) =
  x = x + 1
var n = 1
bump(n)
echo(n)
var xs = [1]
bump(xs[0])
echo(xs[0])
";
    let mut rt = Runtime::new();
    assert_eq!(output(&mut rt, src), vec!["2", "1"]);
}

#[test]
fn runtime_errors_are_returned_not_fatal() {
    let mut rt = Runtime::new();
    let err = rt.run("echo(missing)", None).unwrap_err();
    assert!(matches!(err, QuillError::Runtime(RuntimeError::Undefined(ref n)) if n == "missing"));
    assert!(matches!(rt.run("let = 1", None), Err(QuillError::Parse(_))));
    assert!(matches!(rt.run("echo(\"open", None), Err(QuillError::Lex(_))));
    assert_eq!(output(&mut rt, "echo(\"alive\")"), vec!["alive"]);
}

#[test]
fn full_width_ranges_are_values_not_crashes() {
    let mut rt = Runtime::new();
    let src = "\
let wide = (-9223372036854775807 - 1)..9223372036854775806
if wide:
  echo(len(wide))
echo(wide[3])
";
    assert_eq!(output(&mut rt, src), vec!["9223372036854775807", "-9223372036854775805"]);
}

#[test]
fn deep_nesting_is_a_parse_error() {
    let mut rt = Runtime::new();
    let src = format!("echo({}1{})", "(".repeat(10_000), ")".repeat(10_000));
    assert!(matches!(rt.run(&src, Some(Dialect::Canonical)), Err(QuillError::Parse(_))));
    assert_eq!(output(&mut rt, "echo(((1)))"), vec!["1"]);
}

#[test]
fn default_call_depth_is_reached_on_a_small_thread() {
    let worker = std::thread::Builder::new()
        .stack_size(512 * 1024)
        .spawn(|| {
            let mut rt = Runtime::new();
            let src = "proc f(n: int): int =\n  if n == 0:\n    return 0\n  f(n - 1) + 1\necho(f(500))\n";
            rt.run(src, Some(Dialect::Canonical)).map_err(|e| e.to_string())?;
            let deep = rt.run("echo(f(600))", Some(Dialect::Canonical)).map_err(|e| e.to_string());
            Ok::<_, String>((rt.take_output(), deep.err()))
        })
        .unwrap();
    let (out, deep) = worker.join().unwrap().unwrap();
    assert_eq!(out, vec!["500"]);
    assert_eq!(deep.as_deref(), Some("runtime error: call depth limit of 512 exceeded"));
}

// ── Dialects ──────────────────────────────────────────────────────────────────

const FIB_CANONICAL: &str = "\
proc fib(n: int): int =
  if n < 2:
    return n
  return fib(n - 1) + fib(n - 2)
var total = 0
for i in 0..<10:
  total = total + fib(i)
echo(total)
";

const FIB_PYTHON: &str = "\
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)

total = 0
for i in range(10):
    total = total + fib(i)
print(total)
";

const FIB_JAVASCRIPT: &str = "\
function fib(n) {
  if (n < 2) {
    return n;
  }
  return fib(n - 1) + fib(n - 2);
}
let total = 0;
for (let i = 0; i < 10; i++) {
  total = total + fib(i);
}
console.log(total);
";

#[test]
fn dialects_agree() {
    for (dialect, src) in [
        (Dialect::Canonical, FIB_CANONICAL),
        (Dialect::Python, FIB_PYTHON),
        (Dialect::JavaScript, FIB_JAVASCRIPT),
    ] {
        let mut rt = Runtime::new();
        rt.run(src, Some(dialect))
            .unwrap_or_else(|e| panic!("{dialect} failed: {e}"));
        assert_eq!(rt.take_output(), vec!["88"], "{dialect}");
    }
}

#[test]
fn dialect_is_detected_when_not_given() {
    for src in [FIB_PYTHON, FIB_JAVASCRIPT] {
        let mut rt = Runtime::new();
        rt.run(src, None).unwrap();
        assert_eq!(rt.take_output(), vec!["88"]);
    }
}

// ── Lifecycle fragments ───────────────────────────────────────────────────────

#[test]
fn lifecycle_scopes_and_error_boundary() {
    let mut rt = Runtime::new();
    let mut fragments = FragmentSet::new();
    fragments.add(Lifecycle::Init, "var score = 0", None).unwrap();
    fragments
        .add(Lifecycle::Update, "score = score + 1\nvar scratch = score", None)
        .unwrap();
    fragments.add(Lifecycle::Update, "echo(nope)", None).unwrap();
    fragments.add(Lifecycle::Update, "echo(score)", None).unwrap();

    assert!(fragments.fire(Lifecycle::Init, &mut rt).is_empty());
    for _ in 0..2 {
        let errors = fragments.fire(Lifecycle::Update, &mut rt);
        assert_eq!(errors.len(), 1);
    }

    assert_eq!(rt.get_global("score"), Some(Value::Int(2)));
    assert_eq!(rt.get_global("scratch"), None);
    assert_eq!(rt.take_output(), vec!["1", "2"]);
}

// ── Extensions ────────────────────────────────────────────────────────────────

#[test]
fn extension_functions_run_and_map_for_export() {
    let ext = Extension::new("vec")
        .function("dot2", &[], |_, args| match args {
            [Value::Int(a), Value::Int(b), Value::Int(c), Value::Int(d)] => Ok(Value::Int(*a * *c + *b * *d)),
            _ => Err(RuntimeError::native("dot2 expects four ints")),
        })
        .constant("UNIT", 1i64)
        .codegen(
            BackendKind::Python,
            CodegenMapping::new().import("vecmath").function("dot2", "vecmath.dot2"),
        );

    let mut rt = Runtime::new();
    rt.add_extension(ext).unwrap();
    assert_eq!(rt.eval("dot2(1, 2, 3, 4) + UNIT", None).unwrap(), Value::Int(12));

    let ext = rt.registry().get("vec").unwrap();
    let mut ctx = Context::new(BackendKind::Python).with_extension(ext);
    let program = quill::compile("echo(dot2(1, 2, 3, 4))", Some(Dialect::Canonical)).unwrap();
    let out = generate_code(&program, BackendKind::Python, Some(&mut ctx)).unwrap();
    assert!(out.contains("import vecmath"), "{out}");
    assert!(out.contains("print(vecmath.dot2(1, 2, 3, 4))"), "{out}");
}

#[test]
fn runtimes_are_independent() {
    let mut a = Runtime::new();
    let mut b = Runtime::new();
    a.run("var shared = 1", None).unwrap();
    assert!(b.run("echo(shared)", None).is_err());
    assert_eq!(a.get_global("shared"), Some(Value::Int(1)));
}
