use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quill::frontend::{parse, tokenize};
use quill::{compile, generate_code, BackendKind, Dialect, Runtime};

const SCRIPT: &str = "\
proc fib(n: int): int =
  if n < 2:
    return n
  fib(n - 1) + fib(n - 2)
var total = 0
for i in 0..<15:
  total += fib(i)
var words = [\"start\"]
for i in 0..<50:
  words.add($i)
echo(total, \" \", words.len)
";

fn make_source(repeats: usize) -> String {
    SCRIPT.repeat(repeats)
}

fn bench_frontend(c: &mut Criterion) {
    let small = make_source(1);
    let large = make_source(100);

    let mut g = c.benchmark_group("frontend");
    g.bench_function("tokenize_small", |b| {
        b.iter(|| tokenize(black_box(&small), Dialect::Canonical))
    });
    g.bench_function("tokenize_large", |b| {
        b.iter(|| tokenize(black_box(&large), Dialect::Canonical))
    });

    let tokens = tokenize(&large, Dialect::Canonical).unwrap();
    g.bench_function("parse_large", |b| b.iter(|| parse(black_box(&tokens))));
    g.finish();
}

fn bench_interpret(c: &mut Criterion) {
    let program = compile(SCRIPT, Some(Dialect::Canonical)).unwrap();
    c.bench_function("interpret_fib15", |b| {
        b.iter(|| {
            let mut rt = Runtime::new();
            let root = rt.root().clone();
            rt.exec_program(black_box(&program), &root).unwrap();
            rt.take_output()
        })
    });
}

fn bench_generate(c: &mut Criterion) {
    let program = compile(&make_source(20), Some(Dialect::Canonical)).unwrap();
    let mut g = c.benchmark_group("generate");
    for backend in BackendKind::ALL {
        g.bench_function(backend.name(), |b| {
            b.iter(|| generate_code(black_box(&program), backend, None).unwrap())
        });
    }
    g.finish();
}

criterion_group!(benches, bench_frontend, bench_interpret, bench_generate);
criterion_main!(benches);
