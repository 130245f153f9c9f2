use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new(config: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(&path, config).unwrap();
        Workspace { dir, config: path }
    }

    fn file(&self, name: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    fn quill(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_quill"))
            .current_dir(self.dir.path())
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()
            .unwrap()
    }
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn run_prints_echo_output() {
    let ws = Workspace::new("");
    let script = ws.file("count.quill", "var total = 0\nfor i in 1..3:\n  total += i\necho(\"total \", total)\n");
    let out = ws.quill(&["run", arg(&script)]);
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out), "total 6\n");
}

#[test]
fn run_fires_a_lifecycle_repeatedly() {
    let ws = Workspace::new("");
    let script = ws.file("tick.quill", "echo(\"tick\")\n");
    let out = ws.quill(&["run", arg(&script), "--lifecycle", "update", "--ticks", "3"]);
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out), "tick\ntick\ntick\n");
}

#[test]
fn export_writes_the_requested_backend() {
    let ws = Workspace::new("[export]\nbackend = \"nim\"\n");
    let script = ws.file("hello.py", "def greet(name):\n    return \"hi \" + name\n\nprint(greet(\"ann\"))\n");
    let target = ws.dir.path().join("hello.js");

    let out = ws.quill(&["export", arg(&script), "-b", "js", "-o", arg(&target)]);
    assert!(out.status.success(), "{out:?}");
    assert!(stdout(&out).is_empty());
    let js = std::fs::read_to_string(&target).unwrap();
    assert!(js.contains("function greet(name) {"), "{js}");
    assert!(js.contains("console.log(greet(\"ann\"));"), "{js}");

    // Without -b the configured backend is used.
    let out = ws.quill(&["export", arg(&script)]);
    assert!(out.status.success(), "{out:?}");
    assert!(stdout(&out).contains("proc greet(name: auto): auto ="), "{}", stdout(&out));
}

#[test]
fn detect_names_the_dialect() {
    let ws = Workspace::new("");
    let script = ws.file("game.txt", "function f() {\n  return 1;\n}\nconsole.log(f());\n");
    let out = ws.quill(&["detect", arg(&script)]);
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out), "javascript\n");
}

#[test]
fn errors_exit_with_status_one() {
    let ws = Workspace::new("");
    let script = ws.file("bad.quill", "echo(undefinedName)\n");
    let out = ws.quill(&["run", arg(&script)]);
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("undefinedName"), "{err}");

    let out = ws.quill(&["run", "missing.quill"]);
    assert_eq!(out.status.code(), Some(1));

    let bad_config = Workspace::new("[export]\nbackend = \"cobol\"\n");
    let script = bad_config.file("a.quill", "echo(1)\n");
    let out = bad_config.quill(&["run", arg(&script)]);
    assert_eq!(out.status.code(), Some(1));
}
