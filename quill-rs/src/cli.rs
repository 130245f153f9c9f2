//! Command-line interface.
//!
//! ```text
//! quill run <file> [--dialect D] [--lifecycle L [--ticks N]]
//! quill tokens <file> [--dialect D]
//! quill ast <file> [--dialect D]
//! quill export <file> [--backend nim|python|js] [-o out]
//! quill detect <file>
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::codegen::{generate_code, BackendKind};
use crate::config::Config;
use crate::error::{QuillError, Result};
use crate::frontend::{self, detect, Dialect};
use crate::lifecycle::{FragmentSet, Lifecycle};
use crate::runtime::Runtime;

// ── Arguments ─────────────────────────────────────────────────────────────────

/// Quill: embeddable scripting engine and source exporter
#[derive(Debug, Parser)]
#[command(name = "quill", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./quill.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a script
    Run {
        file: PathBuf,

        /// Source dialect (canonical, python, javascript); detected if omitted
        #[arg(long)]
        dialect: Option<Dialect>,

        /// Treat the file as a fragment for this lifecycle event
        #[arg(long)]
        lifecycle: Option<Lifecycle>,

        /// How many times to fire the lifecycle event
        #[arg(long, default_value_t = 1, requires = "lifecycle")]
        ticks: u32,
    },

    /// Print the canonical token stream
    Tokens {
        file: PathBuf,

        #[arg(long)]
        dialect: Option<Dialect>,
    },

    /// Print the parsed syntax tree
    Ast {
        file: PathBuf,

        #[arg(long)]
        dialect: Option<Dialect>,
    },

    /// Translate a script to Nim, Python or JavaScript
    Export {
        file: PathBuf,

        /// Target language; falls back to `[export] backend` in the config
        #[arg(short, long)]
        backend: Option<BackendKind>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        dialect: Option<Dialect>,
    },

    /// Report which dialect a file is written in
    Detect { file: PathBuf },
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Run a parsed command line, writing results to `out`.
pub fn execute(cli: Cli, out: &mut dyn Write) -> Result<()> {
    let config = Config::discover(cli.config.as_deref())?;
    let write_err = |e: std::io::Error| QuillError::io("<stdout>", e);

    match cli.command {
        Command::Run {
            file,
            dialect,
            lifecycle,
            ticks,
        } => {
            let (dialect, program) = frontend::compile_file(&file, dialect.or(config.dialect))?;
            debug!(file = %file.display(), %dialect, "running");
            let mut rt = Runtime::new();
            config.apply(&mut rt);

            let result = match lifecycle {
                None => {
                    let root = rt.root().clone();
                    rt.exec_program(&program, &root)
                }
                Some(lifecycle) => {
                    let mut fragments = FragmentSet::new();
                    fragments.add_program(lifecycle, program);
                    let mut first_error = None;
                    for _ in 0..ticks {
                        let errors = fragments.fire(lifecycle, &mut rt);
                        if first_error.is_none() {
                            first_error = errors.into_iter().next();
                        }
                    }
                    first_error.map_or(Ok(()), Err)
                }
            };
            for line in rt.take_output() {
                writeln!(out, "{line}").map_err(write_err)?;
            }
            result
        }

        Command::Tokens { file, dialect } => {
            let (source, dialect) = read_source(&file, dialect.or(config.dialect))?;
            for t in frontend::tokenize(&source, dialect)? {
                writeln!(out, "{}:{}\t{:?}\t{:?}", t.line, t.col, t.kind, t.lexeme).map_err(write_err)?;
            }
            Ok(())
        }

        Command::Ast { file, dialect } => {
            let (_, program) = frontend::compile_file(&file, dialect.or(config.dialect))?;
            writeln!(out, "{program:#?}").map_err(write_err)?;
            Ok(())
        }

        Command::Export {
            file,
            backend,
            output,
            dialect,
        } => {
            let backend = backend.or(config.backend).ok_or_else(|| {
                QuillError::Config(crate::config::ConfigError::Invalid {
                    path: config.path.clone().unwrap_or_else(|| PathBuf::from(crate::config::FILE_NAME)),
                    message: "no export backend given (use --backend or [export] backend)".into(),
                })
            })?;
            let (_, program) = frontend::compile_file(&file, dialect.or(config.dialect))?;
            let mut ctx = config.context(backend);
            let text = generate_code(&program, backend, Some(&mut ctx))?;
            match output {
                Some(path) => std::fs::write(&path, text).map_err(|e| QuillError::io(&path, e))?,
                None => out.write_all(text.as_bytes()).map_err(write_err)?,
            }
            Ok(())
        }

        Command::Detect { file } => {
            let (_, dialect) = read_source(&file, None)?;
            writeln!(out, "{dialect}").map_err(write_err)?;
            Ok(())
        }
    }
}

fn read_source(path: &Path, dialect: Option<Dialect>) -> Result<(String, Dialect)> {
    let source = std::fs::read_to_string(path).map_err(|e| QuillError::io(path, e))?;
    let dialect = dialect.unwrap_or_else(|| detect(&source, Some(path)));
    Ok((source, dialect))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("quill").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn run_with_lifecycle() {
        let cli = parse(&["run", "game.quill", "--lifecycle", "on_update", "--ticks", "3"]);
        let Command::Run {
            file, lifecycle, ticks, ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(file, PathBuf::from("game.quill"));
        assert_eq!(lifecycle, Some(Lifecycle::Update));
        assert_eq!(ticks, 3);
    }

    #[test]
    fn export_flags() {
        let cli = parse(&["export", "a.py", "-b", "js", "-o", "out.js", "-v"]);
        assert!(cli.verbose);
        let Command::Export { backend, output, .. } = cli.command else {
            panic!("expected export");
        };
        assert_eq!(backend, Some(BackendKind::JavaScript));
        assert_eq!(output, Some(PathBuf::from("out.js")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Cli::try_parse_from(["quill", "run", "a", "--dialect", "ruby"]).is_err());
        assert!(Cli::try_parse_from(["quill", "export", "a", "--backend", "cobol"]).is_err());
        assert!(Cli::try_parse_from(["quill", "run", "a", "--ticks", "2"]).is_err());
        assert!(Cli::try_parse_from(["quill"]).is_err());
    }

    #[test]
    fn execute_run_and_detect() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hello.py");
        std::fs::write(&script, "def greet(n):\n    return \"hi \" + n\nprint(greet(\"bob\"))\n").unwrap();
        let config = dir.path().join("quill.toml");
        std::fs::write(&config, "").unwrap();

        let mut out = Vec::new();
        let cli = parse(&["--config", config.to_str().unwrap(), "run", script.to_str().unwrap()]);
        execute(cli, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hi bob\n");

        let mut out = Vec::new();
        let cli = parse(&["--config", config.to_str().unwrap(), "detect", script.to_str().unwrap()]);
        execute(cli, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "python\n");
    }

    #[test]
    fn export_without_backend_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("a.quill");
        std::fs::write(&script, "echo(1)\n").unwrap();
        let config = dir.path().join("quill.toml");
        std::fs::write(&config, "").unwrap();
        let cli = parse(&["--config", config.to_str().unwrap(), "export", script.to_str().unwrap()]);
        let err = execute(cli, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("no export backend"), "{err}");
    }
}
