use clap::Parser;
use tracing_subscriber::EnvFilter;

use quill::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();

    // QUILL_LOG wins over -v; without either only warnings are shown.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("QUILL_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = cli::execute(cli, &mut out) {
        eprintln!("quill: {e}");
        std::process::exit(1);
    }
}
