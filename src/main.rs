#![forbid(unsafe_code)]
//! Event Stream Auditor (esa).
//!
//! Polls a multi-agent communication feed, audits every event against a
//! regex rule set, and posts warnings, soft blocks and suggestions back
//! to the feed. The same rules drive one-shot audits and the git/CI
//! gate, which is where block-action findings actually stop changes.
//!
//! Exit behavior:
//!   - Exit 0 = run completed (the feed path never hard-fails on findings)
//!   - Exit 1 = gate denial or runtime error
//!   - Exit 2 = configuration or rules error

use clap::Parser;
use colored::Colorize;
use std::io::{self, IsTerminal};

use event_stream_auditor::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

// Build metadata from vergen (set by build.rs)
const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const BUILD_TIMESTAMP: Option<&str> = option_env!("VERGEN_BUILD_TIMESTAMP");
const RUSTC_SEMVER: Option<&str> = option_env!("VERGEN_RUSTC_SEMVER");
const CARGO_TARGET: Option<&str> = option_env!("VERGEN_CARGO_TARGET_TRIPLE");

/// Configure colored output based on TTY detection.
///
/// Disables colors if stderr is not a terminal (e.g., piped to a file).
fn configure_colors() {
    if !io::stderr().is_terminal() {
        colored::control::set_override(false);
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins when set; otherwise
/// verbose mode turns on the crate's debug logging.
fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "event_stream_auditor=debug,warn"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Print version information and exit.
fn print_version() {
    eprintln!();
    eprintln!(
        "  {}",
        "╭─────────────────────────────────────────╮".bright_black()
    );
    eprintln!(
        "  {}  🔍  {}                {}",
        "│".bright_black(),
        "Event Stream Auditor".white().bold(),
        "│".bright_black()
    );
    eprintln!(
        "  {}      {}                      {}",
        "│".bright_black(),
        format!("esa v{PKG_VERSION}").cyan().bold(),
        "│".bright_black()
    );
    eprintln!(
        "  {}                                         {}",
        "│".bright_black(),
        "│".bright_black()
    );

    // Build info
    if let Some(ts) = BUILD_TIMESTAMP {
        // Extract just the date part for cleaner display
        let date = ts.split('T').next().unwrap_or(ts);
        eprintln!(
            "  {}  {} {}                   {}",
            "│".bright_black(),
            "Built:".bright_black(),
            date.white(),
            "│".bright_black()
        );
    }
    if let Some(rustc) = RUSTC_SEMVER {
        eprintln!(
            "  {}  {} {}                      {}",
            "│".bright_black(),
            "Rustc:".bright_black(),
            rustc.white(),
            "│".bright_black()
        );
    }
    if let Some(target) = CARGO_TARGET {
        eprintln!(
            "  {}  {} {}         {}",
            "│".bright_black(),
            "Target:".bright_black(),
            target.white(),
            "│".bright_black()
        );
    }

    eprintln!(
        "  {}                                         {}",
        "│".bright_black(),
        "│".bright_black()
    );
    eprintln!(
        "  {}  {}      {}",
        "│".bright_black(),
        "Every event read, every rule applied".green(),
        "│".bright_black()
    );
    eprintln!(
        "  {}",
        "╰─────────────────────────────────────────╯".bright_black()
    );
    eprintln!();
}

fn main() {
    configure_colors();

    // Check for --version before clap so the banner wins.
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return;
    }

    let cli = Cli::parse();
    init_tracing(cli.wants_verbose());

    if let Err(e) = cli::run_command(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
