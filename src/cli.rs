//! CLI argument parsing and command handling.
//!
//! This module provides the command-line interface for esa
//! (`event_stream_auditor`): the live watch loop, one-shot audits,
//! rules tooling, the git/CI gate, and configuration helpers.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use crate::config::{self, AuditorConfig, Mode};
use crate::dashboard::{Dashboard, DashboardMeta};
use crate::dedup::FingerprintSet;
use crate::engine::{AuditEngine, AuditReport};
use crate::event::parse_feed_lines;
use crate::feed::CliFeed;
use crate::gate::{self, GateHook};
use crate::logging::AuditLogger;
use crate::poller::Poller;
use crate::report::{
    lock_stats, print_finding, print_pass_summary, print_session_summary, render_report_json,
    shared_stats,
};
use crate::rules::loader::{effective_rules, load_rules_file};
use crate::rules::{CompiledRule, RuleSet};

/// Streaming audit agent for multi-agent event feeds.
///
/// esa (`event_stream_auditor`) polls an agent communication feed,
/// evaluates every event against a regex rule set, and posts warnings,
/// soft blocks and suggestions back to the feed. The same rules can
/// gate git commits and pushes, where a block actually blocks.
#[derive(Parser, Debug)]
#[command(name = "esa")]
#[command(version, about, long_about = None)]
#[command(after_help = "Run 'esa init' to generate a starter configuration.")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Whether verbose diagnostics were requested, checked before the
    /// tracing subscriber is installed.
    #[must_use]
    pub fn wants_verbose(&self) -> bool {
        matches!(&self.command, Command::Watch(args) if args.verbose)
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch the live feed and audit events as they arrive
    #[command(name = "watch")]
    Watch(WatchArgs),

    /// Audit an NDJSON event dump once and exit
    #[command(name = "audit")]
    Audit(AuditArgs),

    /// Inspect or validate rule sets
    #[command(name = "rules")]
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Run as a git or CI gate over pending changes
    #[command(name = "gate")]
    Gate(GateArgs),

    /// Write a starter configuration file
    #[command(name = "init")]
    Init {
        /// Destination path (prints to stdout when omitted)
        #[arg(long, short)]
        output: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the fully resolved configuration and its sources
    #[command(name = "show-config")]
    ShowConfig {
        /// Use this config file instead of the discovered layers
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Operating mode
    #[arg(long, short, value_enum)]
    pub mode: Option<Mode>,

    /// Audit only events from this instance
    #[arg(long, short)]
    pub target: Option<String>,

    /// Rules file (defaults to config, then the built-in set)
    #[arg(long, short)]
    pub rules: Option<PathBuf>,

    /// Use this config file instead of the discovered layers
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Force the live dashboard on
    #[arg(long, conflicts_with = "no_dashboard")]
    pub dashboard: bool,

    /// Force the live dashboard off
    #[arg(long, conflicts_with = "dashboard")]
    pub no_dashboard: bool,

    /// Verbose diagnostics on stderr
    #[arg(long, short)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// NDJSON file to audit ('-' or omitted reads stdin)
    #[arg(long, short)]
    pub input: Option<String>,

    /// Rules file (defaults to config, then the built-in set)
    #[arg(long, short)]
    pub rules: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = ReportFormat::Pretty)]
    pub format: ReportFormat,

    /// Use this config file instead of the discovered layers
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Output format for one-shot audits.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List the rules that would be in effect
    #[command(name = "list")]
    List {
        /// Rules file (defaults to config, then the built-in set)
        #[arg(long, short)]
        rules: Option<PathBuf>,

        /// Use this config file instead of the discovered layers
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a rules file and exit
    #[command(name = "check")]
    Check {
        /// Rules file to validate
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct GateArgs {
    #[command(subcommand)]
    pub hook: GateHookArg,

    /// Rules file (defaults to config, then the built-in set)
    #[arg(long, short, global = true)]
    pub rules: Option<PathBuf>,

    /// Use this config file instead of the discovered layers
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Character budget for the printed report
    #[arg(long, default_value_t = gate::DEFAULT_MAX_CHARS)]
    pub max_chars: usize,
}

/// Hook selector mirroring git's hook names.
#[derive(Subcommand, Debug)]
pub enum GateHookArg {
    /// Audit the staged index before a commit
    #[command(name = "pre-commit")]
    PreCommit,

    /// Audit a commit message file
    #[command(name = "commit-msg")]
    CommitMsg {
        /// Path git passes to the commit-msg hook
        message_file: PathBuf,
    },

    /// Audit the commits about to be pushed (hook input on stdin)
    #[command(name = "pre-push")]
    PrePush,

    /// Audit an explicit revision range
    #[command(name = "ci")]
    Ci {
        /// Revision range, e.g. origin/main..HEAD
        #[arg(long)]
        range: String,
    },
}

impl GateHookArg {
    fn to_hook(&self) -> GateHook {
        match self {
            Self::PreCommit => GateHook::PreCommit,
            Self::CommitMsg { message_file } => GateHook::CommitMsg {
                message_file: message_file.clone(),
            },
            Self::PrePush => GateHook::PrePush,
            Self::Ci { range } => GateHook::Ci {
                range: range.clone(),
            },
        }
    }
}

pub fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Watch(args) => watch(args),
        Command::Audit(args) => audit(args),
        Command::Rules { action } => match action {
            RulesAction::List { rules, config } => {
                rules_list(rules.as_deref(), config.as_deref())
            }
            RulesAction::Check { path } => rules_check(&path),
        },
        Command::Gate(args) => run_gate_command(args),
        Command::Init { output, force } => init_config(output, force),
        Command::ShowConfig { config } => show_config(config.as_deref()),
    }
}

// Broken setup exits 2 so hook scripts can tell it apart from an audit
// denial (exit 1).
fn load_config_or_exit(explicit: Option<&Path>) -> AuditorConfig {
    match config::load(explicit) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(2);
        }
    }
}

fn load_rules_or_exit(path: Option<&Path>) -> RuleSet {
    match effective_rules(path) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("Rules error: {e}");
            process::exit(2);
        }
    }
}

fn watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config_or_exit(args.config.as_deref());
    if let Some(mode) = args.mode {
        config.agent.mode = mode;
    }
    if let Some(target) = args.target {
        config.agent.target_instance = Some(target);
    }
    if let Some(rules) = args.rules {
        config.auditing.rules_path = Some(rules);
    }
    if args.verbose {
        config.agent.verbose = true;
    }
    if args.dashboard {
        config.agent.enable_dashboard = true;
    }
    if args.no_dashboard {
        config.agent.enable_dashboard = false;
    }

    let rules = load_rules_or_exit(config.auditing.rules_path.as_deref());
    let rules_label = format!("{} ({} rules)", rules.source().describe(), rules.len());

    let feed = CliFeed::new(config.feed.command.clone());
    if !feed.is_available() {
        warn!(command = %config.feed.command, "feed CLI not responding; polling will keep retrying");
    }

    let stats = shared_stats();
    let logger = AuditLogger::from_config(&config.audit_log);
    if let Some(logger) = &logger {
        info!(path = %logger.path().display(), "audit trail enabled");
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })?;

    let use_dashboard = config.agent.enable_dashboard && io::stdout().is_terminal();
    let dashboard = use_dashboard.then(|| {
        Dashboard::spawn(
            Arc::clone(&stats),
            DashboardMeta {
                agent: config.agent.name.clone(),
                mode_label: config.agent.mode.label(),
                target: config.agent.target_instance.clone(),
                rules_label,
            },
        )
    });

    let mut poller = Poller::new(
        AuditEngine::new(rules),
        Box::new(feed),
        &config,
        Arc::clone(&stats),
        logger,
    )
    .with_quiet_console(use_dashboard);
    if use_dashboard {
        // The roster is only painted by the dashboard; a refresh every
        // ~5s at the default interval is plenty.
        poller = poller.with_roster_refresh(50);
    }
    poller.run(&running);

    if let Some(dashboard) = dashboard {
        dashboard.stop();
    }
    print_session_summary(&lock_stats(&stats));
    Ok(())
}

fn audit(args: AuditArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(args.config.as_deref());
    let rules_path = args.rules.or(config.auditing.rules_path);
    let rules = load_rules_or_exit(rules_path.as_deref());
    let engine = AuditEngine::new(rules);

    let text = match args.input.as_deref() {
        None | Some("-") => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        Some(path) => std::fs::read_to_string(path)?,
    };

    let batch = parse_feed_lines(&text);
    let mut seen = FingerprintSet::new();
    let mut duplicates: u64 = 0;
    let mut report = AuditReport::new();
    for event in &batch.events {
        if !seen.check_and_record(event.fingerprint()) {
            duplicates += 1;
            continue;
        }
        engine.audit_event(event, &mut report);
    }

    match args.format {
        ReportFormat::Json => println!("{}", render_report_json(&report)),
        ReportFormat::Pretty => {
            for finding in &report.findings {
                print_finding(finding);
            }
            if report.is_clean() {
                println!(
                    "clean: {} event(s) audited, no findings",
                    report.events_audited
                );
            } else {
                print_pass_summary(&report);
            }
            if batch.malformed > 0 || duplicates > 0 {
                eprintln!(
                    "({} malformed line(s) skipped, {} duplicate(s) suppressed)",
                    batch.malformed, duplicates
                );
            }
        }
    }
    Ok(())
}

fn rules_list(
    rules_arg: Option<&Path>,
    config_arg: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(config_arg);
    let path = rules_arg
        .map(Path::to_path_buf)
        .or(config.auditing.rules_path);
    let rules = load_rules_or_exit(path.as_deref());

    println!("{} ({} rules)", rules.source().describe(), rules.len());
    println!();
    for rule in rules.iter() {
        println!(
            "  {:<24} {:<10} {:<6} {:<7}  {}",
            rule.name,
            rule.category.label(),
            rule.severity.label(),
            rule.action.label(),
            rule_check_column(rule)
        );
    }
    Ok(())
}

fn rule_check_column(rule: &CompiledRule) -> String {
    match (&rule.pattern, rule.max_lines) {
        (Some(regex), _) => regex.as_str().to_string(),
        (None, Some(max)) => format!("lines > {max}"),
        (None, None) => "-".to_string(),
    }
}

fn rules_check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match load_rules_file(path) {
        Ok(rules) => {
            println!("OK: {} rules in {}", rules.len(), path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Rules error: {e}");
            process::exit(2);
        }
    }
}

fn run_gate_command(args: GateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(args.config.as_deref());
    let path = args.rules.or(config.auditing.rules_path);
    let rules = load_rules_or_exit(path.as_deref());
    let engine = AuditEngine::new(rules);

    let hook = args.hook.to_hook();
    let outcome = match gate::run_gate(&engine, &hook) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Gate error: {e}");
            process::exit(2);
        }
    };

    print!("{}", gate::render_gate_report(&outcome, args.max_chars));
    if outcome.denied {
        process::exit(1);
    }
    Ok(())
}

fn init_config(output: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let sample = config::generate_sample_config();

    match output {
        Some(path) => {
            let path = Path::new(&path);
            if path.exists() && !force {
                return Err(
                    format!("File exists: {}. Use --force to overwrite.", path.display()).into(),
                );
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            std::fs::write(path, sample)?;
            println!("Configuration written to: {}", path.display());
        }
        None => {
            println!("{sample}");
        }
    }

    Ok(())
}

fn show_config(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(explicit);

    println!("Config sources (lowest → highest priority):");
    match explicit {
        Some(path) => println!("  - explicit: {}", path.display()),
        None => {
            let system = config::system_config_path();
            if system.is_file() {
                println!("  - system: {}", system.display());
            }
            if let Some(user) = config::user_config_path() {
                if user.is_file() {
                    println!("  - user: {}", user.display());
                }
            }
            if let Some(project) = config::project_config_path() {
                println!("  - project: {}", project.display());
            }
        }
    }
    for name in [
        "ESA_MODE",
        "ESA_TARGET",
        "ESA_RULES",
        "ESA_DASHBOARD",
        "ESA_LOG_FILE",
    ] {
        if let Ok(value) = std::env::var(name) {
            println!("  - env: {name}={value}");
        }
    }
    println!();
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbose_is_only_read_from_watch() {
        let cli = Cli::try_parse_from(["esa", "watch", "--verbose", "--no-dashboard"]).unwrap();
        assert!(cli.wants_verbose());

        let cli = Cli::try_parse_from(["esa", "audit", "--input", "events.ndjson"]).unwrap();
        assert!(!cli.wants_verbose());
    }

    #[test]
    fn dashboard_flags_conflict() {
        assert!(Cli::try_parse_from(["esa", "watch", "--dashboard", "--no-dashboard"]).is_err());
    }

    #[test]
    fn gate_hooks_map_one_to_one() {
        let cli = Cli::try_parse_from(["esa", "gate", "pre-commit"]).unwrap();
        let Command::Gate(args) = cli.command else {
            panic!("expected gate");
        };
        assert_eq!(args.hook.to_hook(), GateHook::PreCommit);
        assert_eq!(args.max_chars, gate::DEFAULT_MAX_CHARS);

        let cli = Cli::try_parse_from(["esa", "gate", "ci", "--range", "main..HEAD"]).unwrap();
        let Command::Gate(args) = cli.command else {
            panic!("expected gate");
        };
        assert_eq!(
            args.hook.to_hook(),
            GateHook::Ci {
                range: "main..HEAD".to_string()
            }
        );
    }

    #[test]
    fn mode_values_parse() {
        for (value, mode) in [
            ("readonly", Mode::Readonly),
            ("warn", Mode::Warn),
            ("block", Mode::Block),
        ] {
            let cli = Cli::try_parse_from(["esa", "watch", "--mode", value]).unwrap();
            let Command::Watch(args) = cli.command else {
                panic!("expected watch");
            };
            assert_eq!(args.mode, Some(mode));
        }
        assert!(Cli::try_parse_from(["esa", "watch", "--mode", "loud"]).is_err());
    }
}
