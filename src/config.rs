//! Layered configuration.
//!
//! Precedence, lowest to highest: `/etc/esa/config.yaml`, then
//! `~/.config/esa/config.yaml`, then `./esa.yaml` (or `./.esa.yaml`),
//! then `ESA_*` environment variables, then CLI flags. Discovered layers
//! that fail to read or parse are skipped with a warning; a file passed
//! explicitly with `--config` is authoritative and replaces the layer
//! stack entirely, failing hard on any error.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::logging::{AuditLogConfig, LogFormat};

/// Operating mode: how findings turn into feed traffic.
///
/// `readonly` counts and logs only. `warn` posts notices but downgrades
/// block-action findings to warnings. `block` posts block notices as
/// well; those are advisory on the feed path, the git/CI gate is the
/// only place a block actually stops anything.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Readonly,
    #[default]
    Warn,
    Block,
}

impl Mode {
    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Readonly => "readonly",
            Self::Warn => "warn",
            Self::Block => "block",
        }
    }

    /// Readonly sessions never produce feed traffic.
    #[must_use]
    pub const fn is_readonly(&self) -> bool {
        matches!(self, Self::Readonly)
    }
}

/// Configuration loading failure. Only raised for an explicit
/// `--config` path; discovered layers degrade to warnings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Identity and posture of this auditor instance.
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    /// Name used when posting notices to the feed.
    pub name: String,
    pub mode: Mode,
    /// Audit a single instance; `None` audits everything.
    pub target_instance: Option<String>,
    pub enable_dashboard: bool,
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "auditor".to_string(),
            mode: Mode::default(),
            target_instance: None,
            enable_dashboard: true,
            verbose: false,
        }
    }
}

/// How to reach the event feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedConfig {
    /// External communication CLI to poll.
    pub command: String,
    /// Events requested per tick (`events --last N`).
    pub batch_size: u32,
    pub poll_interval_ms: u64,
    /// Warn after this many consecutive fetch failures.
    pub failure_warn_threshold: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            command: "hcom".to_string(),
            batch_size: 50,
            poll_interval_ms: 100,
            failure_warn_threshold: 10,
        }
    }
}

/// Rule selection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditingConfig {
    /// Rules file; `None` uses the built-in set.
    pub rules_path: Option<PathBuf>,
}

/// Fully resolved configuration after all layers are applied.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditorConfig {
    pub agent: AgentConfig,
    pub feed: FeedConfig,
    pub auditing: AuditingConfig,
    pub audit_log: AuditLogConfig,
}

// File layer: every field optional so absent keys fall through to the
// layer below. Unknown keys are tolerated.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct FileConfig {
    agent: FileAgent,
    feed: FileFeed,
    auditing: FileAuditing,
    audit_log: FileAuditLog,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct FileAgent {
    name: Option<String>,
    mode: Option<Mode>,
    target_instance: Option<String>,
    enable_dashboard: Option<bool>,
    verbose: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct FileFeed {
    command: Option<String>,
    batch_size: Option<u32>,
    poll_interval_ms: Option<u64>,
    failure_warn_threshold: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct FileAuditing {
    rules_path: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct FileAuditLog {
    enabled: Option<bool>,
    file: Option<String>,
    format: Option<LogFormat>,
    include_clean: Option<bool>,
}

impl FileConfig {
    /// Overlay `other` on top of `self`; set fields in `other` win.
    fn merge(self, other: Self) -> Self {
        Self {
            agent: FileAgent {
                name: other.agent.name.or(self.agent.name),
                mode: other.agent.mode.or(self.agent.mode),
                target_instance: other.agent.target_instance.or(self.agent.target_instance),
                enable_dashboard: other.agent.enable_dashboard.or(self.agent.enable_dashboard),
                verbose: other.agent.verbose.or(self.agent.verbose),
            },
            feed: FileFeed {
                command: other.feed.command.or(self.feed.command),
                batch_size: other.feed.batch_size.or(self.feed.batch_size),
                poll_interval_ms: other.feed.poll_interval_ms.or(self.feed.poll_interval_ms),
                failure_warn_threshold: other
                    .feed
                    .failure_warn_threshold
                    .or(self.feed.failure_warn_threshold),
            },
            auditing: FileAuditing {
                rules_path: other.auditing.rules_path.or(self.auditing.rules_path),
            },
            audit_log: FileAuditLog {
                enabled: other.audit_log.enabled.or(self.audit_log.enabled),
                file: other.audit_log.file.or(self.audit_log.file),
                format: other.audit_log.format.or(self.audit_log.format),
                include_clean: other.audit_log.include_clean.or(self.audit_log.include_clean),
            },
        }
    }
}

/// Load configuration. With an explicit path that single file is used;
/// otherwise the discovered layers are merged. Environment overrides
/// apply in both cases.
pub fn load(explicit: Option<&Path>) -> Result<AuditorConfig, ConfigError> {
    let file = match explicit {
        Some(path) => load_file(path)?,
        None => {
            let mut merged = FileConfig::default();
            for path in discovered_layers() {
                if let Some(layer) = load_layer(&path) {
                    merged = merged.merge(layer);
                }
            }
            merged
        }
    };
    let mut config = resolve(file);
    apply_env_overrides(&mut config, |name| env::var(name).ok());
    Ok(config)
}

fn discovered_layers() -> Vec<PathBuf> {
    let mut layers = vec![system_config_path()];
    if let Some(user) = user_config_path() {
        layers.push(user);
    }
    if let Some(project) = project_config_path() {
        layers.push(project);
    }
    layers
}

/// Conventional system-wide config location.
#[must_use]
pub fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/esa/config.yaml")
}

/// Per-user config location.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("esa").join("config.yaml"))
}

/// Project config in the working directory, first spelling that exists.
#[must_use]
pub fn project_config_path() -> Option<PathBuf> {
    ["esa.yaml", ".esa.yaml"]
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// Discovered layers fail open: a broken file drops out of the stack.
fn load_layer(path: &Path) -> Option<FileConfig> {
    if !path.is_file() {
        return None;
    }
    match load_file(path) {
        Ok(layer) => {
            debug!(path = %path.display(), "loaded config layer");
            Some(layer)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable config layer");
            None
        }
    }
}

fn resolve(file: FileConfig) -> AuditorConfig {
    let defaults = AuditorConfig::default();
    AuditorConfig {
        agent: AgentConfig {
            name: file.agent.name.unwrap_or(defaults.agent.name),
            mode: file.agent.mode.unwrap_or(defaults.agent.mode),
            target_instance: file.agent.target_instance,
            enable_dashboard: file
                .agent
                .enable_dashboard
                .unwrap_or(defaults.agent.enable_dashboard),
            verbose: file.agent.verbose.unwrap_or(defaults.agent.verbose),
        },
        feed: FeedConfig {
            command: file.feed.command.unwrap_or(defaults.feed.command),
            batch_size: file.feed.batch_size.unwrap_or(defaults.feed.batch_size),
            poll_interval_ms: file
                .feed
                .poll_interval_ms
                .unwrap_or(defaults.feed.poll_interval_ms),
            failure_warn_threshold: file
                .feed
                .failure_warn_threshold
                .unwrap_or(defaults.feed.failure_warn_threshold),
        },
        auditing: AuditingConfig {
            rules_path: file.auditing.rules_path.as_deref().map(expand_tilde),
        },
        audit_log: AuditLogConfig {
            enabled: file.audit_log.enabled.unwrap_or(false),
            file: file
                .audit_log
                .file
                .unwrap_or_else(|| AuditLogConfig::default().file),
            format: file.audit_log.format.unwrap_or_default(),
            include_clean: file.audit_log.include_clean.unwrap_or(false),
        },
    }
}

// Environment overrides sit between config files and CLI flags. The
// lookup is injected so tests never touch process-global state.
fn apply_env_overrides(config: &mut AuditorConfig, get: impl Fn(&str) -> Option<String>) {
    if let Some(value) = get("ESA_MODE") {
        match parse_mode(&value) {
            Some(mode) => config.agent.mode = mode,
            None => warn!(value, "ignoring invalid ESA_MODE"),
        }
    }
    if let Some(value) = get("ESA_TARGET") {
        // Empty value clears a target set by a config file.
        config.agent.target_instance = if value.is_empty() { None } else { Some(value) };
    }
    if let Some(value) = get("ESA_RULES") {
        config.auditing.rules_path = if value.is_empty() {
            None
        } else {
            Some(expand_tilde(&value))
        };
    }
    if let Some(value) = get("ESA_DASHBOARD") {
        match parse_bool(&value) {
            Some(flag) => config.agent.enable_dashboard = flag,
            None => warn!(value, "ignoring invalid ESA_DASHBOARD"),
        }
    }
    if let Some(value) = get("ESA_LOG_FILE") {
        if !value.is_empty() {
            config.audit_log.enabled = true;
            config.audit_log.file = value;
        }
    }
}

/// Parse a mode name as it appears in env vars and config files.
#[must_use]
pub fn parse_mode(value: &str) -> Option<Mode> {
    match value.to_ascii_lowercase().as_str() {
        "readonly" => Some(Mode::Readonly),
        "warn" => Some(Mode::Warn),
        "block" => Some(Mode::Block),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand a leading `~` or `~/` to the home directory. Paths without a
/// tilde, and systems without a known home, pass through unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// A fully commented config file with every knob at its default, for
/// `esa init`.
#[must_use]
pub fn generate_sample_config() -> String {
    r#"# esa configuration
#
# Layers: /etc/esa/config.yaml, then ~/.config/esa/config.yaml, then
# ./esa.yaml (or ./.esa.yaml), then ESA_* environment variables, then
# CLI flags. Later layers win.

agent:
  # Identity used when posting notices to the feed.
  name: auditor
  # readonly: count and log only.
  # warn: post notices, downgrading block-action findings to warnings.
  # block: post block notices too (advisory on the feed; only the git
  # gate enforces them).
  mode: warn
  # Audit a single instance by name; null audits everything.
  target_instance: null
  enable_dashboard: true
  verbose: false

feed:
  # External communication CLI to poll for events.
  command: hcom
  # Events requested per tick (events --last N).
  batch_size: 50
  poll_interval_ms: 100
  # Warn after this many consecutive fetch failures.
  failure_warn_threshold: 10

auditing:
  # Rules file; null uses the built-in set (esa rules list shows it).
  rules_path: null

audit_log:
  # Durable one-line-per-finding trail, separate from diagnostics.
  enabled: false
  file: ~/.local/share/esa/audit.log
  # text or json
  format: text
  # Also log events that produced no findings.
  include_clean: false
"#
    .to_string()
}
