//! Feed client: subprocess plumbing for the external communication CLI.
//!
//! The feed contract is three subcommands of the external tool (canonically
//! `hcom`, configurable):
//!
//! - `events --last N`: most recent event records, NDJSON on stdout
//! - `send --from NAME --intent INTENT BODY`: post a message
//! - `list --json`: roster of live instances, NDJSON on stdout
//!
//! The transport is a trait so the poller can be driven by a stub in tests.
//! Failures are values, never panics: the poller treats a failed fetch as a
//! retry-next-tick condition.

use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::debug;

use crate::event::truncate_display;

/// Errors from the feed subprocess.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("failed to launch feed command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("feed command '{command}' exited with status {code}: {stderr}")]
    Exit {
        command: String,
        code: String,
        stderr: String,
    },
}

/// One live instance from the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstanceInfo {
    pub name: String,
    pub status: Option<String>,
}

/// Transport seam between the poller and the external tool.
pub trait FeedTransport: Send {
    /// Fetch the most recent events as raw NDJSON text.
    ///
    /// # Errors
    /// Any subprocess failure; the caller retries next tick.
    fn fetch_events(&self, last: u32) -> Result<String, FeedError>;

    /// Post a message to the feed.
    ///
    /// # Errors
    /// Any subprocess failure; notice delivery is best-effort.
    fn send_message(&self, from: &str, intent: &str, body: &str) -> Result<(), FeedError>;

    /// List live instances.
    ///
    /// # Errors
    /// Any subprocess failure; the roster is presentation-only.
    fn list_instances(&self) -> Result<Vec<InstanceInfo>, FeedError>;
}

/// The real transport: shells out to the configured feed program.
#[derive(Debug, Clone)]
pub struct CliFeed {
    program: String,
}

impl CliFeed {
    /// Transport for the given feed program (e.g. `hcom`).
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The configured program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Probe whether the feed tool responds at all.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.run(&["list", "--json"]).is_ok()
    }

    fn run(&self, args: &[&str]) -> Result<String, FeedError> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| FeedError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(FeedError::Exit {
                command: format!("{} {}", self.program, args.join(" ")),
                code: output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                stderr: truncate_display(&stderr, 200),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl FeedTransport for CliFeed {
    fn fetch_events(&self, last: u32) -> Result<String, FeedError> {
        self.run(&["events", "--last", &last.to_string()])
    }

    fn send_message(&self, from: &str, intent: &str, body: &str) -> Result<(), FeedError> {
        self.run(&["send", "--from", from, "--intent", intent, body])
            .map(|_| ())
    }

    fn list_instances(&self) -> Result<Vec<InstanceInfo>, FeedError> {
        let text = self.run(&["list", "--json"])?;
        Ok(parse_roster(&text))
    }
}

/// Parse a roster NDJSON dump, tolerantly: bad lines are skipped with a
/// debug log, since the roster only feeds the dashboard.
#[must_use]
pub fn parse_roster(text: &str) -> Vec<InstanceInfo> {
    let mut instances = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<InstanceInfo>(trimmed) {
            Ok(info) if !info.name.is_empty() => instances.push(info),
            Ok(_) => debug!("roster line without a name, skipped"),
            Err(e) => debug!(error = %e, "unparseable roster line, skipped"),
        }
    }
    instances
}
