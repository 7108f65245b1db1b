#![forbid(unsafe_code)]
//! Event Stream Auditor (esa) library.
//!
//! This library implements a passive audit agent for multi-agent
//! communication feeds: it polls an external feed CLI for NDJSON
//! events, evaluates every event against a named regex rule set, and
//! reports findings as feed notices, console output, an audit trail,
//! and exit codes for git/CI hooks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Configuration                             │
//! │   (system → user → project files → ESA_* env → CLI flags)        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Poller                                 │
//! │   fetch (feed CLI) → parse NDJSON → fingerprint dedup → filter   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Audit Engine                             │
//! │   every rule, every event: scope routing → regex / threshold     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Reporting                               │
//! │   notices to the feed · console · audit trail · gate verdicts    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same engine serves three entry points: the live `watch` loop,
//! one-shot `audit` passes over captured event dumps, and the `gate`
//! subcommand that audits pending git changes and turns block-action
//! findings into a non-zero exit.
//!
//! # Usage
//!
//! The main entry point for event evaluation is the [`engine`] module:
//!
//! ```ignore
//! use event_stream_auditor::engine::{AuditEngine, AuditReport};
//! use event_stream_auditor::event::AuditEvent;
//! use event_stream_auditor::rules::builtin::builtin_rules;
//!
//! let engine = AuditEngine::new(builtin_rules());
//! let mut report = AuditReport::new();
//! if let Some(event) = AuditEvent::parse_line(line) {
//!     engine.audit_event(&event, &mut report);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod dedup;
pub mod engine;
pub mod event;
pub mod feed;
pub mod gate;
pub mod logging;
pub mod notify;
pub mod poller;
pub mod report;
pub mod rules;

// Re-export commonly used types
pub use config::{AuditorConfig, Mode};
pub use dedup::FingerprintSet;
pub use engine::{AuditEngine, AuditReport, CategoryCounts, Finding, SeverityCounts};
pub use event::{AuditEvent, EventKind, ParsedBatch, fingerprint_value, parse_feed_lines};
pub use feed::{CliFeed, FeedError, FeedTransport, InstanceInfo};
pub use gate::{GateHook, GateOutcome, run_gate};
pub use notify::{Notice, NoticeKind, notice_for};
pub use poller::Poller;
pub use rules::loader::{RuleError, effective_rules, load_rules_file};
pub use rules::{Category, CompiledRule, RuleAction, RuleScope, RuleSet, Severity};

// Re-export the dual regex engine abstraction
pub use rules::regex_engine::{CompiledRegex, needs_backtracking_engine};
