//! The polling loop.
//!
//! Fetch, parse, dedup, filter, audit, notify, on a fixed cadence. The
//! fixed interval is the whole resilience story: a failed tick changes
//! nothing but the failure counters, and the next tick starts fresh.
//! Nothing on this path ever escalates to a fatal error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{AuditorConfig, Mode};
use crate::dedup::FingerprintSet;
use crate::engine::{AuditEngine, AuditReport, Finding};
use crate::event::{parse_feed_lines, AuditEvent};
use crate::feed::{FeedError, FeedTransport};
use crate::logging::AuditLogger;
use crate::notify::{self, NoticeKind};
use crate::report::{lock_stats, print_finding, SharedStats};

/// Drives the fetch/audit cycle against one feed transport.
pub struct Poller {
    engine: AuditEngine,
    transport: Box<dyn FeedTransport>,
    seen: FingerprintSet,
    stats: SharedStats,
    logger: Option<AuditLogger>,
    mode: Mode,
    agent: String,
    target: Option<String>,
    batch_size: u32,
    interval: Duration,
    failure_threshold: u32,
    /// Refresh the roster every this many ticks; `None` skips it.
    roster_every: Option<u64>,
    /// Suppress per-finding console lines (the dashboard owns the
    /// terminal then).
    quiet_console: bool,
}

impl Poller {
    #[must_use]
    pub fn new(
        engine: AuditEngine,
        transport: Box<dyn FeedTransport>,
        config: &AuditorConfig,
        stats: SharedStats,
        logger: Option<AuditLogger>,
    ) -> Self {
        Self {
            engine,
            transport,
            seen: FingerprintSet::new(),
            stats,
            logger,
            mode: config.agent.mode,
            agent: config.agent.name.clone(),
            target: config.agent.target_instance.clone(),
            batch_size: config.feed.batch_size,
            interval: Duration::from_millis(config.feed.poll_interval_ms),
            failure_threshold: config.feed.failure_warn_threshold,
            roster_every: None,
            quiet_console: false,
        }
    }

    /// Enable roster refreshes at the given tick cadence.
    #[must_use]
    pub fn with_roster_refresh(mut self, every_ticks: u64) -> Self {
        self.roster_every = Some(every_ticks.max(1));
        self
    }

    /// Keep per-finding output off the console.
    #[must_use]
    pub fn with_quiet_console(mut self, quiet: bool) -> Self {
        self.quiet_console = quiet;
        self
    }

    /// Poll until `running` goes false. Announces the session first,
    /// then ticks at the configured interval.
    pub fn run(&mut self, running: &AtomicBool) {
        self.announce();
        info!(
            agent = %self.agent,
            mode = self.mode.label(),
            interval_ms = self.interval.as_millis() as u64,
            rules = self.engine.rules().len(),
            "watching feed"
        );
        let mut ticks: u64 = 0;
        while running.load(Ordering::SeqCst) {
            self.tick();
            ticks += 1;
            if let Some(every) = self.roster_every {
                if ticks % every == 0 {
                    self.refresh_roster();
                }
            }
            thread::sleep(self.interval);
        }
        info!(ticks, "polling stopped");
    }

    /// One fetch/audit cycle. Returns the findings of this tick; all
    /// counters are folded into the shared stats as a side effect.
    pub fn tick(&mut self) -> AuditReport {
        let mut report = AuditReport::new();
        let raw = match self.transport.fetch_events(self.batch_size) {
            Ok(raw) => {
                self.note_fetch_success();
                raw
            }
            Err(e) => {
                self.note_fetch_failure(&e);
                return report;
            }
        };

        let batch = parse_feed_lines(&raw);
        if !batch.events.is_empty() || batch.malformed > 0 {
            debug!(events = batch.events.len(), malformed = batch.malformed, "tick");
        }
        {
            let mut stats = lock_stats(&self.stats);
            stats.events_seen += batch.events.len() as u64;
            stats.malformed_lines += batch.malformed as u64;
        }

        for event in batch.events {
            // Dedup before filtering, so widening the target later never
            // replays an event the set has already admitted.
            if !self.seen.check_and_record(event.fingerprint()) {
                lock_stats(&self.stats).duplicates += 1;
                continue;
            }
            if self.should_skip(&event) {
                lock_stats(&self.stats).filtered_out += 1;
                continue;
            }

            let before = report.findings.len();
            self.engine.audit_event(&event, &mut report);
            for finding in &report.findings[before..] {
                if !self.quiet_console {
                    print_finding(finding);
                }
                if let Some(logger) = &self.logger {
                    logger.log_finding(finding);
                }
                self.deliver(finding);
            }
            if report.findings.len() == before {
                if let Some(logger) = &self.logger {
                    logger.log_clean(&event);
                }
            }
            lock_stats(&self.stats).last_event_at = Some(Utc::now());
        }

        lock_stats(&self.stats).absorb_report(&report);
        report
    }

    fn should_skip(&self, event: &AuditEvent) -> bool {
        let instance = event.instance();
        // Never audit our own chatter; notices would echo forever.
        if instance == Some(self.agent.as_str()) {
            return true;
        }
        match (&self.target, instance) {
            (Some(target), Some(name)) => name != target,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    // Delivery is best-effort: the finding is already counted, logged
    // and printed by the time we get here.
    fn deliver(&self, finding: &Finding) {
        let Some(notice) = notify::notice_for(finding, self.mode) else {
            return;
        };
        let body = notice.render();
        match self
            .transport
            .send_message(&self.agent, notice.kind.intent(), &body)
        {
            Ok(()) => {
                let mut stats = lock_stats(&self.stats);
                match notice.kind {
                    NoticeKind::Warning => stats.notices.warnings += 1,
                    NoticeKind::Block => stats.notices.blocks += 1,
                    NoticeKind::Suggestion => stats.notices.suggestions += 1,
                }
            }
            Err(e) => {
                warn!(rule = %finding.rule, error = %e, "notice delivery failed");
            }
        }
    }

    fn announce(&self) {
        if let Some(text) = notify::announcement(&self.agent, self.mode) {
            if let Err(e) = self.transport.send_message(&self.agent, "status", &text) {
                debug!(error = %e, "announcement not delivered");
            }
        }
    }

    fn note_fetch_success(&self) {
        let mut stats = lock_stats(&self.stats);
        if stats.consecutive_feed_failures > 0 {
            let streak = stats.consecutive_feed_failures;
            stats.consecutive_feed_failures = 0;
            stats.last_error = None;
            drop(stats);
            info!(after = streak, "feed recovered");
        }
    }

    // Persistent failure is a warning, never an exit; the cadence
    // carries on and each tick retries from scratch.
    fn note_fetch_failure(&self, error: &FeedError) {
        let mut stats = lock_stats(&self.stats);
        stats.feed_failures += 1;
        stats.consecutive_feed_failures += 1;
        stats.last_error = Some(error.to_string());
        let streak = stats.consecutive_feed_failures;
        drop(stats);
        debug!(streak, error = %error, "feed fetch failed");
        if self.failure_threshold > 0 && streak % self.failure_threshold == 0 {
            warn!(streak, "feed unreachable; continuing to poll");
        }
    }

    fn refresh_roster(&self) {
        match self.transport.list_instances() {
            Ok(instances) => {
                lock_stats(&self.stats).instances = instances;
            }
            Err(e) => {
                debug!(error = %e, "roster refresh failed");
            }
        }
    }
}
