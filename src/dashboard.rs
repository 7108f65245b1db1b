//! Live terminal dashboard.
//!
//! A background thread repaints the session counters on the alternate
//! screen every half second while the poller keeps working. Rendering
//! failures stop the repaint thread and nothing else; the audit loop
//! never waits on the terminal.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use tracing::debug;

use crate::event::truncate_display;
use crate::report::{format_age, format_duration, lock_stats, SessionStats, SharedStats};

const REFRESH: Duration = Duration::from_millis(500);
const ROSTER_ROWS: usize = 8;

/// Static labels shown in the dashboard header.
#[derive(Debug, Clone)]
pub struct DashboardMeta {
    pub agent: String,
    pub mode_label: &'static str,
    /// `None` renders as "all".
    pub target: Option<String>,
    /// e.g. "builtin (9 rules)" or a file path.
    pub rules_label: String,
}

/// Handle to the repaint thread. Dropping it restores the terminal.
pub struct Dashboard {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Dashboard {
    /// Start repainting on the alternate screen.
    #[must_use]
    pub fn spawn(stats: SharedStats, meta: DashboardMeta) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || paint_loop(&stats, &meta, &flag));
        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Stop the repaint thread and restore the terminal.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn paint_loop(stats: &SharedStats, meta: &DashboardMeta, running: &AtomicBool) {
    let mut stdout = io::stdout();
    if execute!(stdout, EnterAlternateScreen, Hide).is_err() {
        debug!("dashboard unavailable; leaving plain log output");
        return;
    }
    while running.load(Ordering::SeqCst) {
        let snapshot = lock_stats(stats).clone();
        if let Err(e) = paint(&mut stdout, &snapshot, meta) {
            debug!(error = %e, "dashboard render failed");
            break;
        }
        thread::sleep(REFRESH);
    }
    let _ = execute!(stdout, LeaveAlternateScreen, Show);
}

fn paint(out: &mut impl Write, stats: &SessionStats, meta: &DashboardMeta) -> io::Result<()> {
    execute!(out, MoveTo(0, 0), Clear(ClearType::All))?;
    for (color, text) in render_lines(stats, meta, Utc::now()) {
        execute!(
            out,
            SetForegroundColor(color),
            Print(text),
            Print("\n"),
            ResetColor
        )?;
    }
    out.flush()
}

// Pure layout so the content is testable without a terminal.
fn render_lines(
    stats: &SessionStats,
    meta: &DashboardMeta,
    now: DateTime<Utc>,
) -> Vec<(Color, String)> {
    let mut lines = Vec::new();

    lines.push((Color::Magenta, "event stream auditor".to_string()));
    lines.push((
        Color::DarkGrey,
        format!(
            "agent {} | mode {} | target {} | rules {}",
            meta.agent,
            meta.mode_label,
            meta.target.as_deref().unwrap_or("all"),
            meta.rules_label
        ),
    ));
    lines.push((Color::Reset, String::new()));

    lines.push((
        Color::Reset,
        format!(
            "uptime {} | last event {}",
            format_duration(stats.uptime_secs()),
            format_age(stats.last_event_at, now)
        ),
    ));
    lines.push((
        Color::Reset,
        format!(
            "events seen {} | audited {} | duplicates {} | filtered {} | malformed {}",
            stats.events_seen,
            stats.events_audited,
            stats.duplicates,
            stats.filtered_out,
            stats.malformed_lines
        ),
    ));

    let findings_color = if stats.findings.high > 0 {
        Color::Red
    } else if stats.findings.total() > 0 {
        Color::Yellow
    } else {
        Color::DarkGreen
    };
    lines.push((
        findings_color,
        format!(
            "findings {} | high {} | medium {} | low {}",
            stats.findings.total(),
            stats.findings.high,
            stats.findings.medium,
            stats.findings.low
        ),
    ));
    lines.push((
        Color::Reset,
        format!(
            "security {} | quality {} | compliance {}",
            stats.categories.security, stats.categories.quality, stats.categories.compliance
        ),
    ));
    lines.push((
        Color::Reset,
        format!(
            "notices: warnings {} | blocks {} | suggestions {}",
            stats.notices.warnings, stats.notices.blocks, stats.notices.suggestions
        ),
    ));

    if stats.consecutive_feed_failures > 0 {
        let error = stats.last_error.as_deref().unwrap_or("unknown");
        lines.push((
            Color::Red,
            format!(
                "feed failing (streak {}): {}",
                stats.consecutive_feed_failures,
                truncate_display(error, 60)
            ),
        ));
    } else {
        lines.push((
            Color::DarkGrey,
            format!("feed ok ({} failures this session)", stats.feed_failures),
        ));
    }

    if !stats.instances.is_empty() {
        lines.push((Color::Reset, String::new()));
        lines.push((Color::DarkGrey, "instances:".to_string()));
        for instance in stats.instances.iter().take(ROSTER_ROWS) {
            lines.push((
                Color::Reset,
                format!(
                    "  {}  {}",
                    instance.name,
                    instance.status.as_deref().unwrap_or("-")
                ),
            ));
        }
        if stats.instances.len() > ROSTER_ROWS {
            lines.push((
                Color::DarkGrey,
                format!("  … and {} more", stats.instances.len() - ROSTER_ROWS),
            ));
        }
    }

    lines.push((Color::Reset, String::new()));
    lines.push((Color::DarkGrey, "Ctrl+C to stop".to_string()));
    lines
}
