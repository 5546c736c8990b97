//! Acquisition progress reporting.
//!
//! Renders [`AcquireEvent`]s from the harvester so users see how many
//! candidates are queued, which item is being harvested, and why candidates
//! were dropped. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

use shelf_harvest_core::progress::{AcquireEvent, NoProgress, ProgressReporter};

/// One line per event on stderr, e.g. `acquire  harvesting  12 / 40 items  isbn-123`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: AcquireEvent) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", human_line(&event));
        let _ = err.flush();
    }
}

/// JSON lines on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: AcquireEvent) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", json_event(&event));
        let _ = err.flush();
    }
}

fn human_line(event: &AcquireEvent) -> String {
    match event {
        AcquireEvent::Discovering { pages, candidates } => format!(
            "acquire  discovered {} candidates on {} page{}",
            format_number(*candidates as u64),
            format_number(*pages as u64),
            if *pages == 1 { "" } else { "s" }
        ),
        AcquireEvent::Harvesting {
            identifier,
            n,
            total,
        } => format!(
            "acquire  harvesting  {} / {} items  {}",
            format_number(*n as u64),
            format_number(*total as u64),
            identifier
        ),
        AcquireEvent::Skipped { reference, reason } => {
            format!("acquire  skipped  {}  ({})", reference, reason)
        }
    }
}

fn json_event(event: &AcquireEvent) -> serde_json::Value {
    match event {
        AcquireEvent::Discovering { pages, candidates } => serde_json::json!({
            "event": "progress",
            "phase": "discovering",
            "pages": pages,
            "candidates": candidates
        }),
        AcquireEvent::Harvesting {
            identifier,
            n,
            total,
        } => serde_json::json!({
            "event": "progress",
            "phase": "harvesting",
            "identifier": identifier,
            "n": n,
            "total": total
        }),
        AcquireEvent::Skipped { reference, reason } => serde_json::json!({
            "event": "skip",
            "reference": reference,
            "reason": reason.to_string()
        }),
    }
}

/// Thousands separators: `12345` becomes `12,345`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// `human` when stderr is a terminal, `off` when piped.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
