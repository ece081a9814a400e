//! Batch progress reporting.
//!
//! Each `_msearch` or `_bulk` round trip emits one event so long runs show
//! how much is left. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

use archive_sync_core::updater::{BatchPhase, BatchProgress};

/// A single progress event.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// A new unit of work (a file list, a log) is starting.
    Unit { unit: String, items: u64 },
    /// Batch `n` of `total` for the current unit has been answered.
    Batch {
        unit: String,
        phase: BatchPhase,
        n: u64,
        total: u64,
    },
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "esync lists/a.txt  bulk  2 / 5 batches".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Unit { unit, items } => {
                format!("esync {}  {} items\n", unit, format_number(*items))
            }
            ProgressEvent::Batch {
                unit,
                phase,
                n,
                total,
            } => format!(
                "esync {}  {}  {} / {} batches\n",
                unit,
                phase.as_str(),
                format_number(*n),
                format_number(*total)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Unit { unit, items } => serde_json::json!({
                "event": "unit",
                "unit": unit,
                "items": items
            }),
            ProgressEvent::Batch {
                unit,
                phase,
                n,
                total,
            } => serde_json::json!({
                "event": "progress",
                "unit": unit,
                "phase": phase.as_str(),
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards the updater's batch callbacks to a reporter, tagged with the
/// unit they belong to.
pub struct UnitProgress<'a> {
    unit: String,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> UnitProgress<'a> {
    pub fn start(reporter: &'a dyn ProgressReporter, unit: impl Into<String>, items: usize) -> Self {
        let unit = unit.into();
        reporter.report(ProgressEvent::Unit {
            unit: unit.clone(),
            items: items as u64,
        });
        Self { unit, reporter }
    }
}

impl BatchProgress for UnitProgress<'_> {
    fn batch_done(&self, phase: BatchPhase, done: usize, total: usize) {
        self.reporter.report(ProgressEvent::Batch {
            unit: self.unit.clone(),
            phase,
            n: done as u64,
            total: total as u64,
        });
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: '{}'. Must be off, human, or json.", other),
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
