//! Step log sink.
//!
//! The pipeline reports every tracked state of every simulation once per
//! step. Those rows are what a session review screen plots: weight over time
//! per state, and the running rep count.
//!
//! The export formats are designed to be:
//! - Flat: one row per (step, simulation, state)
//! - Bulk: `take()` hands over everything recorded and starts afresh
//! - Tool-friendly: JSON for programs, CSV for spreadsheets

use serde::{Deserialize, Serialize};

use crate::Result;

/// One logged observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Sample time in seconds.
    pub t: f64,
    /// Name of the simulation.
    pub simulation: String,
    /// Name of the state.
    pub state: String,
    /// Mass held by the state after the step.
    pub weight: f64,
    /// Times the state became the mode since the session started.
    pub count: u64,
}

/// Receiver of per-step entries.
pub trait StepLogger {
    /// Entries are only built and recorded while this is true.
    fn is_enabled(&self) -> bool;

    fn record(&mut self, entry: LogEntry);

    /// Drop everything recorded so far.
    fn clear(&mut self);
}

/// In-memory log with on/off switch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryLog {
    enabled: bool,
    entries: Vec<LogEntry>,
}

impl MemoryLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Vec::new(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand over every entry and leave the log empty.
    pub fn take(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Entries as a pretty-printed JSON array.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Entries as CSV with a header row.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("t,simulation,state,weight,count\n");
        for entry in &self.entries {
            csv.push_str(&format!(
                "{},{},{},{},{}\n",
                entry.t,
                escape_csv(&entry.simulation),
                escape_csv(&entry.state),
                entry.weight,
                entry.count
            ));
        }
        csv
    }
}

impl StepLogger for MemoryLog {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn record(&mut self, entry: LogEntry) {
        if self.enabled {
            self.entries.push(entry);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Quote a CSV field if it contains a separator, quote or line break.
fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
