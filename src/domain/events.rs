//! Events streamed from a pipeline run to its observer.
//!
//! Events are produced in order by a single run and never persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage of an installation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    FetchingConfig,
    Downloading,
    Verifying,
    Extracting,
    Registering,
    Succeeded,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::FetchingConfig => "fetching config",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::Registering => "registering",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Completion percentage, or indeterminate when the total is unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Percent {
    Known(u8),
    Indeterminate,
}

impl Percent {
    /// `floor(100 * done / total)` clamped to `[0, 100]`
    pub fn of(done: u64, total: Option<u64>) -> Self {
        match total {
            Some(total) if total > 0 => {
                let pct = (done as u128 * 100) / total as u128;
                Self::Known(pct.min(100) as u8)
            }
            _ => Self::Indeterminate,
        }
    }
}

/// A single status update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,

    /// Human-readable status or a line of archiver output
    pub message: String,

    pub percent_complete: Percent,

    pub bytes_done: u64,

    /// Unknown when the server sends no length
    pub bytes_total: Option<u64>,

    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    /// Status message with no byte counters
    pub fn status(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            percent_complete: Percent::Indeterminate,
            bytes_done: 0,
            bytes_total: None,
            at: Utc::now(),
        }
    }

    /// Byte-level transfer update
    pub fn transfer(phase: Phase, bytes_done: u64, bytes_total: Option<u64>) -> Self {
        let percent_complete = Percent::of(bytes_done, bytes_total);
        let message = match (percent_complete, bytes_total) {
            (Percent::Known(pct), Some(total)) => format!(
                "Downloading {:.2}MB / {:.2}MB ({}%)",
                mib(bytes_done),
                mib(total),
                pct
            ),
            _ => format!("Downloading {:.2}MB (size unknown)", mib(bytes_done)),
        };
        Self {
            phase,
            message,
            percent_complete,
            bytes_done,
            bytes_total,
            at: Utc::now(),
        }
    }

    pub fn with_percent(mut self, percent: Percent) -> Self {
        self.percent_complete = percent;
        self
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Terminal notice delivered exactly once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Completion {
    Succeeded,

    /// Extraction worked but the executable was not where expected;
    /// environment registration was skipped
    PartialSuccess { warning: String },

    Failed {
        reason: String,
        detail: Option<String>,
    },

    Cancelled,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartialSuccess { .. })
    }

    /// Phase recorded for this outcome
    pub fn phase(&self) -> Phase {
        match self {
            Self::Succeeded | Self::PartialSuccess { .. } => Phase::Succeeded,
            Self::Failed { .. } => Phase::Failed,
            Self::Cancelled => Phase::Cancelled,
        }
    }
}
