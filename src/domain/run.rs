//! Run-scoped state owned by the orchestrator.
//!
//! Nothing outside the orchestrator reads this during a run; observers
//! only see the events derived from it.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tempfile::TempPath;
use uuid::Uuid;

use super::events::Phase;

/// Mutable state for one installation run
#[derive(Debug)]
pub struct PipelineState {
    /// Run identifier (log correlation)
    pub id: Uuid,

    pub phase: Phase,

    /// Cancellation observed by the worker (latched)
    pub cancel_requested: bool,

    /// Downloaded archive, removed when the run ends
    pub temp_artifact: Option<TempPath>,

    /// Executable located after extraction
    pub resolved_exe_path: Option<PathBuf>,

    pub started_at: DateTime<Utc>,

    /// Phases entered so far, in order
    pub history: Vec<Phase>,
}

impl PipelineState {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            phase: Phase::Idle,
            cancel_requested: false,
            temp_artifact: None,
            resolved_exe_path: None,
            started_at: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Move to `phase`; terminal phases are final
    pub fn enter(&mut self, phase: Phase) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = phase;
        self.history.push(phase);
        true
    }

    /// Latch a cancellation observation
    pub fn note_cancel(&mut self, requested: bool) {
        self.cancel_requested |= requested;
    }
}
