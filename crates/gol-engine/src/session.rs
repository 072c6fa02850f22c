use std::fmt;

use gol_types::RunParams;
use uuid::Uuid;

use crate::error::{EngineError, Result};

// ── Run State Machine ────────────────────────────────────────────────────────

/// Idle → Running ⇄ Paused → Finished → Running (next run) …
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run has been started yet.
    Idle,
    /// The turn loop is dispatching (or waiting for workers).
    Running,
    /// A pause was requested; the loop parks at the top of its next turn.
    Paused,
    /// The turn target was reached.
    Finished,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle     => write!(f, "Idle"),
            Self::Running  => write!(f, "Running"),
            Self::Paused   => write!(f, "Paused"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}

// ── Run Control ──────────────────────────────────────────────────────────────

/// State of the broker's single run slot.
#[derive(Debug)]
pub struct RunControl {
    pub state: RunState,
    pub run_id: Option<Uuid>,
    pub params: Option<RunParams>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            run_id: None,
            params: None,
        }
    }

    /// `true` while a run occupies the slot.
    pub fn is_active(&self) -> bool {
        matches!(self.state, RunState::Running | RunState::Paused)
    }

    /// Claim the slot for a new run. Transitions `Idle | Finished → Running`.
    pub fn start(&mut self, params: RunParams) -> Result<Uuid> {
        if self.is_active() {
            return Err(self.invalid(RunState::Running));
        }
        let run_id = Uuid::new_v4();
        self.state = RunState::Running;
        self.run_id = Some(run_id);
        self.params = Some(params);
        Ok(run_id)
    }

    /// Transitions `Running → Paused`.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != RunState::Running {
            return Err(self.invalid(RunState::Paused));
        }
        self.state = RunState::Paused;
        Ok(())
    }

    /// Transitions `Paused → Running`.
    pub fn resume(&mut self) -> Result<()> {
        if self.state != RunState::Paused {
            return Err(self.invalid(RunState::Running));
        }
        self.state = RunState::Running;
        Ok(())
    }

    /// Transitions `Running | Paused → Finished`. A pause that arrives
    /// during the final turn cannot hold the run back from finishing.
    pub fn finish(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(self.invalid(RunState::Finished));
        }
        self.state = RunState::Finished;
        Ok(())
    }

    fn invalid(&self, to: RunState) -> EngineError {
        EngineError::InvalidTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
