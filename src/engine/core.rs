// src/engine/core.rs

//! Pure run phase state machine.
//!
//! No Tokio, channels or IO here: the coordinator feeds it "was the batch
//! empty / is the graph complete" and gets back what to do next. Everything
//! in this module is unit tested without a runtime.

use std::fmt;

use serde::Serialize;

use crate::errors::{Result, TaskmendError};

/// Lifecycle of one run.
///
/// `Planning -> Executing -> Stalled | Done`. `Stalled` and `Done` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Executing,
    Stalled,
    Done,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Stalled | RunPhase::Done)
    }

    pub fn can_transition_to(self, to: RunPhase) -> bool {
        matches!(
            (self, to),
            (RunPhase::Planning, RunPhase::Executing)
                | (RunPhase::Executing, RunPhase::Stalled)
                | (RunPhase::Executing, RunPhase::Done)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Planning => "planning",
            RunPhase::Executing => "executing",
            RunPhase::Stalled => "stalled",
            RunPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// What the coordinator should do after taking a ready snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDecision {
    /// Run the batch.
    Dispatch,
    Done,
    Stalled,
}

/// Decide the next step from a snapshot.
///
/// An empty snapshot on an incomplete graph is a stall, never a reason to
/// wait: nothing else can make progress once every worker has returned.
pub fn decide(batch_empty: bool, graph_complete: bool) -> CycleDecision {
    match (batch_empty, graph_complete) {
        (false, _) => CycleDecision::Dispatch,
        (true, true) => CycleDecision::Done,
        (true, false) => CycleDecision::Stalled,
    }
}

/// Holds the current [`RunPhase`] and rejects illegal moves.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: RunPhase,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Planning,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn transition(&mut self, to: RunPhase) -> Result<()> {
        if !self.phase.can_transition_to(to) {
            return Err(TaskmendError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::debug!(from = %self.phase, to = %to, "run phase transition");
        self.phase = to;
        Ok(())
    }

    /// Apply a terminal [`CycleDecision`]; `Dispatch` leaves the phase as is.
    pub fn apply(&mut self, decision: CycleDecision) -> Result<RunPhase> {
        match decision {
            CycleDecision::Dispatch => {}
            CycleDecision::Done => self.transition(RunPhase::Done)?,
            CycleDecision::Stalled => self.transition(RunPhase::Stalled)?,
        }
        Ok(self.phase)
    }
}
