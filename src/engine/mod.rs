// src/engine/mod.rs

//! Orchestration engine for taskmend.
//!
//! This module ties together:
//! - the scheduler (ready snapshots, fix-task delegation)
//! - the worker pool running one batch at a time
//! - the correction loop around every task
//! - run state persistence after each applied outcome
//!
//! The pure phase state machine lives in [`core`] and the exhaustion policy
//! in [`policy`]; the async shell is [`coordinator`].

use serde_json::Value;

/// Canonical node id type used throughout the engine.
pub type NodeId = String;

/// Opaque task description handed to the executor.
pub type Payload = Value;

/// Opaque value a task produced.
pub type TaskResult = Value;

pub mod coordinator;
pub mod core;
pub mod policy;

pub use coordinator::{Capabilities, Coordinator, CoordinatorOptions, ExhaustedNode, RunReport};
pub use core::{CycleDecision, PhaseMachine, RunPhase, decide};
pub use policy::{ExhaustedResolution, failure_record, is_failure_record};
