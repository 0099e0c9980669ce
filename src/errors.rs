// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Only [`TaskmendError::UnknownNode`] and [`TaskmendError::Stall`] may end
//! a run once it is executing. Everything a task itself does wrong (faults,
//! failed validation, exhausted retries) is absorbed by the correction loop.

use thiserror::Error;

use crate::dag::StallReport;
use crate::engine::{NodeId, RunPhase};

#[derive(Error, Debug)]
pub enum TaskmendError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Run stalled: {0}")]
    Stall(StallReport),

    #[error("Invalid run phase transition from {from} to {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Plan error: {0}")]
    PlanError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskmendError {
    /// Process exit code for the CLI: 2 for a stalled run, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaskmendError::Stall(_) => 2,
            _ => 1,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskmendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_node_names_the_id() {
        let err = TaskmendError::UnknownNode("deploy".to_string());
        assert_eq!(err.to_string(), "Unknown node: deploy");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn only_a_stall_exits_with_two() {
        let err = TaskmendError::ConfigError("bad".to_string());
        assert_eq!(err.exit_code(), 1);
        let stall = TaskmendError::Stall(crate::dag::StallReport {
            blocked: Vec::new(),
            cycles: Vec::new(),
        });
        assert_eq!(stall.exit_code(), 2);
    }
}
