// src/exec/backend.rs

//! Pluggable execution capability.
//!
//! The core never runs anything itself; it hands a node's payload and the
//! accumulated [`TaskContext`] to an [`Executor`]. Production uses
//! [`ShellExecutor`](crate::exec::ShellExecutor); tests substitute scripted
//! fakes.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::correction::AttemptRecord;
use crate::engine::{NodeId, Payload, TaskResult};
use crate::retrieval::ContextSnippet;

/// Boxed future returned by [`Executor::execute`].
pub type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<TaskResult, ExecutionFault>> + Send + 'a>>;

/// Trait abstracting how a single task payload is executed.
///
/// Implementations may retry transient failures internally; the core only
/// sees the final value or fault. A hung execution is the implementation's
/// problem (e.g. its own timeout), the core never cancels it.
pub trait Executor: Send + Sync {
    fn execute<'a>(&'a self, payload: &'a Payload, context: &'a TaskContext) -> ExecFuture<'a>;
}

/// The execution capability failed instead of producing an output.
///
/// Inside the correction loop this counts as a failed validation whose
/// feedback is the fault message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionFault {
    pub message: String,
}

impl ExecutionFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ExecutionFault {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` keeps the context chain on one line.
        Self::new(format!("{err:#}"))
    }
}

/// Everything an executor gets to see besides the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskContext {
    pub node_id: NodeId,
    pub goal: Option<String>,
    /// 1-based attempt number of the current invocation.
    pub attempt: u32,
    /// Results of the node's direct dependencies.
    pub dependency_results: Map<String, Value>,
    /// Retrieved supporting context, best first.
    pub snippets: Vec<ContextSnippet>,
    /// Every earlier failed attempt of this invocation, oldest first.
    pub attempts: Vec<AttemptRecord>,
}

impl TaskContext {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            attempt: 1,
            ..Self::default()
        }
    }

    /// Feedback of all previous attempts, oldest first.
    pub fn feedback(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.feedback.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn anyhow_chain_becomes_fault_message() {
        let err = Err::<(), _>(anyhow::anyhow!("exit 127"))
            .context("spawning process for task 'build'")
            .unwrap_err();
        let fault = ExecutionFault::from(err);
        assert_eq!(fault.message, "spawning process for task 'build': exit 127");
    }
}
