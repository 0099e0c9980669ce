// src/correction/controller.rs

//! Bounded self-correction loop.
//!
//! A task is executed, its output validated, and on failure re-executed with
//! the feedback of *every* earlier attempt in its context, until the
//! validator accepts or `max_attempts` invocations have been made. Running
//! out of attempts is reported as [`CorrectionOutcome::Exhausted`], never as
//! a success.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::correction::ensemble::select_best;
use crate::correction::{Candidate, DEFAULT_MAX_ATTEMPTS, Validator, Verdict, Voter};
use crate::engine::{Payload, TaskResult};
use crate::exec::{ExecutionFault, Executor, TaskContext};

/// One failed attempt, as carried forward to later attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub output: TaskResult,
    pub feedback: String,
}

/// Retry bookkeeping for one task invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    accumulated_context: Vec<AttemptRecord>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts: max_attempts.max(1),
            accumulated_context: Vec::new(),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn accumulated_context(&self) -> &[AttemptRecord] {
        &self.accumulated_context
    }

    /// Record a failed attempt. Returns `true` if another attempt is allowed.
    pub fn record_failure(&mut self, output: TaskResult, feedback: String) -> bool {
        self.accumulated_context.push(AttemptRecord {
            attempt: self.attempt,
            output,
            feedback,
        });
        if self.attempt >= self.max_attempts {
            return false;
        }
        self.attempt += 1;
        true
    }

    fn feedback_trail(&self) -> Vec<String> {
        self.accumulated_context
            .iter()
            .map(|a| a.feedback.clone())
            .collect()
    }
}

/// What the correction loop produced for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionOutcome {
    /// The validator accepted `output` on attempt `attempts`.
    Accepted { output: TaskResult, attempts: u32 },
    /// No attempt passed validation.
    Exhausted {
        last_output: TaskResult,
        /// Feedback of every attempt, oldest first.
        feedback_trail: Vec<String>,
        attempts: u32,
    },
}

impl CorrectionOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            CorrectionOutcome::Accepted { attempts, .. }
            | CorrectionOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, CorrectionOutcome::Accepted { .. })
    }
}

/// Wraps an [`Executor`] with a [`Validator`] and an attempt ceiling.
///
/// Cheap to clone; clones share the executor and validator.
#[derive(Clone)]
pub struct CorrectionController {
    executor: Arc<dyn Executor>,
    validator: Arc<dyn Validator>,
    max_attempts: u32,
}

impl std::fmt::Debug for CorrectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionController")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl CorrectionController {
    pub fn new(executor: Arc<dyn Executor>, validator: Arc<dyn Validator>) -> Self {
        Self {
            executor,
            validator,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set the attempt ceiling (values below 1 are treated as 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the correction loop for one task.
    ///
    /// `context` is the base context; `attempt` and `attempts` are filled in
    /// per invocation.
    pub async fn run(&self, payload: &Payload, context: TaskContext) -> CorrectionOutcome {
        let mut retry = RetryState::new(self.max_attempts);
        let mut context = context;
        let task = context.node_id.clone();

        loop {
            context.attempt = retry.attempt();
            context.attempts = retry.accumulated_context().to_vec();

            debug!(task = %task, attempt = context.attempt, "executing task attempt");
            let executed = AssertUnwindSafe(self.executor.execute(payload, &context))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ExecutionFault::new(format!(
                        "executor panicked: {}",
                        panic_message(&*panic)
                    )))
                });

            let (output, verdict) = match executed {
                Ok(output) => {
                    let verdict = self.validator.validate(&output);
                    (output, verdict)
                }
                Err(fault) => {
                    warn!(
                        task = %task,
                        attempt = context.attempt,
                        error = %fault,
                        "execution fault; treating as failed validation"
                    );
                    (Value::Null, Verdict::fail(fault.message))
                }
            };

            if verdict.success {
                if context.attempt > 1 {
                    info!(task = %task, attempt = context.attempt, "task passed validation after retry");
                }
                return CorrectionOutcome::Accepted {
                    output,
                    attempts: context.attempt,
                };
            }

            debug!(
                task = %task,
                attempt = context.attempt,
                feedback = %verdict.feedback,
                "validation failed"
            );

            if !retry.record_failure(output, verdict.feedback) {
                let feedback_trail = retry.feedback_trail();
                let last_output = retry
                    .accumulated_context()
                    .last()
                    .map(|a| a.output.clone())
                    .unwrap_or(Value::Null);
                warn!(
                    task = %task,
                    attempts = retry.attempt(),
                    feedback = ?feedback_trail,
                    "correction exhausted"
                );
                return CorrectionOutcome::Exhausted {
                    last_output,
                    feedback_trail,
                    attempts: retry.attempt(),
                };
            }
        }
    }

    /// Generate `n` candidates concurrently and keep the one the voter
    /// scores highest (ties go to the earliest candidate).
    ///
    /// Candidates whose execution faulted are dropped. Returns `None` when
    /// no candidate was produced.
    pub async fn run_ensemble(
        &self,
        payload: &Payload,
        context: TaskContext,
        n: usize,
        voter: &dyn Voter,
    ) -> Option<Candidate> {
        let mut set = JoinSet::new();
        for index in 0..n {
            let executor = Arc::clone(&self.executor);
            let payload = payload.clone();
            let context = context.clone();
            set.spawn(async move { (index, executor.execute(&payload, &context).await) });
        }

        let mut produced = Vec::with_capacity(n);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(output))) => produced.push((index, output)),
                Ok((index, Err(fault))) => {
                    warn!(task = %context.node_id, candidate = index, error = %fault, "ensemble candidate faulted");
                }
                Err(err) => {
                    warn!(task = %context.node_id, error = %err, "ensemble candidate task failed to join");
                }
            }
        }

        // First-seen order is generation order, not finishing order.
        produced.sort_by_key(|(index, _)| *index);
        let candidates: Vec<Candidate> = produced
            .into_iter()
            .map(|(index, output)| Candidate {
                id: format!("candidate_{index}"),
                output,
            })
            .collect();

        let scores = voter.vote(&candidates);
        select_best(&candidates, &scores).cloned()
    }
}

/// Text of a panic payload (`panic!` with a literal or a formatted message).
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_state_is_bounded() {
        let mut retry = RetryState::new(2);
        assert_eq!(retry.attempt(), 1);
        assert!(retry.record_failure(Value::from(1), "first".into()));
        assert_eq!(retry.attempt(), 2);
        assert!(!retry.record_failure(Value::from(2), "second".into()));
        assert_eq!(retry.attempt(), 2);
        assert_eq!(retry.feedback_trail(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn panic_payloads_become_text() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let formatted: Box<dyn Any + Send> = Box::new(format!("bad {}", 7));
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*literal), "boom");
        assert_eq!(panic_message(&*formatted), "bad 7");
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[test]
    fn zero_ceiling_still_allows_one_attempt() {
        let mut retry = RetryState::new(0);
        assert!(!retry.record_failure(Value::Null, "only".into()));
        assert_eq!(retry.accumulated_context().len(), 1);
    }
}
