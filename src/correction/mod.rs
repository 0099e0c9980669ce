// src/correction/mod.rs

//! Self-correction around a single task.
//!
//! - [`controller`] runs the bounded execute → validate → retry loop.
//! - [`ensemble`] picks one of several candidate outputs using a [`Voter`].
//! - [`validators`] contains the stock [`Validator`] implementations.

use std::collections::HashMap;

use serde::Serialize;

use crate::engine::TaskResult;

pub mod controller;
pub mod ensemble;
pub mod validators;

pub use controller::{AttemptRecord, CorrectionController, CorrectionOutcome, RetryState};
pub use ensemble::select_best;
pub use validators::{AcceptAll, AllOf, ExitCodeValidator, GuardrailValidator};

/// Default attempt ceiling for the correction loop.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Result of validating one output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub success: bool,
    pub feedback: String,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            success: true,
            feedback: String::new(),
        }
    }

    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            success: false,
            feedback: feedback.into(),
        }
    }
}

/// Judges a task output.
///
/// Must be deterministic enough that the same output gets the same verdict,
/// otherwise retries cannot converge.
pub trait Validator: Send + Sync {
    fn validate(&self, output: &TaskResult) -> Verdict;
}

impl<F> Validator for F
where
    F: Fn(&TaskResult) -> Verdict + Send + Sync,
{
    fn validate(&self, output: &TaskResult) -> Verdict {
        self(output)
    }
}

/// One output competing in an ensemble.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: String,
    pub output: TaskResult,
}

/// Scores ensemble candidates by id.
pub trait Voter: Send + Sync {
    fn vote(&self, candidates: &[Candidate]) -> HashMap<String, f64>;
}

impl<F> Voter for F
where
    F: Fn(&[Candidate]) -> HashMap<String, f64> + Send + Sync,
{
    fn vote(&self, candidates: &[Candidate]) -> HashMap<String, f64> {
        self(candidates)
    }
}
