use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use taskmend::correction::{Candidate, Validator, Verdict, Voter};
use taskmend::engine::{Payload, TaskResult};
use taskmend::exec::{ExecFuture, ExecutionFault, Executor, TaskContext};

/// One scripted executor response.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Output(Value),
    Fault(String),
    /// The executor panics with this message instead of returning.
    Panic(String),
}

#[derive(Default)]
struct ExecutorState {
    scripts: HashMap<String, VecDeque<Step>>,
    delays: HashMap<String, Duration>,
    calls: Vec<String>,
    contexts: Vec<TaskContext>,
}

/// A fake executor that:
/// - records every call (node id + full context)
/// - answers from a per-node script; the last step repeats once the script
///   runs out
/// - answers `{"task": <id>, "status": "ok"}` for nodes without a script
///
/// Clones share the same script and recordings.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<ExecutorState>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, id: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(id.to_string(), steps.into_iter().collect());
        self
    }

    /// Every call for `id` returns `output`.
    pub fn always(self, id: &str, output: Value) -> Self {
        self.script(id, [Step::Output(output)])
    }

    /// Sleep before answering for `id`.
    pub fn with_delay(self, id: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(id.to_string(), delay);
        self
    }

    /// Node ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| *c == id)
            .count()
    }

    /// Contexts seen for `id`, in call order.
    pub fn contexts_for(&self, id: &str) -> Vec<TaskContext> {
        self.state
            .lock()
            .unwrap()
            .contexts
            .iter()
            .filter(|c| c.node_id == id)
            .cloned()
            .collect()
    }

    /// Default output for an unscripted node.
    pub fn default_output(id: &str) -> Value {
        json!({"task": id, "status": "ok"})
    }
}

impl Executor for ScriptedExecutor {
    fn execute<'a>(&'a self, _payload: &'a Payload, context: &'a TaskContext) -> ExecFuture<'a> {
        Box::pin(async move {
            let (step, delay) = {
                let mut state = self.state.lock().unwrap();
                state.calls.push(context.node_id.clone());
                state.contexts.push(context.clone());

                let step = match state.scripts.get_mut(&context.node_id) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                };
                (step, state.delays.get(&context.node_id).copied())
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            match step {
                Some(Step::Output(v)) => Ok(v),
                Some(Step::Fault(msg)) => Err(ExecutionFault::new(msg)),
                Some(Step::Panic(msg)) => panic!("{msg}"),
                None => Ok(Self::default_output(&context.node_id)),
            }
        })
    }
}

/// Validator that rejects specific outputs with scripted feedback and
/// accepts everything else. Counts how often it was asked.
#[derive(Clone, Default)]
pub struct ScriptedValidator {
    rejections: Arc<Mutex<Vec<(Value, String)>>>,
    checks: Arc<Mutex<usize>>,
}

impl ScriptedValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(self, output: Value, feedback: &str) -> Self {
        self.rejections
            .lock()
            .unwrap()
            .push((output, feedback.to_string()));
        self
    }

    pub fn checks(&self) -> usize {
        *self.checks.lock().unwrap()
    }
}

impl Validator for ScriptedValidator {
    fn validate(&self, output: &TaskResult) -> Verdict {
        *self.checks.lock().unwrap() += 1;
        let rejections = self.rejections.lock().unwrap();
        match rejections.iter().find(|(v, _)| v == output) {
            Some((_, feedback)) => Verdict::fail(feedback.clone()),
            None => Verdict::pass(),
        }
    }
}

/// Voter scoring candidates by their output from a fixed table and
/// recording which candidate ids it was shown.
#[derive(Clone, Default)]
pub struct RecordingVoter {
    scores: HashMap<String, f64>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl RecordingVoter {
    /// `scores` maps a candidate output (as a JSON string) to its score.
    pub fn new(scores: impl IntoIterator<Item = (Value, f64)>) -> Self {
        Self {
            scores: scores.into_iter().map(|(v, s)| (v.to_string(), s)).collect(),
            seen: Arc::default(),
        }
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Voter for RecordingVoter {
    fn vote(&self, candidates: &[Candidate]) -> HashMap<String, f64> {
        let mut seen = self.seen.lock().unwrap();
        candidates
            .iter()
            .filter_map(|c| {
                seen.push(c.id.clone());
                self.scores
                    .get(&c.output.to_string())
                    .map(|score| (c.id.clone(), *score))
            })
            .collect()
    }
}
