// src/engine/coordinator.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::ConfigFile;
use crate::correction::{CorrectionController, CorrectionOutcome, DEFAULT_MAX_ATTEMPTS, Validator};
use crate::dag::{ReadyBatch, ReadyTask, Scheduler, SchedulerStep, SharedGraph, TaskGraph};
use crate::engine::core::{PhaseMachine, RunPhase, decide};
use crate::engine::policy::{self, ExhaustedResolution};
use crate::engine::{NodeId, Payload};
use crate::errors::{Result, TaskmendError};
use crate::exec::{Executor, TaskContext, WorkerPool};
use crate::persist::{FixTaskRecord, RunState, StateStore};
use crate::plan::PlannedTask;
use crate::retrieval::Retriever;
use crate::types::CorrectionPolicy;

/// External capabilities a run needs, injected at construction.
#[derive(Clone)]
pub struct Capabilities {
    pub executor: Arc<dyn Executor>,
    pub validator: Arc<dyn Validator>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub store: Arc<dyn StateStore>,
}

impl Capabilities {
    pub fn new(
        executor: Arc<dyn Executor>,
        validator: Arc<dyn Validator>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            executor,
            validator,
            retriever: None,
            store,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("retriever", &self.retriever.is_some())
            .finish_non_exhaustive()
    }
}

/// Run-wide knobs.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub max_attempts: u32,
    pub policy: CorrectionPolicy,
    pub max_fix_depth: u32,
    pub workers: usize,
    /// Snippets requested from the retriever per task.
    pub top_k: usize,
    pub goal: Option<String>,
    /// Re-hydrate from the state store before scheduling.
    pub resume: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            policy: CorrectionPolicy::default(),
            max_fix_depth: 1,
            workers: 4,
            top_k: 3,
            goal: None,
            resume: true,
        }
    }
}

impl CoordinatorOptions {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            max_attempts: cfg.config.max_attempts,
            policy: cfg.config.correction_policy,
            max_fix_depth: cfg.config.max_fix_depth,
            workers: cfg.config.workers,
            top_k: cfg.retrieval.top_k,
            ..Self::default()
        }
    }
}

/// A node whose correction loop ran out of attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExhaustedNode {
    pub id: NodeId,
    pub attempts: u32,
    pub resolution: ExhaustedResolution,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub phase: RunPhase,
    /// Nodes completed by this run, in completion order.
    pub completion_order: Vec<NodeId>,
    /// Nodes already complete in the persisted state.
    pub resumed: Vec<NodeId>,
    /// Attempts used per executed node.
    pub attempts: BTreeMap<NodeId, u32>,
    pub exhausted: Vec<ExhaustedNode>,
    /// Dispatch cycles that ran at least one task.
    pub cycles: u64,
    /// Every completed node's result, in completion order.
    pub results: Map<String, Value>,
    /// Planned nodes nothing depends on.
    pub sinks: Vec<NodeId>,
}

impl RunReport {
    /// Results of the sink nodes, which make up the final answer.
    pub fn sink_results(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.sinks
            .iter()
            .filter_map(|id| self.results.get(id).map(|r| (id.as_str(), r)))
    }
}

/// Drives a graph to completion.
///
/// Each cycle takes a ready snapshot, runs the whole batch through the
/// worker pool and applies outcomes one by one as workers return, saving
/// run state after each. The loop ends in `Done`, or in `Stalled` with a
/// [`TaskmendError::Stall`].
pub struct Coordinator {
    scheduler: Scheduler,
    controller: CorrectionController,
    caps: Capabilities,
    options: CoordinatorOptions,
    pool: WorkerPool,
    phase: PhaseMachine,
    state: RunState,
    completion_order: Vec<NodeId>,
    resumed: Vec<NodeId>,
    attempts: BTreeMap<NodeId, u32>,
    exhausted: Vec<ExhaustedNode>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("phase", &self.phase.phase())
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(caps: Capabilities, options: CoordinatorOptions) -> Self {
        Self::with_graph(SharedGraph::new(TaskGraph::new()), caps, options)
    }

    /// Coordinator over an existing (possibly shared) graph.
    pub fn with_graph(graph: SharedGraph, caps: Capabilities, options: CoordinatorOptions) -> Self {
        let controller = CorrectionController::new(Arc::clone(&caps.executor), Arc::clone(&caps.validator))
            .with_max_attempts(options.max_attempts);
        let pool = WorkerPool::new(options.workers);
        Self {
            scheduler: Scheduler::new(graph),
            controller,
            caps,
            options,
            pool,
            phase: PhaseMachine::new(),
            state: RunState::default(),
            completion_order: Vec::new(),
            resumed: Vec::new(),
            attempts: BTreeMap::new(),
            exhausted: Vec::new(),
        }
    }

    /// Handle to the graph; other components may insert through it mid-run.
    pub fn graph(&self) -> &SharedGraph {
        self.scheduler.graph()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn phase(&self) -> RunPhase {
        self.phase.phase()
    }

    /// Insert `planned`, resume from persisted state, then execute until the
    /// graph is done or stalls.
    pub async fn run(&mut self, planned: Vec<PlannedTask>) -> Result<RunReport> {
        self.plan(planned);
        if self.options.resume {
            self.resume()?;
        }
        self.phase.transition(RunPhase::Executing)?;

        loop {
            let batch = self.scheduler.next_batch();
            let decision = decide(batch.is_empty(), self.scheduler.is_complete());

            match self.phase.apply(decision)? {
                RunPhase::Done => {
                    self.persist();
                    info!(
                        cycles = self.scheduler.cycles(),
                        completed = self.completion_order.len(),
                        exhausted = self.exhausted.len(),
                        "run complete"
                    );
                    return Ok(self.report());
                }
                RunPhase::Stalled => {
                    self.persist();
                    let report = self.scheduler.stall_report();
                    error!(
                        blocked = ?report.blocked_ids(),
                        missing = ?report.missing_dependencies(),
                        cycles = ?report.cycles,
                        "run stalled: {report}"
                    );
                    return Err(TaskmendError::Stall(report));
                }
                RunPhase::Planning | RunPhase::Executing => self.run_batch(batch).await?,
            }
        }
    }

    fn plan(&mut self, planned: Vec<PlannedTask>) {
        info!(tasks = planned.len(), "planning: inserting tasks");
        for task in planned {
            if !self.scheduler.insert(task.id.clone(), task.payload, task.dependencies) {
                debug!(task = %task.id, "planned task already present; skipping");
            }
        }
    }

    /// Re-apply persisted completions and fix nodes. Completed nodes are
    /// never executed again.
    fn resume(&mut self) -> Result<()> {
        let Some(saved) = self.caps.store.load()? else {
            return Ok(());
        };

        for fix in &saved.fix_tasks {
            match self.scheduler.restore_fix(
                &fix.id,
                &fix.original,
                fix.payload.clone(),
                fix.dependencies.clone(),
            ) {
                Ok(()) => {}
                Err(TaskmendError::UnknownNode(original)) => {
                    warn!(fix = %fix.id, original = %original, "persisted fix task repairs an unknown node; skipping");
                }
                Err(err) => return Err(err),
            }
        }

        for (id, result) in saved.completed_results() {
            if !self.graph().read().contains(id) {
                warn!(task = %id, "persisted result for a node not in the graph; skipping");
                continue;
            }
            let step = self.scheduler.complete(id, result.clone())?;
            self.resumed.extend(step.newly_completed);
        }

        self.state = saved;
        let graph = self.scheduler.graph().read();
        self.state.sync_status(&graph);
        drop(graph);
        info!(resumed = self.resumed.len(), "resumed from persisted run state");
        Ok(())
    }

    async fn run_batch(&mut self, batch: ReadyBatch) -> Result<()> {
        info!(cycle = batch.cycle, tasks = ?batch.ids(), "dispatching ready batch");

        let jobs: Vec<(NodeId, Payload, TaskContext)> =
            batch.tasks.into_iter().map(|task| self.job_for(task)).collect();

        let controller = self.controller.clone();
        let mut running = self.pool.dispatch(jobs, move |(id, payload, context)| {
            let controller = controller.clone();
            async move {
                let outcome = controller.run(&payload, context).await;
                (id, outcome)
            }
        });

        // Every job of the batch is waited for, even after an error, so no
        // running task is dropped and every completion is persisted.
        let mut first_error: Option<TaskmendError> = None;
        while let Some(joined) = running.next().await {
            let applied = joined.and_then(|(id, outcome)| self.apply_outcome(&id, outcome));
            match applied {
                Ok(()) => self.persist(),
                Err(err) => {
                    error!(error = %err, remaining = running.pending(), "failed to apply task outcome");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn job_for(&self, task: ReadyTask) -> (NodeId, Payload, TaskContext) {
        let mut context = TaskContext::new(task.id.clone());
        context.goal = self.options.goal.clone();
        context.dependency_results = task.dependency_results;

        if let Some(retriever) = &self.caps.retriever {
            let query = match &task.payload {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            context.snippets = retriever.retrieve(&query, self.options.top_k);
        }

        (task.id, task.payload, context)
    }

    fn apply_outcome(&mut self, id: &str, outcome: CorrectionOutcome) -> Result<()> {
        self.attempts.insert(id.to_string(), outcome.attempts());

        match outcome {
            CorrectionOutcome::Accepted { output, .. } => {
                let step = self.scheduler.complete(id, output)?;
                self.record(step);
            }
            CorrectionOutcome::Exhausted {
                last_output,
                feedback_trail,
                attempts,
            } => {
                let depth = self.scheduler.fix_depth(id);
                let resolution = policy::resolve(self.options.policy, depth, self.options.max_fix_depth);
                warn!(
                    task = %id,
                    attempts,
                    fix_depth = depth,
                    ?resolution,
                    "task exhausted its attempts"
                );
                self.exhausted.push(ExhaustedNode {
                    id: id.to_string(),
                    attempts,
                    resolution,
                });

                let step = match resolution {
                    ExhaustedResolution::InsertFix => {
                        let step = self.scheduler.delegate_to_fix(id, &last_output, &feedback_trail)?;
                        self.record_fix(id);
                        step
                    }
                    ExhaustedResolution::ForceComplete => {
                        let record = policy::failure_record(&last_output, &feedback_trail);
                        self.scheduler.complete(id, record)?
                    }
                };
                self.record(step);
            }
        }
        Ok(())
    }

    fn record(&mut self, step: SchedulerStep) {
        let graph = self.scheduler.graph().read();
        for id in step.newly_completed {
            let result = graph.result_of(&id).cloned().unwrap_or(Value::Null);
            info!(task = %id, "task completed");
            self.state.record_completion(&id, result);
            self.completion_order.push(id);
        }
        self.state.sync_status(&graph);
    }

    fn record_fix(&mut self, original: &str) {
        let Some(fix_id) = self.scheduler.fix_of(original) else {
            return;
        };
        let graph = self.scheduler.graph().read();
        if let Some(node) = graph.node(fix_id) {
            self.state.record_fix(FixTaskRecord {
                id: node.id.clone(),
                original: original.to_string(),
                payload: node.payload.clone(),
                dependencies: node.dependencies.clone(),
            });
        }
    }

    /// Save run state; a failed save is logged and the run goes on.
    fn persist(&self) {
        if let Err(err) = self.caps.store.save(&self.state) {
            error!(error = %format!("{err:#}"), "failed to persist run state");
        }
    }

    fn report(&self) -> RunReport {
        let graph = self.scheduler.graph().read();
        let sinks = graph
            .nodes()
            .filter(|n| graph.dependents_of(&n.id).is_empty())
            .filter(|n| self.scheduler.original_of(&n.id).is_none())
            .map(|n| n.id.clone())
            .collect();

        RunReport {
            phase: self.phase.phase(),
            completion_order: self.completion_order.clone(),
            resumed: self.resumed.clone(),
            attempts: self.attempts.clone(),
            exhausted: self.exhausted.clone(),
            cycles: self.scheduler.cycles(),
            results: self
                .state
                .completed_results()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            sinks,
        }
    }
}
