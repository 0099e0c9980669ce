// src/dag/mod.rs

//! Task graph storage and scheduling.
//!
//! - [`graph`] holds the task graph and its shared, lock-guarded handle.
//! - [`scheduler`] takes ready snapshots, applies completions and manages
//!   fix-task delegation.
//! - [`task_info`] provides node types and the dispatch view of a node.
//! - [`scheduler_step`] defines the result types for scheduler steps.
//! - [`stall`] builds the diagnostic for a run that cannot progress.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod stall;
pub mod task_info;

pub use graph::{SharedGraph, TaskGraph};
pub use scheduler::{FIX_PREFIX, Scheduler, fix_id_for};
pub use scheduler_step::{ReadyBatch, SchedulerStep};
pub use stall::StallReport;
pub use task_info::{BlockedNode, ReadyTask, TaskNode, TaskRunState};
