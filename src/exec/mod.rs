// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] provides the [`Executor`] trait every worker calls, plus
//!   the [`TaskContext`] handed to it.
//! - [`command`] is the production executor running shell commands via
//!   `tokio::process::Command`.
//! - [`pool`] dispatches a ready batch concurrently under a worker cap.

pub mod backend;
pub mod command;
pub mod pool;

pub use backend::{ExecFuture, ExecutionFault, Executor, TaskContext};
pub use command::ShellExecutor;
pub use pool::{Batch, WorkerPool};
