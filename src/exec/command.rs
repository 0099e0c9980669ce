// src/exec/command.rs

//! Shell command executor.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, info};

use crate::engine::{Payload, TaskResult};
use crate::exec::backend::{ExecFuture, ExecutionFault, Executor, TaskContext};
use crate::guardrails::Guardrails;

/// Runs a payload as a shell command and reports
/// `{"exit_code", "stdout", "stderr"}`.
///
/// Accepted payloads:
/// - a string, run as-is;
/// - an object with a `command` (or `cmd`) string;
/// - a fix payload (`{"fix_for", "original_payload", ...}`), which re-runs
///   the original command with the failure trail visible in the context.
///
/// The context is exported as `TASKMEND_CONTEXT` (JSON), plus
/// `TASKMEND_NODE`, `TASKMEND_ATTEMPT` and, when set, `TASKMEND_GOAL`.
/// A non-zero exit is an output like any other; only spawn failures,
/// guardrail hits and timeouts are faults.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    guardrails: Guardrails,
    timeout: Option<Duration>,
    workdir: Option<PathBuf>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guardrails(mut self, guardrails: Guardrails) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    async fn run(&self, payload: &Payload, context: &TaskContext) -> Result<TaskResult, ExecutionFault> {
        let script = command_text(payload)
            .ok_or_else(|| ExecutionFault::new("payload has no shell command"))?;

        self.guardrails
            .check(script)
            .map_err(|violation| ExecutionFault::new(format!("command {violation}")))?;

        let context_json = serde_json::to_string(context)
            .map_err(|e| ExecutionFault::new(format!("serializing task context: {e}")))?;

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(script);
            c
        };

        cmd.env("TASKMEND_CONTEXT", context_json)
            .env("TASKMEND_NODE", &context.node_id)
            .env("TASKMEND_ATTEMPT", context.attempt.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(goal) = &context.goal {
            cmd.env("TASKMEND_GOAL", goal);
        }
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        info!(
            task = %context.node_id,
            attempt = context.attempt,
            cmd = %script,
            "starting task process"
        );

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", context.node_id))?;

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ExecutionFault::new(format!("timed out after {limit:?}")))?,
            None => child.wait_with_output().await,
        };
        let output = waited
            .with_context(|| format!("waiting for process of task '{}'", context.node_id))?;

        let code = output.status.code().unwrap_or(-1);
        debug!(
            task = %context.node_id,
            attempt = context.attempt,
            exit_code = code,
            "task process exited"
        );

        Ok(json!({
            "exit_code": code,
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
        }))
    }
}

impl Executor for ShellExecutor {
    fn execute<'a>(&'a self, payload: &'a Payload, context: &'a TaskContext) -> ExecFuture<'a> {
        Box::pin(self.run(payload, context))
    }
}

/// The shell command carried by `payload`, if any.
fn command_text(payload: &Value) -> Option<&str> {
    match payload {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => {
            if let Some(original) = map.get("original_payload") {
                return command_text(original);
            }
            map.get("command")
                .or_else(|| map.get("cmd"))
                .and_then(Value::as_str)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TaskContext {
        let mut c = TaskContext::new("build");
        c.goal = Some("ship it".into());
        c
    }

    #[test]
    fn command_text_unwraps_fix_payloads() {
        assert_eq!(command_text(&json!("make")), Some("make"));
        assert_eq!(command_text(&json!({"cmd": "make test"})), Some("make test"));
        let fix = json!({"fix_for": "build", "original_payload": {"command": "make"}, "feedback": []});
        assert_eq!(command_text(&fix), Some("make"));
        assert_eq!(command_text(&json!(3)), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_exit_code_and_streams() {
        let exec = ShellExecutor::new();
        let out = exec
            .execute(&json!("echo out; echo err >&2; exit 3"), &ctx())
            .await
            .unwrap();
        assert_eq!(out["exit_code"], 3);
        assert_eq!(out["stdout"], "out\n");
        assert_eq!(out["stderr"], "err\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exports_goal_and_context() {
        let exec = ShellExecutor::new();
        let out = exec
            .execute(&json!("printf '%s|%s' \"$TASKMEND_GOAL\" \"$TASKMEND_NODE\""), &ctx())
            .await
            .unwrap();
        assert_eq!(out["stdout"], "ship it|build");
    }

    #[tokio::test]
    async fn guardrail_hit_is_a_fault() {
        let exec = ShellExecutor::new();
        let err = exec.execute(&json!("rm -rf /tmp/x"), &ctx()).await.unwrap_err();
        assert_eq!(err.message, r"command contains forbidden pattern: rm\s+-rf");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_a_fault() {
        let exec = ShellExecutor::new().with_timeout(Some(Duration::from_millis(50)));
        let err = exec.execute(&json!("sleep 5"), &ctx()).await.unwrap_err();
        assert!(err.message.starts_with("timed out after"));
    }
}
