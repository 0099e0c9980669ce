// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::CorrectionPolicy;

/// Command-line arguments for `taskmend`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskmend",
    version,
    about = "Run a goal as a DAG of tasks, retrying and repairing failed tasks in place.",
    long_about = None
)]
pub struct CliArgs {
    /// The goal for this run.
    ///
    /// If omitted, the goal is read interactively from stdin.
    #[arg(value_name = "GOAL")]
    pub goal: Option<String>,

    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Taskmend.toml")]
    pub config: String,

    /// Planner output (JSON array of `{id, description, deps}`) to use
    /// instead of the `[task.*]` sections of the config.
    #[arg(long, value_name = "PATH")]
    pub plan: Option<String>,

    /// Override `[config].state_file`.
    #[arg(long, value_name = "PATH")]
    pub state: Option<String>,

    /// Ignore any persisted run state and start from scratch.
    #[arg(long)]
    pub fresh: bool,

    /// Override `[config].max_attempts`.
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Override `[config].correction_policy` (fix-task, force-complete).
    #[arg(long, value_name = "POLICY", value_parser = parse_policy)]
    pub policy: Option<CorrectionPolicy>,

    /// Override `[config].workers`.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKMEND_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_policy(s: &str) -> Result<CorrectionPolicy, String> {
    s.parse()
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_and_overrides_parse() {
        let args = CliArgs::try_parse_from([
            "taskmend",
            "build the thing",
            "--policy",
            "force-complete",
            "--max-attempts",
            "5",
        ])
        .unwrap();

        assert_eq!(args.goal.as_deref(), Some("build the thing"));
        assert_eq!(args.policy, Some(CorrectionPolicy::ForceComplete));
        assert_eq!(args.max_attempts, Some(5));
        assert_eq!(args.config, "Taskmend.toml");
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(CliArgs::try_parse_from(["taskmend", "--policy", "ignore"]).is_err());
    }
}
