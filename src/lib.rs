// src/lib.rs

pub mod cli;
pub mod config;
pub mod correction;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod guardrails;
pub mod logging;
pub mod persist;
pub mod plan;
pub mod retrieval;
pub mod types;

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, ensure_has_tasks, load_and_validate, load_or_default};
use crate::correction::{AllOf, ExitCodeValidator, GuardrailValidator, Validator};
use crate::engine::{Capabilities, Coordinator, CoordinatorOptions, RunReport};
use crate::errors::{Result, TaskmendError};
use crate::exec::ShellExecutor;
use crate::fs::RealFileSystem;
use crate::persist::JsonFileStore;
use crate::plan::PlannedTask;
use crate::retrieval::{HybridRetriever, KeywordStrategy, load_documents};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config and plan loading
/// - the shell executor, validators and state store
/// - optional retrieval over `[retrieval].files`
/// - the coordinator run and printing of the final result
///
/// Returns `None` for `--dry-run`.
pub async fn run(args: CliArgs) -> Result<Option<RunReport>> {
    let config_path = PathBuf::from(&args.config);
    let cfg = match &args.plan {
        Some(_) => load_or_default(&config_path)?,
        None => load_and_validate(&config_path)?,
    };

    let planned = match &args.plan {
        Some(path) => plan::parse_plan_json(&std::fs::read_to_string(path)?)?,
        None => {
            ensure_has_tasks(&cfg)?;
            plan::from_config(&cfg)
        }
    };

    let mut options = CoordinatorOptions::from_config(&cfg);
    apply_overrides(&args, &mut options)?;
    let state_path = args
        .state
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.config.state_file.clone());

    if args.dry_run {
        print_dry_run(&planned, &options, &state_path);
        return Ok(None);
    }

    options.goal = match args.goal {
        Some(goal) => Some(goal),
        None => prompt_goal()?,
    };

    let caps = build_capabilities(&cfg, &config_path, &state_path)?;
    let mut coordinator = Coordinator::new(caps, options);
    let report = coordinator.run(planned).await?;

    print_results(&report);
    Ok(Some(report))
}

fn apply_overrides(args: &CliArgs, options: &mut CoordinatorOptions) -> Result<()> {
    if let Some(n) = args.max_attempts {
        if n == 0 {
            return Err(TaskmendError::ConfigError("--max-attempts must be >= 1".to_string()));
        }
        options.max_attempts = n;
    }
    if let Some(n) = args.workers {
        if n == 0 {
            return Err(TaskmendError::ConfigError("--workers must be >= 1".to_string()));
        }
        options.workers = n;
    }
    if let Some(policy) = args.policy {
        options.policy = policy;
    }
    options.resume = !args.fresh;
    Ok(())
}

/// Executor, validator, store and retriever for a CLI run.
fn build_capabilities(cfg: &ConfigFile, config_path: &Path, state_path: &Path) -> Result<Capabilities> {
    let guardrails = cfg.guardrails();
    let root = config_root_dir(config_path);

    let executor = ShellExecutor::new()
        .with_guardrails(guardrails.clone())
        .with_timeout(cfg.task_timeout())
        .with_workdir(&root);

    let mut validator = AllOf::default().with(ExitCodeValidator);
    if !guardrails.is_empty() {
        validator = validator.with(GuardrailValidator::new(guardrails));
    }
    let validator: Arc<dyn Validator> = Arc::new(validator);

    let store = Arc::new(JsonFileStore::new(state_path));
    let mut caps = Capabilities::new(Arc::new(executor), validator, store);

    if !cfg.retrieval.files.is_empty() {
        let files: Vec<PathBuf> = cfg.retrieval.files.iter().map(|f| root.join(f)).collect();
        let docs = load_documents(&RealFileSystem, &files)?;
        info!(documents = docs.len(), "indexed retrieval files");
        let mut retriever = HybridRetriever::new().with_strategy(Box::new(KeywordStrategy::new()), 1.0);
        retriever.index(docs);
        caps = caps.with_retriever(Arc::new(retriever));
    }

    Ok(caps)
}

/// Directory task commands run in.
///
/// - If the config path has a non-empty parent (e.g. "ci/Taskmend.toml"),
///   we use that directory.
/// - For a bare filename we fall back to the current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Ask for a goal on stdin. An empty answer (or closed stdin) means none.
fn prompt_goal() -> Result<Option<String>> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("goal: ");
        io::stderr().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    let goal = line.trim();
    Ok((!goal.is_empty()).then(|| goal.to_string()))
}

/// Print the sink results on stdout: a task's stdout when it has one,
/// otherwise its JSON result.
fn print_results(report: &RunReport) {
    let sinks: Vec<(&str, &Value)> = report.sink_results().collect();
    let labelled = sinks.len() > 1;

    for (id, result) in sinks {
        if labelled {
            println!("[{id}]");
        }
        match result.get("stdout").and_then(Value::as_str) {
            Some(text) => print!("{text}"),
            None => println!(
                "{}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
            ),
        }
    }

    info!(
        completed = report.completion_order.len(),
        resumed = report.resumed.len(),
        exhausted = report.exhausted.len(),
        cycles = report.cycles,
        "run finished"
    );
}

/// Simple dry-run output: print tasks, deps and run settings.
fn print_dry_run(planned: &[PlannedTask], options: &CoordinatorOptions, state_path: &Path) {
    println!("taskmend dry-run");
    println!("  max_attempts = {}", options.max_attempts);
    println!("  correction_policy = {:?}", options.policy);
    println!("  max_fix_depth = {}", options.max_fix_depth);
    println!("  workers = {}", options.workers);
    println!("  state_file = {}", state_path.display());
    println!();

    println!("tasks ({}):", planned.len());
    for task in planned {
        println!("  - {}", task.id);
        match &task.payload {
            Value::String(s) => println!("      payload: {s}"),
            other => println!("      payload: {other}"),
        }
        if !task.dependencies.is_empty() {
            println!("      after: {:?}", task.dependencies);
        }
    }

    debug!("dry-run complete (no execution)");
}
