// tests/cli_run.rs
#![cfg(unix)]

use std::error::Error;
use std::fs;
use std::path::Path;

use clap::Parser;
use serde_json::json;
use tempfile::tempdir;

use taskmend::cli::CliArgs;
use taskmend::engine::{RunPhase, is_failure_record};
use taskmend::errors::TaskmendError;
use taskmend_test_utils::{PlanBuilder, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn args(dir: &Path, extra: &[&str]) -> Result<CliArgs, clap::Error> {
    let config = dir.join("Taskmend.toml");
    let state = dir.join("state.json");
    let mut argv = vec![
        "taskmend".to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--state".to_string(),
        state.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv)
}

const PIPELINE: &str = r#"
[config]
max_attempts = 2

[task.greet]
payload = "echo \"goal: $TASKMEND_GOAL\""

[task.shout]
cmd = "echo done > shout.txt && echo loud"
after = ["greet"]
"#;

#[tokio::test]
async fn runs_shell_tasks_from_config() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::write(dir.path().join("Taskmend.toml"), PIPELINE)?;

    let report = with_timeout(taskmend::run(args(dir.path(), &["ship it"])?))
        .await?
        .ok_or("expected a report")?;

    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(report.completion_order, vec!["greet", "shout"]);
    assert_eq!(report.results["greet"]["stdout"], "goal: ship it\n");
    assert_eq!(report.results["shout"]["stdout"], "loud\n");
    assert_eq!(report.sinks, vec!["shout"]);

    // Commands run in the config's directory.
    assert_eq!(fs::read_to_string(dir.path().join("shout.txt"))?, "done\n");
    assert!(dir.path().join("state.json").is_file());
    Ok(())
}

#[tokio::test]
async fn second_run_resumes_and_fresh_reruns() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::write(dir.path().join("Taskmend.toml"), PIPELINE)?;

    with_timeout(taskmend::run(args(dir.path(), &["once"])?)).await?;
    fs::remove_file(dir.path().join("shout.txt"))?;

    let resumed = with_timeout(taskmend::run(args(dir.path(), &["twice"])?))
        .await?
        .ok_or("expected a report")?;
    assert_eq!(resumed.resumed, vec!["greet", "shout"]);
    assert!(resumed.completion_order.is_empty());
    assert!(!dir.path().join("shout.txt").exists());

    let fresh = with_timeout(taskmend::run(args(dir.path(), &["thrice", "--fresh"])?))
        .await?
        .ok_or("expected a report")?;
    assert_eq!(fresh.completion_order.len(), 2);
    assert_eq!(fresh.results["greet"]["stdout"], "goal: thrice\n");
    assert!(dir.path().join("shout.txt").exists());
    Ok(())
}

#[tokio::test]
async fn failing_command_is_force_completed_with_its_stderr() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::write(
        dir.path().join("Taskmend.toml"),
        r#"
[task.broken]
payload = "echo nope >&2; exit 3"
"#,
    )?;

    let report = with_timeout(taskmend::run(args(
        dir.path(),
        &["goal", "--max-attempts", "2", "--policy", "force-complete"],
    )?))
    .await?
    .ok_or("expected a report")?;

    assert_eq!(report.attempts["broken"], 2);
    let record = &report.results["broken"];
    assert!(is_failure_record(record));
    assert_eq!(record["feedback"], json!(["exit code 3: nope", "exit code 3: nope"]));
    Ok(())
}

#[tokio::test]
async fn forbidden_command_never_runs() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::write(
        dir.path().join("Taskmend.toml"),
        r#"
[config]
max_attempts = 1
correction_policy = "force_complete"

[guardrails]
forbidden = ["touch"]

[task.sneaky]
payload = "touch marker"
"#,
    )?;

    let report = with_timeout(taskmend::run(args(dir.path(), &["goal"])?))
        .await?
        .ok_or("expected a report")?;

    assert!(!dir.path().join("marker").exists());
    let feedback = report.results["sneaky"]["feedback"][0].as_str().unwrap_or_default();
    assert!(feedback.contains("forbidden pattern"));
    Ok(())
}

#[tokio::test]
async fn plan_file_replaces_config_tasks() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let plan = PlanBuilder::new()
        .task_with("1", json!("echo one"), &[])
        .task_with("2", json!("echo two"), &["1"])
        .to_plan_json();
    let plan_path = dir.path().join("plan.json");
    fs::write(&plan_path, format!("```json\n{plan}\n```"))?;

    let report = with_timeout(taskmend::run(args(
        dir.path(),
        &["goal", "--plan", plan_path.to_str().ok_or("path")?],
    )?))
    .await?
    .ok_or("expected a report")?;

    assert_eq!(report.completion_order, vec!["1", "2"]);
    assert_eq!(report.results["2"]["stdout"], "two\n");
    Ok(())
}

#[tokio::test]
async fn cyclic_config_stalls_with_exit_code_two() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    fs::write(
        dir.path().join("Taskmend.toml"),
        r#"
[task.a]
payload = "echo a"
after = ["b"]

[task.b]
payload = "echo b"
after = ["a"]
"#,
    )?;

    let err = with_timeout(taskmend::run(args(dir.path(), &["goal"])?))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskmendError::Stall(_)));
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

#[tokio::test]
async fn dry_run_executes_nothing() -> TestResult {
    let dir = tempdir()?;
    fs::write(dir.path().join("Taskmend.toml"), PIPELINE)?;

    let outcome = taskmend::run(args(dir.path(), &["--dry-run"])?).await?;

    assert!(outcome.is_none());
    assert!(!dir.path().join("state.json").exists());
    assert!(!dir.path().join("shout.txt").exists());
    Ok(())
}

#[tokio::test]
async fn zero_workers_override_is_rejected() -> TestResult {
    let dir = tempdir()?;
    fs::write(dir.path().join("Taskmend.toml"), PIPELINE)?;

    let err = taskmend::run(args(dir.path(), &["goal", "--workers", "0"])?)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskmendError::ConfigError(_)));
    assert_eq!(err.exit_code(), 1);
    Ok(())
}
