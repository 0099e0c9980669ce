// tests/persistence.rs

use std::error::Error;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use taskmend::engine::{Capabilities, Coordinator, CoordinatorOptions};
use taskmend::fs::FileSystem;
use taskmend::fs::mock::MockFileSystem;
use taskmend::persist::{JsonFileStore, RunState, StateStore};
use taskmend_test_utils::{PlanBuilder, ScriptedExecutor, ScriptedValidator, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn coordinator(exec: &ScriptedExecutor, store: Arc<dyn StateStore>) -> Coordinator {
    let caps = Capabilities::new(Arc::new(exec.clone()), Arc::new(ScriptedValidator::new()), store);
    Coordinator::new(caps, CoordinatorOptions::default())
}

fn plan() -> PlanBuilder {
    PlanBuilder::new()
        .task("fetch", &[])
        .task("parse", &["fetch"])
        .task("report", &["parse"])
}

#[tokio::test]
async fn state_file_survives_between_runs() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("state").join("run.json");

    let first = ScriptedExecutor::new();
    with_timeout(coordinator(&first, Arc::new(JsonFileStore::new(&path))).run(plan().build())).await?;
    assert_eq!(first.calls().len(), 3);
    assert!(path.is_file());
    assert!(!dir.path().join("state").join("run.json.tmp").exists());

    let on_disk: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(on_disk["task_status"], json!({"fetch": true, "parse": true, "report": true}));
    let order: Vec<&String> = on_disk["results"].as_object().ok_or("results not an object")?.keys().collect();
    assert_eq!(order, vec!["fetch", "parse", "report"]);
    assert!(on_disk.get("fix_tasks").is_none());

    let second = ScriptedExecutor::new();
    let report = with_timeout(coordinator(&second, Arc::new(JsonFileStore::new(&path))).run(plan().build())).await?;
    assert!(second.calls().is_empty());
    assert_eq!(report.resumed.len(), 3);
    Ok(())
}

#[tokio::test]
async fn crash_after_first_completion_resumes_from_there() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("run.json");

    // What a run killed right after `fetch` completed leaves behind.
    let mut partial = RunState::default();
    partial.record_completion("fetch", json!({"exit_code": 0, "stdout": "data\n", "stderr": ""}));
    partial.task_status.insert("parse".into(), false);
    partial.task_status.insert("report".into(), false);
    JsonFileStore::new(&path).save(&partial)?;

    let exec = ScriptedExecutor::new();
    let report = with_timeout(coordinator(&exec, Arc::new(JsonFileStore::new(&path))).run(plan().build())).await?;

    assert_eq!(exec.calls(), vec!["parse", "report"]);
    assert_eq!(exec.contexts_for("parse")[0].dependency_results["fetch"]["stdout"], "data\n");
    assert_eq!(report.resumed, vec!["fetch"]);

    let saved = JsonFileStore::new(&path).load()?.ok_or("state missing")?;
    assert!(["fetch", "parse", "report"].iter().all(|id| saved.is_completed(id)));
    Ok(())
}

#[tokio::test]
async fn mock_filesystem_store_writes_only_the_target() -> TestResult {
    let fs = MockFileSystem::new();
    let store = JsonFileStore::with_fs("state/run.json", Arc::new(fs.clone()));

    let exec = ScriptedExecutor::new();
    with_timeout(coordinator(&exec, Arc::new(store.clone())).run(PlanBuilder::new().task("only", &[]).build()))
        .await?;

    assert_eq!(fs.paths(), vec![std::path::PathBuf::from("state/run.json")]);
    let text = fs.read_to_string(store.path())?;
    assert!(text.ends_with("}\n"));
    let saved: RunState = serde_json::from_str(&text)?;
    assert_eq!(saved.results["only"], ScriptedExecutor::default_output("only"));
    Ok(())
}

#[tokio::test]
async fn unreadable_state_fails_before_any_execution() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("run.json", "{ not json");
    let store = JsonFileStore::with_fs("run.json", Arc::new(fs));

    let exec = ScriptedExecutor::new();
    let err = with_timeout(coordinator(&exec, Arc::new(store)).run(plan().build()))
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("parse run state"));
    assert!(exec.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn completion_flag_in_state_file_is_honoured_without_a_result() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("run.json");
    std::fs::write(&path, r#"{"task_status": {"fetch": true, "parse": false}}"#)?;

    let exec = ScriptedExecutor::new();
    let report = with_timeout(coordinator(&exec, Arc::new(JsonFileStore::new(&path))).run(plan().build())).await?;

    assert_eq!(exec.calls(), vec!["parse", "report"]);
    assert_eq!(report.results["fetch"], json!(null));
    Ok(())
}
