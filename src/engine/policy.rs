// src/engine/policy.rs

//! What happens to a node whose correction loop gave up.

use serde::Serialize;
use serde_json::{Value, json};

use crate::types::CorrectionPolicy;

/// How an exhausted node was dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedResolution {
    /// A `fix_<id>` node was inserted and the node waits for it.
    InsertFix,
    /// The node was completed with a failure record.
    ForceComplete,
}

/// Pick the resolution for an exhausted node `fix_depth` generations away
/// from a planned node.
///
/// Under [`CorrectionPolicy::FixTask`], fix nodes are only inserted while
/// `fix_depth < max_fix_depth`; past that the node is force-completed so
/// repeated failures cannot grow the graph forever.
pub fn resolve(policy: CorrectionPolicy, fix_depth: u32, max_fix_depth: u32) -> ExhaustedResolution {
    match policy {
        CorrectionPolicy::FixTask if fix_depth < max_fix_depth => ExhaustedResolution::InsertFix,
        CorrectionPolicy::FixTask | CorrectionPolicy::ForceComplete => {
            ExhaustedResolution::ForceComplete
        }
    }
}

/// Result stored for a force-completed node.
pub fn failure_record(last_output: &Value, feedback_trail: &[String]) -> Value {
    json!({
        "status": "failed",
        "last_output": last_output,
        "feedback": feedback_trail,
    })
}

/// True if `result` is a record produced by [`failure_record`].
pub fn is_failure_record(result: &Value) -> bool {
    result.get("status").and_then(Value::as_str) == Some("failed")
        && result.get("feedback").is_some_and(Value::is_array)
}
