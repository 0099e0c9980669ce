use std::str::FromStr;
use serde::Deserialize;

/// What the coordinator does with a node whose correction loop ran out of
/// attempts.
///
/// - `FixTask`: insert a `fix_<id>` node that depends on the same upstream
///   nodes and carries the failure trail. The original node waits for the
///   fix and is completed with its result (default behaviour).
/// - `ForceComplete`: complete the original node with a failure record so
///   the run can move past it.
///
/// Exactly one policy applies to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionPolicy {
    FixTask,
    ForceComplete,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        CorrectionPolicy::FixTask
    }
}

impl FromStr for CorrectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fix_task" => Ok(CorrectionPolicy::FixTask),
            "force_complete" => Ok(CorrectionPolicy::ForceComplete),
            other => Err(format!(
                "invalid correction_policy: {other} (expected \"fix_task\" or \"force_complete\")"
            )),
        }
    }
}
