// src/correction/validators.rs

//! Stock validators.

use std::sync::Arc;

use crate::correction::{Validator, Verdict};
use crate::engine::TaskResult;
use crate::guardrails::Guardrails;

/// Accepts every output. Execution faults still fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _output: &TaskResult) -> Verdict {
        Verdict::pass()
    }
}

/// Accepts outputs of the shape `{"exit_code": 0, ...}` produced by
/// [`ShellExecutor`](crate::exec::ShellExecutor).
///
/// Feedback on failure is the process stderr (or stdout if stderr is empty).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitCodeValidator;

impl Validator for ExitCodeValidator {
    fn validate(&self, output: &TaskResult) -> Verdict {
        let Some(code) = output.get("exit_code").and_then(|c| c.as_i64()) else {
            return Verdict::fail("output has no exit_code");
        };

        if code == 0 {
            return Verdict::pass();
        }

        let text = ["stderr", "stdout"]
            .iter()
            .filter_map(|key| output.get(*key).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or("");

        if text.is_empty() {
            Verdict::fail(format!("exit code {code}"))
        } else {
            Verdict::fail(format!("exit code {code}: {text}"))
        }
    }
}

/// Fails outputs that match a forbidden pattern.
#[derive(Debug, Clone)]
pub struct GuardrailValidator {
    guardrails: Guardrails,
}

impl GuardrailValidator {
    pub fn new(guardrails: Guardrails) -> Self {
        Self { guardrails }
    }
}

impl Validator for GuardrailValidator {
    fn validate(&self, output: &TaskResult) -> Verdict {
        match self.guardrails.check_value(output) {
            Ok(()) => Verdict::pass(),
            Err(violation) => Verdict::fail(format!("output {violation}")),
        }
    }
}

/// Passes only if every inner validator passes; feedback of all failing
/// validators is joined line by line.
#[derive(Clone, Default)]
pub struct AllOf {
    validators: Vec<Arc<dyn Validator>>,
}

impl AllOf {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }

    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }
}

impl Validator for AllOf {
    fn validate(&self, output: &TaskResult) -> Verdict {
        let failures: Vec<String> = self
            .validators
            .iter()
            .map(|v| v.validate(output))
            .filter(|verdict| !verdict.success)
            .map(|verdict| verdict.feedback)
            .collect();

        if failures.is_empty() {
            Verdict::pass()
        } else {
            Verdict::fail(failures.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exit_code_feedback_prefers_stderr() {
        let v = ExitCodeValidator;
        assert!(v.validate(&json!({"exit_code": 0, "stdout": "", "stderr": ""})).success);

        let verdict = v.validate(&json!({"exit_code": 2, "stdout": "out", "stderr": " boom \n"}));
        assert_eq!(verdict, Verdict::fail("exit code 2: boom"));

        let verdict = v.validate(&json!({"exit_code": 1, "stdout": "", "stderr": ""}));
        assert_eq!(verdict.feedback, "exit code 1");

        assert!(!v.validate(&json!("not a process result")).success);
    }

    #[test]
    fn all_of_collects_every_failure() {
        let v = AllOf::default()
            .with(ExitCodeValidator)
            .with(GuardrailValidator::new(Guardrails::default()));

        let verdict = v.validate(&json!({"exit_code": 1, "stdout": "subprocess", "stderr": ""}));
        assert!(!verdict.success);
        assert_eq!(
            verdict.feedback,
            "exit code 1: subprocess\noutput contains forbidden pattern: subprocess"
        );

        assert!(v.validate(&json!({"exit_code": 0, "stdout": "ok", "stderr": ""})).success);
    }

    #[test]
    fn closures_are_validators() {
        let v = |out: &TaskResult| {
            if out == &json!(42) {
                Verdict::pass()
            } else {
                Verdict::fail("not the answer")
            }
        };
        assert!(Validator::validate(&v, &json!(42)).success);
        assert!(!Validator::validate(&v, &json!(41)).success);
        assert!(AcceptAll.validate(&json!(null)).success);
    }
}
