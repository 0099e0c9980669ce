// src/guardrails.rs

//! Forbidden-pattern checks on task inputs and outputs.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Patterns rejected when no `[guardrails]` section overrides them.
pub const DEFAULT_FORBIDDEN: &[&str] = &[r"rm\s+-rf", r"import\s+os", r"subprocess"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("contains forbidden pattern: {pattern}")]
pub struct GuardrailViolation {
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct Guardrails {
    patterns: Vec<Regex>,
}

impl Guardrails {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// No patterns at all.
    pub fn disabled() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn check(&self, text: &str) -> Result<(), GuardrailViolation> {
        match self.patterns.iter().find(|re| re.is_match(text)) {
            Some(re) => Err(GuardrailViolation {
                pattern: re.as_str().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Check a JSON value; strings are checked as-is, anything else in its
    /// serialized form.
    pub fn check_value(&self, value: &Value) -> Result<(), GuardrailViolation> {
        match value {
            Value::String(s) => self.check(s),
            other => self.check(&other.to_string()),
        }
    }
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_FORBIDDEN
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}
