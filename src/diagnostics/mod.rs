use serde::Serialize;

use crate::token::Span;

mod validator;
#[cfg(test)]
mod validator_test;

pub use validator::validate;

pub const DIAGNOSTIC_SOURCE: &str = "clarion-analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// User-facing finding. 0-based line/character range, stable message per
/// rule; plain data the host forwards unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub range: Span,
    pub severity: Severity,
    pub message: String,
    pub source: &'static str,
}

impl Diagnostic {
    pub fn error(range: Span, message: impl Into<String>) -> Self {
        Self {
            range,
            severity: Severity::Error,
            message: message.into(),
            source: DIAGNOSTIC_SOURCE,
        }
    }

    pub fn warning(range: Span, message: impl Into<String>) -> Self {
        Self {
            range,
            severity: Severity::Warning,
            message: message.into(),
            source: DIAGNOSTIC_SOURCE,
        }
    }
}
