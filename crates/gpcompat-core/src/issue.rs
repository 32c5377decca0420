//! Execution errors and classification outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

/// One structured issue extracted from a target engine error
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    /// Engine issue code (SQLSTATE for PostgreSQL-wire targets)
    pub code: String,

    /// Human-readable issue message
    pub message: String,
}

impl Issue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Error returned by the target engine for one query
///
/// Engine-native errors carry a stable code and name plus their issue list;
/// anything else (transport failures, closed pools) is opaque text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("{name} ({code}): {}", render_issues(.issues))]
    Engine {
        code: String,
        name: String,
        issues: Vec<Issue>,
    },

    #[error("{0}")]
    Other(String),
}

impl ExecutionError {
    /// Structured issues, empty for opaque errors
    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::Engine { issues, .. } => issues,
            Self::Other(_) => &[],
        }
    }

    /// Reason used to bucket a failure that no rule explains
    pub fn unknown_reason(&self, unmatched: &[Issue]) -> String {
        match self {
            Self::Engine { code, name, .. } => {
                format!("{} ({}): {}", name, code, render_issues(unmatched))
            }
            Self::Other(message) => format!("non engine err: {}", message),
        }
    }
}

/// Render issues as `[code: message; code: message]`
pub fn render_issues(issues: &[Issue]) -> String {
    let parts: Vec<String> = issues.iter().map(Issue::to_string).collect();
    format!("[{}]", parts.join("; "))
}

/// Classification of one checked query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Outcome {
    /// Query was accepted by the target engine
    Ok,

    /// Failure explained by the named rule
    KnownIssue(String),

    /// Failure no actionable rule explains, tagged with its reason
    UnknownIssue(String),
}
