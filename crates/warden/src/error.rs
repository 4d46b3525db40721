//! Error types for rule parsing

use thiserror::Error;

/// A single permission rule could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("Rule is empty")]
    Empty,

    #[error("Rule is missing a tool name: {0}")]
    MissingToolName(String),

    #[error("Rule has unbalanced parentheses: {0}")]
    UnbalancedParens(String),
}
