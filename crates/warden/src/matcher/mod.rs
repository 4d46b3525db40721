//! Specifier matchers
//!
//! Each matcher is a pure predicate over a candidate and a specifier.

pub mod domain;
pub mod name;
pub mod path;
pub mod shell;

pub use domain::{extract_host, matches_domain};
pub use name::matches_name;
pub use path::matches_path;
pub use shell::{matches_command, split_segments, strip_control_chars};

use serde::Serialize;

/// Which rule list a match is being evaluated for
///
/// Allow matching is conservative in one direction (every clause must be
/// safe), deny and ask in the other (any clause condemns the command).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Allow,
    Deny,
    Ask,
}

impl MatchMode {
    /// Deny and ask share the "any clause" semantics
    pub fn is_restrictive(&self) -> bool {
        matches!(self, MatchMode::Deny | MatchMode::Ask)
    }
}
