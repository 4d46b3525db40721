//! Trust levels for shell execution
//!
//! Where a command comes from decides how much scrutiny it gets:
//! explicit > implicit, with internal helpers on a fixed allowlist.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How much a shell command's origin is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Typed or requested directly through a shell tool.
    /// High-risk commands need confirmation.
    Explicit,

    /// Expanded from text (prompt interpolation, context forks).
    /// Needs opt-in, read-only allowlist, no metacharacters.
    Implicit,

    /// Issued by the host itself for bookkeeping.
    /// Only `git`, `gh` and `which`.
    Internal,
}

impl TrustLevel {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "explicit" => Some(TrustLevel::Explicit),
            "implicit" => Some(TrustLevel::Implicit),
            "internal" => Some(TrustLevel::Internal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Explicit => "explicit",
            TrustLevel::Implicit => "implicit",
            TrustLevel::Internal => "internal",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a shell command originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellSource {
    /// The foreground shell tool
    Bash,
    /// The background shell tool
    BgBash,
    /// Command expansion inside prompt text
    ShellInterpolation,
    /// Command run to fill a forked context
    ContextFork,
    /// Host-issued git/gh helper
    GitHelper,
}

impl ShellSource {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "bash" => Some(ShellSource::Bash),
            "bg_bash" | "bgbash" => Some(ShellSource::BgBash),
            "shell_interpolation" | "interpolation" => Some(ShellSource::ShellInterpolation),
            "context_fork" | "fork" => Some(ShellSource::ContextFork),
            "git_helper" | "git" => Some(ShellSource::GitHelper),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShellSource::Bash => "bash",
            ShellSource::BgBash => "bg_bash",
            ShellSource::ShellInterpolation => "shell_interpolation",
            ShellSource::ContextFork => "context_fork",
            ShellSource::GitHelper => "git_helper",
        }
    }

    /// Trust level implied by this source
    pub fn trust_level(&self) -> TrustLevel {
        match self {
            ShellSource::Bash | ShellSource::BgBash => TrustLevel::Explicit,
            ShellSource::ShellInterpolation | ShellSource::ContextFork => TrustLevel::Implicit,
            ShellSource::GitHelper => TrustLevel::Internal,
        }
    }

    /// Canonical tool name permission rules are matched against
    pub fn tool_name(&self) -> &'static str {
        match self {
            ShellSource::BgBash => crate::rule::tools::BG_BASH,
            _ => crate::rule::tools::BASH,
        }
    }
}

impl fmt::Display for ShellSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
