//! Warden - rule-based permission and shell execution policy
//!
//! Given a requested tool invocation (shell command, file access, URL fetch,
//! sub-agent call, MCP tool call), decide whether it is allowed, denied, or
//! needs the user's confirmation, and keep a record of what happened.
//!
//! Rules are plain strings such as `Bash(npm *)`, `Read(~/.ssh/**)` or
//! `WebFetch(domain:*.example.com)`, collected from several settings tiers.
//! Deny always wins:
//!
//! ```text
//! deny  -> ask -> allow -> default
//! ```
//!
//! Shell commands additionally pass through [`gate::ShellGate`], which knows
//! where a command came from and applies a trust policy on top of the rules.

pub mod audit;
pub mod config;
pub mod confirm;
pub mod error;
pub mod evaluator;
pub mod expand;
pub mod gate;
pub mod glob;
pub mod input;
pub mod level;
pub mod matcher;
pub mod redact;
pub mod rule;
pub mod safety;

pub use audit::{AuditLog, AuditOutcome, AuditSink, ShellAuditEntry};
pub use config::{load_permissions, ConfigCache, LoadOptions, LoadedConfig, PermissionConfig, Tier};
pub use confirm::Confirmer;
pub use error::RuleError;
pub use evaluator::{evaluate, EvalContext, PermissionVerdict, ReasonCode, VerdictAction};
pub use expand::ExpansionVars;
pub use gate::{ConfirmContext, GateSettings, ShellGate, ShellRequest, ShellVerdict};
pub use input::ToolInput;
pub use level::{ShellSource, TrustLevel};
pub use rule::{parse_rule, parse_rules, ParsedRule};
