//! Shell policy gate
//!
//! Decides whether a shell command may run, given where it came from:
//!
//! 1. Empty commands and relative working directories are denied.
//! 2. The hardcoded denylist blocks regardless of rules.
//! 3. Implicit sources need `shellInterpolation` switched on.
//! 4. Permission rules: deny stops, ask needs confirmation, allow stops.
//! 5. Trust policy: internal helpers run `git`/`gh`/`which` only; implicit
//!    commands must be plain read-only commands; explicit high-risk commands
//!    need confirmation.
//!
//! [`ShellGate::check`] previews the decision. [`ShellGate::authorize`] runs
//! the confirmation workflow and audits the outcome.

use crate::audit::{AuditOutcome, AuditSink, GlobalAudit, ShellAuditEntry};
use crate::config::{LoadedConfig, PermissionConfig};
use crate::confirm::Confirmer;
use crate::evaluator::{evaluate_input, EvalContext, ReasonCode, VerdictAction};
use crate::expand::ExpansionVars;
use crate::input::ToolInput;
use crate::level::{ShellSource, TrustLevel};
use crate::matcher::strip_control_chars;
use crate::redact::redact;
use crate::safety::{self, RiskMatch};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_core::env_flag;

/// Env var letting high-risk commands through without a prompt
pub const ENV_ALLOW_HIGH_RISK: &str = "WARDEN_ALLOW_HIGH_RISK";

/// Timeout used when none (or zero) is requested
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on any requested timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30);

/// Clamp a requested execution timeout
pub fn clamp_timeout(requested: Option<Duration>) -> Duration {
    match requested {
        None => DEFAULT_TIMEOUT,
        Some(t) if t.is_zero() => DEFAULT_TIMEOUT,
        Some(t) => t.min(MAX_TIMEOUT),
    }
}

/// A command waiting for a decision
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub command: String,
    pub source: ShellSource,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
}

impl ShellRequest {
    pub fn new(command: impl Into<String>, source: ShellSource, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            source,
            cwd: cwd.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Gate switches that do not come from rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateSettings {
    /// Whether implicit sources may run at all
    pub shell_interpolation: bool,
    /// Let commands needing confirmation through when nobody can be asked
    pub allow_high_risk_noninteractive: bool,
}

impl GateSettings {
    /// Settings from a loaded config plus the environment
    pub fn from_loaded(loaded: &LoadedConfig) -> Self {
        Self {
            shell_interpolation: loaded.shell_interpolation,
            allow_high_risk_noninteractive: env_flag(ENV_ALLOW_HIGH_RISK),
        }
    }
}

/// Decision for one shell command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellVerdict {
    /// False when denied or blocked; true while confirmation is pending
    pub allowed: bool,

    pub requires_confirmation: bool,

    pub reason_code: ReasonCode,

    /// Human-readable explanation, redacted
    pub reason: String,

    pub source: ShellSource,

    pub trust_level: TrustLevel,

    /// Permission rule that decided or flagged the command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,

    /// Static pattern that flagged the command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskMatch>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remediation_hints: Vec<String>,

    /// Clamped execution timeout
    pub timeout_ms: u64,

    /// Terminal outcome, set once the command has been authorized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AuditOutcome>,
}

impl ShellVerdict {
    fn new(request: &ShellRequest, allowed: bool, reason_code: ReasonCode, reason: impl Into<String>) -> Self {
        Self {
            allowed,
            requires_confirmation: false,
            reason_code,
            reason: redact(&reason.into()),
            source: request.source,
            trust_level: request.source.trust_level(),
            matched_rule: None,
            risk: None,
            remediation_hints: Vec::new(),
            timeout_ms: clamp_timeout(request.timeout).as_millis() as u64,
            outcome: None,
        }
    }

    fn deny(request: &ShellRequest, reason_code: ReasonCode, reason: impl Into<String>) -> Self {
        Self::new(request, false, reason_code, reason)
    }

    fn allow(request: &ShellRequest, reason_code: ReasonCode, reason: impl Into<String>) -> Self {
        Self::new(request, true, reason_code, reason)
    }

    fn confirm(request: &ShellRequest, reason_code: ReasonCode, reason: impl Into<String>) -> Self {
        let mut verdict = Self::new(request, true, reason_code, reason);
        verdict.requires_confirmation = true;
        verdict
    }

    fn with_risk(mut self, risk: RiskMatch) -> Self {
        self.risk = Some(risk);
        self
    }

    /// Settle a pending confirmation
    fn resolve(mut self, allowed: bool, reason_code: ReasonCode, reason: impl Into<String>) -> Self {
        self.allowed = allowed;
        self.reason_code = reason_code;
        self.reason = redact(&reason.into());
        self
    }
}

/// How a pending confirmation may be answered
pub struct ConfirmContext<'a> {
    /// Whether a user is present to answer
    pub interactive: bool,
    pub confirmer: Option<&'a dyn Confirmer>,
    /// Cancelling this abandons the prompt and blocks the command
    pub cancel: CancellationToken,
}

impl<'a> ConfirmContext<'a> {
    /// Nobody can be asked
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            confirmer: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Ask through `confirmer`
    pub fn interactive(confirmer: &'a dyn Confirmer) -> Self {
        Self {
            interactive: true,
            confirmer: Some(confirmer),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Shell execution gate
pub struct ShellGate {
    config: PermissionConfig,
    settings: GateSettings,
    vars: Option<ExpansionVars>,
    audit: Arc<dyn AuditSink>,
}

impl ShellGate {
    /// Create a gate that audits to the process-wide log
    pub fn new(config: PermissionConfig, settings: GateSettings) -> Self {
        Self {
            config,
            settings,
            vars: None,
            audit: Arc::new(GlobalAudit),
        }
    }

    /// Create a gate from a loaded config, reading the bypass flag from the environment
    pub fn from_loaded(loaded: &LoadedConfig) -> Self {
        Self::new(loaded.permissions.clone(), GateSettings::from_loaded(loaded))
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Use fixed expansion variables instead of detecting them per request
    pub fn with_vars(mut self, vars: ExpansionVars) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Preview the decision without prompting or auditing
    pub fn check(&self, request: &ShellRequest) -> ShellVerdict {
        let command = strip_control_chars(&request.command);
        let command = command.trim();
        let trust = request.source.trust_level();

        if command.is_empty() {
            return ShellVerdict::deny(request, ReasonCode::EmptyCommand, "Command is empty");
        }
        if !request.cwd.is_absolute() {
            return ShellVerdict::deny(
                request,
                ReasonCode::RelativeCwd,
                format!("Working directory {} is not absolute", request.cwd.display()),
            );
        }

        if let Some(risk) = safety::denylist_match(command) {
            return ShellVerdict::deny(
                request,
                ReasonCode::Denylisted,
                format!("{} is never allowed", risk.reason),
            )
            .with_risk(risk);
        }

        if trust == TrustLevel::Implicit && !self.settings.shell_interpolation {
            let mut verdict = ShellVerdict::deny(
                request,
                ReasonCode::InterpolationDisabled,
                format!("Shell interpolation is disabled; `{}` was not run", command),
            );
            verdict
                .remediation_hints
                .push("Set \"shellInterpolation\": true in settings to enable it".to_string());
            return verdict;
        }

        let ctx = EvalContext::new(
            self.vars
                .clone()
                .unwrap_or_else(|| ExpansionVars::detect(&request.cwd)),
        );
        let input = ToolInput::Command(command.to_string());
        let permission = evaluate_input(request.source.tool_name(), &input, &self.config, &ctx);

        let mut pending: Option<ShellVerdict> = None;
        match permission.action {
            VerdictAction::Deny => {
                let mut verdict = ShellVerdict::deny(request, ReasonCode::DenyRule, permission.reason);
                verdict.matched_rule = permission.matched_rule;
                verdict.remediation_hints = permission.remediation_hints;
                return verdict;
            }
            VerdictAction::Allow => {
                let mut verdict = ShellVerdict::allow(request, ReasonCode::AllowRule, permission.reason);
                verdict.matched_rule = permission.matched_rule;
                return verdict;
            }
            VerdictAction::Ask => {
                let mut verdict = ShellVerdict::confirm(request, ReasonCode::AskRule, permission.reason);
                verdict.matched_rule = permission.matched_rule;
                verdict.remediation_hints = permission.remediation_hints;
                pending = Some(verdict);
            }
            VerdictAction::Default => {}
        }

        match trust {
            TrustLevel::Internal => {
                if !safety::internal_allowed(command) {
                    return ShellVerdict::deny(
                        request,
                        ReasonCode::NotAllowlisted,
                        format!("Internal helpers may only run git, gh or which, not `{}`", command),
                    );
                }
            }
            TrustLevel::Implicit => {
                if let Some(meta) = safety::forbidden_metacharacter(command) {
                    return ShellVerdict::deny(
                        request,
                        ReasonCode::ForbiddenMetacharacter,
                        format!("Interpolated commands may not contain `{}`", meta.escape_default()),
                    );
                }
                if let Some(rejection) = safety::implicit_rejection(command) {
                    return ShellVerdict::deny(request, ReasonCode::NotAllowlisted, rejection);
                }
                if let Some(risk) = safety::high_risk_match(command) {
                    return ShellVerdict::deny(
                        request,
                        ReasonCode::HighRisk,
                        format!("{} is not allowed in interpolated commands", risk.reason),
                    )
                    .with_risk(risk);
                }
            }
            TrustLevel::Explicit => {
                if pending.is_none() {
                    if let Some(risk) = safety::high_risk_match(command) {
                        pending = Some(
                            ShellVerdict::confirm(
                                request,
                                ReasonCode::HighRisk,
                                format!("{} needs confirmation", risk.reason),
                            )
                            .with_risk(risk),
                        );
                    }
                }
            }
        }

        pending.unwrap_or_else(|| {
            ShellVerdict::allow(request, ReasonCode::Permitted, format!("`{}` passed every check", command))
        })
    }

    /// Decide, confirming with the user when needed, and audit the outcome
    pub async fn authorize(&self, request: &ShellRequest, confirm: ConfirmContext<'_>) -> ShellVerdict {
        let verdict = self.check(request);

        if !verdict.allowed {
            debug!(command = %redact(&request.command), reason = %verdict.reason, "Shell command denied");
            return self.finish(request, verdict, AuditOutcome::Denied);
        }
        if !verdict.requires_confirmation {
            debug!(command = %redact(&request.command), "Shell command allowed");
            return self.finish(request, verdict, AuditOutcome::Allowed);
        }

        if !confirm.interactive {
            if self.settings.allow_high_risk_noninteractive {
                info!(command = %redact(&request.command), "Confirmation bypassed");
                let reason = format!("{} (bypassed by {})", verdict.reason, ENV_ALLOW_HIGH_RISK);
                let verdict = verdict.resolve(true, ReasonCode::Bypassed, reason);
                return self.finish(request, verdict, AuditOutcome::Bypassed);
            }
            let reason = format!(
                "{}; no one can confirm in a non-interactive session. Run it interactively or set {}=1",
                verdict.reason, ENV_ALLOW_HIGH_RISK
            );
            let verdict = verdict.resolve(false, ReasonCode::NonInteractive, reason);
            return self.finish(request, verdict, AuditOutcome::Blocked);
        }

        let Some(confirmer) = confirm.confirmer else {
            let reason = format!("{}; no confirmation prompt is available", verdict.reason);
            let verdict = verdict.resolve(false, ReasonCode::NonInteractive, reason);
            return self.finish(request, verdict, AuditOutcome::Blocked);
        };

        let answer = tokio::select! {
            _ = confirm.cancel.cancelled() => None,
            answer = confirmer.confirm(&request.command, &verdict.reason) => Some(answer),
        };

        let (verdict, outcome) = match answer {
            None => {
                let reason = format!("{}; confirmation was cancelled", verdict.reason);
                (verdict.resolve(false, ReasonCode::Cancelled, reason), AuditOutcome::Blocked)
            }
            Some(Ok(Some(true))) => {
                let reason = format!("{}; confirmed by user", verdict.reason);
                (verdict.resolve(true, ReasonCode::Confirmed, reason), AuditOutcome::Confirmed)
            }
            Some(Ok(_)) => {
                let reason = format!("{}; rejected by user", verdict.reason);
                (verdict.resolve(false, ReasonCode::Rejected, reason), AuditOutcome::Blocked)
            }
            Some(Err(e)) => {
                warn!("Confirmation failed: {:#}", e);
                let reason = format!("{}; confirmation failed: {:#}", verdict.reason, e);
                (verdict.resolve(false, ReasonCode::ConfirmationFailed, reason), AuditOutcome::Blocked)
            }
        };
        self.finish(request, verdict, outcome)
    }

    /// Audit a command that has finished running
    pub fn record_execution(&self, request: &ShellRequest, exit_code: Option<i32>, duration: Duration) {
        let entry = ShellAuditEntry::new(&request.command, request.source, &request.cwd, AuditOutcome::Executed)
            .with_execution(exit_code, duration.as_millis() as u64);
        self.audit.record(entry);
    }

    fn finish(&self, request: &ShellRequest, mut verdict: ShellVerdict, outcome: AuditOutcome) -> ShellVerdict {
        let entry = ShellAuditEntry::new(&request.command, request.source, &request.cwd, outcome)
            .with_reason(verdict.reason.clone());
        self.audit.record(entry);
        verdict.outcome = Some(outcome);
        verdict
    }
}
