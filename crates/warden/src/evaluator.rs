//! Permission evaluation
//!
//! Resolves a tool invocation against a [`PermissionConfig`]:
//! deny rules first, then ask, then allow, then the default. The first
//! matching rule in a list wins. Evaluation never fails; every path ends in
//! a [`PermissionVerdict`].

use crate::config::{PermissionConfig, Tier, ENV_DENY_RULES};
use crate::expand::ExpansionVars;
use crate::glob::shell_glob_matches;
use crate::input::{is_path_tool, is_shell_tool, ToolInput};
use crate::matcher::domain::DOMAIN_PREFIX;
use crate::matcher::{matches_command, matches_domain, matches_name, matches_path, MatchMode};
use crate::redact::redact;
use crate::rule::{normalize_tool_name, tools, ParsedRule};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;
use warden_core::{LEGACY_DIR, NAMESPACE_DIR};

/// At most this many remediation hints are attached to a verdict
pub const MAX_HINTS: usize = 2;

/// Which branch of the evaluation produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictAction {
    Deny,
    Ask,
    Allow,
    /// No rule matched
    Default,
}

impl VerdictAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictAction::Deny => "deny",
            VerdictAction::Ask => "ask",
            VerdictAction::Allow => "allow",
            VerdictAction::Default => "default",
        }
    }
}

/// Machine-readable reason for a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// A deny rule matched
    DenyRule,
    /// An ask rule matched
    AskRule,
    /// An allow rule matched
    AllowRule,
    /// Allow rules exist but none matched
    AllowlistUnmatched,
    /// No allow rules are configured
    NoRulesConfigured,
    /// Command was empty
    EmptyCommand,
    /// Working directory was not absolute
    RelativeCwd,
    /// Command hit the hardcoded denylist
    Denylisted,
    /// Implicit execution is switched off
    InterpolationDisabled,
    /// Implicit command used a shell metacharacter
    ForbiddenMetacharacter,
    /// Command is not on the allowlist for its trust level
    NotAllowlisted,
    /// Command matched a high-risk pattern
    HighRisk,
    /// High-risk command in a non-interactive session
    NonInteractive,
    /// High-risk command allowed through the bypass flag
    Bypassed,
    /// User approved the command
    Confirmed,
    /// User rejected or dismissed the prompt
    Rejected,
    /// Prompt was cancelled
    Cancelled,
    /// The confirmation callback failed
    ConfirmationFailed,
    /// Command passed every check
    Permitted,
}

/// Result of a permission evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionVerdict {
    /// False for deny and ask
    pub allowed: bool,

    pub action: VerdictAction,

    pub reason_code: ReasonCode,

    /// Human-readable explanation, redacted
    pub reason: String,

    /// Raw text of the rule that matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_scope: Option<Tier>,

    /// Up to two redacted suggestions for getting unblocked
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remediation_hints: Vec<String>,
}

impl PermissionVerdict {
    fn from_rule(action: VerdictAction, reason_code: ReasonCode, reason: String, rule: &ParsedRule) -> Self {
        Self {
            allowed: action == VerdictAction::Allow,
            action,
            reason_code,
            reason: redact(&reason),
            matched_rule: Some(rule.raw.clone()),
            source_path: rule.source_path.clone(),
            source_scope: rule.source_scope,
            remediation_hints: Vec::new(),
        }
    }

    fn fallback(reason_code: ReasonCode, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            action: VerdictAction::Default,
            reason_code,
            reason: redact(&reason.into()),
            matched_rule: None,
            source_path: None,
            source_scope: None,
            remediation_hints: Vec::new(),
        }
    }
}

/// Per-call evaluation context
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub vars: ExpansionVars,

    /// Base for `/`-prefixed path specifiers on rules without a source file
    pub settings_dir: Option<PathBuf>,
}

impl EvalContext {
    pub fn new(vars: ExpansionVars) -> Self {
        Self {
            vars,
            settings_dir: None,
        }
    }

    /// Context for a working directory with detected home and project
    pub fn detect(cwd: &Path) -> Self {
        Self::new(ExpansionVars::detect(cwd))
    }

    pub fn with_settings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings_dir = Some(dir.into());
        self
    }

    /// Directory `/`-prefixed specifiers of `rule` resolve against
    ///
    /// Rules loaded from `<root>/.warden/settings.json` resolve against
    /// `<root>`; other files against their own directory.
    fn settings_dir_for(&self, rule: &ParsedRule) -> PathBuf {
        if let Some(parent) = rule.source_path.as_deref().and_then(Path::parent) {
            let is_namespace = parent
                .file_name()
                .map(|name| name == NAMESPACE_DIR || name == LEGACY_DIR)
                .unwrap_or(false);
            return match (is_namespace, parent.parent()) {
                (true, Some(root)) => root.to_path_buf(),
                _ => parent.to_path_buf(),
            };
        }
        self.settings_dir
            .clone()
            .unwrap_or_else(|| self.vars.cwd.clone())
    }
}

/// Evaluate a tool call given its raw JSON input
pub fn evaluate(tool: &str, input: &Value, config: &PermissionConfig, ctx: &EvalContext) -> PermissionVerdict {
    let tool = normalize_tool_name(tool);
    let input = ToolInput::extract(&tool, input);
    evaluate_input(&tool, &input, config, ctx)
}

/// Evaluate a tool call whose input has already been extracted
///
/// `tool` must be canonical (see [`normalize_tool_name`]).
pub fn evaluate_input(
    tool: &str,
    input: &ToolInput,
    config: &PermissionConfig,
    ctx: &EvalContext,
) -> PermissionVerdict {
    let subject = describe(tool, input);

    if let Some(rule) = first_match(&config.deny, tool, input, MatchMode::Deny, ctx) {
        debug!(tool, rule = %rule.raw, "Denied by rule");
        let mut verdict = PermissionVerdict::from_rule(
            VerdictAction::Deny,
            ReasonCode::DenyRule,
            format!("{} is denied by rule `{}`{}", subject, rule.raw, origin(rule)),
            rule,
        );
        verdict.remediation_hints = remediation_hints(rule, tool, input);
        return verdict;
    }

    if let Some(rule) = first_match(&config.ask, tool, input, MatchMode::Ask, ctx) {
        debug!(tool, rule = %rule.raw, "Ask rule matched");
        let mut verdict = PermissionVerdict::from_rule(
            VerdictAction::Ask,
            ReasonCode::AskRule,
            format!("{} requires confirmation by rule `{}`{}", subject, rule.raw, origin(rule)),
            rule,
        );
        verdict.remediation_hints = remediation_hints(rule, tool, input);
        return verdict;
    }

    if let Some(rule) = first_match(&config.allow, tool, input, MatchMode::Allow, ctx) {
        debug!(tool, rule = %rule.raw, "Allowed by rule");
        return PermissionVerdict::from_rule(
            VerdictAction::Allow,
            ReasonCode::AllowRule,
            format!("{} is allowed by rule `{}`{}", subject, rule.raw, origin(rule)),
            rule,
        );
    }

    if config.allow.is_empty() {
        PermissionVerdict::fallback(ReasonCode::NoRulesConfigured, "No permission rules matched")
    } else {
        PermissionVerdict::fallback(
            ReasonCode::AllowlistUnmatched,
            format!("{} is not on the allowlist; using default policy", subject),
        )
    }
}

fn first_match<'a>(
    rules: &'a [ParsedRule],
    tool: &str,
    input: &ToolInput,
    mode: MatchMode,
    ctx: &EvalContext,
) -> Option<&'a ParsedRule> {
    rules
        .iter()
        .find(|rule| tool_matches(rule, tool) && input_matches(rule, tool, input, mode, ctx))
}

fn tool_matches(rule: &ParsedRule, tool: &str) -> bool {
    if rule.tool == tool {
        return true;
    }
    rule.is_mcp_glob() && tool.starts_with(tools::MCP_PREFIX) && matches_name(tool, &rule.tool)
}

fn input_matches(rule: &ParsedRule, tool: &str, input: &ToolInput, mode: MatchMode, ctx: &EvalContext) -> bool {
    let Some(specifier) = rule.specifier.as_deref() else {
        return true;
    };

    match input {
        ToolInput::Command(command) if is_shell_tool(tool) => matches_command(command, specifier, mode),
        ToolInput::Path(path) if is_path_tool(tool) => {
            let settings_dir = ctx.settings_dir_for(rule);
            matches_path(path, specifier, &ctx.vars, Some(&settings_dir))
        }
        ToolInput::Url(url) => {
            if specifier.starts_with(DOMAIN_PREFIX) {
                matches_domain(url, specifier)
            } else {
                shell_glob_matches(specifier, url)
            }
        }
        ToolInput::Agents(agents) => {
            if mode.is_restrictive() {
                agents.iter().any(|agent| matches_name(agent, specifier))
            } else {
                agents.iter().all(|agent| matches_name(agent, specifier))
            }
        }
        _ => false,
    }
}

fn describe(tool: &str, input: &ToolInput) -> String {
    match input {
        ToolInput::Other => format!("`{}`", tool),
        other => format!("`{}` on `{}`", tool, other.summary()),
    }
}

fn origin(rule: &ParsedRule) -> String {
    match (&rule.source_path, rule.source_scope) {
        (Some(path), _) => format!(" in {}", path.display()),
        (None, Some(scope)) => format!(" ({} rules)", scope),
        (None, None) => String::new(),
    }
}

/// Build at most [`MAX_HINTS`] redacted hints for a blocking rule
fn remediation_hints(rule: &ParsedRule, tool: &str, input: &ToolInput) -> Vec<String> {
    let mut hints = Vec::new();

    match (&rule.source_path, rule.source_scope) {
        (Some(path), _) => hints.push(format!("Edit {} to change rule `{}`", path.display(), rule.raw)),
        (None, Some(Tier::Cli)) => hints.push(format!(
            "Rule `{}` was passed on the command line or via {}",
            rule.raw, ENV_DENY_RULES
        )),
        _ => {}
    }

    if let Some(alternative) = safer_alternative(tool, input) {
        hints.push(alternative);
    }

    hints.truncate(MAX_HINTS);
    hints.into_iter().map(|h| redact(&h)).collect()
}

/// Suggest a dedicated tool for common shell commands
fn safer_alternative(tool: &str, input: &ToolInput) -> Option<String> {
    let ToolInput::Command(command) = input else {
        return None;
    };
    if !is_shell_tool(tool) {
        return None;
    }
    let program = command.split_whitespace().next()?;
    let program = program.rsplit('/').next().unwrap_or(program);
    let suggestion = match program {
        "cat" | "head" | "tail" | "less" | "more" => tools::READ,
        "grep" | "rg" | "ag" => tools::GREP,
        "find" | "fd" => tools::FIND,
        "ls" | "tree" => tools::LS,
        "curl" | "wget" => tools::WEB_FETCH,
        "sed" | "awk" | "perl" => tools::EDIT,
        "cd" | "pushd" => tools::CD,
        _ => return None,
    };
    Some(format!("Use the {} tool instead of `{}`", suggestion, program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::parse_rule;
    use serde_json::json;

    fn rules(raw: &[&str]) -> Vec<ParsedRule> {
        raw.iter().map(|r| parse_rule(r).unwrap()).collect()
    }

    fn ctx() -> EvalContext {
        EvalContext::new(ExpansionVars::new("/work/app", "/home/dev", "/work/app"))
    }

    #[test]
    fn test_deny_beats_allow() {
        let config = PermissionConfig {
            deny: rules(&["Bash(rm *)"]),
            ask: vec![],
            allow: rules(&["Bash"]),
        };
        let verdict = evaluate("Bash", &json!({"command": "rm -rf /tmp/x"}), &config, &ctx());
        assert!(!verdict.allowed);
        assert_eq!(verdict.action, VerdictAction::Deny);
        assert_eq!(verdict.reason_code, ReasonCode::DenyRule);
        assert_eq!(verdict.matched_rule.as_deref(), Some("Bash(rm *)"));

        let verdict = evaluate("Bash", &json!({"command": "ls"}), &config, &ctx());
        assert!(verdict.allowed);
        assert_eq!(verdict.action, VerdictAction::Allow);
    }

    #[test]
    fn test_ask_before_allow() {
        let config = PermissionConfig {
            deny: vec![],
            ask: rules(&["Bash(git push *)"]),
            allow: rules(&["Bash(git *)"]),
        };
        let verdict = evaluate("bash", &json!({"command": "git push origin main"}), &config, &ctx());
        assert_eq!(verdict.action, VerdictAction::Ask);
        assert!(!verdict.allowed);

        let verdict = evaluate("bash", &json!({"command": "git status"}), &config, &ctx());
        assert_eq!(verdict.action, VerdictAction::Allow);
    }

    #[cfg(unix)]
    #[test]
    fn test_deny_through_symlinked_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(cwd.join("vault")).unwrap();
        std::fs::write(cwd.join("vault/key.txt"), "k").unwrap();
        std::os::unix::fs::symlink(cwd.join("vault"), cwd.join("secrets")).unwrap();
        let ctx = EvalContext::new(ExpansionVars::new(&cwd, "/home/dev", &cwd));

        let absolute = format!("Read(/{}/secrets/**)", cwd.display());
        for rule in ["Read(./secrets/**)", absolute.as_str()] {
            let config = PermissionConfig {
                deny: rules(&[rule]),
                ..Default::default()
            };
            for path in ["secrets/key.txt", "vault/key.txt"] {
                let verdict = evaluate("Read", &json!({"path": path}), &config, &ctx);
                assert_eq!(verdict.action, VerdictAction::Deny, "{} vs {}", rule, path);
                assert!(!verdict.allowed);
            }
        }
    }

    #[test]
    fn test_default_reasons() {
        let empty = PermissionConfig::new();
        let verdict = evaluate("Read", &json!({"path": "/work/app/a.txt"}), &empty, &ctx());
        assert!(verdict.allowed);
        assert_eq!(verdict.action, VerdictAction::Default);
        assert_eq!(verdict.reason_code, ReasonCode::NoRulesConfigured);

        let config = PermissionConfig {
            allow: rules(&["Bash(npm *)"]),
            ..Default::default()
        };
        let verdict = evaluate("Bash", &json!({"command": "make"}), &config, &ctx());
        assert!(verdict.allowed);
        assert_eq!(verdict.reason_code, ReasonCode::AllowlistUnmatched);
    }

    #[test]
    fn test_compound_command_not_allowed_by_prefix() {
        let config = PermissionConfig {
            allow: rules(&["Bash(npm *)"]),
            ..Default::default()
        };
        let verdict = evaluate("Bash", &json!({"command": "npm test && rm -rf /tmp/x"}), &config, &ctx());
        assert_eq!(verdict.action, VerdictAction::Default);

        let verdict = evaluate("Bash", &json!({"command": "npm test"}), &config, &ctx());
        assert_eq!(verdict.action, VerdictAction::Allow);
    }

    #[test]
    fn test_bash_rules_do_not_cover_bg_bash() {
        let config = PermissionConfig {
            deny: rules(&["Bash(rm *)"]),
            ..Default::default()
        };
        let verdict = evaluate("BgBash", &json!({"command": "rm -rf /tmp/x"}), &config, &ctx());
        assert_eq!(verdict.action, VerdictAction::Default);
    }

    #[test]
    fn test_mcp_glob_rules() {
        let config = PermissionConfig {
            deny: rules(&["mcp__github__*"]),
            allow: rules(&["mcp__*"]),
            ..Default::default()
        };
        let verdict = evaluate("mcp__github__create_issue", &json!({}), &config, &ctx());
        assert_eq!(verdict.action, VerdictAction::Deny);

        let verdict = evaluate("mcp__slack__post", &json!({}), &config, &ctx());
        assert_eq!(verdict.action, VerdictAction::Allow);

        // An mcp glob never applies to built-in tools
        let verdict = evaluate("Read", &json!({"path": "/work/app/x"}), &config, &ctx());
        assert_eq!(verdict.action, VerdictAction::Default);
    }

    #[test]
    fn test_web_fetch_domains() {
        let config = PermissionConfig {
            deny: rules(&["WebFetch(domain:*.evil.test)"]),
            allow: rules(&["WebFetch(domain:*.example.com)", "WebFetch(https://docs.rs/*)"]),
            ..Default::default()
        };
        let check = |url: &str| evaluate("WebFetch", &json!({ "url": url }), &config, &ctx()).action;

        assert_eq!(check("https://api.example.com/x"), VerdictAction::Allow);
        assert_eq!(check("https://example.com/x"), VerdictAction::Default);
        assert_eq!(check("https://cdn.evil.test"), VerdictAction::Deny);
        assert_eq!(check("https://docs.rs/regex"), VerdictAction::Allow);
    }

    #[test]
    fn test_subagent_any_and_all() {
        let config = PermissionConfig {
            deny: rules(&["Task(deploy-*)"]),
            allow: rules(&["Task(review-*)"]),
            ..Default::default()
        };

        let input = json!({"tasks": [{"agent": "review-a"}, {"agent": "deploy-prod"}]});
        assert_eq!(evaluate("Task", &input, &config, &ctx()).action, VerdictAction::Deny);

        let input = json!({"tasks": [{"agent": "review-a"}, {"agent": "lint"}]});
        assert_eq!(evaluate("Task", &input, &config, &ctx()).action, VerdictAction::Default);

        let input = json!({"centipede": [{"agent": "review-a"}, {"agent": "review-b"}]});
        assert_eq!(evaluate("Task", &input, &config, &ctx()).action, VerdictAction::Allow);
    }

    #[test]
    fn test_settings_relative_path_rule() {
        let root = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(root.path()).unwrap();
        std::fs::create_dir_all(root.join(".warden")).unwrap();
        std::fs::create_dir_all(root.join("src/a/b")).unwrap();

        let rule = parse_rule("Edit(/src/**)")
            .unwrap()
            .with_source(Some(root.join(".warden/settings.json")), Tier::ProjectShared);
        let config = PermissionConfig {
            deny: vec![rule],
            ..Default::default()
        };
        let elsewhere = tempfile::tempdir().unwrap();
        let elsewhere = std::fs::canonicalize(elsewhere.path()).unwrap();
        let ctx = EvalContext::new(ExpansionVars::new(&elsewhere, "/home/dev", &elsewhere));

        let inside = root.join("src/a/b/c.ts");
        let verdict = evaluate("Edit", &json!({"file_path": inside}), &config, &ctx);
        assert_eq!(verdict.action, VerdictAction::Deny);
        assert_eq!(verdict.source_scope, Some(Tier::ProjectShared));

        let outside = elsewhere.join("src/a/b/c.ts");
        let verdict = evaluate("Edit", &json!({"file_path": outside}), &config, &ctx);
        assert_eq!(verdict.action, VerdictAction::Default);
    }

    #[test]
    fn test_hints_are_capped_and_redacted() {
        let rule = parse_rule("Bash(cat *)")
            .unwrap()
            .with_source(Some(PathBuf::from("/work/app/.warden/settings.json")), Tier::ProjectShared);
        let config = PermissionConfig {
            deny: vec![rule],
            ..Default::default()
        };
        let verdict = evaluate("Bash", &json!({"command": "cat secrets/.env"}), &config, &ctx());
        assert_eq!(verdict.remediation_hints.len(), 2);
        assert!(verdict.remediation_hints[0].contains("/work/app/.warden/settings.json"));
        assert_eq!(verdict.remediation_hints[1], "Use the read tool instead of `cat`");
        assert!(!verdict.reason.contains(".env"));
    }
}
