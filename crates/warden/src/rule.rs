//! Permission rule parsing
//!
//! Rules are written `Tool`, `Tool()` or `Tool(specifier)`:
//!
//! ```text
//! Bash(npm *)              shell glob over the command line
//! Read(~/.ssh/**)          path glob with prefix conventions
//! WebFetch(domain:*.rs)    host pattern
//! Task(reviewer-*)         sub-agent name glob
//! mcp__github__*           MCP tool name glob, no specifier
//! ```

use crate::config::Tier;
use crate::error::RuleError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Canonical tool names understood by the evaluator
pub mod tools {
    pub const BASH: &str = "bash";
    pub const BG_BASH: &str = "bg_bash";
    pub const READ: &str = "read";
    pub const WRITE: &str = "write";
    pub const EDIT: &str = "edit";
    pub const CD: &str = "cd";
    pub const LS: &str = "ls";
    pub const FIND: &str = "find";
    pub const GREP: &str = "grep";
    pub const WEB_FETCH: &str = "web_fetch";
    pub const SUBAGENT: &str = "subagent";

    /// Prefix shared by every MCP tool name
    pub const MCP_PREFIX: &str = "mcp__";
}

/// Map a tool name to its canonical lowercase form
pub fn normalize_tool_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "bash" | "shell" => tools::BASH,
        "bg_bash" | "bgbash" | "background_bash" | "backgroundbash" => tools::BG_BASH,
        "read" | "readfile" | "read_file" => tools::READ,
        "write" | "writefile" | "write_file" => tools::WRITE,
        "edit" | "multiedit" | "multi_edit" => tools::EDIT,
        "cd" => tools::CD,
        "ls" => tools::LS,
        "find" | "glob" => tools::FIND,
        "grep" => tools::GREP,
        "webfetch" | "web_fetch" | "fetch" => tools::WEB_FETCH,
        "task" | "agent" | "subagent" | "sub_agent" => tools::SUBAGENT,
        _ => return lower,
    };
    canonical.to_string()
}

/// A parsed permission rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedRule {
    /// Canonical tool name
    pub tool: String,

    /// Text inside the parentheses; `None` matches every invocation
    pub specifier: Option<String>,

    /// The rule as written (trimmed)
    pub raw: String,

    /// Settings file the rule came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,

    /// Tier of the settings file the rule came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_scope: Option<Tier>,
}

impl ParsedRule {
    /// Attach the settings file and tier that defined this rule
    pub fn with_source(mut self, path: Option<PathBuf>, scope: Tier) -> Self {
        self.source_path = path;
        self.source_scope = Some(scope);
        self
    }

    /// True when the rule applies to every invocation of its tool
    pub fn is_bare(&self) -> bool {
        self.specifier.is_none()
    }

    /// True when the rule targets MCP tools by name pattern
    pub fn is_mcp_glob(&self) -> bool {
        self.tool.starts_with(tools::MCP_PREFIX)
    }
}

impl fmt::Display for ParsedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for ParsedRule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_rule(s)
    }
}

/// Whether parentheses outside quotes nest properly
fn parens_balanced(text: &str) -> bool {
    let mut depth = 0usize;
    let mut quote = None;
    for c in text.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}

/// Parse a single rule string
pub fn parse_rule(input: &str) -> Result<ParsedRule, RuleError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(RuleError::Empty);
    }
    if raw.starts_with('(') {
        return Err(RuleError::MissingToolName(raw.to_string()));
    }

    let (tool, specifier) = match raw.find('(') {
        None => {
            if raw.contains(')') {
                return Err(RuleError::UnbalancedParens(raw.to_string()));
            }
            (raw, None)
        }
        Some(open) => {
            let tool = &raw[..open];
            if tool.contains(')') || !raw.ends_with(')') {
                return Err(RuleError::UnbalancedParens(raw.to_string()));
            }
            let inner = raw[open + 1..raw.len() - 1].trim();
            if !parens_balanced(inner) {
                return Err(RuleError::UnbalancedParens(raw.to_string()));
            }
            (tool, (!inner.is_empty()).then(|| inner.to_string()))
        }
    };

    let tool = tool.trim();
    if tool.is_empty() {
        return Err(RuleError::MissingToolName(raw.to_string()));
    }

    Ok(ParsedRule {
        tool: normalize_tool_name(tool),
        specifier,
        raw: raw.to_string(),
        source_path: None,
        source_scope: None,
    })
}

/// Parse a batch of rules, skipping bad entries
///
/// Returns the parsed rules in input order plus one warning per skipped entry.
pub fn parse_rules<S: AsRef<str>>(inputs: &[S]) -> (Vec<ParsedRule>, Vec<String>) {
    let mut rules = Vec::with_capacity(inputs.len());
    let mut warnings = Vec::new();

    for input in inputs {
        match parse_rule(input.as_ref()) {
            Ok(rule) => rules.push(rule),
            Err(e) => warnings.push(format!("Skipping rule {:?}: {}", input.as_ref(), e)),
        }
    }

    (rules, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_and_empty_parens() {
        let bare = parse_rule("Read").unwrap();
        assert_eq!(bare.tool, "read");
        assert!(bare.is_bare());

        let empty = parse_rule("Read()").unwrap();
        assert_eq!(empty.tool, "read");
        assert!(empty.is_bare());
        assert_eq!(empty.raw, "Read()");
    }

    #[test]
    fn test_specifier() {
        let rule = parse_rule("Bash(npm *)").unwrap();
        assert_eq!(rule.tool, "bash");
        assert_eq!(rule.specifier.as_deref(), Some("npm *"));

        let nested = parse_rule("Bash(echo $(date))").unwrap();
        assert_eq!(nested.specifier.as_deref(), Some("echo $(date)"));
    }

    #[test]
    fn test_aliases() {
        assert_eq!(parse_rule("WebFetch").unwrap().tool, "web_fetch");
        assert_eq!(parse_rule("webfetch").unwrap().tool, "web_fetch");
        assert_eq!(parse_rule("Task(reviewer)").unwrap().tool, "subagent");
        assert_eq!(parse_rule("task").unwrap().tool, "subagent");
        assert_eq!(parse_rule("Glob(**/*.rs)").unwrap().tool, "find");
        assert_eq!(parse_rule("SomeCustomTool").unwrap().tool, "somecustomtool");
        assert_eq!(parse_rule("mcp__GitHub__*").unwrap().tool, "mcp__github__*");
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_rule(""), Err(RuleError::Empty));
        assert_eq!(parse_rule("   "), Err(RuleError::Empty));
        assert!(matches!(parse_rule("(npm *)"), Err(RuleError::MissingToolName(_))));
        assert!(matches!(parse_rule("Bash(npm *"), Err(RuleError::UnbalancedParens(_))));
        assert!(matches!(parse_rule("Bash)npm("), Err(RuleError::UnbalancedParens(_))));
        assert!(matches!(parse_rule("Bash)"), Err(RuleError::UnbalancedParens(_))));
        assert!(matches!(parse_rule("Bash(npm) extra"), Err(RuleError::UnbalancedParens(_))));
        assert!(matches!(parse_rule("Bash(echo ))"), Err(RuleError::UnbalancedParens(_))));
        assert!(matches!(parse_rule("Bash(()"), Err(RuleError::UnbalancedParens(_))));
        assert!(matches!(parse_rule("Bash(a) (b)"), Err(RuleError::UnbalancedParens(_))));
    }

    #[test]
    fn test_quoted_parens_in_specifier() {
        let rule = parse_rule(r#"Bash(echo ")" *)"#).unwrap();
        assert_eq!(rule.specifier.as_deref(), Some(r#"echo ")" *"#));
    }

    #[test]
    fn test_round_trip_raw() {
        for raw in ["Bash(npm *)", "Read", "Read()", "WebFetch(domain:*.example.com)", "  Write(./out/**)  "] {
            let rule = parse_rule(raw).unwrap();
            assert_eq!(parse_rule(&rule.raw).unwrap().raw, rule.raw);
        }
    }

    #[test]
    fn test_parse_rules_skips_bad_entries() {
        let (rules, warnings) = parse_rules(&["Bash(ls *)", "(oops)", "", "Read"]);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].raw, "Bash(ls *)");
        assert_eq!(rules[1].raw, "Read");
        assert_eq!(warnings.len(), 2);
    }
}
