//! Tool input extraction
//!
//! Tools carry different structured inputs. The evaluator only needs the one
//! field a specifier is matched against, so the input is reduced once per
//! call to a [`ToolInput`] variant keyed by tool kind.

use crate::rule::tools;
use serde::Serialize;
use serde_json::Value;

/// The part of a tool invocation that rule specifiers match against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolInput {
    /// Shell command line (bash, bg_bash)
    Command(String),
    /// Target path (read, write, edit, cd, ls, find, grep)
    Path(String),
    /// URL to fetch (web_fetch)
    Url(String),
    /// Every sub-agent a call would start
    Agents(Vec<String>),
    /// Nothing a specifier can match; only bare rules apply
    Other,
}

/// Tools whose specifier is a path glob
pub fn is_path_tool(tool: &str) -> bool {
    matches!(
        tool,
        tools::READ | tools::WRITE | tools::EDIT | tools::CD | tools::LS | tools::FIND | tools::GREP
    )
}

/// Tools whose specifier is a shell glob
pub fn is_shell_tool(tool: &str) -> bool {
    matches!(tool, tools::BASH | tools::BG_BASH)
}

impl ToolInput {
    /// Extract the matchable input for a canonical tool name
    pub fn extract(tool: &str, input: &Value) -> Self {
        if is_shell_tool(tool) {
            return string_field(input, &["command"])
                .map(ToolInput::Command)
                .unwrap_or(ToolInput::Other);
        }

        if is_path_tool(tool) {
            return match string_field(input, &["path", "file_path"]) {
                Some(path) => ToolInput::Path(path),
                // Listing and search tools default to the working directory
                None if matches!(tool, tools::CD | tools::LS | tools::FIND | tools::GREP) => {
                    ToolInput::Path(".".to_string())
                }
                None => ToolInput::Other,
            };
        }

        match tool {
            tools::WEB_FETCH => string_field(input, &["url"])
                .map(ToolInput::Url)
                .unwrap_or(ToolInput::Other),
            tools::SUBAGENT => {
                let agents = extract_agents(input);
                if agents.is_empty() {
                    ToolInput::Other
                } else {
                    ToolInput::Agents(agents)
                }
            }
            _ => ToolInput::Other,
        }
    }

    /// Short text used in reasons and logs
    pub fn summary(&self) -> String {
        match self {
            ToolInput::Command(c) => c.clone(),
            ToolInput::Path(p) => p.clone(),
            ToolInput::Url(u) => u.clone(),
            ToolInput::Agents(a) => a.join(", "),
            ToolInput::Other => String::new(),
        }
    }
}

fn string_field(input: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| input.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Collect agent names from a single call, parallel tasks, or a centipede chain
fn extract_agents(input: &Value) -> Vec<String> {
    let mut agents = Vec::new();

    if let Some(agent) = input.get("agent").and_then(Value::as_str) {
        agents.push(agent.to_string());
    }

    for key in ["tasks", "centipede"] {
        if let Some(steps) = input.get(key).and_then(Value::as_array) {
            agents.extend(
                steps
                    .iter()
                    .filter_map(|step| step.get("agent").and_then(Value::as_str))
                    .map(str::to_string),
            );
        }
    }

    agents
}
