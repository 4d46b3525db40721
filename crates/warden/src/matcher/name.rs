//! Name matching for MCP tools and sub-agents
//!
//! Names are flat strings, but use the path-glob syntax so `*` reads the
//! same everywhere rules are written.

use crate::glob::path_glob_matches;

/// Match a tool or agent name against a name glob
pub fn matches_name(name: &str, pattern: &str) -> bool {
    path_glob_matches(pattern, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_globs() {
        assert!(matches_name("mcp__github__create_issue", "mcp__github__*"));
        assert!(!matches_name("mcp__gitlab__create_issue", "mcp__github__*"));
        assert!(matches_name("reviewer-fast", "reviewer-*"));
        assert!(matches_name("planner", "planner"));
        assert!(!matches_name("planner2", "planner"));
    }
}
