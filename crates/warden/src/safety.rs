//! Static command safety checks
//!
//! Patterns here apply regardless of configured rules: the denylist blocks
//! outright, high-risk patterns force confirmation (explicit) or rejection
//! (implicit). Both run on the command with quoted text blanked, so
//! `grep -r "rm -rf" .` is not mistaken for a deletion.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// A named pattern that flagged a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskMatch {
    pub name: &'static str,
    pub reason: &'static str,
}

struct RiskRule {
    name: &'static str,
    pattern: &'static LazyLock<Regex>,
    reason: &'static str,
}

impl RiskRule {
    fn to_match(&self) -> RiskMatch {
        RiskMatch {
            name: self.name,
            reason: self.reason,
        }
    }
}

// Denylist

static FORK_BOMB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}").unwrap());
static RM_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\brm\s+(?:-[A-Za-z-]+\s+)*-(?:[A-Za-z]*[rR][A-Za-z]*|-recursive)\s+(?:-[A-Za-z-]+\s+)*/[/.]*\*?(?:[\s;&|)]|$)",
    )
    .unwrap()
});
static MKFS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|[\s;&|(/])mkfs(?:\.\w+)?(?:[\s;&|)]|$)").unwrap());
static DD_RAW_DISK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bdd\b[^;&|\n]*\bof=/dev/(?:sd|hd|nvme|loop|disk)").unwrap()
});

static DENYLIST: [RiskRule; 4] = [
    RiskRule {
        name: "fork-bomb",
        pattern: &FORK_BOMB,
        reason: "Fork bomb",
    },
    RiskRule {
        name: "rm-root",
        pattern: &RM_ROOT,
        reason: "Recursive delete of the filesystem root",
    },
    RiskRule {
        name: "mkfs",
        pattern: &MKFS,
        reason: "Filesystem format",
    },
    RiskRule {
        name: "dd-raw-disk",
        pattern: &DD_RAW_DISK,
        reason: "Raw write to a disk device",
    },
];

// High risk

static RM_RECURSIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\brm\s+(?:-[A-Za-z-]+\s+)*-(?:[A-Za-z]*[rR][A-Za-z]*|-recursive)\b").unwrap()
});
static SUDO: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bsudo\b").unwrap());
static PIPE_TO_SHELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:curl|wget)\b[^;&\n]*\|\s*(?:sudo\s+)?(?:ba|z|k|da)?sh\b").unwrap()
});
static CHMOD_777: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bchmod\s+(?:-[A-Za-z]+\s+)*-[A-Za-z]*R[A-Za-z]*\s+(?:-[A-Za-z]+\s+)*0?777\b").unwrap()
});
static CHOWN_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bchown\s+(?:-[A-Za-z]+\s+)*-[A-Za-z]*R[A-Za-z]*\s+(?:-[A-Za-z]+\s+)*root\b").unwrap()
});
// Global options such as `-C dir` or `-c key=value` may sit between `git` and the subcommand
static GIT_RESET_HARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bgit(?:[ \t]+-\S+(?:[ \t]+\S+)?)*[ \t]+reset\b[^;&|\n]*\s--hard\b").unwrap()
});
static GIT_CLEAN_FORCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bgit(?:[ \t]+-\S+(?:[ \t]+\S+)?)*[ \t]+clean\b[^;&|\n]*\s-[A-Za-z]*f").unwrap()
});
static DD_INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdd\b[^;&|\n]*\bif=").unwrap());

static HIGH_RISK: [RiskRule; 8] = [
    RiskRule {
        name: "rm-recursive",
        pattern: &RM_RECURSIVE,
        reason: "Recursive delete",
    },
    RiskRule {
        name: "sudo",
        pattern: &SUDO,
        reason: "Runs with elevated privileges",
    },
    RiskRule {
        name: "pipe-to-shell",
        pattern: &PIPE_TO_SHELL,
        reason: "Downloads and executes a script",
    },
    RiskRule {
        name: "chmod-777",
        pattern: &CHMOD_777,
        reason: "Recursively makes files world-writable",
    },
    RiskRule {
        name: "chown-root",
        pattern: &CHOWN_ROOT,
        reason: "Recursively hands files to root",
    },
    RiskRule {
        name: "git-reset-hard",
        pattern: &GIT_RESET_HARD,
        reason: "Discards uncommitted changes",
    },
    RiskRule {
        name: "git-clean-force",
        pattern: &GIT_CLEAN_FORCE,
        reason: "Deletes untracked files",
    },
    RiskRule {
        name: "dd",
        pattern: &DD_INPUT,
        reason: "Raw block copy",
    },
];

/// Programs an implicit command may start with
const IMPLICIT_PROGRAMS: &[&str] = &[
    "echo", "printf", "pwd", "ls", "cat", "head", "tail", "grep", "rg", "find", "which",
];

/// Git subcommands that only read
const READ_ONLY_GIT: &[&str] = &[
    "status", "log", "diff", "show", "branch", "rev-parse", "describe", "ls-files", "blame",
    "remote", "tag", "shortlog",
];

/// Git global options that change nothing but output
const SAFE_GIT_GLOBAL_OPTIONS: &[&str] = &[
    "--no-pager", "-P", "--no-optional-locks", "--literal-pathspecs", "--no-replace-objects",
];

/// Options that take the following token as their value
const GIT_VALUE_OPTIONS: &[&str] = &[
    "--contains", "--no-contains", "--merged", "--no-merged", "--points-at", "--sort", "--format",
];

/// Short flags of `git branch` that create, move or delete
const BRANCH_WRITE_SHORT: &str = "dDmMcCfut";

/// Long options of `git branch` that create, move or delete
const BRANCH_WRITE_LONG: &[&str] = &[
    "--delete", "--move", "--copy", "--force", "--set-upstream-to", "--unset-upstream",
    "--edit-description", "--track", "--no-track", "--create-reflog", "--recurse-submodules",
];

/// Short flags of `git tag` that create or delete
const TAG_WRITE_SHORT: &str = "adfsumFe";

/// Long options of `git tag` that create or delete
const TAG_WRITE_LONG: &[&str] = &[
    "--delete", "--force", "--annotate", "--sign", "--no-sign", "--local-user", "--message",
    "--file", "--edit", "--create-reflog", "--cleanup", "--trailer",
];

/// `git remote` subcommands that only read
const READ_ONLY_REMOTE: &[&str] = &["show", "get-url"];

/// Programs internal helpers may run
const INTERNAL_PROGRAMS: &[&str] = &["git", "gh", "which"];

/// Shell syntax an implicit command may not contain
const FORBIDDEN_METACHARACTERS: &[&str] = &["&&", "||", ";", "|", "<", ">", "$(", "`", "&", "\n"];

/// `find` actions that run programs or modify files
const FIND_ACTIONS: &[&str] = &[
    "-exec", "-execdir", "-ok", "-okdir", "-delete", "-fprint", "-fprint0", "-fprintf", "-fls",
];

/// Check the command against the hardcoded denylist
pub fn denylist_match(command: &str) -> Option<RiskMatch> {
    let text = blank_quoted(command);
    DENYLIST
        .iter()
        .find(|rule| rule.pattern.is_match(&text))
        .map(RiskRule::to_match)
}

/// Check the command against the high-risk patterns
pub fn high_risk_match(command: &str) -> Option<RiskMatch> {
    let text = blank_quoted(command);
    HIGH_RISK
        .iter()
        .find(|rule| rule.pattern.is_match(&text))
        .map(RiskRule::to_match)
}

/// First forbidden metacharacter in an implicit command
pub fn forbidden_metacharacter(command: &str) -> Option<&'static str> {
    FORBIDDEN_METACHARACTERS
        .iter()
        .copied()
        .find(|meta| command.contains(meta))
}

/// Why an implicit command falls outside the read-only allowlist, if it does
pub fn implicit_rejection(command: &str) -> Option<String> {
    let mut tokens = command.split_whitespace();
    let Some(program) = tokens.next() else {
        return Some("Command is empty".to_string());
    };

    if program == "git" {
        let args: Vec<&str> = tokens.collect();
        return git_rejection(&args);
    }

    if !IMPLICIT_PROGRAMS.contains(&program) {
        return Some(format!("`{}` is not on the implicit allowlist", program));
    }

    if program == "find" {
        if let Some(action) = tokens.find(|t| FIND_ACTIONS.contains(t)) {
            return Some(format!("`find {}` can run programs or modify files", action));
        }
    } else if program == "rg" {
        // --pre and --pre-glob run a program on every searched file
        if let Some(flag) = tokens.find(|t| t.starts_with("--pre")) {
            return Some(format!("`rg {}` runs a preprocessor program", flag));
        }
    }

    None
}

fn git_rejection(args: &[&str]) -> Option<String> {
    let mut rest = args.iter().copied();
    let subcommand = loop {
        match rest.next() {
            None => return Some("`git` needs a read-only subcommand".to_string()),
            Some("-C") => {
                if rest.next().is_none() {
                    return Some("`git -C` needs a directory".to_string());
                }
            }
            Some(opt) if opt.starts_with('-') => {
                if !SAFE_GIT_GLOBAL_OPTIONS.contains(&opt) {
                    return Some(format!("`git {}` is not allowed in implicit commands", opt));
                }
            }
            Some(sub) => break sub,
        }
    };

    if !READ_ONLY_GIT.contains(&subcommand) {
        return Some(format!("`git {}` is not a read-only git command", subcommand));
    }

    let args: Vec<&str> = rest.collect();
    if let Some(opt) = args
        .iter()
        .find(|a| **a == "--output" || a.starts_with("--output="))
    {
        return Some(format!("`git {} {}` writes a file", subcommand, opt));
    }

    match subcommand {
        "branch" => listing_rejection("branch", &args, BRANCH_WRITE_SHORT, BRANCH_WRITE_LONG, "l"),
        "tag" => listing_rejection("tag", &args, TAG_WRITE_SHORT, TAG_WRITE_LONG, "lv"),
        "remote" => args
            .iter()
            .copied()
            .find(|a| !a.starts_with('-'))
            .filter(|sub| !READ_ONLY_REMOTE.contains(sub))
            .map(|sub| format!("`git remote {}` modifies remotes", sub)),
        _ => None,
    }
}

/// Reject `git branch`/`git tag` forms that do more than list
///
/// Positional arguments name a ref to create unless a listing flag
/// (one of `list_short`, or its long form) is present.
fn listing_rejection(
    subcommand: &str,
    args: &[&str],
    write_short: &str,
    write_long: &[&str],
    list_short: &str,
) -> Option<String> {
    let mut listing = false;
    let mut positional = None;
    let mut iter = args.iter().copied();

    while let Some(arg) = iter.next() {
        if let Some(long) = arg.strip_prefix("--") {
            let name = long.split('=').next().unwrap_or(long);
            let option = format!("--{}", name);
            if write_long.contains(&option.as_str()) {
                return Some(format!("`git {} {}` modifies refs", subcommand, arg));
            }
            if name == "list" || name == "verify" {
                listing = true;
            }
            if GIT_VALUE_OPTIONS.contains(&option.as_str()) && !long.contains('=') {
                iter.next();
            }
        } else if let Some(short) = arg.strip_prefix('-') {
            if let Some(flag) = short.chars().find(|c| write_short.contains(*c)) {
                return Some(format!("`git {} -{}` modifies refs", subcommand, flag));
            }
            if short.chars().any(|c| list_short.contains(c)) {
                listing = true;
            }
        } else if positional.is_none() {
            positional = Some(arg);
        }
    }

    match positional {
        Some(name) if !listing => Some(format!("`git {} {}` creates a ref", subcommand, name)),
        _ => None,
    }
}

/// Whether an internal helper command runs an allowed program
pub fn internal_allowed(command: &str) -> bool {
    command
        .split_whitespace()
        .next()
        .map(|program| INTERNAL_PROGRAMS.contains(&program))
        .unwrap_or(false)
}

/// Blank quoted text so patterns only see live shell syntax
///
/// Single-quoted text is always blanked. Double-quoted text is blanked
/// unless it holds a `$(` or backtick substitution, which the shell would
/// still run.
pub fn blank_quoted(command: &str) -> String {
    let chars: Vec<char> = command.chars().collect();
    let mut out = String::with_capacity(command.len());
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.get(i + 1) {
                    out.push(*next);
                }
                i += 2;
                continue;
            }
            '\'' => {
                out.push(' ');
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    out.push(' ');
                    i += 1;
                }
                out.push(' ');
            }
            '"' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != '"' {
                    if chars[end] == '\\' {
                        end += 1;
                    }
                    end += 1;
                }
                let end = end.min(chars.len());
                let body: String = chars[start..end].iter().collect();
                out.push(' ');
                if body.contains("$(") || body.contains('`') {
                    out.push_str(&body);
                } else {
                    out.extend(std::iter::repeat(' ').take(end - start));
                }
                out.push(' ');
                i = end;
            }
            c => out.push(c),
        }
        i += 1;
    }

    out
}
