//! Variable expansion and path resolution for rule specifiers
//!
//! Path specifiers use prefix conventions checked before expansion:
//!
//! | Prefix  | Resolves against                               |
//! |---------|------------------------------------------------|
//! | `//`    | filesystem root                                |
//! | `~/`    | home directory                                 |
//! | `./`    | evaluation working directory                   |
//! | `/`     | directory of the settings file with the rule  |
//! | (none)  | expanded, then working directory if relative   |

use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// Values substituted into `{cwd}`, `{home}` and `{project}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpansionVars {
    pub cwd: PathBuf,
    pub home: PathBuf,
    pub project: PathBuf,
}

impl ExpansionVars {
    pub fn new(cwd: impl Into<PathBuf>, home: impl Into<PathBuf>, project: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            home: home.into(),
            project: project.into(),
        }
    }

    /// Resolve variables for a working directory from the environment
    pub fn detect(cwd: &Path) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let project = warden_core::find_project_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
        Self::new(cwd, home, project)
    }
}

/// Replace `{cwd}`, `{home}` and `{project}`; other `{x}` tokens stay literal
pub fn expand_variables(pattern: &str, vars: &ExpansionVars) -> String {
    pattern
        .replace("{cwd}", &vars.cwd.to_string_lossy())
        .replace("{home}", &vars.home.to_string_lossy())
        .replace("{project}", &vars.project.to_string_lossy())
}

/// Turn a path specifier into an absolute glob pattern
///
/// `settings_dir` is the directory holding the settings file that defined the
/// rule. Rules without a file (CLI rules) fall back to the working directory.
pub fn resolve_path_specifier(
    specifier: &str,
    vars: &ExpansionVars,
    settings_dir: Option<&Path>,
) -> String {
    let cwd = canonicalize_path(&vars.cwd, &vars.cwd);

    let resolved = if let Some(rest) = specifier.strip_prefix("//") {
        expand_variables(&format!("/{}", rest), vars)
    } else if specifier == "~" || specifier.starts_with("~/") {
        let home = canonicalize_path(&vars.home, &cwd);
        let home = home.to_string_lossy().into_owned();
        let expanded = shellexpand::tilde_with_context(specifier, || Some(home.as_str()));
        expand_variables(&expanded, vars)
    } else if let Some(rest) = specifier.strip_prefix("./") {
        join_pattern(&cwd, &expand_variables(rest, vars))
    } else if let Some(rest) = specifier.strip_prefix('/') {
        let base = settings_dir
            .map(|dir| canonicalize_path(dir, &cwd))
            .unwrap_or_else(|| cwd.clone());
        join_pattern(&base, &expand_variables(rest, vars))
    } else {
        let expanded = expand_variables(specifier, vars);
        if Path::new(&expanded).is_absolute() {
            expanded
        } else {
            join_pattern(&cwd, &expanded)
        }
    };

    canonicalize_literal_prefix(&normalize_pattern(&resolved))
}

/// Resolve symlinks in the wildcard-free leading segments of a pattern
///
/// Candidates are canonicalized before matching, so a rule written through a
/// symlinked directory must point at the same real directory.
fn canonicalize_literal_prefix(pattern: &str) -> String {
    if !pattern.starts_with('/') {
        return pattern.to_string();
    }

    let segments: Vec<&str> = pattern.split('/').collect();
    let literal = segments
        .iter()
        .take_while(|segment| !segment.contains(['*', '?']))
        .count();
    if literal <= 1 {
        return pattern.to_string();
    }

    let prefix = segments[..literal].join("/");
    let real = canonicalize_path(Path::new(&prefix), Path::new("/"));
    let mut out = real.to_string_lossy().trim_end_matches('/').to_string();
    for segment in &segments[literal..] {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn join_pattern(base: &Path, rest: &str) -> String {
    let base = base.to_string_lossy();
    let base = base.trim_end_matches('/');
    if rest.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, rest)
    }
}

/// Collapse `.` and `..` segments in a glob pattern without touching wildcards
fn normalize_pattern(pattern: &str) -> String {
    let absolute = pattern.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in pattern.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Resolve a path to an absolute, symlink-free form
///
/// Existing paths are canonicalized by the filesystem. For paths that do not
/// exist yet (write targets), the deepest existing ancestor is canonicalized
/// and the remaining components are appended after lexical normalization.
pub fn canonicalize_path(path: &Path, cwd: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    let normalized = normalize_lexically(&absolute);

    if let Ok(real) = std::fs::canonicalize(&normalized) {
        return real;
    }

    let mut existing = normalized.as_path();
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            tail.push(name);
        }
        existing = parent;
        if let Ok(real) = std::fs::canonicalize(existing) {
            let mut result = real;
            for name in tail.iter().rev() {
                result.push(name);
            }
            return result;
        }
    }

    normalized
}

/// Remove `.` and resolve `..` components without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            other => result.push(other),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> ExpansionVars {
        ExpansionVars::new("/work/app", "/home/dev", "/work")
    }

    #[test]
    fn test_expand_known_variables() {
        assert_eq!(
            expand_variables("{home}/.cache/{cwd}", &vars()),
            "/home/dev/.cache//work/app"
        );
        assert_eq!(expand_variables("{project}/src", &vars()), "/work/src");
    }

    #[test]
    fn test_unknown_variables_stay_literal() {
        assert_eq!(expand_variables("{user}/{cwd}", &vars()), "{user}//work/app");
    }

    #[test]
    fn test_prefix_conventions() {
        let v = vars();
        assert_eq!(resolve_path_specifier("//no-such-root/hosts", &v, None), "/no-such-root/hosts");
        assert_eq!(resolve_path_specifier("~/.ssh/**", &v, None), "/home/dev/.ssh/**");
        assert_eq!(resolve_path_specifier("./build/*", &v, None), "/work/app/build/*");
        assert_eq!(
            resolve_path_specifier("/src/**", &v, Some(Path::new("/settings/dir"))),
            "/settings/dir/src/**"
        );
        assert_eq!(resolve_path_specifier("/src/**", &v, None), "/work/app/src/**");
        assert_eq!(resolve_path_specifier("*.env", &v, None), "/work/app/*.env");
        assert_eq!(resolve_path_specifier("{home}/notes", &v, None), "/home/dev/notes");
    }

    #[test]
    fn test_pattern_normalization() {
        assert_eq!(resolve_path_specifier("./a/../b/./c", &vars(), None), "/work/app/b/c");
    }

    #[cfg(unix)]
    #[test]
    fn test_pattern_prefix_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(real.join("vault")).unwrap();
        std::os::unix::fs::symlink(real.join("vault"), real.join("secrets")).unwrap();
        let v = ExpansionVars::new(&real, "/home/dev", &real);

        let expected = format!("{}/vault/**", real.display());
        assert_eq!(resolve_path_specifier("./secrets/**", &v, None), expected);
        let absolute = format!("/{}/secrets/**", real.display());
        assert_eq!(resolve_path_specifier(&absolute, &v, None), expected);
        assert_eq!(
            resolve_path_specifier("./secrets/key.txt", &v, None),
            format!("{}/vault/key.txt", real.display())
        );
    }

    #[test]
    fn test_canonicalize_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let real = std::fs::canonicalize(dir.path()).unwrap();

        let target = canonicalize_path(Path::new("new/../out/file.txt"), dir.path());
        assert_eq!(target, real.join("out/file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_canonicalize_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir(real.join("target")).unwrap();
        std::os::unix::fs::symlink(real.join("target"), real.join("link")).unwrap();

        assert_eq!(
            canonicalize_path(Path::new("link/missing.txt"), &real),
            real.join("target/missing.txt")
        );
    }
}
