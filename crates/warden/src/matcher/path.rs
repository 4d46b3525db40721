//! Path specifier matching

use crate::expand::{canonicalize_path, resolve_path_specifier, ExpansionVars};
use crate::glob::path_glob_matches;
use std::path::Path;

/// Match a tool's target path against a path specifier
///
/// The candidate is canonicalized against the working directory; the
/// specifier is resolved with the prefix conventions in [`crate::expand`].
pub fn matches_path(
    candidate: &str,
    specifier: &str,
    vars: &ExpansionVars,
    settings_dir: Option<&Path>,
) -> bool {
    let target = canonicalize_path(Path::new(candidate), &vars.cwd);
    let pattern = resolve_path_specifier(specifier, vars, settings_dir);
    path_glob_matches(&pattern, &target.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_relative_specifier() {
        let project = tempfile::tempdir().unwrap();
        let project = std::fs::canonicalize(project.path()).unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let elsewhere = std::fs::canonicalize(elsewhere.path()).unwrap();
        std::fs::create_dir_all(project.join("src/a/b")).unwrap();
        std::fs::write(project.join("src/a/b/c.ts"), "").unwrap();

        let vars = ExpansionVars::new(&elsewhere, "/home/dev", &elsewhere);
        let settings_dir = project.clone();

        let inside = project.join("src/a/b/c.ts");
        assert!(matches_path(&inside.to_string_lossy(), "/src/**", &vars, Some(&settings_dir)));

        let outside = elsewhere.join("src/a/b/c.ts");
        assert!(!matches_path(&outside.to_string_lossy(), "/src/**", &vars, Some(&settings_dir)));
    }

    #[test]
    fn test_relative_candidate_uses_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        let vars = ExpansionVars::new(&cwd, "/home/dev", &cwd);

        assert!(matches_path("./secrets/.env", "**/.env", &vars, None));
        assert!(matches_path("notes.txt", "./*.txt", &vars, None));
        assert!(!matches_path("docs/notes.txt", "./*.txt", &vars, None));
    }
}
