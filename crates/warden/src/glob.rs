//! Glob compilers
//!
//! Both compilers translate a glob character by character into an anchored
//! regex. Literal characters go through `regex::escape`; wildcards become
//! bounded constructs. The `regex` crate runs in linear time, so a hostile
//! pattern cannot trigger catastrophic backtracking.

use regex::Regex;

/// Compile a path glob
///
/// - `*` matches within one path segment
/// - `**` matches across segments; `**/` matches zero or more leading segments
/// - `?` matches one non-separator character
pub fn compile_path_glob(glob: &str) -> Option<Regex> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let mut end = i + 2;
                while chars.get(end) == Some(&'*') {
                    end += 1;
                }
                if chars.get(end) == Some(&'/') {
                    out.push_str("(?:[^/]*/)*");
                    end += 1;
                } else {
                    out.push_str(".*");
                }
                i = end;
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => push_literal(&mut out, c),
        }
        i += 1;
    }

    out.push('$');
    Regex::new(&out).ok()
}

/// Compile a shell glob
///
/// `*` matches anything, spaces and slashes included; `?` matches any single
/// character. Runs of `*` collapse to one.
pub fn compile_shell_glob(glob: &str) -> Option<Regex> {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push_str("(?s)^");

    let mut previous_star = false;
    for c in glob.chars() {
        match c {
            '*' => {
                if !previous_star {
                    out.push_str(".*");
                }
                previous_star = true;
                continue;
            }
            '?' => out.push('.'),
            c => push_literal(&mut out, c),
        }
        previous_star = false;
    }

    out.push('$');
    Regex::new(&out).ok()
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

/// Match a candidate against a path glob
pub fn path_glob_matches(glob: &str, candidate: &str) -> bool {
    compile_path_glob(glob).is_some_and(|re| re.is_match(candidate))
}

/// Match a candidate against a shell glob
pub fn shell_glob_matches(glob: &str, candidate: &str) -> bool {
    compile_shell_glob(glob).is_some_and(|re| re.is_match(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_star_stays_in_segment() {
        assert!(path_glob_matches("/src/*.rs", "/src/main.rs"));
        assert!(!path_glob_matches("/src/*.rs", "/src/bin/main.rs"));
    }

    #[test]
    fn test_path_double_star() {
        assert!(path_glob_matches("/src/**", "/src/a/b/c.ts"));
        assert!(path_glob_matches("/src/**/*.ts", "/src/c.ts"));
        assert!(path_glob_matches("/src/**/*.ts", "/src/a/b/c.ts"));
        assert!(!path_glob_matches("/src/**/*.ts", "/lib/c.ts"));
        assert!(path_glob_matches("**/.env", "/deep/nested/.env"));
    }

    #[test]
    fn test_path_question_mark() {
        assert!(path_glob_matches("/tmp/file?.txt", "/tmp/file1.txt"));
        assert!(!path_glob_matches("/tmp/file?.txt", "/tmp/file/.txt"));
    }

    #[test]
    fn test_metacharacters_are_literal() {
        assert!(path_glob_matches("/a+b/(x).txt", "/a+b/(x).txt"));
        assert!(!path_glob_matches("/a.b", "/axb"));
        assert!(shell_glob_matches("echo $HOME", "echo $HOME"));
        assert!(!shell_glob_matches("ls [ab]", "ls a"));
    }

    #[test]
    fn test_shell_star_crosses_everything() {
        assert!(shell_glob_matches("npm *", "npm run build --prefix /tmp/x"));
        assert!(shell_glob_matches("git ***", "git log"));
        assert!(shell_glob_matches("cat ?", "cat /"));
        assert!(!shell_glob_matches("npm *", "yarn install"));
    }
}
