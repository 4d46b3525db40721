//! Permission configuration loading
//!
//! Rules come from several tiers, read in a fixed order and concatenated:
//!
//! 1. CLI (`WARDEN_PERMISSIONS_ALLOW` / `WARDEN_PERMISSIONS_DENY`, or explicit)
//! 2. Project local: `.warden/settings.local.json`, then `.claude/settings.local.json`
//! 3. Project shared: `.warden/settings.json`, then `.claude/settings.json`
//! 4. User: `~/.warden/settings.json`
//!
//! Project tiers are only read for trusted projects. Nothing overrides: a
//! deny from any tier blocks.

use crate::rule::{parse_rules, ParsedRule};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use warden_core::{env_flag, Dialect, Paths};

/// Env var holding CLI-origin allow rules as a JSON array
pub const ENV_ALLOW_RULES: &str = "WARDEN_PERMISSIONS_ALLOW";
/// Env var holding CLI-origin deny rules as a JSON array
pub const ENV_DENY_RULES: &str = "WARDEN_PERMISSIONS_DENY";
/// Env var enabling shell interpolation
pub const ENV_SHELL_INTERPOLATION: &str = "WARDEN_SHELL_INTERPOLATION";
/// Older spelling of [`ENV_SHELL_INTERPOLATION`]
pub const ENV_SHELL_INTERPOLATION_LEGACY: &str = "WARDEN_ENABLE_INTERPOLATION";
/// Env var forcing the current project to be treated as trusted
pub const ENV_TRUST_PROJECT: &str = "WARDEN_TRUST_PROJECT";

/// Precedence tier of a configuration source, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Cli,
    ProjectLocal,
    ProjectShared,
    User,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cli => "cli",
            Tier::ProjectLocal => "project-local",
            Tier::ProjectShared => "project-shared",
            Tier::User => "user",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered deny, ask and allow rule lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionConfig {
    pub deny: Vec<ParsedRule>,
    pub ask: Vec<ParsedRule>,
    pub allow: Vec<ParsedRule>,
}

impl PermissionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append another config's rules after this one's
    pub fn extend(&mut self, other: PermissionConfig) {
        self.deny.extend(other.deny);
        self.ask.extend(other.ask);
        self.allow.extend(other.allow);
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty() && self.ask.is_empty() && self.allow.is_empty()
    }

    /// Total rule count across all lists
    pub fn len(&self) -> usize {
        self.deny.len() + self.ask.len() + self.allow.len()
    }
}

/// Rules supplied on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliRules {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl CliRules {
    /// Read CLI rules from the environment
    ///
    /// Values must be JSON arrays of strings; anything else is reported as
    /// a warning and ignored.
    pub fn from_env(warnings: &mut Vec<String>) -> Option<Self> {
        let allow = read_env_rules(ENV_ALLOW_RULES, warnings);
        let deny = read_env_rules(ENV_DENY_RULES, warnings);
        if allow.is_none() && deny.is_none() {
            return None;
        }
        Some(Self {
            allow: allow.unwrap_or_default(),
            deny: deny.unwrap_or_default(),
        })
    }
}

fn read_env_rules(name: &str, warnings: &mut Vec<String>) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(rules) => Some(rules),
        Err(e) => {
            warnings.push(format!("{} is not a JSON array of strings: {}", name, e));
            None
        }
    }
}

/// A settings file that contributed to the loaded config
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSource {
    pub tier: Tier,
    pub path: PathBuf,
    pub dialect: Dialect,
    pub rules: usize,
}

/// Inputs to a config load
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Working directory the project tiers are read from
    pub cwd: PathBuf,
    /// Where user settings and the trusted-project list live
    pub paths: Paths,
    /// Whether project tiers may be read
    pub trusted: bool,
    /// Rules from the command line, read before every file
    pub cli: Option<CliRules>,
}

impl LoadOptions {
    /// Options for a working directory, resolving trust and CLI rules from
    /// the environment
    pub fn for_cwd(cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        let paths = Paths::new();
        let trusted = is_project_trusted(&paths, &cwd);
        Self {
            cwd,
            paths,
            trusted,
            cli: None,
        }
    }

    pub fn with_paths(mut self, paths: Paths) -> Self {
        self.paths = paths;
        self
    }

    pub fn trusted(mut self, trusted: bool) -> Self {
        self.trusted = trusted;
        self
    }

    pub fn with_cli(mut self, cli: CliRules) -> Self {
        self.cli = Some(cli);
        self
    }
}

/// The merged result of reading every tier
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadedConfig {
    pub permissions: PermissionConfig,
    /// Whether implicit shell sources (interpolation, context forks) may run
    pub shell_interpolation: bool,
    /// Files that were read, in order
    pub sources: Vec<SettingsSource>,
    /// Problems that caused a source or field to be skipped
    pub warnings: Vec<String>,
}

/// Shape of the permission-related parts of a settings file
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    permissions: Option<Value>,
    shell_interpolation: Option<Value>,
}

/// Read every tier and concatenate their rules
pub fn load_permissions(options: &LoadOptions) -> LoadedConfig {
    let mut loaded = LoadedConfig::default();

    let cli = match &options.cli {
        Some(cli) => Some(cli.clone()),
        None => CliRules::from_env(&mut loaded.warnings),
    };
    if let Some(cli) = cli {
        let (deny, mut warnings) = parse_rules(&cli.deny);
        let (allow, allow_warnings) = parse_rules(&cli.allow);
        warnings.extend(allow_warnings);
        loaded.warnings.extend(warnings);
        loaded.permissions.extend(PermissionConfig {
            deny: deny.into_iter().map(|r| r.with_source(None, Tier::Cli)).collect(),
            ask: Vec::new(),
            allow: allow.into_iter().map(|r| r.with_source(None, Tier::Cli)).collect(),
        });
    }

    let paths = &options.paths;
    let cwd = &options.cwd;
    let mut files: Vec<(Tier, Dialect, PathBuf)> = Vec::new();
    if options.trusted {
        for dialect in [Dialect::Native, Dialect::Legacy] {
            files.push((Tier::ProjectLocal, dialect, paths.project_local_settings(cwd, dialect)));
        }
        for dialect in [Dialect::Native, Dialect::Legacy] {
            files.push((Tier::ProjectShared, dialect, paths.project_settings(cwd, dialect)));
        }
    } else {
        debug!("Project at {:?} is not trusted; skipping project settings", cwd);
    }
    files.push((Tier::User, Dialect::Native, paths.user_settings()));

    for (tier, dialect, path) in files {
        let Some(settings) = read_settings_file(&path) else {
            continue;
        };

        if let Some(enabled) = settings.shell_interpolation.as_ref().and_then(interpolation_flag) {
            loaded.shell_interpolation |= enabled;
        }

        let Some(permissions) = settings.permissions else {
            debug!("No permissions in {:?}", path);
            continue;
        };

        let (config, warnings) = parse_permissions_value(&permissions, &path, tier);
        for warning in &warnings {
            warn!("{}", warning);
        }
        loaded.warnings.extend(warnings);
        loaded.sources.push(SettingsSource {
            tier,
            path,
            dialect,
            rules: config.len(),
        });
        loaded.permissions.extend(config);
    }

    if env_flag(ENV_SHELL_INTERPOLATION) || env_flag(ENV_SHELL_INTERPOLATION_LEGACY) {
        loaded.shell_interpolation = true;
    }

    loaded
}

/// Read and parse a settings file; any failure skips the file
fn read_settings_file(path: &Path) -> Option<SettingsFile> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Skipping settings {:?}: {}", path, e);
            return None;
        }
    };
    match serde_json::from_str::<SettingsFile>(&content) {
        Ok(settings) => Some(settings),
        Err(e) => {
            debug!("Skipping malformed settings {:?}: {}", path, e);
            None
        }
    }
}

/// `shellInterpolation` is either a boolean or `{ "enabled": bool }`
fn interpolation_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(enabled) => Some(*enabled),
        Value::Object(map) => map.get("enabled").and_then(Value::as_bool),
        _ => None,
    }
}

/// Parse the `permissions` object of one settings file
fn parse_permissions_value(value: &Value, path: &Path, tier: Tier) -> (PermissionConfig, Vec<String>) {
    let mut config = PermissionConfig::new();
    let mut warnings = Vec::new();

    for field in ["deny", "ask", "allow"] {
        let Some(entry) = value.get(field) else {
            continue;
        };
        let Some(items) = entry.as_array() else {
            warnings.push(format!(
                "permissions.{} in {} is not an array; ignoring it",
                field,
                path.display()
            ));
            continue;
        };

        let mut strings = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str() {
                Some(s) => strings.push(s.to_string()),
                None => warnings.push(format!(
                    "Skipping non-string rule {} in permissions.{} of {}",
                    item,
                    field,
                    path.display()
                )),
            }
        }

        let (rules, rule_warnings) = parse_rules(&strings);
        warnings.extend(
            rule_warnings
                .into_iter()
                .map(|w| format!("{} ({})", w, path.display())),
        );
        let rules = rules
            .into_iter()
            .map(|r| r.with_source(Some(path.to_path_buf()), tier));

        match field {
            "deny" => config.deny.extend(rules),
            "ask" => config.ask.extend(rules),
            _ => config.allow.extend(rules),
        }
    }

    (config, warnings)
}

/// Check whether a project directory is trusted
///
/// A project is trusted when `WARDEN_TRUST_PROJECT` is set, or when `cwd`
/// equals or sits under an entry of `~/.warden/trusted-projects.json`.
pub fn is_project_trusted(paths: &Paths, cwd: &Path) -> bool {
    if env_flag(ENV_TRUST_PROJECT) {
        return true;
    }
    match load_trusted_projects(&paths.trusted_projects()) {
        Ok(projects) => projects.iter().any(|p| cwd.starts_with(p)),
        Err(e) => {
            debug!("Could not read trusted projects: {:#}", e);
            false
        }
    }
}

fn load_trusted_projects(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trusted projects from {:?}", path))?;
    let projects: Vec<PathBuf> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse trusted projects from {:?}", path))?;
    Ok(projects)
}

/// In-memory cache of loaded configs keyed by working directory
///
/// Loading reads several files, so hosts keep one cache and invalidate it
/// when settings change.
#[derive(Debug, Default)]
pub struct ConfigCache {
    entries: Mutex<HashMap<PathBuf, Arc<LoadedConfig>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached config for `options.cwd`, loading it on a miss
    ///
    /// Files are read without holding the lock. When two callers miss on the
    /// same directory at once, the first insert wins.
    pub fn get_or_load(&self, options: &LoadOptions) -> Arc<LoadedConfig> {
        if let Some(cached) = self.lock().get(&options.cwd) {
            return cached.clone();
        }

        let loaded = Arc::new(load_permissions(options));
        self.lock()
            .entry(options.cwd.clone())
            .or_insert(loaded)
            .clone()
    }

    /// Drop the cached config for one working directory
    pub fn invalidate(&self, cwd: &Path) -> bool {
        self.lock().remove(cwd).is_some()
    }

    /// Drop every cached config
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<LoadedConfig>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _home: TempDir,
        _project: TempDir,
        paths: Paths,
        cwd: PathBuf,
    }

    fn fixture() -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let paths = Paths::with_home(home.path());
        let cwd = project.path().to_path_buf();
        Fixture {
            _home: home,
            _project: project,
            paths,
            cwd,
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn options(f: &Fixture, trusted: bool) -> LoadOptions {
        LoadOptions {
            cwd: f.cwd.clone(),
            paths: f.paths.clone(),
            trusted,
            cli: Some(CliRules::default()),
        }
    }

    #[test]
    fn test_tier_order_and_annotation() {
        let f = fixture();
        write(
            &f.paths.project_local_settings(&f.cwd, Dialect::Native),
            r#"{"permissions": {"deny": ["Bash(rm *)"]}}"#,
        );
        write(
            &f.paths.project_local_settings(&f.cwd, Dialect::Legacy),
            r#"{"permissions": {"deny": ["Bash(sudo *)"]}}"#,
        );
        write(
            &f.paths.project_settings(&f.cwd, Dialect::Native),
            r#"{"permissions": {"deny": ["Read(.env)"], "allow": ["Bash(npm *)"]}}"#,
        );
        write(
            &f.paths.user_settings(),
            r#"{"permissions": {"deny": ["WebFetch"], "ask": ["Bash(git push *)"]}}"#,
        );

        let mut opts = options(&f, true);
        opts.cli = Some(CliRules {
            allow: vec![],
            deny: vec!["Bash(curl *)".to_string()],
        });
        let loaded = load_permissions(&opts);

        let deny: Vec<&str> = loaded.permissions.deny.iter().map(|r| r.raw.as_str()).collect();
        assert_eq!(deny, vec!["Bash(curl *)", "Bash(rm *)", "Bash(sudo *)", "Read(.env)", "WebFetch"]);
        assert_eq!(loaded.permissions.ask.len(), 1);
        assert_eq!(loaded.permissions.allow.len(), 1);

        assert_eq!(loaded.permissions.deny[0].source_scope, Some(Tier::Cli));
        assert_eq!(loaded.permissions.deny[0].source_path, None);
        assert_eq!(loaded.permissions.deny[2].source_scope, Some(Tier::ProjectLocal));
        assert_eq!(
            loaded.permissions.deny[2].source_path,
            Some(f.paths.project_local_settings(&f.cwd, Dialect::Legacy))
        );
        assert_eq!(loaded.permissions.deny[4].source_scope, Some(Tier::User));
        assert_eq!(loaded.sources.len(), 4);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_untrusted_project_reads_user_only() {
        let f = fixture();
        write(
            &f.paths.project_settings(&f.cwd, Dialect::Native),
            r#"{"permissions": {"allow": ["Bash"]}, "shellInterpolation": true}"#,
        );
        write(&f.paths.user_settings(), r#"{"permissions": {"deny": ["Bash(rm *)"]}}"#);

        let loaded = load_permissions(&options(&f, false));
        assert!(loaded.permissions.allow.is_empty());
        assert_eq!(loaded.permissions.deny.len(), 1);
        assert!(!loaded.shell_interpolation);
    }

    #[test]
    fn test_malformed_sources_are_skipped() {
        let f = fixture();
        write(&f.paths.project_local_settings(&f.cwd, Dialect::Native), "{ not json");
        write(&f.paths.project_settings(&f.cwd, Dialect::Native), r#"{"model": "x"}"#);
        write(
            &f.paths.project_settings(&f.cwd, Dialect::Legacy),
            r#"{"permissions": {"allow": "Bash", "deny": ["Bash(rm *)", 42, "(bad"]}}"#,
        );

        let loaded = load_permissions(&options(&f, true));
        assert!(loaded.permissions.allow.is_empty());
        assert_eq!(loaded.permissions.deny.len(), 1);
        assert_eq!(loaded.warnings.len(), 3);
        assert!(loaded.warnings.iter().any(|w| w.contains("permissions.allow") && w.contains("not an array")));
    }

    #[test]
    fn test_shell_interpolation_forms() {
        let f = fixture();
        write(&f.paths.user_settings(), r#"{"shellInterpolation": {"enabled": true}}"#);
        assert!(load_permissions(&options(&f, false)).shell_interpolation);

        write(&f.paths.user_settings(), r#"{"shellInterpolation": false}"#);
        write(
            &f.paths.project_settings(&f.cwd, Dialect::Native),
            r#"{"shellInterpolation": true}"#,
        );
        assert!(load_permissions(&options(&f, true)).shell_interpolation);
    }

    #[test]
    fn test_trusted_projects_file() {
        let f = fixture();
        assert!(load_trusted_projects(&f.paths.trusted_projects()).unwrap().is_empty());

        let list = serde_json::to_string(&vec![f.cwd.clone()]).unwrap();
        write(&f.paths.trusted_projects(), &list);
        let projects = load_trusted_projects(&f.paths.trusted_projects()).unwrap();
        assert!(projects.iter().any(|p| f.cwd.join("sub").starts_with(p)));
    }

    #[test]
    fn test_cache_invalidation() {
        let f = fixture();
        write(&f.paths.user_settings(), r#"{"permissions": {"deny": ["Bash(rm *)"]}}"#);
        let cache = ConfigCache::new();
        let opts = options(&f, false);

        assert_eq!(cache.get_or_load(&opts).permissions.deny.len(), 1);

        write(&f.paths.user_settings(), r#"{"permissions": {"deny": []}}"#);
        assert_eq!(cache.get_or_load(&opts).permissions.deny.len(), 1);

        assert!(cache.invalidate(&f.cwd));
        assert_eq!(cache.get_or_load(&opts).permissions.deny.len(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_concurrent_loads() {
        let first = fixture();
        let second = fixture();
        write(&first.paths.user_settings(), r#"{"permissions": {"deny": ["Bash(rm *)"]}}"#);
        let cache = ConfigCache::new();
        let (a, b) = (options(&first, false), options(&second, false));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| cache.get_or_load(&a));
                scope.spawn(|| cache.get_or_load(&b));
            }
        });

        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&cache.get_or_load(&a), &cache.get_or_load(&a)));
        assert_eq!(cache.get_or_load(&a).permissions.deny.len(), 1);
        assert!(cache.get_or_load(&b).permissions.is_empty());
    }
}
