//! Standard paths used by warden
//!
//! Settings files follow a fixed layout:
//! - `~/.warden/settings.json` - user defaults, always read
//! - `<project>/.warden/settings.json` - shared project rules
//! - `<project>/.warden/settings.local.json` - local project rules
//!
//! The `.claude` directory is read alongside as a legacy dialect with the
//! same file names.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Directory name for warden's own settings
pub const NAMESPACE_DIR: &str = ".warden";

/// Directory name for the compatible legacy settings format
pub const LEGACY_DIR: &str = ".claude";

const SETTINGS_FILE: &str = "settings.json";
const LOCAL_SETTINGS_FILE: &str = "settings.local.json";
const TRUSTED_PROJECTS_FILE: &str = "trusted-projects.json";

/// Which settings format a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Native,
    Legacy,
}

impl Dialect {
    fn dir(&self) -> &'static str {
        match self {
            Dialect::Native => NAMESPACE_DIR,
            Dialect::Legacy => LEGACY_DIR,
        }
    }
}

/// Standard warden paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Home directory
    pub home: PathBuf,
    /// User-level settings directory (~/.warden)
    pub user: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        Self::with_home(home)
    }

    /// Build paths rooted at a custom home directory
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let user = home.join(NAMESPACE_DIR);
        Self { home, user }
    }

    /// User-level settings file
    pub fn user_settings(&self) -> PathBuf {
        self.user.join(SETTINGS_FILE)
    }

    /// List of directories the user has marked as trusted
    pub fn trusted_projects(&self) -> PathBuf {
        self.user.join(TRUSTED_PROJECTS_FILE)
    }

    /// Shared (version controlled) project settings for a dialect
    pub fn project_settings(&self, cwd: &Path, dialect: Dialect) -> PathBuf {
        cwd.join(dialect.dir()).join(SETTINGS_FILE)
    }

    /// Local (not version controlled) project settings for a dialect
    pub fn project_local_settings(&self, cwd: &Path, dialect: Dialect) -> PathBuf {
        cwd.join(dialect.dir()).join(LOCAL_SETTINGS_FILE)
    }
}

/// Walk up from `start` looking for a directory that marks a project root
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(NAMESPACE_DIR).is_dir() || dir.join(".git").exists())
        .map(Path::to_path_buf)
}
