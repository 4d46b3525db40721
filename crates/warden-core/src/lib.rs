//! Warden Core - shared functionality for the warden policy engine
//!
//! Settings locations and environment flag parsing live here so the engine
//! and any host tool agree on where rules come from.

pub mod env;
pub mod paths;

pub use env::{env_flag, is_truthy};
pub use paths::{find_project_root, Dialect, Paths, LEGACY_DIR, NAMESPACE_DIR};
