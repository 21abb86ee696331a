//! Canonical paths for the installer.
//!
//! Single source of truth - import this instead of hardcoding paths.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

// ============================================================================
// Settings file discovery
// ============================================================================

/// Directory holding the settings file
pub const SETTINGS_DIR: &str = ".runtime-installer";

/// Settings file name inside `SETTINGS_DIR`
pub const SETTINGS_FILE: &str = "config.yaml";

/// Search `start` and its parents for `.runtime-installer/config.yaml`
pub fn find_settings_file_from(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let candidate = current.join(SETTINGS_DIR).join(SETTINGS_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Search from the current directory
pub fn find_settings_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_settings_file_from(&cwd)
}

// ============================================================================
// Runtime locations
// ============================================================================

/// Directory of the running executable (bundled archiver lookup)
pub fn program_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to determine program location")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("Program location has no parent directory")
}

/// Default directory for transient downloads
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir()
}

// ============================================================================
// Tests
// ============================================================================
