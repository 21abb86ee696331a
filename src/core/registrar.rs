//! Persistent environment registration.
//!
//! `register` stores the runtime directory in a user-level variable;
//! `ensure_path` appends `%NAME%` and `%NAME%\Scripts` to the persisted
//! PATH unless equivalent entries are already present. Both are
//! idempotent.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::error::InstallError;
use crate::adapters::EnvBackend;

/// Subdirectory holding the runtime's helper scripts
pub const SCRIPTS_DIR: &str = "Scripts";

#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

/// Outcome of a PATH merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathUpdate {
    /// Every candidate was already present
    Unchanged,
    /// These entries were appended
    Appended(Vec<String>),
}

/// The two PATH entries referencing `env_var`
pub fn path_candidates(env_var: &str) -> [String; 2] {
    [
        format!("%{}%", env_var),
        format!("%{}%\\{}", env_var, SCRIPTS_DIR),
    ]
}

/// Expand `%VAR%` references; unknown variables stay literal
pub fn expand_vars(entry: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(entry.len());
    let mut rest = entry;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Canonical comparison form of a PATH entry
pub fn normalize_entry(entry: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let expanded = expand_vars(entry.trim(), lookup).replace('\\', "/");

    let root = if expanded.starts_with("//") {
        "//"
    } else if expanded.starts_with('/') {
        "/"
    } else {
        ""
    };

    let mut parts: Vec<&str> = Vec::new();
    for part in expanded.split('/') {
        match part {
            "" | "." => {}
            ".." if parts.last().map_or(false, |p| *p != "..") => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    let normalized = format!("{}{}", root, parts.join("/"));
    if cfg!(windows) {
        normalized.to_lowercase()
    } else {
        normalized
    }
}

/// Compute the merged PATH value.
///
/// Returns `None` when nothing needs adding; otherwise the new value and
/// the entries appended. Existing entries keep their text and order.
pub fn merge_path_entries(
    current: &str,
    env_var: &str,
    separator: char,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Option<(String, Vec<String>)> {
    let mut present: Vec<String> = current
        .split(separator)
        .filter(|e| !e.trim().is_empty())
        .map(|e| normalize_entry(e, lookup))
        .collect();

    let mut additions = Vec::new();
    for candidate in path_candidates(env_var) {
        let normalized = normalize_entry(&candidate, lookup);
        if !present.contains(&normalized) {
            present.push(normalized);
            additions.push(candidate);
        }
    }

    if additions.is_empty() {
        return None;
    }

    let mut value = current.to_string();
    if !value.is_empty() && !value.ends_with(separator) {
        value.push(separator);
    }
    value.push_str(&additions.join(&separator.to_string()));

    Some((value, additions))
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Applies installation results to the persistent environment
pub struct EnvironmentRegistrar {
    backend: Arc<dyn EnvBackend>,
    separator: char,
}

impl EnvironmentRegistrar {
    pub fn new(backend: Arc<dyn EnvBackend>) -> Self {
        Self {
            backend,
            separator: PATH_LIST_SEPARATOR,
        }
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Persist `env_var = value_dir`; no-op if already set to that value
    pub async fn register(&self, env_var: &str, value_dir: &Path) -> Result<(), InstallError> {
        let value = value_dir.display().to_string();

        if self.backend.user_var(env_var).await?.as_deref() == Some(value.as_str()) {
            debug!(%env_var, %value, "Environment variable already set");
            return Ok(());
        }

        self.backend.set_user_var(env_var, &value).await?;
        info!(%env_var, %value, "Environment variable set");
        Ok(())
    }

    /// Append the runtime's PATH entries if missing
    pub async fn ensure_path(&self, env_var: &str) -> Result<PathUpdate, InstallError> {
        let path_var = self.backend.path_var().to_string();
        let current = self.backend.user_var(&path_var).await?.unwrap_or_default();

        match merge_path_entries(&current, env_var, self.separator, &process_env) {
            None => {
                info!("User PATH already contains required entries");
                Ok(PathUpdate::Unchanged)
            }
            Some((value, additions)) => {
                self.backend.set_user_var(&path_var, &value).await?;
                info!(added = ?additions, "User PATH updated");
                Ok(PathUpdate::Appended(additions))
            }
        }
    }
}
