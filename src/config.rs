//! Installer settings.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (RUNTIME_INSTALLER_CONFIG_URL,
//!    RUNTIME_INSTALLER_WORK_DIR, RUNTIME_INSTALLER_ARCHIVER)
//! 2. Settings file (.runtime-installer/config.yaml)
//! 3. Defaults
//!
//! Settings file discovery:
//! - Searches current directory and parents for .runtime-installer/config.yaml
//! - Relative paths in the file are resolved against the directory that
//!   contains `.runtime-installer/`

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Descriptor used when neither the environment nor the settings file names one
pub const DEFAULT_CONFIG_URL: &str =
    "https://raw.githubusercontent.com/msweier/pythonCWMS/refs/heads/main/pythonCWMS_config.json";

/// Runtime executable looked up after extraction
pub const DEFAULT_EXECUTABLE_NAME: &str = "python.exe";

pub const ENV_CONFIG_URL: &str = "RUNTIME_INSTALLER_CONFIG_URL";
pub const ENV_WORK_DIR: &str = "RUNTIME_INSTALLER_WORK_DIR";
pub const ENV_ARCHIVER: &str = "RUNTIME_INSTALLER_ARCHIVER";

/// Global cached settings (stores Result to handle init errors)
static SETTINGS: OnceLock<Result<InstallerSettings, String>> = OnceLock::new();

/// Raw settings file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub version: Option<String>,
    pub config_url: Option<String>,
    pub work_dir: Option<String>,
    pub archiver: Option<String>,
    pub executable_name: Option<String>,
    #[serde(default)]
    pub http: Option<HttpFileConfig>,
    #[serde(default)]
    pub extraction: Option<ExtractionFileConfig>,
    #[serde(default)]
    pub progress: Option<ProgressFileConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpFileConfig {
    pub user_agent: Option<String>,
    pub config_timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionFileConfig {
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressFileConfig {
    pub step_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpSettings {
    pub user_agent: String,
    /// Whole-request timeout for the descriptor fetch
    pub config_timeout_seconds: u64,
    /// Connect timeout for artifact downloads (the body itself is unbounded)
    pub connect_timeout_seconds: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("runtime-installer/{}", env!("CARGO_PKG_VERSION")),
            config_timeout_seconds: 30,
            connect_timeout_seconds: 30,
        }
    }
}

/// Resolved settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallerSettings {
    pub config_url: String,
    /// Directory for transient files (descriptor copy, downloaded archive)
    pub work_dir: PathBuf,
    /// Explicit archiver binary; probing is skipped when set
    pub archiver: Option<PathBuf>,
    pub executable_name: String,
    pub http: HttpSettings,
    pub poll_interval_ms: u64,
    pub progress_step_bytes: u64,
    /// Path to settings file (if found)
    pub settings_file: Option<PathBuf>,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            config_url: DEFAULT_CONFIG_URL.to_string(),
            work_dir: paths::default_work_dir(),
            archiver: None,
            executable_name: DEFAULT_EXECUTABLE_NAME.to_string(),
            http: HttpSettings::default(),
            poll_interval_ms: 100,
            progress_step_bytes: 1024 * 1024,
            settings_file: None,
        }
    }
}

/// Load and parse a settings file
fn load_settings_file(path: &Path) -> Result<SettingsFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

/// Resolve a path that may be relative to the settings base directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Merge file values and environment lookups over the defaults
fn resolve(
    file: Option<(PathBuf, SettingsFile)>,
    env: &dyn Fn(&str) -> Option<String>,
) -> InstallerSettings {
    let mut settings = InstallerSettings::default();

    if let Some((path, file)) = file {
        // Base directory is the parent of .runtime-installer/
        let base_dir = path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        if let Some(url) = file.config_url {
            settings.config_url = url;
        }
        if let Some(ref dir) = file.work_dir {
            settings.work_dir = resolve_path(&base_dir, dir);
        }
        if let Some(ref archiver) = file.archiver {
            settings.archiver = Some(resolve_path(&base_dir, archiver));
        }
        if let Some(name) = file.executable_name {
            settings.executable_name = name;
        }
        if let Some(http) = file.http {
            if let Some(agent) = http.user_agent {
                settings.http.user_agent = agent;
            }
            if let Some(secs) = http.config_timeout_seconds {
                settings.http.config_timeout_seconds = secs;
            }
            if let Some(secs) = http.connect_timeout_seconds {
                settings.http.connect_timeout_seconds = secs;
            }
        }
        if let Some(ms) = file.extraction.and_then(|e| e.poll_interval_ms) {
            settings.poll_interval_ms = ms.max(1);
        }
        if let Some(step) = file.progress.and_then(|p| p.step_bytes) {
            settings.progress_step_bytes = step.max(1);
        }
        settings.settings_file = Some(path);
    }

    if let Some(url) = env(ENV_CONFIG_URL).filter(|v| !v.trim().is_empty()) {
        settings.config_url = url;
    }
    if let Some(dir) = env(ENV_WORK_DIR).filter(|v| !v.trim().is_empty()) {
        settings.work_dir = PathBuf::from(dir);
    }
    if let Some(archiver) = env(ENV_ARCHIVER).filter(|v| !v.trim().is_empty()) {
        settings.archiver = Some(PathBuf::from(archiver));
    }

    settings
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Load settings from all sources
fn load_settings() -> Result<InstallerSettings> {
    let file = match paths::find_settings_file() {
        Some(path) => {
            let parsed = load_settings_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };

    Ok(resolve(file, &process_env))
}

/// Get the global settings (loads once, then cached)
pub fn settings() -> Result<&'static InstallerSettings> {
    let result = SETTINGS.get_or_init(|| load_settings().map_err(|e| e.to_string()));

    match result {
        Ok(settings) => Ok(settings),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Load settings again, bypassing the cache
pub fn reload_settings() -> Result<InstallerSettings> {
    load_settings()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = resolve(None, &no_env);

        assert_eq!(settings.config_url, DEFAULT_CONFIG_URL);
        assert_eq!(settings.executable_name, "python.exe");
        assert_eq!(settings.http.config_timeout_seconds, 30);
        assert_eq!(settings.poll_interval_ms, 100);
        assert_eq!(settings.progress_step_bytes, 1024 * 1024);
        assert!(settings.archiver.is_none());
        assert!(settings.settings_file.is_none());
        assert!(settings.http.user_agent.starts_with("runtime-installer/"));
    }

    #[test]
    fn test_settings_file_parsing() {
        let temp = TempDir::new().unwrap();
        let settings_dir = temp.path().join(paths::SETTINGS_DIR);
        std::fs::create_dir_all(&settings_dir).unwrap();

        let path = settings_dir.join(paths::SETTINGS_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
config_url: https://example.com/runtime.json
work_dir: ./scratch
archiver: tools/7z
http:
  config_timeout_seconds: 5
extraction:
  poll_interval_ms: 25
"#
        )
        .unwrap();

        let parsed = load_settings_file(&path).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("1.0"));
        assert_eq!(parsed.http.as_ref().unwrap().config_timeout_seconds, Some(5));

        let settings = resolve(Some((path.clone(), parsed)), &no_env);
        assert_eq!(settings.config_url, "https://example.com/runtime.json");
        assert_eq!(settings.work_dir, temp.path().join("./scratch"));
        assert_eq!(settings.archiver, Some(temp.path().join("tools/7z")));
        assert_eq!(settings.http.config_timeout_seconds, 5);
        // Unset keys keep their defaults
        assert_eq!(settings.http.connect_timeout_seconds, 30);
        assert_eq!(settings.poll_interval_ms, 25);
        assert_eq!(settings.settings_file, Some(path));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = SettingsFile {
            config_url: Some("https://file.example/config.json".to_string()),
            ..Default::default()
        };
        let env = |name: &str| match name {
            ENV_CONFIG_URL => Some("https://env.example/config.json".to_string()),
            ENV_ARCHIVER => Some("/opt/7z/7z".to_string()),
            ENV_WORK_DIR => Some("  ".to_string()),
            _ => None,
        };

        let settings = resolve(
            Some((PathBuf::from("/proj/.runtime-installer/config.yaml"), file)),
            &env,
        );
        assert_eq!(settings.config_url, "https://env.example/config.json");
        assert_eq!(settings.archiver, Some(PathBuf::from("/opt/7z/7z")));
        // Blank values are ignored
        assert_eq!(settings.work_dir, paths::default_work_dir());
    }

    #[test]
    fn test_reload_matches_cached_settings() {
        let cached = settings().unwrap();
        let fresh = reload_settings().unwrap();

        assert_eq!(fresh, *cached);
        assert!(!std::ptr::eq(&fresh, cached));
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "http: [not, a, map").unwrap();

        assert!(load_settings_file(&path).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./scratch"),
            PathBuf::from("/home/user/project/./scratch")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
