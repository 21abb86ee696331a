//! Typed installation descriptor.
//!
//! The remote JSON document uses the key names below; parsing and
//! validation live here so every config source applies the same rules.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::integrity::DigestAlgorithm;

/// Wire format of the remote configuration document
#[derive(Debug, Clone, Default, Deserialize)]
struct RawDescriptor {
    python_download_url: Option<String>,
    python_expected_hash_sha256: Option<String>,
    default_install_directory: Option<String>,
    default_env_var_name: Option<String>,
    python_exe_sub_directory: Option<String>,
}

/// Validated, immutable installation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// http(s) URL of the compressed runtime archive
    pub artifact_url: String,

    /// Expected sha256, 64 lowercase hex chars
    pub expected_digest_hex: String,

    /// Directory the archive is extracted into
    pub destination_dir: PathBuf,

    /// User-level variable pointing at the runtime directory
    pub env_var_name: String,

    /// Location of the executable relative to `destination_dir` (may be empty)
    pub exe_relative_path: PathBuf,
}

/// User-supplied replacements for descriptor values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub artifact_url: Option<String>,
    pub destination_dir: Option<PathBuf>,
    pub env_var_name: Option<String>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.artifact_url.is_none() && self.destination_dir.is_none() && self.env_var_name.is_none()
    }
}

impl InstallConfig {
    /// Parse and validate a JSON descriptor
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let raw: RawDescriptor =
            serde_json::from_slice(bytes).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let artifact_url = required(raw.python_download_url, "python_download_url")?;
        let expected_digest_hex =
            required(raw.python_expected_hash_sha256, "python_expected_hash_sha256")?;
        let destination_dir = required(raw.default_install_directory, "default_install_directory")?;
        let env_var_name = required(raw.default_env_var_name, "default_env_var_name")?;

        // Empty string is a valid sub-path; absence is not.
        let exe_relative_path = raw.python_exe_sub_directory.ok_or_else(|| {
            ConfigError::Validation("missing required key 'python_exe_sub_directory'".to_string())
        })?;

        let config = Self {
            artifact_url,
            expected_digest_hex: expected_digest_hex.to_ascii_lowercase(),
            destination_dir: PathBuf::from(destination_dir),
            env_var_name,
            exe_relative_path: PathBuf::from(exe_relative_path.trim()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field invariant
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.artifact_url)?;
        validate_digest(&self.expected_digest_hex, DigestAlgorithm::Sha256)?;

        if self.destination_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "destination directory is empty".to_string(),
            ));
        }
        if self.env_var_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "environment variable name is empty".to_string(),
            ));
        }
        if self.exe_relative_path.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "executable sub-directory must be relative: {}",
                self.exe_relative_path.display()
            )));
        }
        Ok(())
    }

    /// Apply user overrides and re-validate the result
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(ref url) = overrides.artifact_url {
            self.artifact_url = url.trim().to_string();
        }
        if let Some(ref dir) = overrides.destination_dir {
            self.destination_dir = dir.clone();
        }
        if let Some(ref name) = overrides.env_var_name {
            self.env_var_name = name.trim().to_string();
        }
        self.validate()?;
        Ok(self)
    }

    /// Directory holding the runtime executable
    pub fn exe_dir(&self) -> PathBuf {
        if self.exe_relative_path.as_os_str().is_empty() {
            self.destination_dir.clone()
        } else {
            self.destination_dir.join(&self.exe_relative_path)
        }
    }
}

fn required(value: Option<String>, key: &str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(ConfigError::Validation(format!("key '{}' is empty", key))),
        None => Err(ConfigError::Validation(format!(
            "missing required key '{}'",
            key
        ))),
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(ConfigError::Validation("download URL is empty".to_string()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "download URL must start with http:// or https://: {}",
            url
        )));
    }
    Ok(())
}

fn validate_digest(digest: &str, algorithm: DigestAlgorithm) -> Result<(), ConfigError> {
    if digest.len() != algorithm.hex_len() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::Validation(format!(
            "expected digest must be {} hex characters, got '{}'",
            algorithm.hex_len(),
            digest
        )));
    }
    Ok(())
}
