//! Error taxonomy for the installation pipeline.
//!
//! Every stage returns one of these; the orchestrator maps each to a
//! terminal completion without swallowing it.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while obtaining the remote configuration descriptor
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to fetch configuration from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Errors produced by pipeline stages
#[derive(Debug, Clone, Error)]
pub enum InstallError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Hash mismatch: downloaded file is corrupted or tampered with")]
    Integrity { expected: String, actual: String },

    #[error("Extraction failed with exit code {exit_code}")]
    ExtractionFailed { exit_code: i32, stderr: String },

    #[error("Executable not found at expected location: {}", path.display())]
    ExecutableNotFound { path: PathBuf },

    #[error("Failed to persist environment variable (exit code {exit_code})")]
    Registration { exit_code: i32, detail: String },

    #[error("Archiver executable not found")]
    ArchiverNotFound { tried: Vec<PathBuf> },

    #[error("Installation cancelled by user")]
    Cancelled,
}

impl InstallError {
    /// Build an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Warning-class outcomes do not fail the run on their own
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::ExecutableNotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Raw diagnostic detail to show next to the human-readable message
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Integrity { expected, actual } => {
                Some(format!("expected: {}\ncalculated: {}", expected, actual))
            }
            Self::ExtractionFailed { exit_code, stderr } => {
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    Some(format!("exit code: {}", exit_code))
                } else {
                    Some(format!("exit code: {}\n{}", exit_code, stderr))
                }
            }
            Self::Registration { exit_code, detail } => {
                Some(format!("exit code: {}\n{}", exit_code, detail.trim()))
            }
            Self::ArchiverNotFound { tried } => Some(
                tried
                    .iter()
                    .map(|p| format!("tried: {}", p.display()))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Self::Io { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }
}
