//! Command-backed persistent environment.
//!
//! Writes go through `setx` (user scope). Reads query the user's
//! `HKCU:\Environment` key through PowerShell with
//! `DoNotExpandEnvironmentNames`, so `%VAR%` references come back as
//! stored and survive a read-modify-write of PATH.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::EnvBackend;
use crate::core::error::InstallError;

/// Longest value `setx` stores without truncating
pub const SETX_MAX_VALUE_LEN: usize = 1024;

/// Persistent user environment via platform commands
pub struct CommandEnvBackend {
    /// Program used to persist variables (default: `setx`)
    setter: PathBuf,
    /// Shell used to query variables (default: `powershell`)
    shell: PathBuf,
}

impl Default for CommandEnvBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandEnvBackend {
    pub fn new() -> Self {
        Self {
            setter: PathBuf::from("setx"),
            shell: PathBuf::from("powershell"),
        }
    }

    /// Use custom programs for setting and querying
    pub fn with_programs(setter: impl Into<PathBuf>, shell: impl Into<PathBuf>) -> Self {
        Self {
            setter: setter.into(),
            shell: shell.into(),
        }
    }
}

fn command_error(program: &Path, output: &Output) -> InstallError {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    InstallError::Registration {
        exit_code: output.status.code().unwrap_or(-1),
        detail: format!(
            "{} failed. Error: {} Output: {}",
            program.display(),
            stderr.trim(),
            stdout.trim()
        ),
    }
}

fn spawn_error(program: &Path, err: std::io::Error) -> InstallError {
    InstallError::Registration {
        exit_code: -1,
        detail: format!("failed to run {}: {}", program.display(), err),
    }
}

/// Quote a value for a single-quoted PowerShell string literal
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Script printing the unexpanded user value of `name` (empty if unset)
fn query_script(name: &str) -> String {
    format!(
        "(Get-Item -LiteralPath 'HKCU:\\Environment').GetValue({}, '', \
         'DoNotExpandEnvironmentNames')",
        ps_quote(name)
    )
}

#[async_trait]
impl EnvBackend for CommandEnvBackend {
    async fn set_user_var(&self, name: &str, value: &str) -> Result<(), InstallError> {
        let len = value.chars().count();
        if len > SETX_MAX_VALUE_LEN {
            warn!(%name, len, "Value too long for setx, refusing to truncate");
            return Err(InstallError::Registration {
                exit_code: -1,
                detail: format!(
                    "value for '{}' is {} characters; {} stores at most {} and would truncate it",
                    name,
                    len,
                    self.setter.display(),
                    SETX_MAX_VALUE_LEN
                ),
            });
        }

        info!(%name, %value, "Setting user environment variable");

        let output = Command::new(&self.setter)
            .arg(name)
            .arg(value)
            .output()
            .await
            .map_err(|e| spawn_error(&self.setter, e))?;

        if !output.status.success() {
            return Err(command_error(&self.setter, &output));
        }

        debug!(stdout = %String::from_utf8_lossy(&output.stdout).trim(), "setx output");
        Ok(())
    }

    async fn user_var(&self, name: &str) -> Result<Option<String>, InstallError> {
        let script = query_script(name);

        let output = Command::new(&self.shell)
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .await
            .map_err(|e| spawn_error(&self.shell, e))?;

        if !output.status.success() {
            return Err(command_error(&self.shell, &output));
        }

        let value = String::from_utf8_lossy(&output.stdout);
        let value = value.trim_end_matches(['\r', '\n']);
        if value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }
}
