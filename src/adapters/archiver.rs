//! External archiver adapter.
//!
//! Drives a 7-Zip compatible binary as a subprocess: `x <archive>
//! -o<dest> -y`. Stdout is streamed line by line while the cancellation
//! signal is polled on a fixed interval.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{Extractor, LineFn};
use crate::core::cancel::CancelSignal;
use crate::core::error::InstallError;

/// Header emitted before archiver stderr output
pub const STDERR_HEADER: &str = "--- archiver errors ---";

#[cfg(windows)]
const ARCHIVER_EXE: &str = "7z.exe";
#[cfg(not(windows))]
const ARCHIVER_EXE: &str = "7z";

/// Ordered set of locations to look for the archiver
#[derive(Debug, Clone)]
pub struct ArchiverProbe {
    /// Well-known system install location
    pub system_path: PathBuf,

    /// Directory of the running program
    pub program_dir: PathBuf,

    /// Bundled tool subdirectory name (`<program_dir>/<tool_dir>/<exe>`)
    pub tool_dir: String,

    pub exe_name: String,
}

impl ArchiverProbe {
    /// Probe locations for the current platform
    pub fn platform_default(program_dir: impl Into<PathBuf>) -> Self {
        Self {
            system_path: system_archiver_path(),
            program_dir: program_dir.into(),
            tool_dir: "7z".to_string(),
            exe_name: ARCHIVER_EXE.to_string(),
        }
    }

    /// Candidate paths in probe order
    pub fn candidates(&self) -> Vec<PathBuf> {
        vec![
            self.system_path.clone(),
            self.program_dir.join(&self.tool_dir).join(&self.exe_name),
            self.program_dir.join(&self.exe_name),
        ]
    }
}

#[cfg(windows)]
fn system_archiver_path() -> PathBuf {
    let program_files =
        std::env::var("ProgramFiles").unwrap_or_else(|_| "C:\\Program Files".to_string());
    PathBuf::from(program_files).join("7-Zip").join(ARCHIVER_EXE)
}

#[cfg(not(windows))]
fn system_archiver_path() -> PathBuf {
    PathBuf::from("/usr/bin").join(ARCHIVER_EXE)
}

/// First existing candidate wins
pub fn locate_archiver(probe: &ArchiverProbe) -> Result<PathBuf, InstallError> {
    let tried = probe.candidates();
    for candidate in &tried {
        if candidate.is_file() {
            info!(path = %candidate.display(), "Using archiver");
            return Ok(candidate.clone());
        }
    }
    Err(InstallError::ArchiverNotFound { tried })
}

/// `dest_dir/exe_relative_path/exe_name`
pub fn executable_path(dest_dir: &Path, exe_relative_path: &Path, exe_name: &str) -> PathBuf {
    dest_dir.join(exe_relative_path).join(exe_name)
}

/// Extractor that shells out to the archiver binary
pub struct ArchiverExtractor {
    archiver: PathBuf,
    /// Fixed runtime executable file name (e.g. `python.exe`)
    exe_name: String,
    poll_interval: Duration,
}

impl ArchiverExtractor {
    pub fn new(archiver: impl Into<PathBuf>, exe_name: impl Into<String>) -> Self {
        Self {
            archiver: archiver.into(),
            exe_name: exe_name.into(),
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn spawn(&self, archive: &Path, dest_dir: &Path) -> Result<Child, InstallError> {
        Command::new(&self.archiver)
            .arg("x")
            .arg(archive)
            .arg(format!("-o{}", dest_dir.display()))
            .arg("-y")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InstallError::io(&self.archiver, &e))
    }

    /// Wait for exit while still honouring cancellation
    async fn wait(
        &self,
        child: &mut Child,
        cancel: &CancelSignal,
    ) -> Result<ExitStatus, InstallError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            if cancel.is_cancelled() {
                terminate(child);
                return Err(InstallError::Cancelled);
            }
            tokio::select! {
                status = child.wait() => {
                    return status.map_err(|e| InstallError::io(&self.archiver, &e));
                }
                _ = ticker.tick() => {}
            }
        }
    }
}

/// Best effort; does not wait for the process to go away
fn terminate(child: &mut Child) {
    warn!("Cancellation requested during extraction, terminating archiver");
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Could not terminate archiver process");
    }
}

#[async_trait]
impl Extractor for ArchiverExtractor {
    async fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
        exe_relative_path: &Path,
        cancel: &CancelSignal,
        on_line: LineFn<'_>,
    ) -> Result<PathBuf, InstallError> {
        cancel.check()?;

        info!(
            archive = %archive.display(),
            dest = %dest_dir.display(),
            "Extracting archive"
        );

        let mut child = self.spawn(archive, dest_dir)?;

        let stdout = child.stdout.take().ok_or_else(|| InstallError::Io {
            path: self.archiver.clone(),
            reason: "archiver stdout was not captured".to_string(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| InstallError::Io {
            path: self.archiver.clone(),
            reason: "archiver stderr was not captured".to_string(),
        })?;

        // Drained on its own task so a chatty stderr cannot stall stdout
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                warn!(error = %e, captured = buf.len(), "Archiver stderr capture cut short");
            }
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut reader = BufReader::new(stdout);
        let mut line = Vec::new();
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            if cancel.is_cancelled() {
                terminate(&mut child);
                stderr_task.abort();
                return Err(InstallError::Cancelled);
            }

            tokio::select! {
                // read_until keeps partial data in `line` if the tick wins
                read = reader.read_until(b'\n', &mut line) => {
                    let n = read.map_err(|e| InstallError::io(&self.archiver, &e))?;
                    if n == 0 && line.is_empty() {
                        break;
                    }
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim();
                    if !text.is_empty() {
                        on_line(text);
                    }
                    line.clear();
                }
                _ = ticker.tick() => {}
            }
        }

        let status = self.wait(&mut child, cancel).await?;

        let stderr_text = stderr_task.await.unwrap_or_default();
        if !stderr_text.trim().is_empty() {
            on_line(STDERR_HEADER);
            for err_line in stderr_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                on_line(err_line);
            }
        }

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            return Err(InstallError::ExtractionFailed {
                exit_code,
                stderr: stderr_text,
            });
        }

        info!("Archive extraction completed successfully");

        let exe = executable_path(dest_dir, exe_relative_path, &self.exe_name);
        if !exe.exists() {
            return Err(InstallError::ExecutableNotFound { path: exe });
        }

        debug!(path = %exe.display(), "Identified runtime executable");
        Ok(exe)
    }
}
