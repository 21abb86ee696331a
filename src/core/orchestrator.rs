//! Installation pipeline orchestrator.
//!
//! Sequences config fetch, download, verification, extraction and
//! environment registration. Owns all run-scoped state, polls the
//! cancellation signal between every stage, rolls back on failure and
//! reports outward only through an `Observer`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{
    ArchiverExtractor, CommandEnvBackend, ConfigSource, Downloader, Extractor, HttpConfigLoader,
    HttpDownloader,
};
use crate::config::InstallerSettings;
use crate::domain::{
    Completion, ConfigOverrides, InstallConfig, Percent, Phase, PipelineState, ProgressEvent,
};

use super::cancel::CancelSignal;
use super::error::InstallError;
use super::integrity;
use super::observer::{ChannelObserver, Observer, PipelineEvent};
use super::registrar::{EnvironmentRegistrar, PathUpdate};

/// Byte step between indeterminate download updates (1 MiB)
pub const DEFAULT_PROGRESS_STEP: u64 = 1024 * 1024;

/// Archiver output lines naming the file being unpacked
const EXTRACTING_PREFIX: &str = "Extracting ";

/// Where a run gets its configuration from
#[derive(Debug, Clone)]
pub enum ConfigRequest {
    /// Fetch the descriptor during the run, then apply overrides
    Remote {
        url: String,
        overrides: ConfigOverrides,
    },

    /// Use an already loaded snapshot
    Loaded(InstallConfig),
}

impl ConfigRequest {
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            overrides: ConfigOverrides::default(),
        }
    }
}

/// How a run that got through extraction ended
#[derive(Debug)]
enum StageOutcome {
    Registered,
    Partial { warning: String },
}

/// Limits download events to percentage changes
struct ProgressThrottle {
    last_percent: Option<u8>,
    last_bytes: Option<u64>,
    step: u64,
}

impl ProgressThrottle {
    fn new(step: u64) -> Self {
        Self {
            last_percent: None,
            last_bytes: None,
            step: step.max(1),
        }
    }

    fn update(&mut self, done: u64, total: Option<u64>) -> Option<ProgressEvent> {
        match Percent::of(done, total) {
            Percent::Known(pct) => {
                if self.last_percent == Some(pct) {
                    return None;
                }
                self.last_percent = Some(pct);
            }
            Percent::Indeterminate => {
                if let Some(last) = self.last_bytes {
                    if done.saturating_sub(last) < self.step {
                        return None;
                    }
                }
                self.last_bytes = Some(done);
            }
        }
        Some(ProgressEvent::transfer(Phase::Downloading, done, total))
    }
}

/// Observation helper: logs the cancellation point and aborts the stage
fn checkpoint(state: &mut PipelineState, cancel: &CancelSignal) -> Result<(), InstallError> {
    if cancel.is_cancelled() {
        state.note_cancel(true);
        info!(phase = %state.phase, "Cancellation observed");
        return Err(InstallError::Cancelled);
    }
    Ok(())
}

/// Runs installations
pub struct InstallPipeline {
    config_source: Arc<dyn ConfigSource>,
    downloader: Arc<dyn Downloader>,
    extractor: Arc<dyn Extractor>,
    registrar: EnvironmentRegistrar,
    /// Directory for the temporary artifact
    work_dir: PathBuf,
    progress_step: u64,
}

impl InstallPipeline {
    pub fn new(
        config_source: Arc<dyn ConfigSource>,
        downloader: Arc<dyn Downloader>,
        extractor: Arc<dyn Extractor>,
        registrar: EnvironmentRegistrar,
    ) -> Self {
        Self {
            config_source,
            downloader,
            extractor,
            registrar,
            work_dir: std::env::temp_dir(),
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }

    /// Production wiring: HTTP adapters, the given archiver, command-backed environment
    pub fn from_settings(settings: &InstallerSettings, archiver: &Path) -> Result<Self> {
        let config_source = HttpConfigLoader::new(
            &settings.http.user_agent,
            Duration::from_secs(settings.http.config_timeout_seconds),
            &settings.work_dir,
        )?;
        let downloader = HttpDownloader::new(
            &settings.http.user_agent,
            Duration::from_secs(settings.http.connect_timeout_seconds),
        )?;
        let extractor = ArchiverExtractor::new(archiver, &settings.executable_name)
            .with_poll_interval(Duration::from_millis(settings.poll_interval_ms));
        let registrar = EnvironmentRegistrar::new(Arc::new(CommandEnvBackend::new()));

        Ok(Self::new(
            Arc::new(config_source),
            Arc::new(downloader),
            Arc::new(extractor),
            registrar,
        )
        .with_work_dir(&settings.work_dir)
        .with_progress_step(settings.progress_step_bytes))
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_progress_step(mut self, bytes: u64) -> Self {
        self.progress_step = bytes;
        self
    }

    /// Run on a background task; events arrive on the handle in order
    pub fn spawn(self: Arc<Self>, request: ConfigRequest) -> InstallHandle {
        let cancel = CancelSignal::new();
        let (mut observer, events) = ChannelObserver::channel();
        let worker_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            self.run(request, &worker_cancel, &mut observer).await
        });

        InstallHandle {
            cancel,
            events,
            task,
        }
    }

    /// Execute one run to completion on the current task
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        request: ConfigRequest,
        cancel: &CancelSignal,
        observer: &mut dyn Observer,
    ) -> Completion {
        let mut state = PipelineState::new(Uuid::new_v4());
        tracing::Span::current().record("run_id", tracing::field::display(state.id));
        info!("Starting installation");

        let mut snapshot: Option<InstallConfig> = None;
        let result = self
            .execute(&mut state, &mut snapshot, request, cancel, observer)
            .await;

        self.finish(state, snapshot, result, cancel, observer).await
    }

    async fn execute(
        &self,
        state: &mut PipelineState,
        snapshot: &mut Option<InstallConfig>,
        request: ConfigRequest,
        cancel: &CancelSignal,
        observer: &mut dyn Observer,
    ) -> Result<StageOutcome, InstallError> {
        // FetchingConfig
        state.enter(Phase::FetchingConfig);
        checkpoint(state, cancel)?;
        let config = match request {
            ConfigRequest::Remote { url, overrides } => {
                observer.on_progress(ProgressEvent::status(
                    Phase::FetchingConfig,
                    format!("Loading configuration from: {}", url),
                ));
                self.config_source
                    .load(&url)
                    .await?
                    .with_overrides(&overrides)?
            }
            ConfigRequest::Loaded(config) => {
                observer.on_progress(ProgressEvent::status(
                    Phase::FetchingConfig,
                    "Using loaded configuration",
                ));
                config.validate()?;
                config
            }
        };
        observer.on_progress(ProgressEvent::status(
            Phase::FetchingConfig,
            "Configuration loaded successfully.",
        ));
        *snapshot = Some(config.clone());
        checkpoint(state, cancel)?;

        // Downloading
        state.enter(Phase::Downloading);
        observer.on_progress(ProgressEvent::status(
            Phase::Downloading,
            format!("Downloading '{}'...", config.artifact_url),
        ));
        let temp = tempfile::Builder::new()
            .prefix("runtime-")
            .suffix(".7z")
            .tempfile_in(&self.work_dir)
            .map_err(|e| InstallError::io(&self.work_dir, &e))?
            .into_temp_path();
        let artifact = temp.to_path_buf();
        state.temp_artifact = Some(temp);
        checkpoint(state, cancel)?;

        let mut throttle = ProgressThrottle::new(self.progress_step);
        let bytes = {
            let mut on_progress = |done: u64, total: Option<u64>| {
                if let Some(event) = throttle.update(done, total) {
                    observer.on_progress(event);
                }
            };
            self.downloader
                .download(&config.artifact_url, &artifact, &mut on_progress, cancel)
                .await?
        };
        observer.on_progress(
            ProgressEvent::status(
                Phase::Downloading,
                format!("Download complete: {}", artifact.display()),
            )
            .with_percent(Percent::Known(100)),
        );
        info!(bytes, "Artifact downloaded");
        checkpoint(state, cancel)?;

        // Verifying
        state.enter(Phase::Verifying);
        observer.on_progress(ProgressEvent::status(
            Phase::Verifying,
            format!("Expected SHA256 hash: {}", config.expected_digest_hex),
        ));
        let actual = integrity::verify(&artifact, &config.expected_digest_hex).await?;
        observer.on_progress(ProgressEvent::status(
            Phase::Verifying,
            format!("Hash verification successful: {}", actual),
        ));
        checkpoint(state, cancel)?;

        // Extracting
        state.enter(Phase::Extracting);
        let dest = &config.destination_dir;
        let message = if dest.is_dir() {
            format!("Destination directory already exists: {}", dest.display())
        } else {
            tokio::fs::create_dir_all(dest)
                .await
                .map_err(|e| InstallError::io(dest, &e))?;
            format!("Created destination directory: {}", dest.display())
        };
        observer.on_progress(ProgressEvent::status(Phase::Extracting, message));
        observer.on_progress(ProgressEvent::status(
            Phase::Extracting,
            format!("Extracting '{}' to '{}'...", artifact.display(), dest.display()),
        ));
        checkpoint(state, cancel)?;

        let extracted = {
            let mut on_line = |line: &str| {
                observer.on_progress(ProgressEvent::status(Phase::Extracting, line));
                if let Some(file) = line.strip_prefix(EXTRACTING_PREFIX) {
                    observer.on_progress(ProgressEvent::status(
                        Phase::Extracting,
                        format!("Extracting file: {}", file.trim()),
                    ));
                }
            };
            self.extractor
                .extract(&artifact, dest, &config.exe_relative_path, cancel, &mut on_line)
                .await
        };

        let exe = match extracted {
            Ok(exe) => exe,
            Err(e) if e.is_warning() => {
                checkpoint(state, cancel)?;
                warn!(error = %e, "Extraction finished without a runtime executable");
                let warning = format!(
                    "{}. Ensure the archive extracts into '{}' relative to the destination \
                     directory.",
                    e,
                    config.exe_relative_path.display()
                );
                observer.on_progress(ProgressEvent::status(Phase::Extracting, warning.clone()));
                return Ok(StageOutcome::Partial { warning });
            }
            Err(e) => return Err(e),
        };
        observer.on_progress(ProgressEvent::status(
            Phase::Extracting,
            format!("Identified runtime executable at: {}", exe.display()),
        ));
        state.resolved_exe_path = Some(exe.clone());
        checkpoint(state, cancel)?;

        // Registering
        state.enter(Phase::Registering);
        let exe_dir = exe.parent().unwrap_or(dest.as_path()).to_path_buf();
        observer.on_progress(ProgressEvent::status(
            Phase::Registering,
            format!(
                "Setting user environment variable '{}' to '{}'...",
                config.env_var_name,
                exe_dir.display()
            ),
        ));
        self.registrar.register(&config.env_var_name, &exe_dir).await?;
        observer.on_progress(ProgressEvent::status(
            Phase::Registering,
            format!("Environment variable '{}' set.", config.env_var_name),
        ));

        observer.on_progress(ProgressEvent::status(
            Phase::Registering,
            "Checking/updating user PATH...",
        ));
        // The variable is already persisted; a PATH failure must not roll it back
        match self.registrar.ensure_path(&config.env_var_name).await {
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Could not update user PATH");
                let mut message = format!(
                    "Warning: Failed to update user PATH: {}. Add %{}% to PATH manually.",
                    e, config.env_var_name
                );
                if let Some(detail) = e.detail() {
                    message.push('\n');
                    message.push_str(&detail);
                }
                observer.on_progress(ProgressEvent::status(Phase::Registering, message));
            }
            Ok(PathUpdate::Unchanged) => observer.on_progress(ProgressEvent::status(
                Phase::Registering,
                "User PATH already contains required entries. No changes made.",
            )),
            Ok(PathUpdate::Appended(entries)) => {
                observer.on_progress(ProgressEvent::status(
                    Phase::Registering,
                    format!("Added {} to user PATH.", entries.join(", ")),
                ));
                observer.on_progress(ProgressEvent::status(
                    Phase::Registering,
                    "User PATH changes will be available in NEW command prompt windows.",
                ));
            }
        }

        Ok(StageOutcome::Registered)
    }

    /// Classify the outcome, roll back, release temp files, notify
    async fn finish(
        &self,
        mut state: PipelineState,
        snapshot: Option<InstallConfig>,
        result: Result<StageOutcome, InstallError>,
        cancel: &CancelSignal,
        observer: &mut dyn Observer,
    ) -> Completion {
        state.note_cancel(cancel.is_cancelled());
        let phase = state.phase;

        let completion = match result {
            Ok(StageOutcome::Registered) => Completion::Succeeded,
            Ok(StageOutcome::Partial { warning }) => Completion::PartialSuccess { warning },
            // Cancellation wins even if the stage reported something else
            Err(e) if e.is_cancelled() || state.cancel_requested => {
                if !e.is_cancelled() {
                    info!(error = %e, "Stage error after cancellation request");
                }
                Completion::Cancelled
            }
            Err(e) => {
                error!(%phase, error = %e, "Installation failed");
                Completion::Failed {
                    reason: e.to_string(),
                    detail: e.detail(),
                }
            }
        };

        match &completion {
            Completion::Failed { reason, detail } => {
                let mut message = format!("ERROR: {}", reason);
                if let Some(detail) = detail {
                    message.push('\n');
                    message.push_str(detail);
                }
                observer.on_progress(ProgressEvent::status(phase, message));
                if let Some(ref config) = snapshot {
                    self.rollback(&config.destination_dir, phase, observer).await;
                }
            }
            Completion::Cancelled => {
                observer.on_progress(ProgressEvent::status(
                    phase,
                    "Installation cancelled by user.",
                ));
            }
            _ => {}
        }

        self.release_artifact(&mut state, observer);

        state.enter(completion.phase());
        let (message, percent) = match &completion {
            Completion::Succeeded => ("Installation Complete!", 100),
            Completion::PartialSuccess { .. } => (
                "Installed, but the environment variable could not be set automatically. \
                 Set it manually for your installation.",
                100,
            ),
            Completion::Failed { .. } => ("Installation Failed!", 0),
            Completion::Cancelled => ("Installation Cancelled!", 0),
        };
        observer.on_progress(
            ProgressEvent::status(state.phase, message).with_percent(Percent::Known(percent)),
        );

        let elapsed_ms = (Utc::now() - state.started_at).num_milliseconds();
        info!(
            outcome = ?completion,
            phases = ?state.history,
            exe = ?state.resolved_exe_path,
            elapsed_ms,
            "Installation finished"
        );
        observer.on_complete(&completion);
        completion
    }

    /// Remove a half-installed tree; failure here is reported, not escalated
    async fn rollback(&self, dest: &Path, phase: Phase, observer: &mut dyn Observer) {
        if !dest.exists() {
            return;
        }
        observer.on_progress(ProgressEvent::status(
            phase,
            format!("Cleaning up partially installed directory: {}", dest.display()),
        ));
        match tokio::fs::remove_dir_all(dest).await {
            Ok(()) => {
                info!(path = %dest.display(), "Rolled back destination directory");
                observer.on_progress(ProgressEvent::status(
                    phase,
                    format!("Cleaned up: {}", dest.display()),
                ));
            }
            Err(e) => {
                warn!(path = %dest.display(), error = %e, "Rollback failed");
                observer.on_progress(ProgressEvent::status(
                    phase,
                    format!(
                        "Warning: Could not fully clean up directory {}. \
                         Please remove it manually if needed. Error: {}",
                        dest.display(),
                        e
                    ),
                ));
            }
        }
    }

    fn release_artifact(&self, state: &mut PipelineState, observer: &mut dyn Observer) {
        let Some(temp) = state.temp_artifact.take() else {
            return;
        };
        let path = temp.to_path_buf();
        if !path.exists() {
            // Nothing on disk; dropping the handle is enough
            drop(temp);
            return;
        }
        match temp.close() {
            Ok(()) => observer.on_progress(ProgressEvent::status(
                state.phase,
                format!("Cleaned up temporary file: {}", path.display()),
            )),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not remove temporary artifact");
                observer.on_progress(ProgressEvent::status(
                    state.phase,
                    format!(
                        "Warning: Could not remove temporary file {}: {}",
                        path.display(),
                        e
                    ),
                ));
            }
        }
    }
}

/// Caller side of a spawned run
pub struct InstallHandle {
    cancel: CancelSignal,
    events: mpsc::UnboundedReceiver<PipelineEvent>,
    task: JoinHandle<Completion>,
}

impl InstallHandle {
    /// Request cancellation; idempotent
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Next event, or `None` once the run has finished and drained
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end
    pub async fn join(self) -> Completion {
        match self.task.await {
            Ok(completion) => completion,
            Err(e) => Completion::Failed {
                reason: format!("installation worker stopped unexpectedly: {}", e),
                detail: None,
            },
        }
    }
}
