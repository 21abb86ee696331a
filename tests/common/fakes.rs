//! In-memory stage implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use runtime_installer::adapters::archiver::executable_path;
use runtime_installer::adapters::{
    ConfigSource, Downloader, EnvBackend, Extractor, LineFn, ProgressFn,
};
use runtime_installer::core::{
    CancelSignal, ConfigError, EnvironmentRegistrar, InstallError, InstallPipeline,
};
use runtime_installer::domain::InstallConfig;

pub const EXE_NAME: &str = "python.exe";

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Valid snapshot installing into `dest` with executable under `bin/`
pub fn install_config(dest: &Path, digest: &str) -> InstallConfig {
    InstallConfig {
        artifact_url: "https://example.com/runtime.7z".to_string(),
        expected_digest_hex: digest.to_string(),
        destination_dir: dest.to_path_buf(),
        env_var_name: "MYRUNTIME".to_string(),
        exe_relative_path: PathBuf::from("bin"),
    }
}

// ============================================================================
// ConfigSource
// ============================================================================

pub struct StaticConfigSource {
    result: Result<InstallConfig, ConfigError>,
    pub calls: AtomicUsize,
}

impl StaticConfigSource {
    pub fn new(result: Result<InstallConfig, ConfigError>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn load(&self, _url: &str) -> Result<InstallConfig, ConfigError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

// ============================================================================
// Downloader
// ============================================================================

pub struct FakeDownloader {
    body: Vec<u8>,
    chunk_size: usize,
    /// Report a total length (like Content-Length)
    advertise_length: bool,
    /// Trigger this signal once this many chunks were written
    cancel_after: Option<(usize, CancelSignal)>,
    /// After the first chunk, wait until the run is cancelled
    stall: bool,
    pub calls: AtomicUsize,
}

impl FakeDownloader {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            chunk_size: 16,
            advertise_length: true,
            cancel_after: None,
            stall: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn without_length(mut self) -> Self {
        self.advertise_length = false;
        self
    }

    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn cancel_after(mut self, chunks: usize, signal: CancelSignal) -> Self {
        self.cancel_after = Some((chunks, signal));
        self
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(
        &self,
        _url: &str,
        dest: &Path,
        on_progress: ProgressFn<'_>,
        cancel: &CancelSignal,
    ) -> Result<u64, InstallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        cancel.check()?;

        let total = self.advertise_length.then(|| self.body.len() as u64);
        let mut written = Vec::new();
        on_progress(0, total);

        for (index, chunk) in self.body.chunks(self.chunk_size).enumerate() {
            if let Some((after, ref signal)) = self.cancel_after {
                if index == after {
                    signal.cancel();
                }
            }
            cancel.check()?;
            written.extend_from_slice(chunk);
            std::fs::write(dest, &written).map_err(|e| InstallError::io(dest, &e))?;
            on_progress(written.len() as u64, total);

            while self.stall {
                cancel.check()?;
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        }

        Ok(written.len() as u64)
    }
}

// ============================================================================
// Extractor
// ============================================================================

pub struct FakeExtractor {
    /// Files written relative to the destination directory
    files: Vec<(PathBuf, Vec<u8>)>,
    lines: Vec<String>,
    failure: Option<InstallError>,
    /// Trigger this signal once extraction has started
    cancel_on_start: Option<CancelSignal>,
    pub calls: AtomicUsize,
}

impl FakeExtractor {
    /// Produces `bin/python.exe`
    pub fn with_runtime() -> Self {
        Self::with_files(vec![(PathBuf::from("bin").join(EXE_NAME), b"MZ".to_vec())])
    }

    pub fn with_files(files: Vec<(PathBuf, Vec<u8>)>) -> Self {
        Self {
            files,
            lines: vec!["Extracting  bin/python.exe".to_string(), "Everything is Ok".to_string()],
            failure: None,
            cancel_on_start: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: InstallError) -> Self {
        Self {
            failure: Some(error),
            ..Self::with_files(Vec::new())
        }
    }

    pub fn cancel_on_start(mut self, signal: CancelSignal) -> Self {
        self.cancel_on_start = Some(signal);
        self
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(
        &self,
        _archive: &Path,
        dest_dir: &Path,
        exe_relative_path: &Path,
        cancel: &CancelSignal,
        on_line: LineFn<'_>,
    ) -> Result<PathBuf, InstallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref signal) = self.cancel_on_start {
            signal.cancel();
        }
        cancel.check()?;

        for (rel, bytes) in &self.files {
            let path = dest_dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, &e))?;
            }
            std::fs::write(&path, bytes).map_err(|e| InstallError::io(&path, &e))?;
        }
        for line in &self.lines {
            on_line(line);
        }

        if let Some(ref failure) = self.failure {
            return Err(failure.clone());
        }

        let exe = executable_path(dest_dir, exe_relative_path, EXE_NAME);
        if !exe.exists() {
            return Err(InstallError::ExecutableNotFound { path: exe });
        }
        Ok(exe)
    }
}

// ============================================================================
// EnvBackend
// ============================================================================

#[derive(Default)]
pub struct MemoryEnvBackend {
    vars: Mutex<HashMap<String, String>>,
    /// Every write, in order
    pub writes: Mutex<Vec<(String, String)>>,
    fail_writes: bool,
    /// Reject writes to this variable only
    rejected_var: Option<String>,
}

impl MemoryEnvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(self, name: &str, value: &str) -> Self {
        self.vars
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn failing_writes_for(name: &str) -> Self {
        Self {
            rejected_var: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.lock().unwrap().get(name).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl EnvBackend for MemoryEnvBackend {
    async fn set_user_var(&self, name: &str, value: &str) -> Result<(), InstallError> {
        if self.fail_writes || self.rejected_var.as_deref() == Some(name) {
            return Err(InstallError::Registration {
                exit_code: 1,
                detail: "access denied".to_string(),
            });
        }
        self.writes
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        self.vars
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn user_var(&self, name: &str) -> Result<Option<String>, InstallError> {
        Ok(self.get(name))
    }
}

// ============================================================================
// Pipeline wiring
// ============================================================================

pub struct Harness {
    pub config_source: Arc<StaticConfigSource>,
    pub downloader: Arc<FakeDownloader>,
    pub extractor: Arc<FakeExtractor>,
    pub env: Arc<MemoryEnvBackend>,
    pub pipeline: InstallPipeline,
}

impl Harness {
    pub fn new(
        config: Result<InstallConfig, ConfigError>,
        downloader: FakeDownloader,
        extractor: FakeExtractor,
        env: MemoryEnvBackend,
        work_dir: &Path,
    ) -> Self {
        let config_source = Arc::new(StaticConfigSource::new(config));
        let downloader = Arc::new(downloader);
        let extractor = Arc::new(extractor);
        let env = Arc::new(env);

        let registrar = EnvironmentRegistrar::new(env.clone()).with_separator(';');
        let pipeline = InstallPipeline::new(
            config_source.clone(),
            downloader.clone(),
            extractor.clone(),
            registrar,
        )
        .with_work_dir(work_dir);

        Self {
            config_source,
            downloader,
            extractor,
            env,
            pipeline,
        }
    }

    pub fn download_calls(&self) -> usize {
        self.downloader.calls.load(Ordering::SeqCst)
    }

    pub fn extract_calls(&self) -> usize {
        self.extractor.calls.load(Ordering::SeqCst)
    }
}
