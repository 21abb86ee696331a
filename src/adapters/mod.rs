//! Adapter interfaces for the external collaborators of a run.
//!
//! Each pipeline stage that touches the outside world (HTTP, the
//! archiver process, the persistent environment) sits behind one of
//! these traits so the orchestrator can be driven by fakes in tests.

pub mod archiver;
pub mod environment;
pub mod http;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::cancel::CancelSignal;
use crate::core::error::{ConfigError, InstallError};
use crate::domain::InstallConfig;

// Re-export the concrete adapters
pub use archiver::{locate_archiver, ArchiverExtractor, ArchiverProbe};
pub use environment::CommandEnvBackend;
pub use http::{HttpConfigLoader, HttpDownloader};

/// Progress callback: `(bytes_done, bytes_total)`
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u64, Option<u64>) + Send);

/// Receives one line of archiver output at a time
pub type LineFn<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Source of installation descriptors
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch and validate the descriptor at `url`
    async fn load(&self, url: &str) -> Result<InstallConfig, ConfigError>;
}

/// Streams a remote resource to a local file
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// A cancelled transfer leaves any partial file in place.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: ProgressFn<'_>,
        cancel: &CancelSignal,
    ) -> Result<u64, InstallError>;
}

/// Unpacks an archive and locates the runtime executable inside it
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract `archive` into `dest_dir` and return the executable path
    /// under `dest_dir/exe_relative_path`.
    async fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
        exe_relative_path: &Path,
        cancel: &CancelSignal,
        on_line: LineFn<'_>,
    ) -> Result<PathBuf, InstallError>;
}

/// Platform mechanism for persistent user-scoped variables
#[async_trait]
pub trait EnvBackend: Send + Sync {
    /// Name of the PATH-like variable in this environment
    fn path_var(&self) -> &str {
        "Path"
    }

    /// Durably set `name = value` for the current user
    async fn set_user_var(&self, name: &str, value: &str) -> Result<(), InstallError>;

    /// Read the persisted value of `name`, if any
    async fn user_var(&self, name: &str) -> Result<Option<String>, InstallError>;
}
