//! Core installation logic.
//!
//! This module contains:
//! - Orchestrator: Phase sequencing, rollback and completion
//! - Registrar: Persistent variable and PATH updates
//! - Integrity: Block-wise artifact digests
//! - Cancel / Observer: Run control and event delivery

pub mod cancel;
pub mod error;
pub mod integrity;
pub mod observer;
pub mod orchestrator;
pub mod registrar;

// Re-export commonly used types
pub use cancel::CancelSignal;
pub use error::{ConfigError, InstallError};
pub use integrity::{digest_file, digests_match, DigestAlgorithm};
pub use observer::{ChannelObserver, Observer, PipelineEvent, RecordingObserver};
pub use orchestrator::{ConfigRequest, InstallHandle, InstallPipeline, DEFAULT_PROGRESS_STEP};
pub use registrar::{merge_path_entries, normalize_entry, EnvironmentRegistrar, PathUpdate};
