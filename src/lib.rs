//! runtime-installer - Portable runtime bootstrapper
//!
//! Fetches a JSON descriptor, downloads the archive it names, verifies
//! its SHA-256 digest, unpacks it with an external 7-Zip compatible
//! archiver and registers the result in the user's persistent
//! environment (a named variable plus PATH entries).
//!
//! # Architecture
//!
//! A single orchestrator drives the run as a forward-only state machine:
//! - Each stage sits behind a trait in `adapters` so it can be faked
//! - Cancellation is cooperative and checked between every stage
//! - Progress and the final outcome are delivered through an `Observer`
//!
//! # Modules
//!
//! - `adapters`: External collaborators (HTTP, archiver, environment)
//! - `core`: Orchestration logic (InstallPipeline, Registrar, Integrity)
//! - `domain`: Data structures (InstallConfig, ProgressEvent, Completion)
//! - `config`: Installer settings
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Install with the stock descriptor
//! runtime-installer install
//!
//! # Install somewhere else
//! runtime-installer install --dest D:/tools/runtime --env-var MYRUNTIME
//!
//! # Inspect the descriptor
//! runtime-installer show-config
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{CancelSignal, ConfigRequest, InstallError, InstallHandle, InstallPipeline};
pub use domain::{Completion, ConfigOverrides, InstallConfig, Phase, ProgressEvent};
