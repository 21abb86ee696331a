//! Domain types for the installer.
//!
//! - InstallConfig: validated installation parameters
//! - Events: progress updates and terminal notices
//! - Run: orchestrator-owned run state

pub mod events;
pub mod install_config;
pub mod run;

// Re-export commonly used types
pub use events::{Completion, Percent, Phase, ProgressEvent};
pub use install_config::{ConfigOverrides, InstallConfig};
pub use run::PipelineState;
