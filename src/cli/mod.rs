//! Command-line interface for runtime-installer.
//!
//! Provides commands for installing the runtime, inspecting the remote
//! descriptor, locating the archiver and showing resolved settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{locate_archiver, ArchiverProbe, ConfigSource, HttpConfigLoader};
use crate::config::{self, paths, InstallerSettings};
use crate::core::{ConfigRequest, InstallPipeline, PipelineEvent};
use crate::domain::{Completion, ConfigOverrides, Percent, ProgressEvent};

/// Exit status for a cancelled installation (128 + SIGINT)
pub const EXIT_CANCELLED: i32 = 130;

/// runtime-installer - Download, verify and register a portable runtime
#[derive(Parser, Debug)]
#[command(name = "runtime-installer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install the runtime described by the remote descriptor
    Install {
        /// Descriptor URL (defaults to the configured one)
        #[arg(long)]
        config_url: Option<String>,

        /// Override the archive URL from the descriptor
        #[arg(long)]
        archive_url: Option<String>,

        /// Override the destination directory
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Override the environment variable name
        #[arg(short, long)]
        env_var: Option<String>,
    },

    /// Fetch and print the installation descriptor
    ShowConfig {
        /// Descriptor URL (defaults to the configured one)
        #[arg(long)]
        config_url: Option<String>,
    },

    /// Show where the archiver is looked up and which one would be used
    LocateArchiver,

    /// Show resolved installer settings (debug)
    Settings,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Install {
                config_url,
                archive_url,
                dest,
                env_var,
            } => {
                let overrides = ConfigOverrides {
                    artifact_url: archive_url,
                    destination_dir: dest,
                    env_var_name: env_var,
                };
                install(config_url, overrides).await
            }
            Commands::ShowConfig { config_url } => show_config(config_url).await,
            Commands::LocateArchiver => show_archiver(),
            Commands::Settings => show_settings(),
        }
    }
}

/// Explicit archiver from settings, otherwise the probe result
fn resolve_archiver(settings: &InstallerSettings) -> Result<PathBuf> {
    if let Some(ref archiver) = settings.archiver {
        if !archiver.is_file() {
            anyhow::bail!("Configured archiver not found: {}", archiver.display());
        }
        return Ok(archiver.clone());
    }

    let probe = ArchiverProbe::platform_default(paths::program_dir()?);
    Ok(locate_archiver(&probe)?)
}

/// Run an installation, printing events as they arrive
async fn install(config_url: Option<String>, overrides: ConfigOverrides) -> Result<()> {
    let settings = config::settings()?;

    // No run starts without an archiver
    let archiver = resolve_archiver(settings).context("Cannot install without an archiver")?;

    let pipeline = Arc::new(
        InstallPipeline::from_settings(settings, &archiver)
            .context("Failed to set up installation pipeline")?,
    );

    let url = config_url.unwrap_or_else(|| settings.config_url.clone());
    let mut handle = pipeline.spawn(ConfigRequest::Remote { url, overrides });

    let cancel = handle.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && cancel.cancel() {
            eprintln!("\nCancellation requested, stopping at the next checkpoint...");
        }
    });

    while let Some(event) = handle.next_event().await {
        match event {
            PipelineEvent::Progress(progress) => print_progress(&progress),
            PipelineEvent::Finished(completion) => print_completion(&completion),
        }
    }

    match handle.join().await {
        Completion::Succeeded | Completion::PartialSuccess { .. } => Ok(()),
        Completion::Failed { .. } => std::process::exit(1),
        Completion::Cancelled => std::process::exit(EXIT_CANCELLED),
    }
}

fn print_progress(event: &ProgressEvent) {
    match event.percent_complete {
        Percent::Known(pct) => println!("[{:>3}%] [{}] {}", pct, event.phase, event.message),
        Percent::Indeterminate => println!("[ -- ] [{}] {}", event.phase, event.message),
    }
}

fn print_completion(completion: &Completion) {
    match completion {
        Completion::Succeeded => eprintln!("\n[Installation succeeded]"),
        Completion::PartialSuccess { warning } => {
            eprintln!("\n[Installation finished with a warning: {}]", warning)
        }
        Completion::Failed { reason, detail } => {
            eprintln!("\n[Installation failed: {}]", reason);
            if let Some(detail) = detail {
                eprintln!("{}", detail);
            }
        }
        Completion::Cancelled => eprintln!("\n[Installation cancelled]"),
    }
}

/// Fetch the descriptor and print the validated snapshot
async fn show_config(config_url: Option<String>) -> Result<()> {
    let settings = config::settings()?;
    let url = config_url.unwrap_or_else(|| settings.config_url.clone());

    let loader = HttpConfigLoader::new(
        &settings.http.user_agent,
        Duration::from_secs(settings.http.config_timeout_seconds),
        &settings.work_dir,
    )?;
    let cfg = loader
        .load(&url)
        .await
        .with_context(|| format!("Failed to load descriptor from {}", url))?;

    println!("Descriptor: {}", url);
    println!();
    println!("  Archive URL:        {}", cfg.artifact_url);
    println!("  Expected SHA256:    {}", cfg.expected_digest_hex);
    println!("  Install directory:  {}", cfg.destination_dir.display());
    println!("  Variable name:      {}", cfg.env_var_name);
    println!("  Executable subdir:  {}", display_or(&cfg.exe_relative_path, "(root)"));
    println!("  Executable dir:     {}", cfg.exe_dir().display());

    Ok(())
}

fn display_or(path: &Path, empty: &str) -> String {
    if path.as_os_str().is_empty() {
        empty.to_string()
    } else {
        path.display().to_string()
    }
}

/// Print probe candidates and the chosen archiver
fn show_archiver() -> Result<()> {
    let settings = config::settings()?;

    if let Some(ref archiver) = settings.archiver {
        println!("Configured archiver: {}", archiver.display());
        println!("  exists: {}", archiver.is_file());
        return Ok(());
    }

    let probe = ArchiverProbe::platform_default(paths::program_dir()?);
    println!("Probe order:");
    for candidate in probe.candidates() {
        let mark = if candidate.is_file() { "found" } else { "missing" };
        println!("  [{}] {}", mark, candidate.display());
    }
    println!();

    match locate_archiver(&probe) {
        Ok(path) => println!("Using: {}", path.display()),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Print resolved settings
fn show_settings() -> Result<()> {
    let cfg = config::settings()?;

    println!(
        "Settings file: {}",
        cfg.settings_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Descriptor:");
    println!("  Config URL:      {}", cfg.config_url);
    println!("  Executable name: {}", cfg.executable_name);
    println!();
    println!("Paths:");
    println!("  Work dir: {}", cfg.work_dir.display());
    println!(
        "  Archiver: {}",
        cfg.archiver
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(probe)".to_string())
    );
    println!();
    println!("HTTP:");
    println!("  User agent:      {}", cfg.http.user_agent);
    println!("  Config timeout:  {}s", cfg.http.config_timeout_seconds);
    println!("  Connect timeout: {}s", cfg.http.connect_timeout_seconds);
    println!();
    println!("Extraction poll interval: {}ms", cfg.poll_interval_ms);
    println!("Progress step:            {} bytes", cfg.progress_step_bytes);

    Ok(())
}
