//! HTTP adapters backed by reqwest.
//!
//! `HttpConfigLoader` fetches the JSON descriptor through a transient
//! file; `HttpDownloader` streams the artifact chunk by chunk.

use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{ConfigSource, Downloader, ProgressFn};
use crate::core::cancel::CancelSignal;
use crate::core::error::{ConfigError, InstallError};
use crate::domain::InstallConfig;

/// Render a reqwest error together with its underlying cause
fn describe(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    if err.is_timeout() {
        text.push_str(" (timed out)");
    }
    text
}

/// Loads installation descriptors over HTTP(S)
pub struct HttpConfigLoader {
    client: reqwest::Client,
    /// Where the transient descriptor file is created
    work_dir: PathBuf,
}

impl HttpConfigLoader {
    pub fn new(user_agent: &str, timeout: Duration, work_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for config loading")?;

        Ok(Self {
            client,
            work_dir: work_dir.into(),
        })
    }

    async fn fetch_and_parse(&self, url: &str, path: &Path) -> Result<InstallConfig, ConfigError> {
        let fetch_error = |reason: String| ConfigError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("server returned HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(describe(&e)))?;

        tokio::fs::write(path, &body)
            .await
            .map_err(|e| fetch_error(format!("write {}: {}", path.display(), e)))?;

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| fetch_error(format!("read {}: {}", path.display(), e)))?;

        InstallConfig::from_json_slice(&content)
    }
}

#[async_trait]
impl ConfigSource for HttpConfigLoader {
    async fn load(&self, url: &str) -> Result<InstallConfig, ConfigError> {
        info!(%url, "Loading configuration");

        let temp = tempfile::Builder::new()
            .prefix("runtime-config-")
            .suffix(".json")
            .tempfile_in(&self.work_dir)
            .map_err(|e| ConfigError::Fetch {
                url: url.to_string(),
                reason: format!("cannot create temporary file: {}", e),
            })?
            .into_temp_path();

        let result = self.fetch_and_parse(url, &temp).await;

        // Released on every path, including parse and validation failures
        let temp_display = temp.display().to_string();
        match temp.close() {
            Ok(()) => debug!(path = %temp_display, "Cleaned up temporary config file"),
            Err(e) => {
                warn!(path = %temp_display, error = %e, "Could not remove temporary config file")
            }
        }

        result
    }
}

/// Streams artifacts to disk
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Only the connect phase is bounded; large artifacts may take a while
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to build HTTP client for downloads")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: ProgressFn<'_>,
        cancel: &CancelSignal,
    ) -> Result<u64, InstallError> {
        cancel.check()?;

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| InstallError::Network(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::Network(format!(
                "server returned HTTP {} for {}",
                status, url
            )));
        }

        let total = response.content_length();
        debug!(%url, ?total, "Download started");

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| InstallError::io(dest, &e))?;

        let mut done = 0u64;
        on_progress(done, total);

        loop {
            cancel.check()?;
            let chunk = match response
                .chunk()
                .await
                .map_err(|e| InstallError::Network(describe(&e)))?
            {
                Some(chunk) => chunk,
                None => break,
            };

            cancel.check()?;
            file.write_all(&chunk)
                .await
                .map_err(|e| InstallError::io(dest, &e))?;

            done += chunk.len() as u64;
            on_progress(done, total);
        }

        file.flush().await.map_err(|e| InstallError::io(dest, &e))?;

        if let Some(expected) = total {
            if done < expected {
                return Err(InstallError::Network(format!(
                    "connection closed after {} of {} bytes",
                    done, expected
                )));
            }
        }

        info!(bytes = done, path = %dest.display(), "Download complete");
        Ok(done)
    }
}
