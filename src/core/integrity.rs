//! Content digests for downloaded artifacts.
//!
//! Files are hashed in fixed-size blocks so memory use stays bounded
//! regardless of artifact size.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::error::InstallError;

/// Block size used when reading files for hashing
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
}

impl DigestAlgorithm {
    /// Length of the hex-encoded digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => 64,
        }
    }
}

/// Compute the lowercase hex digest of a file (blocking)
pub fn digest_file(path: &Path, algorithm: DigestAlgorithm) -> Result<String, InstallError> {
    let mut file = File::open(path).map_err(|e| InstallError::io(path, &e))?;
    let mut buf = vec![0u8; BLOCK_SIZE];

    match algorithm {
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf).map_err(|e| InstallError::io(path, &e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

/// Case-insensitive hex comparison
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Hash `path` off the async runtime and compare against `expected`.
///
/// Returns the computed digest on success.
pub async fn verify(path: &Path, expected: &str) -> Result<String, InstallError> {
    let owned = path.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || digest_file(&owned, DigestAlgorithm::Sha256))
        .await
        .map_err(|e| InstallError::Io {
            path: path.to_path_buf(),
            reason: format!("hash worker failed: {}", e),
        })??;

    debug!(path = %path.display(), %actual, "Computed digest");

    if !digests_match(expected, &actual) {
        return Err(InstallError::Integrity {
            expected: expected.to_string(),
            actual,
        });
    }

    info!("Hash verification successful");
    Ok(actual)
}
