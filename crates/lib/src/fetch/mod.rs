//! Artifact fetching and verification.
//!
//! The fetcher is the integrity gate of the engine. An artifact is written to
//! the download cache only after its digest matched the formula's declared
//! digest, so nothing downstream ever sees unverified bytes.

pub mod transport;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT, RETRY_DELAY_MS};
use crate::formula::{Formula, IntegrityDigest};
use crate::platform::paths::cache_dir;
use crate::util::hash::{hash_bytes, hash_file};

pub use transport::{DefaultTransport, Transport, TransportError};

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("failed to fetch {url} after {attempts} attempt(s): {source}")]
  Transport {
    url: String,
    attempts: u32,
    #[source]
    source: TransportError,
  },

  #[error("integrity mismatch for {url}: expected {expected}, got {actual}")]
  IntegrityMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("failed to store download {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
  /// Upper bound for a single attempt.
  pub timeout: Duration,
  /// Retries after the first failed attempt. Only transient failures are retried.
  pub retries: u32,
  /// Base backoff, multiplied by the attempt number.
  pub retry_delay: Duration,
  pub download_dir: PathBuf,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      timeout: DEFAULT_FETCH_TIMEOUT,
      retries: DEFAULT_FETCH_RETRIES,
      retry_delay: Duration::from_millis(RETRY_DELAY_MS),
      download_dir: cache_dir().join("downloads"),
    }
  }
}

/// A verified artifact in the download cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedArtifact {
  pub path: PathBuf,
  pub digest: IntegrityDigest,
  pub size: u64,
  /// Served from the cache without touching the transport.
  pub cached: bool,
}

pub struct Fetcher {
  transport: Arc<dyn Transport>,
  options: FetchOptions,
}

impl Fetcher {
  pub fn new(transport: Arc<dyn Transport>, options: FetchOptions) -> Self {
    Self { transport, options }
  }

  pub fn options(&self) -> &FetchOptions {
    &self.options
  }

  /// Cache location of the artifact for `formula`.
  pub fn artifact_path(&self, formula: &Formula) -> PathBuf {
    let digest = &formula.digest;
    self
      .options
      .download_dir
      .join(format!("{}-{}", digest.algorithm, digest.hex))
      .join(url_to_filename(&formula.url))
  }

  /// Fetch and verify the source artifact of `formula`.
  pub async fn fetch(&self, formula: &Formula) -> Result<FetchedArtifact, FetchError> {
    let url = &formula.url;
    let digest = &formula.digest;
    let dest_path = self.artifact_path(formula);

    if let Some(artifact) = self.cached(&dest_path, digest).await {
      info!(formula = %formula.name, path = %dest_path.display(), "using cached artifact");
      return Ok(artifact);
    }

    info!(formula = %formula.name, url = %url, "fetching artifact");
    let bytes = self.download(url).await?;

    // Verify before anything is written
    let actual = hash_bytes(digest.algorithm, &bytes);
    if !digest.matches(&actual) {
      warn!(formula = %formula.name, url = %url, expected = %digest.hex, actual = %actual, "integrity mismatch");
      return Err(FetchError::IntegrityMismatch {
        url: url.clone(),
        expected: digest.to_string(),
        actual: format!("{}:{}", digest.algorithm, actual),
      });
    }

    let io_err = |path: &Path| {
      let path = path.to_path_buf();
      move |source| FetchError::Io { path, source }
    };

    if let Some(parent) = dest_path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }

    // Write to a temporary file first, then rename into place
    let temp_path = dest_path.with_extension("part");
    tokio::fs::write(&temp_path, &bytes).await.map_err(io_err(&temp_path))?;
    tokio::fs::rename(&temp_path, &dest_path).await.map_err(io_err(&dest_path))?;

    info!(formula = %formula.name, path = %dest_path.display(), size = bytes.len(), "artifact verified");

    Ok(FetchedArtifact {
      path: dest_path,
      digest: digest.clone(),
      size: bytes.len() as u64,
      cached: false,
    })
  }

  /// Return the cached artifact if its digest still matches.
  ///
  /// A cached file that fails verification is discarded.
  async fn cached(&self, path: &Path, digest: &IntegrityDigest) -> Option<FetchedArtifact> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    debug!(path = %path.display(), "checking cached artifact");

    match hash_file(digest.algorithm, path).await {
      Ok(actual) if digest.matches(&actual) => Some(FetchedArtifact {
        path: path.to_path_buf(),
        digest: digest.clone(),
        size: metadata.len(),
        cached: true,
      }),
      Ok(actual) => {
        debug!(expected = %digest.hex, actual = %actual, "cached artifact digest mismatch, re-downloading");
        let _ = tokio::fs::remove_file(path).await;
        None
      }
      Err(e) => {
        debug!(error = %e, "failed to read cached artifact");
        None
      }
    }
  }

  async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 0;
    loop {
      attempt += 1;

      let result = match tokio::time::timeout(self.options.timeout, self.transport.get(url)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout),
      };

      match result {
        Ok(bytes) => return Ok(bytes),
        Err(e) if e.is_transient() && attempt <= self.options.retries => {
          warn!(url = %url, attempt, error = %e, "fetch attempt failed, retrying");
          tokio::time::sleep(self.options.retry_delay * attempt).await;
        }
        Err(source) => {
          return Err(FetchError::Transport {
            url: url.to_string(),
            attempts: attempt,
            source,
          });
        }
      }
    }
  }
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to a hash of
/// the URL if no suitable filename can be extracted.
pub fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split(['?', '#']).next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let hash = hash_bytes(crate::formula::DigestAlgorithm::Sha256, url.as_bytes());
  format!("download_{}", &hash[..16])
}
