//! Artifact transport.
//!
//! The fetcher never talks to the network directly. It goes through a
//! [`Transport`], so tests and embedders can inject their own.

use std::io;

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("network error: {0}")]
  Network(String),

  #[error("request timed out")]
  Timeout,

  #[error("server responded with HTTP {status}")]
  Status { status: u16 },

  #[error("invalid URL `{0}`")]
  InvalidUrl(String),

  #[error("unsupported URL scheme `{0}`")]
  UnsupportedScheme(String),

  #[error(transparent)]
  Io(#[from] io::Error),
}

impl TransportError {
  /// Whether retrying the same request may succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      TransportError::Network(_) | TransportError::Timeout => true,
      TransportError::Status { status } => *status >= 500 || *status == 429,
      TransportError::InvalidUrl(_) | TransportError::UnsupportedScheme(_) | TransportError::Io(_) => false,
    }
  }
}

impl From<reqwest::Error> for TransportError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      TransportError::Timeout
    } else if let Some(status) = e.status() {
      TransportError::Status {
        status: status.as_u16(),
      }
    } else {
      TransportError::Network(e.to_string())
    }
  }
}

/// Retrieves the raw bytes behind a URL.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// `http`/`https` through reqwest, `file` from the local filesystem.
#[derive(Debug, Clone)]
pub struct DefaultTransport {
  client: reqwest::Client,
}

impl DefaultTransport {
  pub fn new() -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("keg/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for DefaultTransport {
  async fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
    let parsed = Url::parse(url).map_err(|_| TransportError::InvalidUrl(url.to_string()))?;

    match parsed.scheme() {
      "file" => {
        let path = parsed
          .to_file_path()
          .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
        debug!(path = %path.display(), "reading local artifact");
        Ok(tokio::fs::read(&path).await?)
      }
      "http" | "https" => {
        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
          return Err(TransportError::Status {
            status: status.as_u16(),
          });
        }
        Ok(response.bytes().await?.to_vec())
      }
      other => Err(TransportError::UnsupportedScheme(other.to_string())),
    }
  }
}
