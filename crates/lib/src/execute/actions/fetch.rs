//! Source archive downloads.
//!
//! Downloads go to `<dest>.partial` and are renamed into place only after the body has been
//! fully written and the optional SHA256 pin verified, so an interrupted fetch never leaves
//! a file that looks complete.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::ActionError;
use crate::config::FetchSettings;
use crate::consts::PARTIAL_SUFFIX;

/// HTTP(S) and `file://` downloader with bounded retry.
#[derive(Debug, Clone)]
pub struct Fetcher {
  client: reqwest::Client,
  settings: FetchSettings,
}

/// A failed attempt and whether trying again could help.
struct AttemptError {
  error: ActionError,
  transient: bool,
}

impl AttemptError {
  fn fatal(error: ActionError) -> Self {
    Self { error, transient: false }
  }
}

impl Fetcher {
  pub fn new(settings: &FetchSettings) -> Result<Self, ActionError> {
    let client = reqwest::Client::builder()
      .timeout(settings.timeout)
      .build()
      .map_err(|e| ActionError::FetchFailed {
        url: String::new(),
        message: format!("failed to build HTTP client: {}", e),
      })?;

    Ok(Self {
      client,
      settings: settings.clone(),
    })
  }

  /// Download `url` to `dest`, verifying `expected_sha256` when given.
  pub async fn fetch(&self, url: &str, expected_sha256: Option<&str>, dest: &Path) -> Result<(), ActionError> {
    info!(url = %url, dest = ?dest, "fetching URL");

    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(dest);

    let mut attempt: u32 = 0;
    loop {
      match self.try_fetch(url, &partial).await {
        Ok(()) => break,
        Err(failure) if failure.transient && attempt < self.settings.retries => {
          let delay = self.settings.backoff.saturating_mul(1u32 << attempt.min(16));
          warn!(url = %url, attempt = attempt + 1, delay = ?delay, error = %failure.error, "download failed, retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(failure) => {
          let _ = fs::remove_file(&partial).await;
          return Err(failure.error);
        }
      }
    }

    if let Some(expected) = expected_sha256 {
      let actual = hash_file(&partial).await?;
      if !actual.eq_ignore_ascii_case(expected) {
        let _ = fs::remove_file(&partial).await;
        return Err(ActionError::HashMismatch {
          url: url.to_string(),
          expected: expected.to_string(),
          actual,
        });
      }
      debug!(sha256 = %actual, "hash verified");
    }

    fs::rename(&partial, dest).await?;
    info!(path = ?dest, "download complete");
    Ok(())
  }

  async fn try_fetch(&self, url: &str, partial: &Path) -> Result<(), AttemptError> {
    if let Some(source) = url.strip_prefix("file://") {
      return fs::copy(source, partial).await.map(|_| ()).map_err(|e| {
        AttemptError::fatal(ActionError::FetchFailed {
          url: url.to_string(),
          message: e.to_string(),
        })
      });
    }

    let failed = |message: String, transient: bool| AttemptError {
      error: ActionError::FetchFailed {
        url: url.to_string(),
        message,
      },
      transient,
    };

    let mut response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| failed(e.to_string(), e.is_timeout() || e.is_connect() || e.is_request()))?;

    let status = response.status();
    if !status.is_success() {
      let transient = status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
      return Err(failed(format!("HTTP {}", status), transient));
    }

    let mut file = fs::File::create(partial)
      .await
      .map_err(|e| AttemptError::fatal(e.into()))?;
    let mut size = 0usize;
    while let Some(chunk) = response
      .chunk()
      .await
      .map_err(|e| failed(e.to_string(), e.is_timeout() || e.is_body()))?
    {
      size += chunk.len();
      file.write_all(&chunk).await.map_err(|e| AttemptError::fatal(e.into()))?;
    }
    file.flush().await.map_err(|e| AttemptError::fatal(e.into()))?;

    debug!(url = %url, size, "body received");
    Ok(())
  }
}

/// `<dest>.partial`
fn partial_path(dest: &Path) -> PathBuf {
  let mut name = dest.file_name().unwrap_or_default().to_os_string();
  name.push(".");
  name.push(PARTIAL_SUFFIX);
  dest.with_file_name(name)
}

/// Compute SHA256 hash of a file.
pub async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
  let bytes = fs::read(path).await?;
  Ok(hash_bytes(&bytes))
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}
