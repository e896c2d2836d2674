//! External collaborators: shell commands, downloads and archives.
//!
//! Every child process gets a scoped environment and appends to its stage log.

pub mod archive;
pub mod cmd;
pub mod fetch;

use std::path::PathBuf;

use thiserror::Error;

pub use archive::{create_tar_gz, unpack_tar_gz};
pub use cmd::{execute_cmd, run_program, scoped_env, shell_quote};
pub use fetch::{Fetcher, hash_bytes, hash_file};

/// Errors raised by the external-collaborator helpers.
///
/// Stages translate these into the stage error carrying the product, OS, SDK and arch.
#[derive(Debug, Error)]
pub enum ActionError {
  /// Shell command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  /// A directly spawned program exited unsuccessfully.
  #[error("{program} failed with exit code {code:?}: {stderr}")]
  ProgramFailed {
    program: String,
    code: Option<i32>,
    stderr: String,
  },

  /// HTTP request or local copy failed during a download.
  #[error("fetch failed for {url}: {message}")]
  FetchFailed { url: String, message: String },

  /// SHA256 hash mismatch after download.
  #[error("hash mismatch for {url}: expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("archive {}: {message}", path.display())]
  Archive { path: PathBuf, message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
