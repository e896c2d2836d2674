//! Timestamp-based freshness.
//!
//! An output is fresh when it exists and is not older than every one of its declared inputs.
//! A missing input makes the output stale, so the stage that produces the input runs first.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Modification time of `path`, or `None` if it cannot be read.
pub fn modified(path: &Path) -> Option<SystemTime> {
  fs::metadata(path).and_then(|m| m.modified()).ok()
}

pub fn is_fresh<P: AsRef<Path>>(output: &Path, inputs: &[P]) -> bool {
  let Some(output_time) = modified(output) else {
    trace!(output = ?output, "output missing");
    return false;
  };

  inputs.iter().all(|input| match modified(input.as_ref()) {
    Some(input_time) => output_time >= input_time,
    None => {
      trace!(input = ?input.as_ref(), "input missing");
      false
    }
  })
}

/// Every output is fresh against every input.
pub fn all_fresh<O: AsRef<Path>, I: AsRef<Path>>(outputs: &[O], inputs: &[I]) -> bool {
  !outputs.is_empty() && outputs.iter().all(|output| is_fresh(output.as_ref(), inputs))
}

/// Set the modification time of an existing file to now.
pub fn touch(path: &Path) -> io::Result<()> {
  File::options().write(true).open(path)?.set_modified(SystemTime::now())
}

/// Content of an inert completion marker.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageMarker {
  /// Marker format version.
  pub version: u32,
  pub status: String,
  pub stage: String,
  pub target: String,
}

/// Write a completion marker for `stage` of `target`.
pub fn write_marker(path: &Path, stage: &str, target: &str) -> io::Result<()> {
  let marker = StageMarker {
    version: 1,
    status: "complete".to_string(),
    stage: stage.to_string(),
    target: target.to_string(),
  };
  let content = serde_json::to_string(&marker).map_err(io::Error::other)?;
  fs::write(path, format!("{}\n", content))
}

/// Read a completion marker; `None` when absent or unreadable.
pub fn read_marker(path: &Path) -> Option<StageMarker> {
  let content = fs::read_to_string(path).ok()?;
  serde_json::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;
  use std::time::Duration;

  use super::*;
  use tempfile::TempDir;

  fn write_at(path: &Path, age: Duration) {
    fs::write(path, "x").unwrap();
    File::options()
      .write(true)
      .open(path)
      .unwrap()
      .set_modified(SystemTime::now() - age)
      .unwrap();
  }

  #[test]
  fn missing_output_is_stale() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in");
    write_at(&input, Duration::ZERO);
    assert!(!is_fresh(&temp.path().join("out"), &[&input]));
  }

  #[test]
  fn missing_input_is_stale() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("out");
    write_at(&output, Duration::ZERO);
    assert!(!is_fresh(&output, &[temp.path().join("in")]));
  }

  #[test]
  fn older_output_is_stale() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in");
    let output = temp.path().join("out");
    write_at(&output, Duration::from_secs(60));
    write_at(&input, Duration::ZERO);
    assert!(!is_fresh(&output, &[&input]));
  }

  #[test]
  fn newer_output_is_fresh() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in");
    let output = temp.path().join("out");
    write_at(&input, Duration::from_secs(60));
    write_at(&output, Duration::ZERO);
    assert!(is_fresh(&output, &[&input]));
  }

  #[test]
  fn no_inputs_means_existence_is_enough() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("out");
    write_at(&output, Duration::from_secs(3600));
    assert!(is_fresh::<PathBuf>(&output, &[]));
  }

  #[test]
  fn all_fresh_requires_outputs() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in");
    write_at(&input, Duration::ZERO);
    assert!(!all_fresh::<PathBuf, _>(&[], &[&input]));
  }

  #[test]
  fn touch_makes_output_fresh_again() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("in");
    let output = temp.path().join("out");
    write_at(&output, Duration::from_secs(60));
    write_at(&input, Duration::from_secs(30));
    assert!(!is_fresh(&output, &[&input]));

    touch(&output).unwrap();
    assert!(is_fresh(&output, &[&input]));
  }

  #[test]
  fn marker_roundtrip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(".marker");
    write_marker(&path, "configure", "OpenSSL/iOS/iphoneos.arm64").unwrap();

    let marker = read_marker(&path).unwrap();
    assert_eq!(marker.status, "complete");
    assert_eq!(marker.stage, "configure");
    assert!(read_marker(&temp.path().join("missing")).is_none());
  }
}
