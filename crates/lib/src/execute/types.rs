//! Types for stage execution.
//!
//! This module defines the stage vocabulary, the error taxonomy every stage reports through,
//! and the per-node and per-run results of executing the stage graph.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::target::{SdkKey, TargetKey};

/// One step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  Download,
  Unpack,
  Configure,
  Compile,
  Install,
  Merge,
  Package,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Download => "download",
      Stage::Unpack => "unpack",
      Stage::Configure => "configure",
      Stage::Compile => "compile",
      Stage::Install => "install",
      Stage::Merge => "merge",
      Stage::Package => "package",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Names the product, OS, SDK, architecture and stage an outcome belongs to.
///
/// Download nodes carry only the product; merge and package nodes stop at the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StageLabel {
  pub product: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub os: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sdk: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub arch: Option<String>,
  pub stage: Stage,
}

impl StageLabel {
  pub fn product(product: &str, stage: Stage) -> Self {
    Self {
      product: product.to_string(),
      os: None,
      sdk: None,
      arch: None,
      stage,
    }
  }

  pub fn target(key: &TargetKey, stage: Stage) -> Self {
    Self {
      product: key.product.clone(),
      os: Some(key.os.clone()),
      sdk: Some(key.sdk.clone()),
      arch: Some(key.arch.clone()),
      stage,
    }
  }

  pub fn sdk(key: &SdkKey, stage: Stage) -> Self {
    Self {
      product: key.product.clone(),
      os: Some(key.os.clone()),
      sdk: Some(key.sdk.clone()),
      arch: None,
      stage,
    }
  }
}

impl fmt::Display for StageLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.product)?;
    if let Some(os) = &self.os {
      write!(f, "/{}", os)?;
    }
    match (&self.sdk, &self.arch) {
      (Some(sdk), Some(arch)) => write!(f, "/{}.{}", sdk, arch)?,
      (Some(sdk), None) => write!(f, "/{}", sdk)?,
      _ => {}
    }
    write!(f, ":{}", self.stage)
  }
}

/// A stage failure. Every variant names where it happened; per-target stages also name the log.
#[derive(Debug, Error)]
pub enum StageError {
  #[error("{label}: failed to download {version} from {url}: {message}")]
  Download {
    label: StageLabel,
    version: String,
    url: String,
    message: String,
  },

  #[error("{label}: patch {} failed (log: {})", patch.display(), log.display())]
  Patch {
    label: StageLabel,
    patch: PathBuf,
    log: PathBuf,
  },

  #[error("{label}: unpack failed: {message} (log: {})", log.display())]
  Unpack {
    label: StageLabel,
    message: String,
    log: PathBuf,
  },

  #[error("{label}: configure failed: {message} (log: {})", log.display())]
  Configure {
    label: StageLabel,
    message: String,
    log: PathBuf,
  },

  #[error("{label}: compile failed: {message} (log: {})", log.display())]
  Compile {
    label: StageLabel,
    message: String,
    log: PathBuf,
  },

  #[error("{label}: install failed: {message} (log: {})", log.display())]
  Install {
    label: StageLabel,
    message: String,
    log: PathBuf,
  },

  #[error("{label}: missing {arch} artifact {}", path.display())]
  MissingArtifact {
    label: StageLabel,
    arch: String,
    path: PathBuf,
  },

  #[error("{label}: missing input {}", path.display())]
  MissingInput { label: StageLabel, path: PathBuf },

  #[error("{label}: merge failed: {message}")]
  Merge { label: StageLabel, message: String },

  #[error("{label}: packaging failed: {message}")]
  Package { label: StageLabel, message: String },

  #[error("{label}: stage task panicked: {message}")]
  Panicked { label: StageLabel, message: String },

  #[error("{label}: {context}: {source}")]
  Io {
    label: StageLabel,
    context: String,
    #[source]
    source: std::io::Error,
  },
}

impl StageError {
  pub fn io(label: &StageLabel, context: impl Into<String>, source: std::io::Error) -> Self {
    StageError::Io {
      label: label.clone(),
      context: context.into(),
      source,
    }
  }

  pub fn label(&self) -> &StageLabel {
    match self {
      StageError::Download { label, .. }
      | StageError::Patch { label, .. }
      | StageError::Unpack { label, .. }
      | StageError::Configure { label, .. }
      | StageError::Compile { label, .. }
      | StageError::Install { label, .. }
      | StageError::MissingArtifact { label, .. }
      | StageError::MissingInput { label, .. }
      | StageError::Merge { label, .. }
      | StageError::Package { label, .. }
      | StageError::Panicked { label, .. }
      | StageError::Io { label, .. } => label,
    }
  }

  /// The stage log holding the failing tool's output, when there is one.
  pub fn log(&self) -> Option<&Path> {
    match self {
      StageError::Patch { log, .. }
      | StageError::Unpack { log, .. }
      | StageError::Configure { log, .. }
      | StageError::Compile { log, .. }
      | StageError::Install { log, .. } => Some(log),
      _ => None,
    }
  }

  /// Short name of the error kind, used in reports.
  pub fn kind(&self) -> &'static str {
    match self {
      StageError::Download { .. } => "download",
      StageError::Patch { .. } => "patch",
      StageError::Unpack { .. } => "unpack",
      StageError::Configure { .. } => "configure",
      StageError::Compile { .. } => "compile",
      StageError::Install { .. } => "install",
      StageError::MissingArtifact { .. } => "missing-artifact",
      StageError::MissingInput { .. } => "missing-input",
      StageError::Merge { .. } => "merge",
      StageError::Package { .. } => "package",
      StageError::Panicked { .. } => "panic",
      StageError::Io { .. } => "io",
    }
  }
}

/// Identifies the failed node that caused another node to be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDependency(pub StageLabel);

impl fmt::Display for FailedDependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Graph-level errors that prevent execution from starting.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("dependency cycle detected")]
  CycleDetected,

  #[error("stage node not found: {0}")]
  NodeNotFound(String),
}

/// What happened to one node of the stage graph.
#[derive(Debug)]
pub enum NodeOutcome {
  /// Output already up to date; nothing ran.
  Fresh,
  /// The stage ran and produced its output.
  Built,
  /// Dry run only: the stage would run.
  Pending,
  Failed(StageError),
  Skipped(FailedDependency),
}

impl NodeOutcome {
  pub fn is_failure(&self) -> bool {
    matches!(self, NodeOutcome::Failed(_) | NodeOutcome::Skipped(_))
  }
}

#[derive(Debug)]
pub struct NodeReport {
  pub label: StageLabel,
  pub outcome: NodeOutcome,
  pub elapsed: Duration,
}

/// Per-product counts of node outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductSummary {
  pub product: String,
  pub built: usize,
  pub fresh: usize,
  pub pending: usize,
  pub failed: usize,
  pub skipped: usize,
}

impl ProductSummary {
  pub fn is_success(&self) -> bool {
    self.failed == 0 && self.skipped == 0
  }
}

/// Result of executing the whole stage graph.
#[derive(Debug, Default)]
pub struct RunReport {
  pub nodes: Vec<NodeReport>,
  pub dry_run: bool,
}

impl RunReport {
  /// True when no node failed or was skipped.
  pub fn is_success(&self) -> bool {
    !self.nodes.iter().any(|n| n.outcome.is_failure())
  }

  pub fn failures(&self) -> impl Iterator<Item = &StageError> {
    self.nodes.iter().filter_map(|n| match &n.outcome {
      NodeOutcome::Failed(e) => Some(e),
      _ => None,
    })
  }

  pub fn skipped(&self) -> impl Iterator<Item = (&StageLabel, &FailedDependency)> {
    self.nodes.iter().filter_map(|n| match &n.outcome {
      NodeOutcome::Skipped(dep) => Some((&n.label, dep)),
      _ => None,
    })
  }

  /// Labels of nodes whose stage actually ran (or would run, in a dry run).
  pub fn executed(&self) -> impl Iterator<Item = &StageLabel> {
    self
      .nodes
      .iter()
      .filter(|n| matches!(n.outcome, NodeOutcome::Built | NodeOutcome::Pending))
      .map(|n| &n.label)
  }

  pub fn outcome(&self, label: &StageLabel) -> Option<&NodeOutcome> {
    self.nodes.iter().find(|n| &n.label == label).map(|n| &n.outcome)
  }

  /// One summary per product, in order of first appearance.
  pub fn products(&self) -> Vec<ProductSummary> {
    let mut summaries: Vec<ProductSummary> = Vec::new();

    for node in &self.nodes {
      let index = match summaries.iter().position(|s| s.product == node.label.product) {
        Some(index) => index,
        None => {
          summaries.push(ProductSummary {
            product: node.label.product.clone(),
            ..Default::default()
          });
          summaries.len() - 1
        }
      };

      let summary = &mut summaries[index];
      match node.outcome {
        NodeOutcome::Fresh => summary.fresh += 1,
        NodeOutcome::Built => summary.built += 1,
        NodeOutcome::Pending => summary.pending += 1,
        NodeOutcome::Failed(_) => summary.failed += 1,
        NodeOutcome::Skipped(_) => summary.skipped += 1,
      }
    }

    summaries
  }
}

/// Configuration for stage execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of stages running at once.
  pub parallelism: usize,

  /// Report what would run without running it.
  pub dry_run: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      dry_run: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
