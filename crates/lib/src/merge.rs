//! Fat-binary merger.
//!
//! Combines the installed libraries of every architecture of one (product, OS, SDK) into one
//! multi-architecture library per file name and copies the headers of the first
//! architecture. Nothing is written unless every constituent is present.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::consts::PARTIAL_SUFFIX;
use crate::driver::{StagePaths, StageStatus};
use crate::execute::types::{Stage, StageError, StageLabel};
use crate::registry::Product;
use crate::target::{BuildTarget, SdkGroup};
use crate::toolchain::FatBinaryCombiner;

pub const LIB_DIR: &str = "lib";
pub const INCLUDE_DIR: &str = "include";

/// Merged library `name` of `group`.
pub fn merged_library(group: &SdkGroup, name: &str) -> PathBuf {
  group.merge_dir.join(LIB_DIR).join(name)
}

pub fn merge_paths(product: &Product, group: &SdkGroup) -> StagePaths {
  let mut outputs: Vec<PathBuf> = product.libraries.iter().map(|lib| merged_library(group, lib)).collect();
  outputs.push(group.merge_dir.join(INCLUDE_DIR));

  let mut inputs: Vec<PathBuf> = group
    .targets
    .iter()
    .flat_map(|target| constituents(product, target))
    .collect();
  if let Some(first) = group.targets.first() {
    inputs.push(first.install_dir.join(INCLUDE_DIR));
  }

  StagePaths { outputs, inputs }
}

/// Installed libraries of one architecture followed by its install marker.
fn constituents(product: &Product, target: &BuildTarget) -> Vec<PathBuf> {
  let mut paths: Vec<PathBuf> = product.libraries.iter().map(|lib| target.installed_library(lib)).collect();
  paths.push(target.installed_marker());
  paths
}

/// First missing constituent, checked architecture by architecture in declaration order.
fn missing_constituent(product: &Product, group: &SdkGroup) -> Option<(String, PathBuf)> {
  for target in &group.targets {
    if let Some(path) = constituents(product, target).into_iter().find(|p| !p.exists()) {
      return Some((target.key.arch.clone(), path));
    }
  }

  let first = group.targets.first()?;
  let headers = first.install_dir.join(INCLUDE_DIR);
  (!headers.is_dir()).then(|| (first.key.arch.clone(), headers))
}

pub async fn merge(
  product: &Product,
  group: &SdkGroup,
  combiner: Arc<dyn FatBinaryCombiner>,
) -> Result<StageStatus, StageError> {
  let label = StageLabel::sdk(&group.key, Stage::Merge);

  if let Some((arch, path)) = missing_constituent(product, group) {
    return Err(StageError::MissingArtifact { label, arch, path });
  }
  if merge_paths(product, group).is_fresh() {
    return Ok(StageStatus::Fresh);
  }

  info!(sdk = %group.key, archs = ?group.archs(), "merging");
  let product = product.clone();
  let group = group.clone();
  tokio::task::spawn_blocking(move || merge_blocking(&product, &group, combiner.as_ref()))
    .await
    .map_err(|e| StageError::Merge {
      label: label.clone(),
      message: e.to_string(),
    })??;

  Ok(StageStatus::Built)
}

fn merge_blocking(product: &Product, group: &SdkGroup, combiner: &dyn FatBinaryCombiner) -> Result<(), StageError> {
  let label = StageLabel::sdk(&group.key, Stage::Merge);
  let lib_dir = group.merge_dir.join(LIB_DIR);
  fs::create_dir_all(&lib_dir).map_err(|e| StageError::io(&label, "failed to create merge directory", e))?;

  for lib in &product.libraries {
    let inputs: Vec<PathBuf> = group.targets.iter().map(|t| t.installed_library(lib)).collect();
    let output = merged_library(group, lib);
    let partial = with_partial_suffix(&output);

    let _ = fs::remove_file(&partial);
    combiner.combine(&inputs, &partial).map_err(|e| StageError::Merge {
      label: label.clone(),
      message: format!("{}: {}", lib, e),
    })?;
    fs::rename(&partial, &output).map_err(|e| StageError::io(&label, "failed to move merged library", e))?;
    debug!(library = %lib, inputs = inputs.len(), "merged");
  }

  // Headers are taken from the first architecture as-is.
  let Some(first) = group.targets.first() else {
    return Ok(());
  };
  let include = group.merge_dir.join(INCLUDE_DIR);
  let staging = with_partial_suffix(&include);
  if staging.exists() {
    fs::remove_dir_all(&staging).map_err(|e| StageError::io(&label, "failed to clear header staging", e))?;
  }
  copy_tree(&first.install_dir.join(INCLUDE_DIR), &staging)
    .map_err(|e| StageError::io(&label, "failed to copy headers", e))?;
  if include.exists() {
    fs::remove_dir_all(&include).map_err(|e| StageError::io(&label, "failed to remove old headers", e))?;
  }
  fs::rename(&staging, &include).map_err(|e| StageError::io(&label, "failed to move headers", e))?;

  Ok(())
}

fn with_partial_suffix(path: &Path) -> PathBuf {
  let mut name = path.file_name().unwrap_or_default().to_os_string();
  name.push(".");
  name.push(PARTIAL_SUFFIX);
  path.with_file_name(name)
}

/// Recursively copy `src` to `dst`, keeping symlinks as symlinks.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
  for entry in WalkDir::new(src).follow_links(false) {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = dst.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      #[cfg(unix)]
      std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
      #[cfg(not(unix))]
      fs::copy(entry.path(), &target)?;
    } else {
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}
