//! Packager: archives the merged `lib` and `include` trees of one (product, OS, SDK).

use std::fs;

use tempfile::NamedTempFile;
use tracing::info;

use crate::driver::{StagePaths, StageStatus};
use crate::execute::actions::create_tar_gz;
use crate::execute::types::{Stage, StageError, StageLabel};
use crate::merge::{INCLUDE_DIR, LIB_DIR, merged_library};
use crate::registry::Product;
use crate::target::SdkGroup;

pub fn package_paths(product: &Product, group: &SdkGroup) -> StagePaths {
  StagePaths {
    outputs: vec![group.package_path.clone()],
    inputs: product.libraries.iter().map(|lib| merged_library(group, lib)).collect(),
  }
}

pub async fn package(product: &Product, group: &SdkGroup) -> Result<StageStatus, StageError> {
  let label = StageLabel::sdk(&group.key, Stage::Package);

  let required = product
    .libraries
    .iter()
    .map(|lib| merged_library(group, lib))
    .chain(std::iter::once(group.merge_dir.join(INCLUDE_DIR)));
  for path in required {
    if !path.exists() {
      return Err(StageError::MissingInput { label, path });
    }
  }

  if package_paths(product, group).is_fresh() {
    return Ok(StageStatus::Fresh);
  }

  info!(sdk = %group.key, package = ?group.package_path, "packaging");
  let group = group.clone();
  let task_label = label.clone();
  tokio::task::spawn_blocking(move || write_package(&group, &task_label))
    .await
    .map_err(|e| StageError::Package {
      label: label.clone(),
      message: e.to_string(),
    })??;

  Ok(StageStatus::Built)
}

/// Write to a temporary file next to the package and rename it into place.
fn write_package(group: &SdkGroup, label: &StageLabel) -> Result<(), StageError> {
  let failed = |message: String| StageError::Package {
    label: label.clone(),
    message,
  };

  let Some(dist_dir) = group.package_path.parent() else {
    return Err(failed("package path has no parent directory".to_string()));
  };
  fs::create_dir_all(dist_dir).map_err(|e| StageError::io(label, "failed to create dist directory", e))?;

  let mut tmp = NamedTempFile::new_in(dist_dir).map_err(|e| StageError::io(label, "failed to create temp file", e))?;
  create_tar_gz(&group.merge_dir, &[LIB_DIR, INCLUDE_DIR], tmp.as_file_mut()).map_err(|e| failed(e.to_string()))?;

  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
      .map_err(|e| StageError::io(label, "failed to set package permissions", e))?;
  }

  tmp
    .persist(&group.package_path)
    .map_err(|e| failed(e.error.to_string()))?;
  Ok(())
}
