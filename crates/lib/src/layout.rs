//! On-disk layout of a build root.
//!
//! ```text
//! <root>/
//!   downloads/<slug>-<version>.tar.gz
//!   build/<os>/<sdk>.<arch>/<slug>-<version>/         source tree
//!   build/<os>/<sdk>.<arch>/<slug>-<version>.<stage>.log
//!   install/<os>/<sdk>.<arch>/<slug>-<version>/
//!   merge/<os>/<sdk>/<slug>-<version>/
//!   dist/<slug>-<version>-<build>-<sdk>.tar.gz
//! ```

use std::path::{Path, PathBuf};

use crate::registry::Product;

pub const DOWNLOADS_DIR: &str = "downloads";
pub const BUILD_DIR: &str = "build";
pub const INSTALL_DIR: &str = "install";
pub const MERGE_DIR: &str = "merge";
pub const DIST_DIR: &str = "dist";
pub const LOCK_FILE: &str = ".lock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
  root: PathBuf,
}

impl Layout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn downloads_dir(&self) -> PathBuf {
    self.root.join(DOWNLOADS_DIR)
  }

  pub fn build_dir(&self) -> PathBuf {
    self.root.join(BUILD_DIR)
  }

  pub fn install_dir(&self) -> PathBuf {
    self.root.join(INSTALL_DIR)
  }

  pub fn merge_dir(&self) -> PathBuf {
    self.root.join(MERGE_DIR)
  }

  pub fn dist_dir(&self) -> PathBuf {
    self.root.join(DIST_DIR)
  }

  pub fn lock_path(&self) -> PathBuf {
    self.root.join(LOCK_FILE)
  }

  pub fn archive_path(&self, product: &Product) -> PathBuf {
    self.downloads_dir().join(format!("{}.tar.gz", product.dir_name()))
  }

  /// Directory holding a target's source tree and stage logs.
  pub fn target_build_dir(&self, os: &str, sdk: &str, arch: &str) -> PathBuf {
    self.build_dir().join(os).join(format!("{}.{}", sdk, arch))
  }

  pub fn source_dir(&self, product: &Product, os: &str, sdk: &str, arch: &str) -> PathBuf {
    self.target_build_dir(os, sdk, arch).join(product.dir_name())
  }

  pub fn target_install_dir(&self, product: &Product, os: &str, sdk: &str, arch: &str) -> PathBuf {
    self
      .install_dir()
      .join(os)
      .join(format!("{}.{}", sdk, arch))
      .join(product.dir_name())
  }

  pub fn sdk_merge_dir(&self, product: &Product, os: &str, sdk: &str) -> PathBuf {
    self.merge_dir().join(os).join(sdk).join(product.dir_name())
  }

  pub fn package_path(&self, product: &Product, build_number: &str, sdk: &str) -> PathBuf {
    self.dist_dir().join(package_name(product, build_number, sdk))
  }
}

/// `<slug>-<version>-<build>-<sdk>.tar.gz`
pub fn package_name(product: &Product, build_number: &str, sdk: &str) -> String {
  format!("{}-{}-{}.tar.gz", product.dir_name(), build_number, sdk)
}
