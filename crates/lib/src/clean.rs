//! Scoped removal of generated state.
//!
//! A product clean removes that product's source trees, logs, installs, merges and packages
//! and leaves every other product alone. An OS clean removes everything built for that OS.
//! `All` also removes downloads.

use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::layout::Layout;
use crate::registry::{ConfigurationError, Registry};

#[derive(Debug, Error)]
pub enum CleanError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to delete {}: {source}", path.display())]
  Delete {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// What to clean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanScope {
  Product(String),
  Os(String),
  ProductOs { product: String, os: String },
  /// Everything, downloads included.
  All,
}

#[derive(Debug, Default, Serialize)]
pub struct CleanResult {
  pub deleted_paths: Vec<PathBuf>,
  pub bytes_freed: u64,
}

/// Entry-name filter for one product.
struct ProductMatch {
  prefix: String,
}

impl ProductMatch {
  fn new(slug: &str) -> Self {
    Self {
      prefix: format!("{}-", slug),
    }
  }

  /// `<slug>-<version>...` where the version starts with a digit.
  fn matches(&self, name: &str) -> bool {
    name
      .strip_prefix(&self.prefix)
      .and_then(|rest| rest.chars().next())
      .is_some_and(|c| c.is_ascii_digit())
  }
}

pub fn clean(layout: &Layout, registry: &Registry, scope: &CleanScope, dry_run: bool) -> Result<CleanResult, CleanError> {
  let mut result = CleanResult::default();

  let (product, os) = match scope {
    CleanScope::All => {
      for dir in [
        layout.build_dir(),
        layout.install_dir(),
        layout.merge_dir(),
        layout.dist_dir(),
        layout.downloads_dir(),
      ] {
        remove(&dir, dry_run, &mut result)?;
      }
      info!(deleted = result.deleted_paths.len(), bytes_freed = result.bytes_freed, dry_run, "distclean complete");
      return Ok(result);
    }
    CleanScope::Product(product) => (Some(registry.product(product)?), None),
    CleanScope::Os(os) => (None, Some(registry.os(os)?)),
    CleanScope::ProductOs { product, os } => (Some(registry.product(product)?), Some(registry.os(os)?)),
  };

  let matcher = product.map(|p| ProductMatch::new(&p.slug()));

  for base in [layout.build_dir(), layout.install_dir(), layout.merge_dir()] {
    for os_dir in children(&base)? {
      if let Some(os) = os
        && file_name(&os_dir) != os.name
      {
        continue;
      }

      match &matcher {
        None => remove(&os_dir, dry_run, &mut result)?,
        Some(matcher) => {
          for sdk_dir in children(&os_dir)? {
            for entry in children(&sdk_dir)? {
              if matcher.matches(&file_name(&entry)) {
                remove(&entry, dry_run, &mut result)?;
              }
            }
          }
        }
      }
    }
  }

  for package in children(&layout.dist_dir())? {
    let name = file_name(&package);
    let product_ok = matcher.as_ref().is_none_or(|m| m.matches(&name));
    let os_ok = os.is_none_or(|os| {
      os.sdks
        .iter()
        .any(|sdk| name.ends_with(&format!("-{}.tar.gz", sdk.name)))
    });
    if product_ok && os_ok {
      remove(&package, dry_run, &mut result)?;
    }
  }

  info!(
    scope = ?scope,
    deleted = result.deleted_paths.len(),
    bytes_freed = result.bytes_freed,
    dry_run,
    "clean complete"
  );
  Ok(result)
}

fn children(dir: &Path) -> Result<Vec<PathBuf>, CleanError> {
  match fs::read_dir(dir) {
    Ok(entries) => {
      let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
      paths.sort();
      Ok(paths)
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
    Err(source) => Err(CleanError::Read {
      path: dir.to_path_buf(),
      source,
    }),
  }
}

fn file_name(path: &Path) -> String {
  path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}

fn remove(path: &Path, dry_run: bool, result: &mut CleanResult) -> Result<(), CleanError> {
  let Ok(md) = fs::symlink_metadata(path) else {
    return Ok(());
  };

  let size = if md.is_dir() { dir_size(path) } else { md.len() };
  debug!(path = %path.display(), size, dry_run, "removing");

  if !dry_run {
    let removed = if md.is_dir() {
      fs::remove_dir_all(path)
    } else {
      fs::remove_file(path)
    };
    removed.map_err(|source| CleanError::Delete {
      path: path.to_path_buf(),
      source,
    })?;
  }

  result.bytes_freed += size;
  result.deleted_paths.push(path.to_path_buf());
  Ok(())
}
