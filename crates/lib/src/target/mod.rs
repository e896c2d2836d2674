//! Target expansion.
//!
//! Turns the registry into concrete build targets: one [`BuildTarget`] per
//! (product, OS, SDK, architecture), grouped per SDK for merging and per OS for reporting.
//! Every requested key is validated before anything is expanded, so a bad request never
//! yields a partial target set.

mod keys;
mod triple;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::consts::{COMPILED_MARKER, INSTALLED_MARKER};
use crate::execute::types::Stage;
use crate::layout::Layout;
use crate::registry::{ConfigurationError, OsProfile, Product, Registry};

pub use keys::{SdkKey, TargetKey};
pub use triple::{compiler, triple};

/// One product built for one architecture of one SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
  pub key: TargetKey,
  pub version: String,
  pub triple: String,
  /// OS-specific compiler flags (minimum OS version).
  pub cflags: String,
  pub srcdir: PathBuf,
  pub install_dir: PathBuf,
  /// Directory holding the per-stage log files.
  pub log_dir: PathBuf,
  log_stem: String,
}

impl BuildTarget {
  /// `<sdk>.<arch>`
  pub fn name(&self) -> String {
    self.key.name()
  }

  pub fn is_simulator(&self) -> bool {
    self.key.sdk.contains("simulator")
  }

  /// Compiler invocation for this target against the SDK rooted at `sysroot`.
  pub fn compiler(&self, sysroot: &Path) -> String {
    compiler(&self.key.sdk, &self.triple, sysroot, &self.cflags)
  }

  /// Log file that collects the output of `stage`.
  pub fn log_path(&self, stage: Stage) -> PathBuf {
    self.log_dir.join(format!("{}.{}.log", self.log_stem, stage))
  }

  /// Installed static library `name`.
  pub fn installed_library(&self, name: &str) -> PathBuf {
    self.install_dir.join("lib").join(name)
  }

  /// Written once compile has succeeded; removed before it runs again.
  pub fn compiled_marker(&self) -> PathBuf {
    self.srcdir.join(COMPILED_MARKER)
  }

  /// Written once install has succeeded; removed before it runs again.
  pub fn installed_marker(&self) -> PathBuf {
    self.install_dir.join(INSTALLED_MARKER)
  }
}

/// All architectures of one (product, OS, SDK); the unit the merger combines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkGroup {
  pub key: SdkKey,
  pub version: String,
  pub targets: Vec<BuildTarget>,
  pub merge_dir: PathBuf,
  pub package_path: PathBuf,
}

impl SdkGroup {
  pub fn archs(&self) -> Vec<&str> {
    self.targets.iter().map(|t| t.key.arch.as_str()).collect()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsGroup {
  pub os: String,
  pub sdks: Vec<SdkGroup>,
}

/// Everything requested for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPlan {
  pub product: Product,
  pub archive: PathBuf,
  pub oses: Vec<OsGroup>,
}

impl ProductPlan {
  pub fn sdk_groups(&self) -> impl Iterator<Item = &SdkGroup> {
    self.oses.iter().flat_map(|os| os.sdks.iter())
  }

  pub fn targets(&self) -> impl Iterator<Item = &BuildTarget> {
    self.sdk_groups().flat_map(|sdk| sdk.targets.iter())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateLevel {
  Os,
  Sdk,
  Arch,
}

/// A named roll-up target, e.g. `OpenSSL-iOS-iphoneos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregate {
  pub name: String,
  pub level: AggregateLevel,
  /// Names of the aggregates one level down; empty for per-architecture aggregates.
  pub children: Vec<String>,
}

/// Filters for expansion. Empty lists select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRequest {
  pub products: Vec<String>,
  pub oses: Vec<String>,
  pub sdks: Vec<String>,
}

/// The expanded, immutable target graph of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
  pub build_number: String,
  pub products: Vec<ProductPlan>,
}

impl TargetSet {
  pub fn targets(&self) -> impl Iterator<Item = &BuildTarget> {
    self.products.iter().flat_map(|p| p.targets())
  }

  pub fn sdk_groups(&self) -> impl Iterator<Item = &SdkGroup> {
    self.products.iter().flat_map(|p| p.sdk_groups())
  }

  pub fn plan(&self, product: &str) -> Option<&ProductPlan> {
    self.products.iter().find(|p| p.product.name == product)
  }

  pub fn target(&self, key: &TargetKey) -> Option<&BuildTarget> {
    self.targets().find(|t| &t.key == key)
  }

  pub fn sdk_group(&self, key: &SdkKey) -> Option<&SdkGroup> {
    self.sdk_groups().find(|g| &g.key == key)
  }

  /// Per-OS, per-SDK and per-architecture aggregates, parents before children.
  pub fn aggregates(&self) -> Vec<Aggregate> {
    let mut aggregates = Vec::new();

    for plan in &self.products {
      let product = &plan.product.name;
      for os in &plan.oses {
        let os_name = format!("{}-{}", product, os.os);
        aggregates.push(Aggregate {
          name: os_name.clone(),
          level: AggregateLevel::Os,
          children: os.sdks.iter().map(|s| format!("{}-{}", os_name, s.key.sdk)).collect(),
        });

        for sdk in &os.sdks {
          let sdk_name = format!("{}-{}", os_name, sdk.key.sdk);
          aggregates.push(Aggregate {
            name: sdk_name.clone(),
            level: AggregateLevel::Sdk,
            children: sdk.targets.iter().map(|t| format!("{}-{}", os_name, t.name())).collect(),
          });

          for target in &sdk.targets {
            aggregates.push(Aggregate {
              name: format!("{}-{}", os_name, target.name()),
              level: AggregateLevel::Arch,
              children: Vec::new(),
            });
          }
        }
      }
    }

    aggregates
  }
}

/// Expand `request` against `registry`.
pub fn expand(
  registry: &Registry,
  layout: &Layout,
  build_number: &str,
  request: &TargetRequest,
) -> Result<TargetSet, ConfigurationError> {
  let products = select(&request.products, registry.products(), |name| registry.product(name))?;
  let oses = select(&request.oses, registry.os_profiles(), |name| registry.os(name))?;

  for sdk in &request.sdks {
    if !oses.iter().any(|os| os.sdks.iter().any(|s| &s.name == sdk)) {
      let os = oses.iter().map(|o| o.name.as_str()).collect::<Vec<_>>().join(",");
      return Err(ConfigurationError::UnknownSdk { os, sdk: sdk.clone() });
    }
  }

  let plans = products
    .iter()
    .map(|product| {
      let oses = oses
        .iter()
        .filter_map(|os| {
          let sdks: Vec<SdkGroup> = os
            .sdks
            .iter()
            .filter(|sdk| request.sdks.is_empty() || request.sdks.contains(&sdk.name))
            .map(|sdk| {
              let targets = sdk
                .archs
                .iter()
                .map(|arch| build_target(layout, product, os, &sdk.name, arch, triple(os, sdk, arch)))
                .collect();
              SdkGroup {
                key: SdkKey {
                  product: product.name.clone(),
                  os: os.name.clone(),
                  sdk: sdk.name.clone(),
                },
                version: product.version.clone(),
                targets,
                merge_dir: layout.sdk_merge_dir(product, &os.name, &sdk.name),
                package_path: layout.package_path(product, build_number, &sdk.name),
              }
            })
            .collect();

          (!sdks.is_empty()).then(|| OsGroup {
            os: os.name.clone(),
            sdks,
          })
        })
        .collect();

      ProductPlan {
        product: (*product).clone(),
        archive: layout.archive_path(product),
        oses,
      }
    })
    .collect::<Vec<_>>();

  let set = TargetSet {
    build_number: build_number.to_string(),
    products: plans,
  };
  debug!(
    products = set.products.len(),
    targets = set.targets().count(),
    "expanded targets"
  );
  Ok(set)
}

fn select<'a, T, F>(names: &[String], all: &'a [T], lookup: F) -> Result<Vec<&'a T>, ConfigurationError>
where
  F: Fn(&str) -> Result<&'a T, ConfigurationError>,
  T: PartialEq,
{
  if names.is_empty() {
    return Ok(all.iter().collect());
  }

  let mut selected: Vec<&T> = Vec::new();
  for name in names {
    let item = lookup(name)?;
    if !selected.contains(&item) {
      selected.push(item);
    }
  }
  Ok(selected)
}

fn build_target(layout: &Layout, product: &Product, os: &OsProfile, sdk: &str, arch: &str, triple: String) -> BuildTarget {
  BuildTarget {
    key: TargetKey {
      product: product.name.clone(),
      os: os.name.clone(),
      sdk: sdk.to_string(),
      arch: arch.to_string(),
    },
    version: product.version.clone(),
    triple,
    cflags: os.version_flag(sdk),
    srcdir: layout.source_dir(product, &os.name, sdk, arch),
    install_dir: layout.target_install_dir(product, &os.name, sdk, arch),
    log_dir: layout.target_build_dir(&os.name, sdk, arch),
    log_stem: product.dir_name(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn expand_builtin(request: TargetRequest) -> Result<TargetSet, ConfigurationError> {
    let registry = Registry::builtin().unwrap();
    expand(&registry, &Layout::new("/work"), "7", &request)
  }

  #[test]
  fn expands_every_product_os_sdk_arch() {
    let set = expand_builtin(TargetRequest::default()).unwrap();
    // 2 macOS + 3 iOS + 3 tvOS + 3 watchOS targets per product.
    assert_eq!(set.targets().count(), 3 * 11);
    assert_eq!(set.sdk_groups().count(), 3 * 7);
  }

  #[test]
  fn sdk_group_archs_match_profile() {
    let set = expand_builtin(TargetRequest {
      products: vec!["BZip2".to_string()],
      oses: vec!["iOS".to_string()],
      ..Default::default()
    })
    .unwrap();

    let groups: Vec<_> = set.sdk_groups().collect();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].archs(), vec!["x86_64", "arm64"]);
    assert_eq!(groups[1].archs(), vec!["arm64"]);
  }

  #[test]
  fn derived_fields() {
    let set = expand_builtin(TargetRequest {
      products: vec!["openssl".to_string()],
      oses: vec!["macOS".to_string()],
      ..Default::default()
    })
    .unwrap();

    let target = set.targets().next().unwrap();
    assert_eq!(target.key.to_string(), "OpenSSL/macOS/macosx.x86_64");
    assert_eq!(target.triple, "x86_64-apple-darwin");
    assert_eq!(target.cflags, "-mmacosx-version-min=11.0");
    assert_eq!(target.srcdir, PathBuf::from("/work/build/macOS/macosx.x86_64/openssl-3.0.15"));
    assert_eq!(
      target.log_path(Stage::Configure),
      PathBuf::from("/work/build/macOS/macosx.x86_64/openssl-3.0.15.configure.log")
    );
    assert_eq!(target.compiled_marker(), target.srcdir.join(".fatdeps-compiled"));
    assert!(target.installed_marker().starts_with(&target.install_dir));

    let group = set.sdk_groups().next().unwrap();
    assert_eq!(group.package_path, PathBuf::from("/work/dist/openssl-3.0.15-7-macosx.tar.gz"));
  }

  #[test]
  fn unknown_os_fails_whole_expansion() {
    let err = expand_builtin(TargetRequest {
      oses: vec!["macOS".to_string(), "Plan9".to_string()],
      ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::UnknownOs(ref os) if os == "Plan9"));
  }

  #[test]
  fn unknown_sdk_names_key() {
    let err = expand_builtin(TargetRequest {
      oses: vec!["macOS".to_string()],
      sdks: vec!["iphoneos".to_string()],
      ..Default::default()
    })
    .unwrap_err();
    assert_eq!(err.to_string(), "unknown SDK iphoneos for OS macOS");
  }

  #[test]
  fn unknown_product_fails() {
    let err = expand_builtin(TargetRequest {
      products: vec!["zlib".to_string()],
      ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::UnknownProduct(_)));
  }

  #[test]
  fn sdk_filter_drops_empty_oses() {
    let set = expand_builtin(TargetRequest {
      products: vec!["XZ".to_string()],
      sdks: vec!["appletvos".to_string()],
      ..Default::default()
    })
    .unwrap();

    assert_eq!(set.products[0].oses.len(), 1);
    assert_eq!(set.products[0].oses[0].os, "tvOS");
  }

  #[test]
  fn aggregates_nest_three_levels() {
    let set = expand_builtin(TargetRequest {
      products: vec!["BZip2".to_string()],
      oses: vec!["macOS".to_string()],
      ..Default::default()
    })
    .unwrap();

    let names: Vec<_> = set.aggregates().into_iter().map(|a| a.name).collect();
    assert_eq!(
      names,
      vec![
        "BZip2-macOS",
        "BZip2-macOS-macosx",
        "BZip2-macOS-macosx.x86_64",
        "BZip2-macOS-macosx.arm64",
      ]
    );

    let sdk = &set.aggregates()[1];
    assert_eq!(sdk.children, vec!["BZip2-macOS-macosx.x86_64", "BZip2-macOS-macosx.arm64"]);
  }
}
