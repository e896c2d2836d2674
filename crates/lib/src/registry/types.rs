//! Registry data types: products, OS profiles and their SDKs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading the registry or resolving keys against it.
#[derive(Debug, Error)]
pub enum ConfigurationError {
  #[error("unknown OS: {0}")]
  UnknownOs(String),

  #[error("unknown SDK {sdk} for OS {os}")]
  UnknownSdk { os: String, sdk: String },

  #[error("unknown product: {0}")]
  UnknownProduct(String),

  #[error("invalid target {target} for OS {os}: expected <sdk>.<arch>")]
  InvalidTarget { os: String, target: String },

  #[error("OS {0} declares no targets")]
  EmptyOs(String),

  #[error("invalid product {product}: {message}")]
  InvalidProduct { product: String, message: String },

  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {message}")]
  Parse { path: PathBuf, message: String },
}

/// Shell templates for a user-defined product.
///
/// Commands run with `/bin/sh -c` inside the source directory. `{prefix}`, `{srcdir}` and
/// `{make}` are substituted before execution; the compiler environment (`CC`, `CFLAGS`,
/// `LDFLAGS`, `HOST_TRIPLE`, `ARCH`, `SDK`) is exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptSpec {
  /// File inside the unpacked tree that marks a completed unpack.
  pub unpack_marker: String,
  #[serde(default)]
  pub configure: Option<String>,
  /// File produced by `configure`. Without one an inert marker records completion.
  #[serde(default)]
  pub configure_output: Option<String>,
  /// File an interrupted `configure` leaves behind, reported instead of reconfiguring over it.
  #[serde(default)]
  pub stale_configure_output: Option<String>,
  pub build: String,
  /// File produced by `build`, relative to the source directory.
  pub build_output: String,
  pub install: String,
}

/// Which build adapter drives a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterKind {
  Bzip2,
  Xz,
  Openssl,
  Script(ScriptSpec),
}

impl AdapterKind {
  pub fn name(&self) -> &'static str {
    match self {
      AdapterKind::Bzip2 => "bzip2",
      AdapterKind::Xz => "xz",
      AdapterKind::Openssl => "openssl",
      AdapterKind::Script(_) => "script",
    }
  }
}

/// A patch applied to a product's source tree right after unpacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRef {
  pub path: PathBuf,
  /// Restricts the patch to one OS; `None` applies it everywhere.
  pub os: Option<String>,
}

/// A third-party library pinned to one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
  pub name: String,
  pub version: String,
  /// Source archive URL; `{version}` is substituted.
  pub url_template: String,
  pub sha256: Option<String>,
  pub patches: Vec<PatchRef>,
  /// Static library file names the product installs under `lib/`.
  pub libraries: Vec<String>,
  pub adapter: AdapterKind,
}

impl Product {
  /// Lowercase name used for on-disk paths and archive names.
  pub fn slug(&self) -> String {
    self.name.to_lowercase()
  }

  /// `<slug>-<version>`, the directory name for sources, installs and merges.
  pub fn dir_name(&self) -> String {
    format!("{}-{}", self.slug(), self.version)
  }

  pub fn url(&self) -> String {
    self.url_template.replace("{version}", &self.version)
  }

  /// Patches that apply to `os`, in declaration order.
  pub fn patches_for<'a>(&'a self, os: &'a str) -> impl Iterator<Item = &'a PatchRef> + 'a {
    self
      .patches
      .iter()
      .filter(move |p| p.os.as_deref().is_none_or(|patch_os| patch_os.eq_ignore_ascii_case(os)))
  }
}

/// One SDK of an OS and the architectures built against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkProfile {
  pub name: String,
  pub archs: Vec<String>,
}

impl SdkProfile {
  pub fn is_simulator(&self) -> bool {
    self.name.contains("simulator")
  }
}

/// A target operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsProfile {
  pub name: String,
  pub version_min: String,
  /// Compiler flag template; `{version}` is replaced with `version_min`.
  pub cflags: String,
  /// Flag template for simulator SDKs.
  pub simulator_cflags: String,
  pub sdks: Vec<SdkProfile>,
}

impl OsProfile {
  /// Build a profile from `<sdk>.<arch>` target strings.
  ///
  /// SDKs keep the order of their first appearance; duplicate architectures collapse.
  pub fn from_targets<S: AsRef<str>>(
    name: &str,
    version_min: &str,
    cflags: &str,
    targets: &[S],
  ) -> Result<Self, ConfigurationError> {
    let mut sdks: Vec<SdkProfile> = Vec::new();

    for target in targets {
      let target = target.as_ref();
      let Some((sdk, arch)) = target.rsplit_once('.') else {
        return Err(ConfigurationError::InvalidTarget {
          os: name.to_string(),
          target: target.to_string(),
        });
      };
      if sdk.is_empty() || arch.is_empty() {
        return Err(ConfigurationError::InvalidTarget {
          os: name.to_string(),
          target: target.to_string(),
        });
      }

      match sdks.iter_mut().find(|s| s.name == sdk) {
        Some(profile) => {
          if !profile.archs.iter().any(|a| a == arch) {
            profile.archs.push(arch.to_string());
          }
        }
        None => sdks.push(SdkProfile {
          name: sdk.to_string(),
          archs: vec![arch.to_string()],
        }),
      }
    }

    if sdks.is_empty() {
      return Err(ConfigurationError::EmptyOs(name.to_string()));
    }

    Ok(Self {
      name: name.to_string(),
      version_min: version_min.to_string(),
      cflags: cflags.to_string(),
      simulator_cflags: simulator_template(cflags),
      sdks,
    })
  }

  pub fn with_simulator_cflags(mut self, template: impl Into<String>) -> Self {
    self.simulator_cflags = template.into();
    self
  }

  pub fn sdk(&self, name: &str) -> Result<&SdkProfile, ConfigurationError> {
    self
      .sdks
      .iter()
      .find(|s| s.name == name)
      .ok_or_else(|| ConfigurationError::UnknownSdk {
        os: self.name.clone(),
        sdk: name.to_string(),
      })
  }

  /// The minimum-OS-version flag for `sdk` with the version filled in.
  pub fn version_flag(&self, sdk: &str) -> String {
    let template = if sdk.contains("simulator") {
      &self.simulator_cflags
    } else {
      &self.cflags
    };
    template.replace("{version}", &self.version_min)
  }

  /// All `<sdk>.<arch>` target strings, in declaration order.
  pub fn targets(&self) -> Vec<String> {
    self
      .sdks
      .iter()
      .flat_map(|sdk| sdk.archs.iter().map(move |arch| format!("{}.{}", sdk.name, arch)))
      .collect()
  }
}

/// `-m<os>-version-min=` becomes `-m<os>-simulator-version-min=`.
fn simulator_template(cflags: &str) -> String {
  if cflags.contains("-simulator-version-min") {
    cflags.to_string()
  } else {
    cflags.replace("-version-min", "-simulator-version-min")
  }
}

/// Resolve `path` against `base` unless it is already absolute.
pub(crate) fn resolve_path(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  }
}
