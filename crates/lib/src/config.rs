//! Configuration loading.
//!
//! The built-in registry is the baseline; an optional `fatdeps.toml` overrides product
//! versions, patches, OS target lists and tool settings. The CLI layers flags and
//! environment variables on top of the result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::consts::{DEFAULT_BUILD_NUMBER, DEFAULT_PASSTHROUGH_ENV, DEFAULT_TOOL_PATH};
use crate::registry::{
  AdapterKind, ConfigurationError, OsProfile, PatchRef, Product, Registry, ScriptSpec, default_cflags, resolve_path,
};

/// External tools and the environment they run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
  /// PATH given to every child process.
  pub path: String,
  /// Host variables forwarded into child processes.
  pub passthrough_env: Vec<String>,
  /// Shell override for stage commands (defaults to `/bin/sh`).
  pub shell: Option<String>,
  pub make: String,
  pub patch: String,
  pub lipo: String,
  /// SDK roots pinned by name instead of asking `xcrun`.
  pub sdk_paths: BTreeMap<String, PathBuf>,
}

impl Default for ToolSettings {
  fn default() -> Self {
    Self {
      path: DEFAULT_TOOL_PATH.to_string(),
      passthrough_env: DEFAULT_PASSTHROUGH_ENV.iter().map(|s| s.to_string()).collect(),
      shell: None,
      make: "make".to_string(),
      patch: "patch".to_string(),
      lipo: "lipo".to_string(),
      sdk_paths: BTreeMap::new(),
    }
  }
}

/// Download behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
  /// Extra attempts after the first one fails with a transient error.
  pub retries: u32,
  pub timeout: Duration,
  /// Delay before the first retry; doubled for each following one.
  pub backoff: Duration,
}

impl Default for FetchSettings {
  fn default() -> Self {
    Self {
      retries: 3,
      timeout: Duration::from_secs(300),
      backoff: Duration::from_secs(2),
    }
  }
}

/// Everything a run needs to know before the target graph is expanded.
#[derive(Debug, Clone)]
pub struct Config {
  pub registry: Registry,
  pub build_number: String,
  pub tools: ToolSettings,
  pub fetch: FetchSettings,
  /// Directory relative patch paths are resolved against.
  pub project_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
  pub build_number: Option<String>,
  #[serde(default)]
  pub products: BTreeMap<String, ProductEntry>,
  #[serde(default)]
  pub os: BTreeMap<String, OsEntry>,
  #[serde(default)]
  pub tools: ToolsEntry,
  #[serde(default)]
  pub fetch: FetchEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductEntry {
  pub version: Option<String>,
  pub url: Option<String>,
  pub sha256: Option<String>,
  pub patches: Option<Vec<PatchEntry>>,
  pub libraries: Option<Vec<String>>,
  pub adapter: Option<String>,
  pub script: Option<ScriptSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchEntry {
  pub path: PathBuf,
  #[serde(default)]
  pub os: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OsEntry {
  pub version_min: Option<String>,
  pub cflags: Option<String>,
  pub simulator_cflags: Option<String>,
  pub targets: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsEntry {
  pub path: Option<String>,
  pub passthrough_env: Option<Vec<String>>,
  pub shell: Option<String>,
  pub make: Option<String>,
  pub patch: Option<String>,
  pub lipo: Option<String>,
  #[serde(default)]
  pub sdk_paths: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchEntry {
  pub retries: Option<u32>,
  pub timeout_secs: Option<u64>,
  pub backoff_ms: Option<u64>,
}

impl Config {
  /// The built-in registry with default tool and fetch settings.
  pub fn builtin(project_dir: impl Into<PathBuf>) -> Result<Self, ConfigurationError> {
    Ok(Self {
      registry: Registry::builtin()?,
      build_number: DEFAULT_BUILD_NUMBER.to_string(),
      tools: ToolSettings::default(),
      fetch: FetchSettings::default(),
      project_dir: project_dir.into(),
    })
  }

  /// Load `path` on top of the built-in registry.
  ///
  /// Relative patch paths in the file resolve against the file's directory.
  pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut config = Self::builtin(&base)?;
    config.apply_str(&content, path)?;
    Ok(config)
  }

  /// Parse TOML `content` and apply it; `origin` is used for error messages and as the base
  /// directory for relative paths.
  pub fn apply_str(&mut self, content: &str, origin: &Path) -> Result<(), ConfigurationError> {
    let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigurationError::Parse {
      path: origin.to_path_buf(),
      message: e.to_string(),
    })?;
    let base = origin
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| self.project_dir.clone());
    self.apply(file, &base)
  }

  /// Apply parsed overrides.
  pub fn apply(&mut self, file: ConfigFile, base: &Path) -> Result<(), ConfigurationError> {
    if let Some(build_number) = file.build_number {
      self.build_number = build_number;
    }

    for (name, entry) in file.products {
      let product = match self.registry.product(&name) {
        Ok(existing) => merge_product(existing.clone(), entry, base)?,
        Err(_) => new_product(&name, entry, base)?,
      };
      debug!(product = %product.name, version = %product.version, "product configured");
      self.registry.upsert_product(product);
    }

    for (name, entry) in file.os {
      let profile = match self.registry.os(&name) {
        Ok(existing) => merge_os(existing, entry)?,
        Err(_) => new_os(&name, entry)?,
      };
      debug!(os = %profile.name, targets = ?profile.targets(), "OS configured");
      self.registry.upsert_os(profile);
    }

    let tools = file.tools;
    if let Some(path) = tools.path {
      self.tools.path = path;
    }
    if let Some(passthrough) = tools.passthrough_env {
      self.tools.passthrough_env = passthrough;
    }
    if tools.shell.is_some() {
      self.tools.shell = tools.shell;
    }
    if let Some(make) = tools.make {
      self.tools.make = make;
    }
    if let Some(patch) = tools.patch {
      self.tools.patch = patch;
    }
    if let Some(lipo) = tools.lipo {
      self.tools.lipo = lipo;
    }
    for (sdk, path) in tools.sdk_paths {
      self.tools.sdk_paths.insert(sdk, resolve_path(base, &path));
    }

    if let Some(retries) = file.fetch.retries {
      self.fetch.retries = retries;
    }
    if let Some(secs) = file.fetch.timeout_secs {
      self.fetch.timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = file.fetch.backoff_ms {
      self.fetch.backoff = Duration::from_millis(ms);
    }

    Ok(())
  }
}

fn parse_adapter(product: &str, adapter: Option<&str>, script: Option<ScriptSpec>) -> Result<AdapterKind, ConfigurationError> {
  match (adapter, script) {
    (Some("script") | None, Some(spec)) => Ok(AdapterKind::Script(spec)),
    (Some("script"), None) => Err(ConfigurationError::InvalidProduct {
      product: product.to_string(),
      message: "adapter \"script\" requires a [script] table".to_string(),
    }),
    (Some("bzip2"), None) => Ok(AdapterKind::Bzip2),
    (Some("xz"), None) => Ok(AdapterKind::Xz),
    (Some("openssl"), None) => Ok(AdapterKind::Openssl),
    (Some(other), Some(_)) => Err(ConfigurationError::InvalidProduct {
      product: product.to_string(),
      message: format!("adapter \"{}\" does not take a [script] table", other),
    }),
    (Some(other), None) => Err(ConfigurationError::InvalidProduct {
      product: product.to_string(),
      message: format!("unknown adapter \"{}\"", other),
    }),
    (None, None) => Err(ConfigurationError::InvalidProduct {
      product: product.to_string(),
      message: "no adapter given".to_string(),
    }),
  }
}

fn convert_patches(entries: Vec<PatchEntry>, base: &Path) -> Vec<PatchRef> {
  entries
    .into_iter()
    .map(|entry| PatchRef {
      path: resolve_path(base, &entry.path),
      os: entry.os,
    })
    .collect()
}

fn merge_product(mut product: Product, entry: ProductEntry, base: &Path) -> Result<Product, ConfigurationError> {
  if let Some(version) = entry.version {
    product.version = version;
  }
  if let Some(url) = entry.url {
    product.url_template = url;
  }
  if entry.sha256.is_some() {
    product.sha256 = entry.sha256;
  }
  if let Some(patches) = entry.patches {
    product.patches = convert_patches(patches, base);
  }
  if let Some(libraries) = entry.libraries {
    product.libraries = libraries;
  }
  if entry.adapter.is_some() || entry.script.is_some() {
    product.adapter = parse_adapter(&product.name, entry.adapter.as_deref(), entry.script)?;
  }
  validate_product(&product)?;
  Ok(product)
}

fn new_product(name: &str, entry: ProductEntry, base: &Path) -> Result<Product, ConfigurationError> {
  let missing = |field: &str| ConfigurationError::InvalidProduct {
    product: name.to_string(),
    message: format!("new products must set `{}`", field),
  };

  let product = Product {
    name: name.to_string(),
    version: entry.version.ok_or_else(|| missing("version"))?,
    url_template: entry.url.ok_or_else(|| missing("url"))?,
    sha256: entry.sha256,
    patches: convert_patches(entry.patches.unwrap_or_default(), base),
    libraries: entry.libraries.ok_or_else(|| missing("libraries"))?,
    adapter: parse_adapter(name, entry.adapter.as_deref(), entry.script)?,
  };
  validate_product(&product)?;
  Ok(product)
}

fn validate_product(product: &Product) -> Result<(), ConfigurationError> {
  if product.libraries.is_empty() {
    return Err(ConfigurationError::InvalidProduct {
      product: product.name.clone(),
      message: "at least one library is required".to_string(),
    });
  }
  if product.version.is_empty() {
    return Err(ConfigurationError::InvalidProduct {
      product: product.name.clone(),
      message: "version must not be empty".to_string(),
    });
  }
  Ok(())
}

fn merge_os(existing: &OsProfile, entry: OsEntry) -> Result<OsProfile, ConfigurationError> {
  let version_min = entry.version_min.unwrap_or_else(|| existing.version_min.clone());
  // A new cflags template re-derives the simulator one unless that is given too
  let simulator_cflags = match (&entry.cflags, entry.simulator_cflags) {
    (_, Some(simulator)) => Some(simulator),
    (None, None) => Some(existing.simulator_cflags.clone()),
    (Some(_), None) => None,
  };
  let cflags = entry.cflags.unwrap_or_else(|| existing.cflags.clone());
  let targets = entry.targets.unwrap_or_else(|| existing.targets());
  let os = OsProfile::from_targets(&existing.name, &version_min, &cflags, &targets)?;
  Ok(match simulator_cflags {
    Some(template) => os.with_simulator_cflags(template),
    None => os,
  })
}

fn new_os(name: &str, entry: OsEntry) -> Result<OsProfile, ConfigurationError> {
  let targets = entry.targets.ok_or_else(|| ConfigurationError::EmptyOs(name.to_string()))?;
  let version_min = entry.version_min.unwrap_or_default();
  let cflags = entry.cflags.unwrap_or_else(|| default_cflags(name));
  let os = OsProfile::from_targets(name, &version_min, &cflags, &targets)?;
  Ok(match entry.simulator_cflags {
    Some(template) => os.with_simulator_cflags(template),
    None => os,
  })
}
