//! Apple toolchain seams: fat-binary combination and SDK root lookup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::config::ToolSettings;
use crate::execute::actions::{ActionError, run_program, scoped_env};

/// Combines single-architecture static libraries into one multi-architecture library.
pub trait FatBinaryCombiner: Send + Sync {
  /// Write the combination of `inputs` to `output`. Blocking.
  fn combine(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ActionError>;
}

/// `lipo -create -output <out> <inputs...>`
#[derive(Debug, Clone)]
pub struct LipoCombiner {
  tools: ToolSettings,
}

impl LipoCombiner {
  pub fn new(tools: &ToolSettings) -> Self {
    Self { tools: tools.clone() }
  }
}

impl FatBinaryCombiner for LipoCombiner {
  fn combine(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ActionError> {
    info!(output = ?output, inputs = inputs.len(), "creating fat library");

    let mut args: Vec<&std::ffi::OsStr> = vec!["-create".as_ref(), "-output".as_ref(), output.as_os_str()];
    args.extend(inputs.iter().map(|p| p.as_os_str()));

    let env = scoped_env(&self.tools, &BTreeMap::new());
    run_program(&self.tools.lipo, args, &env)?;
    Ok(())
  }
}

/// Resolves SDK names such as `iphoneos` to their root directory.
///
/// Pinned paths from the configuration win; anything else is asked of
/// `xcrun --sdk <name> --show-sdk-path` once and cached.
#[derive(Debug)]
pub struct SdkResolver {
  tools: ToolSettings,
  cache: Mutex<BTreeMap<String, PathBuf>>,
}

impl SdkResolver {
  pub fn new(tools: &ToolSettings) -> Self {
    Self {
      tools: tools.clone(),
      cache: Mutex::new(tools.sdk_paths.clone()),
    }
  }

  fn cached(&self, sdk: &str) -> Option<PathBuf> {
    self.cache.lock().ok().and_then(|cache| cache.get(sdk).cloned())
  }

  /// Root of `sdk`. Blocking on the first lookup of an unpinned SDK.
  pub fn resolve(&self, sdk: &str) -> Result<PathBuf, ActionError> {
    if let Some(path) = self.cached(sdk) {
      return Ok(path);
    }

    let env = scoped_env(&self.tools, &BTreeMap::new());
    let out = run_program("xcrun", ["--sdk", sdk, "--show-sdk-path"], &env)?;
    let path = PathBuf::from(out);
    debug!(sdk = %sdk, path = ?path, "resolved SDK");

    if let Ok(mut cache) = self.cache.lock() {
      cache.insert(sdk.to_string(), path.clone());
    }
    Ok(path)
  }
}
