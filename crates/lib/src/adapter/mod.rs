//! Product build adapters.
//!
//! An adapter knows how one product's native build system is driven: which file marks a
//! completed unpack, whether and how it configures, what compile produces and how it
//! installs. Adapters only describe paths and commands; the driver runs them, checks
//! freshness and records completion.

mod bzip2;
mod openssl;
mod script;
mod xz;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::execute::actions::shell_quote;
use crate::registry::AdapterKind;
use crate::target::BuildTarget;

pub use bzip2::Bzip2Adapter;
pub use openssl::{OpensslAdapter, openssl_target};
pub use script::ScriptAdapter;
pub use xz::XzAdapter;

/// A shell command to run for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
  pub script: String,
  pub cwd: PathBuf,
  /// Added on top of the scoped base environment.
  pub env: BTreeMap<String, String>,
}

/// How the driver knows a stage has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
  /// A file the tool itself produces.
  Output(PathBuf),
  /// An inert marker the driver writes after the command succeeds.
  Marker(PathBuf),
}

impl Completion {
  pub fn path(&self) -> &Path {
    match self {
      Completion::Output(path) | Completion::Marker(path) => path,
    }
  }
}

/// Everything an adapter needs to describe the commands for one target.
#[derive(Debug, Clone)]
pub struct BuildEnv<'a> {
  pub target: &'a BuildTarget,
  pub sysroot: PathBuf,
  /// Triple of the machine running the build.
  pub build_triple: String,
  pub make: String,
}

impl BuildEnv<'_> {
  /// Compiler environment exported to every stage command.
  pub fn compiler_env(&self) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("CC".to_string(), self.target.compiler(&self.sysroot));
    env.insert("CFLAGS".to_string(), "-O2".to_string());
    env.insert("LDFLAGS".to_string(), self.target.cflags.clone());
    env.insert("SDKROOT".to_string(), self.sysroot.to_string_lossy().to_string());
    env.insert("HOST_TRIPLE".to_string(), self.target.triple.clone());
    env.insert("BUILD_TRIPLE".to_string(), self.build_triple.clone());
    env.insert("ARCH".to_string(), self.target.key.arch.clone());
    env.insert("SDK".to_string(), self.target.key.sdk.clone());
    env
  }

  pub fn prefix(&self) -> String {
    shell_quote(&self.target.install_dir.to_string_lossy())
  }

  pub fn make(&self) -> String {
    shell_quote(&self.make)
  }

  /// A command run in the target's source directory with the compiler environment.
  pub fn command(&self, script: String) -> StageCommand {
    StageCommand {
      script,
      cwd: self.target.srcdir.clone(),
      env: self.compiler_env(),
    }
  }
}

pub trait ProductAdapter: Send + Sync {
  fn name(&self) -> &'static str;

  /// File inside the unpacked tree whose presence marks a completed unpack.
  fn unpack_marker(&self) -> &str;

  /// How configure completion is recorded; `None` when the product has no configure step.
  fn configure_completion(&self, target: &BuildTarget) -> Option<Completion>;

  /// File a previous, interrupted configure leaves behind. Its presence without a fresh
  /// configure completion means the tree needs a manual clean.
  fn stale_configure_artifact(&self) -> Option<&str> {
    None
  }

  fn configure(&self, env: &BuildEnv<'_>) -> Option<StageCommand>;

  /// File the compile step produces, relative paths resolved against the source tree.
  fn compile_output(&self, target: &BuildTarget) -> PathBuf;

  fn compile(&self, env: &BuildEnv<'_>) -> StageCommand;

  fn install(&self, env: &BuildEnv<'_>) -> StageCommand;
}

pub fn adapter_for(kind: &AdapterKind) -> Box<dyn ProductAdapter> {
  match kind {
    AdapterKind::Bzip2 => Box::new(Bzip2Adapter),
    AdapterKind::Xz => Box::new(XzAdapter),
    AdapterKind::Openssl => Box::new(OpensslAdapter),
    AdapterKind::Script(spec) => Box::new(ScriptAdapter::new(spec.clone())),
  }
}
