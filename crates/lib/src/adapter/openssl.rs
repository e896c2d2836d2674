use std::path::PathBuf;

use super::{BuildEnv, Completion, ProductAdapter, StageCommand};
use crate::consts::CONFIGURED_MARKER;
use crate::target::BuildTarget;

/// OpenSSL's Perl `Configure`.
///
/// `Configure` regenerates files it owns on every run, so completion is an inert marker the
/// driver writes afterwards instead of one of those files.
#[derive(Debug, Clone, Copy)]
pub struct OpensslAdapter;

/// OpenSSL configuration target for a build target.
pub fn openssl_target(target: &BuildTarget) -> String {
  if target.key.sdk == "macosx" {
    format!("darwin64-{}-cc", target.key.arch)
  } else if target.key.arch == "arm64_32" {
    "ios-xcrun".to_string()
  } else if target.is_simulator() {
    "iossimulator-xcrun".to_string()
  } else {
    "ios64-xcrun".to_string()
  }
}

impl ProductAdapter for OpensslAdapter {
  fn name(&self) -> &'static str {
    "openssl"
  }

  fn unpack_marker(&self) -> &str {
    "Configure"
  }

  fn configure_completion(&self, target: &BuildTarget) -> Option<Completion> {
    Some(Completion::Marker(target.srcdir.join(CONFIGURED_MARKER)))
  }

  fn stale_configure_artifact(&self) -> Option<&str> {
    Some("configdata.pm")
  }

  fn configure(&self, env: &BuildEnv<'_>) -> Option<StageCommand> {
    Some(env.command(format!(
      "./Configure no-tests no-asm no-shared {} --prefix={} --openssldir=/etc/ssl",
      openssl_target(env.target),
      env.prefix()
    )))
  }

  fn compile_output(&self, target: &BuildTarget) -> PathBuf {
    target.srcdir.join("libssl.a")
  }

  fn compile(&self, env: &BuildEnv<'_>) -> StageCommand {
    env.command(format!("{} all", env.make()))
  }

  fn install(&self, env: &BuildEnv<'_>) -> StageCommand {
    env.command(format!("{} install_sw", env.make()))
  }
}
