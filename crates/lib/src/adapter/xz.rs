use std::path::PathBuf;

use super::{BuildEnv, Completion, ProductAdapter, StageCommand};
use crate::target::BuildTarget;

/// XZ Utils: autoconf configure, liblzma built by libtool.
#[derive(Debug, Clone, Copy)]
pub struct XzAdapter;

impl ProductAdapter for XzAdapter {
  fn name(&self) -> &'static str {
    "xz"
  }

  fn unpack_marker(&self) -> &str {
    "configure"
  }

  fn configure_completion(&self, target: &BuildTarget) -> Option<Completion> {
    Some(Completion::Output(target.srcdir.join("Makefile")))
  }

  fn stale_configure_artifact(&self) -> Option<&str> {
    Some("config.status")
  }

  fn configure(&self, env: &BuildEnv<'_>) -> Option<StageCommand> {
    Some(env.command(format!(
      "./configure --disable-shared --enable-static --host={} --build={} --prefix={}",
      env.target.triple,
      env.build_triple,
      env.prefix()
    )))
  }

  fn compile_output(&self, target: &BuildTarget) -> PathBuf {
    target.srcdir.join("src/liblzma/.libs/liblzma.a")
  }

  fn compile(&self, env: &BuildEnv<'_>) -> StageCommand {
    env.command(format!("{} all", env.make()))
  }

  fn install(&self, env: &BuildEnv<'_>) -> StageCommand {
    env.command(format!("{} install", env.make()))
  }
}
