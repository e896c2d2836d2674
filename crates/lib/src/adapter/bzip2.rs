use std::path::PathBuf;

use super::{BuildEnv, Completion, ProductAdapter, StageCommand};
use crate::target::BuildTarget;

/// BZip2 ships a plain Makefile; there is nothing to configure.
#[derive(Debug, Clone, Copy)]
pub struct Bzip2Adapter;

impl ProductAdapter for Bzip2Adapter {
  fn name(&self) -> &'static str {
    "bzip2"
  }

  fn unpack_marker(&self) -> &str {
    "Makefile"
  }

  fn configure_completion(&self, _target: &BuildTarget) -> Option<Completion> {
    None
  }

  fn configure(&self, _env: &BuildEnv<'_>) -> Option<StageCommand> {
    None
  }

  fn compile_output(&self, target: &BuildTarget) -> PathBuf {
    target.srcdir.join("libbz2.a")
  }

  fn compile(&self, env: &BuildEnv<'_>) -> StageCommand {
    // The Makefile assigns CC and CFLAGS itself, so they go on the command line.
    env.command(format!(
      "{} libbz2.a CC=\"$CC\" CFLAGS=\"$CFLAGS -D_FILE_OFFSET_BITS=64\"",
      env.make()
    ))
  }

  fn install(&self, env: &BuildEnv<'_>) -> StageCommand {
    // `make install` also links the command-line tools; only the library and header ship.
    let prefix = env.prefix();
    env.command(format!(
      "mkdir -p {prefix}/lib {prefix}/include && cp libbz2.a {prefix}/lib/ && cp bzlib.h {prefix}/include/"
    ))
  }
}
