use std::path::PathBuf;

use super::{BuildEnv, Completion, ProductAdapter, StageCommand};
use crate::consts::CONFIGURED_MARKER;
use crate::execute::actions::shell_quote;
use crate::registry::ScriptSpec;
use crate::target::BuildTarget;

/// A user-defined product described by shell templates.
#[derive(Debug, Clone)]
pub struct ScriptAdapter {
  spec: ScriptSpec,
}

impl ScriptAdapter {
  pub fn new(spec: ScriptSpec) -> Self {
    Self { spec }
  }

  fn render(&self, template: &str, env: &BuildEnv<'_>) -> String {
    template
      .replace("{prefix}", &env.prefix())
      .replace("{srcdir}", &shell_quote(&env.target.srcdir.to_string_lossy()))
      .replace("{make}", &env.make())
      .replace("{host}", &env.target.triple)
  }
}

impl ProductAdapter for ScriptAdapter {
  fn name(&self) -> &'static str {
    "script"
  }

  fn unpack_marker(&self) -> &str {
    &self.spec.unpack_marker
  }

  fn configure_completion(&self, target: &BuildTarget) -> Option<Completion> {
    self.spec.configure.as_ref()?;
    Some(match &self.spec.configure_output {
      Some(output) => Completion::Output(target.srcdir.join(output)),
      None => Completion::Marker(target.srcdir.join(CONFIGURED_MARKER)),
    })
  }

  fn stale_configure_artifact(&self) -> Option<&str> {
    self.spec.stale_configure_output.as_deref()
  }

  fn configure(&self, env: &BuildEnv<'_>) -> Option<StageCommand> {
    let template = self.spec.configure.as_deref()?;
    Some(env.command(self.render(template, env)))
  }

  fn compile_output(&self, target: &BuildTarget) -> PathBuf {
    target.srcdir.join(&self.spec.build_output)
  }

  fn compile(&self, env: &BuildEnv<'_>) -> StageCommand {
    env.command(self.render(&self.spec.build, env))
  }

  fn install(&self, env: &BuildEnv<'_>) -> StageCommand {
    env.command(self.render(&self.spec.install, env))
  }
}
