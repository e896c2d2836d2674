//! Per-architecture build driver.
//!
//! Runs download, unpack, configure, compile and install for one target through its
//! product adapter. Every stage first compares its declared outputs against its declared
//! inputs and does nothing when they are fresh. Tool output is appended to the target's
//! per-stage log.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::adapter::{BuildEnv, Completion, ProductAdapter, StageCommand};
use crate::config::ToolSettings;
use crate::consts::PARTIAL_SUFFIX;
use crate::execute::actions::{
  ActionError, Fetcher, execute_cmd, hash_bytes, hash_file, scoped_env, shell_quote, unpack_tar_gz,
};
use crate::execute::types::{Stage, StageError, StageLabel};
use crate::fresh;
use crate::target::{BuildTarget, ProductPlan};
use crate::toolchain::SdkResolver;

/// Whether a stage did any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
  Fresh,
  Built,
}

/// The declared outputs and inputs of a stage, as seen by the freshness check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagePaths {
  pub outputs: Vec<PathBuf>,
  pub inputs: Vec<PathBuf>,
}

impl StagePaths {
  pub fn is_fresh(&self) -> bool {
    fresh::all_fresh(&self.outputs, &self.inputs)
  }
}

pub fn unpack_marker_path(target: &BuildTarget, adapter: &dyn ProductAdapter) -> PathBuf {
  target.srcdir.join(adapter.unpack_marker())
}

/// Outputs and inputs of `stage` for `target`. Merge and package are handled by their own modules.
pub fn target_stage_paths(
  plan: &ProductPlan,
  target: &BuildTarget,
  adapter: &dyn ProductAdapter,
  stage: Stage,
) -> StagePaths {
  let marker = unpack_marker_path(target, adapter);
  let configured = adapter.configure_completion(target).map(|c| c.path().to_path_buf());

  match stage {
    Stage::Download => StagePaths {
      outputs: vec![plan.archive.clone()],
      inputs: Vec::new(),
    },
    Stage::Unpack => {
      let mut inputs = vec![plan.archive.clone()];
      inputs.extend(plan.product.patches_for(&target.key.os).map(|p| p.path.clone()));
      StagePaths {
        outputs: vec![marker],
        inputs,
      }
    }
    Stage::Configure => StagePaths {
      outputs: configured.into_iter().collect(),
      inputs: vec![marker],
    },
    Stage::Compile => StagePaths {
      outputs: vec![adapter.compile_output(target), target.compiled_marker()],
      inputs: vec![configured.unwrap_or(marker)],
    },
    Stage::Install => {
      let mut outputs: Vec<PathBuf> = plan
        .product
        .libraries
        .iter()
        .map(|lib| target.installed_library(lib))
        .collect();
      outputs.push(target.installed_marker());
      StagePaths {
        outputs,
        inputs: vec![target.compiled_marker()],
      }
    }
    Stage::Merge | Stage::Package => StagePaths::default(),
  }
}

/// The archive is present and matches the product's SHA-256 pin, if any.
pub fn archive_is_current(plan: &ProductPlan) -> bool {
  match &plan.product.sha256 {
    None => plan.archive.exists(),
    Some(expected) => std::fs::read(&plan.archive)
      .is_ok_and(|bytes| hash_bytes(&bytes).eq_ignore_ascii_case(expected)),
  }
}

/// Runs the per-target stages.
#[derive(Debug)]
pub struct Driver {
  tools: ToolSettings,
  fetcher: Fetcher,
  sdks: Arc<SdkResolver>,
  build_triple: String,
}

impl Driver {
  pub fn new(tools: ToolSettings, fetcher: Fetcher, sdks: Arc<SdkResolver>, build_triple: String) -> Self {
    Self {
      tools,
      fetcher,
      sdks,
      build_triple,
    }
  }

  /// Fetch the product archive unless it is already present and matches its pin.
  pub async fn download(&self, plan: &ProductPlan) -> Result<StageStatus, StageError> {
    let product = &plan.product;
    if plan.archive.exists() {
      let Some(expected) = product.sha256.as_deref() else {
        debug!(archive = ?plan.archive, "archive present");
        return Ok(StageStatus::Fresh);
      };
      match hash_file(&plan.archive).await {
        Ok(actual) if actual.eq_ignore_ascii_case(expected) => {
          debug!(archive = ?plan.archive, "archive present and verified");
          return Ok(StageStatus::Fresh);
        }
        Ok(actual) => warn!(
          archive = ?plan.archive,
          expected = %expected,
          actual = %actual,
          "archive does not match pin, fetching again"
        ),
        Err(e) => warn!(archive = ?plan.archive, error = %e, "failed to hash archive, fetching again"),
      }
    }

    let url = product.url();
    self
      .fetcher
      .fetch(&url, product.sha256.as_deref(), &plan.archive)
      .await
      .map_err(|e| StageError::Download {
        label: StageLabel::product(&product.name, Stage::Download),
        version: product.version.clone(),
        url: url.clone(),
        message: e.to_string(),
      })?;

    Ok(StageStatus::Built)
  }

  /// Unpack into a staging directory, apply the patch set, then move the tree into place.
  ///
  /// The unpack marker is touched last; a tree whose patches failed is never moved into place.
  pub async fn unpack(
    &self,
    plan: &ProductPlan,
    target: &BuildTarget,
    adapter: &dyn ProductAdapter,
  ) -> Result<StageStatus, StageError> {
    if target_stage_paths(plan, target, adapter, Stage::Unpack).is_fresh() {
      return Ok(StageStatus::Fresh);
    }

    let label = StageLabel::target(&target.key, Stage::Unpack);
    let log = target.log_path(Stage::Unpack);
    info!(target = %target.key, archive = ?plan.archive, "unpacking");

    let staging = staging_path(&target.srcdir);
    let archive = plan.archive.clone();
    let dest = staging.clone();
    let unpacked = tokio::task::spawn_blocking(move || {
      if dest.exists() {
        std::fs::remove_dir_all(&dest)?;
      }
      unpack_tar_gz(&archive, &dest, 1)
    })
    .await;

    let unpack_error = |message: String| StageError::Unpack {
      label: label.clone(),
      message,
      log: log.clone(),
    };
    match unpacked {
      Ok(Ok(())) => {}
      Ok(Err(e)) => return Err(unpack_error(e.to_string())),
      Err(e) => return Err(unpack_error(e.to_string())),
    }

    let env = scoped_env(&self.tools, &Default::default());
    for patch in plan.product.patches_for(&target.key.os) {
      info!(target = %target.key, patch = ?patch.path, "applying patch");
      let script = format!(
        "{} -p1 -i {}",
        shell_quote(&self.tools.patch),
        shell_quote(&patch.path.to_string_lossy())
      );
      if let Err(e) = execute_cmd(&script, &staging, &env, &log, self.tools.shell.as_deref()).await {
        debug!(patch = ?patch.path, error = %e, "patch failed");
        let _ = fs::remove_dir_all(&staging).await;
        return Err(StageError::Patch {
          label: label.clone(),
          patch: patch.path.clone(),
          log: log.clone(),
        });
      }
    }

    if fs::try_exists(&target.srcdir).await.unwrap_or(false) {
      fs::remove_dir_all(&target.srcdir)
        .await
        .map_err(|e| StageError::io(&label, "failed to remove previous source tree", e))?;
    }
    fs::rename(&staging, &target.srcdir)
      .await
      .map_err(|e| StageError::io(&label, "failed to move source tree into place", e))?;

    let marker = unpack_marker_path(target, adapter);
    if !marker.exists() {
      return Err(unpack_error(format!(
        "archive did not contain {}",
        adapter.unpack_marker()
      )));
    }
    fresh::touch(&marker).map_err(|e| StageError::io(&label, "failed to touch unpack marker", e))?;

    Ok(StageStatus::Built)
  }

  /// Configure the source tree. A leftover artifact of an interrupted configure is reported,
  /// not cleaned.
  pub async fn configure(
    &self,
    plan: &ProductPlan,
    target: &BuildTarget,
    adapter: &dyn ProductAdapter,
  ) -> Result<StageStatus, StageError> {
    let Some(completion) = adapter.configure_completion(target) else {
      return Ok(StageStatus::Fresh);
    };
    if target_stage_paths(plan, target, adapter, Stage::Configure).is_fresh() {
      return Ok(StageStatus::Fresh);
    }

    let label = StageLabel::target(&target.key, Stage::Configure);
    let log = target.log_path(Stage::Configure);
    let failed = |message: String| StageError::Configure {
      label: label.clone(),
      message,
      log: log.clone(),
    };

    if let Some(artifact) = adapter.stale_configure_artifact()
      && target.srcdir.join(artifact).exists()
    {
      return Err(failed(format!(
        "stale partial configuration: {} exists without a completed configure; clean {} and rebuild",
        artifact, target.key.product
      )));
    }

    let env = self.build_env(target).await.map_err(|e| failed(e.to_string()))?;
    let Some(command) = adapter.configure(&env) else {
      return Ok(StageStatus::Fresh);
    };

    info!(target = %target.key, "configuring");
    if let Completion::Marker(marker) = &completion {
      remove_if_exists(marker).await.map_err(|e| StageError::io(&label, "failed to remove marker", e))?;
    }
    self.run(&command, &log).await.map_err(|e| failed(e.to_string()))?;

    match &completion {
      Completion::Marker(marker) => {
        fresh::write_marker(marker, Stage::Configure.as_str(), &target.key.to_string())
          .map_err(|e| StageError::io(&label, "failed to write configure marker", e))?;
      }
      Completion::Output(output) => {
        finish_output(output).map_err(|e| failed(format!("{}: {}", output.display(), e)))?;
      }
    }

    Ok(StageStatus::Built)
  }

  pub async fn compile(
    &self,
    plan: &ProductPlan,
    target: &BuildTarget,
    adapter: &dyn ProductAdapter,
  ) -> Result<StageStatus, StageError> {
    if target_stage_paths(plan, target, adapter, Stage::Compile).is_fresh() {
      return Ok(StageStatus::Fresh);
    }

    let label = StageLabel::target(&target.key, Stage::Compile);
    let log = target.log_path(Stage::Compile);
    let failed = |message: String| StageError::Compile {
      label: label.clone(),
      message,
      log: log.clone(),
    };

    let env = self.build_env(target).await.map_err(|e| failed(e.to_string()))?;
    let completed = target.compiled_marker();
    remove_if_exists(&completed)
      .await
      .map_err(|e| StageError::io(&label, "failed to remove marker", e))?;

    info!(target = %target.key, "compiling");
    self
      .run(&adapter.compile(&env), &log)
      .await
      .map_err(|e| failed(e.to_string()))?;

    let output = adapter.compile_output(target);
    finish_output(&output).map_err(|e| failed(format!("{}: {}", output.display(), e)))?;
    fresh::write_marker(&completed, Stage::Compile.as_str(), &target.key.to_string())
      .map_err(|e| StageError::io(&label, "failed to write compile marker", e))?;

    Ok(StageStatus::Built)
  }

  pub async fn install(
    &self,
    plan: &ProductPlan,
    target: &BuildTarget,
    adapter: &dyn ProductAdapter,
  ) -> Result<StageStatus, StageError> {
    let paths = target_stage_paths(plan, target, adapter, Stage::Install);
    if paths.is_fresh() {
      return Ok(StageStatus::Fresh);
    }

    let label = StageLabel::target(&target.key, Stage::Install);
    let log = target.log_path(Stage::Install);
    let failed = |message: String| StageError::Install {
      label: label.clone(),
      message,
      log: log.clone(),
    };

    let env = self.build_env(target).await.map_err(|e| failed(e.to_string()))?;
    let completed = target.installed_marker();
    remove_if_exists(&completed)
      .await
      .map_err(|e| StageError::io(&label, "failed to remove marker", e))?;

    info!(target = %target.key, prefix = ?target.install_dir, "installing");
    self
      .run(&adapter.install(&env), &log)
      .await
      .map_err(|e| failed(e.to_string()))?;

    for library in paths.outputs.iter().filter(|p| **p != completed) {
      finish_output(library).map_err(|e| failed(format!("{}: {}", library.display(), e)))?;
    }
    fresh::write_marker(&completed, Stage::Install.as_str(), &target.key.to_string())
      .map_err(|e| StageError::io(&label, "failed to write install marker", e))?;

    Ok(StageStatus::Built)
  }

  async fn build_env<'a>(&self, target: &'a BuildTarget) -> Result<BuildEnv<'a>, ActionError> {
    let sdks = Arc::clone(&self.sdks);
    let sdk = target.key.sdk.clone();
    let sysroot = tokio::task::spawn_blocking(move || sdks.resolve(&sdk))
      .await
      .map_err(|e| ActionError::Io(std::io::Error::other(e)))??;

    Ok(BuildEnv {
      target,
      sysroot,
      build_triple: self.build_triple.clone(),
      make: self.tools.make.clone(),
    })
  }

  async fn run(&self, command: &StageCommand, log: &Path) -> Result<(), ActionError> {
    let env = scoped_env(&self.tools, &command.env);
    execute_cmd(&command.script, &command.cwd, &env, log, self.tools.shell.as_deref()).await
  }
}

/// `<srcdir>.partial`, the staging directory for an unpack.
fn staging_path(srcdir: &Path) -> PathBuf {
  let mut name = srcdir.file_name().unwrap_or_default().to_os_string();
  name.push(".");
  name.push(PARTIAL_SUFFIX);
  srcdir.with_file_name(name)
}

/// Check a tool-produced output exists and stamp it as newer than the stage inputs.
///
/// Tools that find their output up to date leave its timestamp alone.
fn finish_output(output: &Path) -> std::io::Result<()> {
  if !output.exists() {
    return Err(std::io::Error::new(ErrorKind::NotFound, "expected output was not produced"));
  }
  fresh::touch(output)
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
  match fs::remove_file(path).await {
    Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}
