//! Wires configuration, target expansion, the per-target driver, the merger and the
//! packager into one runnable stage graph.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::adapter::{ProductAdapter, adapter_for};
use crate::config::Config;
use crate::driver::{Driver, StageStatus, archive_is_current, target_stage_paths};
use crate::execute::actions::{ActionError, Fetcher};
use crate::execute::{
  ExecuteConfig, ExecuteError, NodeScope, RunReport, Stage, StageError, StageGraph, StageNode, StageRunner,
  execute_graph,
};
use crate::layout::Layout;
use crate::merge::{self, merge_paths};
use crate::package::{self, package_paths};
use crate::platform::host_triple;
use crate::registry::ConfigurationError;
use crate::target::{BuildTarget, ProductPlan, SdkGroup, TargetRequest, TargetSet, expand};
use crate::toolchain::{FatBinaryCombiner, LipoCombiner, SdkResolver};

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),

  #[error("failed to set up fetcher: {0}")]
  Fetcher(#[source] ActionError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),
}

/// Resolved paths and flags of one target, as printed by `fatdeps vars`.
#[derive(Debug, Clone, Serialize)]
pub struct TargetVars {
  pub target: String,
  pub product: String,
  pub version: String,
  pub triple: String,
  pub cflags: String,
  /// `None` when the SDK root could not be resolved.
  pub sdk_root: Option<PathBuf>,
  pub compiler: Option<String>,
  pub srcdir: PathBuf,
  pub install_dir: PathBuf,
  pub merge_dir: PathBuf,
  pub package: PathBuf,
}

pub struct Pipeline {
  targets: TargetSet,
  adapters: HashMap<String, Box<dyn ProductAdapter>>,
  driver: Driver,
  sdks: Arc<SdkResolver>,
  combiner: Arc<dyn FatBinaryCombiner>,
}

impl Pipeline {
  /// Expand `request` and set up the tools for it. Fails before anything runs if the request
  /// names an unknown product, OS or SDK.
  pub fn new(config: &Config, layout: &Layout, request: &TargetRequest) -> Result<Self, PipelineError> {
    let targets = expand(&config.registry, layout, &config.build_number, request)?;
    let fetcher = Fetcher::new(&config.fetch).map_err(PipelineError::Fetcher)?;
    let sdks = Arc::new(SdkResolver::new(&config.tools));
    let driver = Driver::new(config.tools.clone(), fetcher, sdks.clone(), host_triple());

    let adapters = targets
      .products
      .iter()
      .map(|plan| (plan.product.name.clone(), adapter_for(&plan.product.adapter)))
      .collect();

    debug!(
      products = targets.products.len(),
      targets = targets.targets().count(),
      "pipeline ready"
    );

    Ok(Self {
      targets,
      adapters,
      driver,
      sdks,
      combiner: Arc::new(LipoCombiner::new(&config.tools)),
    })
  }

  /// Replace the fat-binary combiner.
  pub fn with_combiner(mut self, combiner: Arc<dyn FatBinaryCombiner>) -> Self {
    self.combiner = combiner;
    self
  }

  pub fn targets(&self) -> &TargetSet {
    &self.targets
  }

  /// The stage graph of every expanded target.
  pub fn graph(&self) -> Result<StageGraph, ExecuteError> {
    StageGraph::from_targets(&self.targets, |plan, target| {
      self
        .adapters
        .get(&plan.product.name)
        .is_some_and(|adapter| adapter.configure_completion(target).is_some())
    })
  }

  /// Build everything, or with `dry_run` report what would be built.
  pub async fn run(self: Arc<Self>, config: &ExecuteConfig) -> Result<RunReport, ExecuteError> {
    let graph = self.graph()?;
    info!(
      stages = graph.len(),
      parallelism = config.parallelism,
      build_number = %self.targets.build_number,
      "running pipeline"
    );
    execute_graph(&graph, self, config).await
  }

  /// Resolved paths and flags of every target of `os`.
  pub fn vars(&self, os: &str) -> Vec<TargetVars> {
    self
      .targets
      .sdk_groups()
      .filter(|group| group.key.os.eq_ignore_ascii_case(os))
      .flat_map(|group| group.targets.iter().map(move |target| (group, target)))
      .map(|(group, target)| {
        let sdk_root = match self.sdks.resolve(&target.key.sdk) {
          Ok(path) => Some(path),
          Err(e) => {
            debug!(sdk = %target.key.sdk, error = %e, "SDK root unavailable");
            None
          }
        };

        TargetVars {
          target: target.key.to_string(),
          product: target.key.product.clone(),
          version: target.version.clone(),
          triple: target.triple.clone(),
          cflags: target.cflags.clone(),
          compiler: sdk_root.as_deref().map(|root| target.compiler(root)),
          sdk_root,
          srcdir: target.srcdir.clone(),
          install_dir: target.install_dir.clone(),
          merge_dir: group.merge_dir.clone(),
          package: group.package_path.clone(),
        }
      })
      .collect()
  }

  fn adapter(&self, product: &str) -> Option<&dyn ProductAdapter> {
    self.adapters.get(product).map(|adapter| adapter.as_ref())
  }

  fn resolve(&self, node: &StageNode) -> Option<Resolved<'_>> {
    let plan = self.targets.plan(node.product())?;
    match &node.scope {
      NodeScope::Product(_) => Some(Resolved::Product(plan)),
      NodeScope::Target(key) => {
        let target = self.targets.target(key)?;
        Some(Resolved::Target(plan, target, self.adapter(&key.product)?))
      }
      NodeScope::Sdk(key) => Some(Resolved::Sdk(plan, self.targets.sdk_group(key)?)),
    }
  }
}

enum Resolved<'a> {
  Product(&'a ProductPlan),
  Target(&'a ProductPlan, &'a BuildTarget, &'a dyn ProductAdapter),
  Sdk(&'a ProductPlan, &'a SdkGroup),
}

impl StageRunner for Pipeline {
  async fn run_node(&self, node: &StageNode) -> Result<StageStatus, StageError> {
    let Some(resolved) = self.resolve(node) else {
      let label = node.label();
      return Err(StageError::io(
        &label,
        "unknown stage node",
        io::Error::new(io::ErrorKind::NotFound, label.to_string()),
      ));
    };

    match (node.stage, resolved) {
      (Stage::Download, Resolved::Product(plan)) => self.driver.download(plan).await,
      (Stage::Unpack, Resolved::Target(plan, target, adapter)) => self.driver.unpack(plan, target, adapter).await,
      (Stage::Configure, Resolved::Target(plan, target, adapter)) => {
        self.driver.configure(plan, target, adapter).await
      }
      (Stage::Compile, Resolved::Target(plan, target, adapter)) => self.driver.compile(plan, target, adapter).await,
      (Stage::Install, Resolved::Target(plan, target, adapter)) => self.driver.install(plan, target, adapter).await,
      (Stage::Merge, Resolved::Sdk(plan, group)) => merge::merge(&plan.product, group, self.combiner.clone()).await,
      (Stage::Package, Resolved::Sdk(plan, group)) => package::package(&plan.product, group).await,
      (stage, _) => {
        let label = node.label();
        Err(StageError::io(
          &label,
          format!("{} does not apply to this scope", stage),
          io::Error::new(io::ErrorKind::InvalidInput, label.to_string()),
        ))
      }
    }
  }

  fn is_fresh(&self, node: &StageNode) -> bool {
    match (node.stage, self.resolve(node)) {
      (Stage::Download, Some(Resolved::Product(plan))) => archive_is_current(plan),
      (stage, Some(Resolved::Target(plan, target, adapter))) => {
        target_stage_paths(plan, target, adapter, stage).is_fresh()
      }
      (Stage::Merge, Some(Resolved::Sdk(plan, group))) => merge_paths(&plan.product, group).is_fresh(),
      (Stage::Package, Some(Resolved::Sdk(plan, group))) => package_paths(&plan.product, group).is_fresh(),
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn pipeline(root: &TempDir, request: TargetRequest) -> Pipeline {
    let config = Config::builtin(root.path()).unwrap();
    Pipeline::new(&config, &Layout::new(root.path()), &request).unwrap()
  }

  #[test]
  fn unknown_os_fails_before_running() {
    let root = TempDir::new().unwrap();
    let config = Config::builtin(root.path()).unwrap();
    let request = TargetRequest {
      oses: vec!["Android".to_string()],
      ..Default::default()
    };

    let err = Pipeline::new(&config, &Layout::new(root.path()), &request).err().unwrap();
    assert!(matches!(err, PipelineError::Configuration(_)));
  }

  #[test]
  fn graph_covers_every_builtin_target() {
    let root = TempDir::new().unwrap();
    let p = pipeline(&root, TargetRequest::default());
    let graph = p.graph().unwrap();

    let targets = p.targets().targets().count();
    let bzip2 = p.targets().targets().filter(|t| t.key.product == "BZip2").count();
    let groups = p.targets().sdk_groups().count();
    let products = p.targets().products.len();

    // unpack, compile, install per target plus configure for everything but BZip2
    let expected = products + targets * 4 - bzip2 + groups * 2;
    assert_eq!(graph.len(), expected);
  }

  #[tokio::test]
  async fn dry_run_on_empty_root_is_all_pending() {
    let root = TempDir::new().unwrap();
    let p = Arc::new(pipeline(
      &root,
      TargetRequest {
        products: vec!["XZ".to_string()],
        oses: vec!["macOS".to_string()],
        ..Default::default()
      },
    ));

    let config = ExecuteConfig {
      parallelism: 2,
      dry_run: true,
    };
    let report = p.run(&config).await.unwrap();

    assert!(report.dry_run);
    assert!(report.is_success());
    assert_eq!(report.executed().count(), report.nodes.len());
    assert!(!root.path().join("downloads").exists());
  }

  #[test]
  fn vars_lists_pinned_sdk_roots() {
    let root = TempDir::new().unwrap();
    let mut config = Config::builtin(root.path()).unwrap();
    config.tools.sdk_paths.insert("macosx".to_string(), PathBuf::from("/sdk/MacOSX.sdk"));
    let request = TargetRequest {
      products: vec!["BZip2".to_string()],
      ..Default::default()
    };
    let p = Pipeline::new(&config, &Layout::new(root.path()), &request).unwrap();

    let vars = p.vars("macos");
    assert_eq!(vars.len(), 2);
    assert_eq!(vars[0].target, "BZip2/macOS/macosx.x86_64");
    assert_eq!(vars[0].triple, "x86_64-apple-darwin");
    assert_eq!(vars[0].sdk_root, Some(PathBuf::from("/sdk/MacOSX.sdk")));
    assert!(vars[0].compiler.as_deref().unwrap().contains("--sysroot /sdk/MacOSX.sdk"));
    assert!(vars[1].package.ends_with("bzip2-1.0.8-custom-macosx.tar.gz"));
  }
}
