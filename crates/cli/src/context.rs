//! Resolution of the config file, build root and execution settings shared by all commands.
//!
//! Precedence: command-line flags, then environment, then the config file, then built-ins.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tracing::debug;

use fatdeps_lib::config::Config;
use fatdeps_lib::consts::{CONFIG_FILENAME, DEFAULT_ROOT_DIR};
use fatdeps_lib::execute::ExecuteConfig;
use fatdeps_lib::layout::Layout;

use crate::GlobalArgs;

pub struct Context {
  pub config: Config,
  pub layout: Layout,
  jobs: Option<usize>,
}

impl Context {
  pub fn load(args: &GlobalArgs) -> Result<Self> {
    let project_dir = std::env::current_dir().context("Failed to determine current directory")?;

    let config_path = args.config.clone().or_else(|| {
      let default = project_dir.join(CONFIG_FILENAME);
      default.exists().then_some(default)
    });
    let mut config = match &config_path {
      Some(path) => Config::load(path).with_context(|| format!("Failed to load config {}", path.display()))?,
      None => Config::builtin(&project_dir).context("Failed to load built-in registry")?,
    };

    if let Some(build_number) = &args.build_number {
      config.build_number = build_number.clone();
    }
    if let Some(timeout) = args.fetch_timeout {
      config.fetch.timeout = timeout.into();
    }

    let root: PathBuf = args.root.clone().unwrap_or_else(|| project_dir.join(DEFAULT_ROOT_DIR));
    debug!(root = ?root, config = ?config_path, build_number = %config.build_number, "resolved context");

    Ok(Self {
      config,
      layout: Layout::new(root),
      jobs: args.jobs,
    })
  }

  pub fn execute_config(&self, dry_run: bool) -> ExecuteConfig {
    let mut execute = ExecuteConfig {
      dry_run,
      ..Default::default()
    };
    if let Some(jobs) = self.jobs {
      execute.parallelism = jobs.max(1);
    }
    execute
  }
}
