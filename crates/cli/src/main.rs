//! fatdeps: builds multi-architecture static libraries of BZip2, XZ and OpenSSL for Apple
//! platforms and packages them per SDK.

mod cmd;
mod context;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fatdeps_lib::consts::{ENV_BUILD_NUMBER, ENV_CONFIG, ENV_ROOT};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "fatdeps")]
#[command(author, version, about = "Build fat Apple static libraries of BZip2, XZ and OpenSSL", long_about = None)]
struct Cli {
  #[command(flatten)]
  global: GlobalArgs,

  #[command(subcommand)]
  command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
  /// Build root holding downloads, build trees, installs, merges and packages
  #[arg(long, global = true, env = ENV_ROOT)]
  pub root: Option<PathBuf>,

  /// Config file (default: fatdeps.toml in the current directory, if present)
  #[arg(long, global = true, env = ENV_CONFIG)]
  pub config: Option<PathBuf>,

  /// Build-number label embedded in package names
  #[arg(long, global = true, env = ENV_BUILD_NUMBER)]
  pub build_number: Option<String>,

  /// Maximum number of stages running at once (default: CPU count)
  #[arg(short, long, global = true)]
  pub jobs: Option<usize>,

  /// Download timeout, e.g. "90s" or "5m"
  #[arg(long, global = true)]
  pub fetch_timeout: Option<humantime::Duration>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Download, build, merge and package libraries
  Build {
    /// Products to build (default: all)
    products: Vec<String>,

    /// Restrict to these OSes
    #[arg(long = "os")]
    oses: Vec<String>,

    /// Restrict to these SDKs
    #[arg(long = "sdk")]
    sdks: Vec<String>,

    /// List the stages that would run without running them
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Remove the generated state of one product, one OS, or both combined
  Clean {
    /// Product to clean
    #[arg(required_unless_present = "os")]
    product: Option<String>,

    /// OS to clean
    #[arg(long)]
    os: Option<String>,

    /// Show what would be removed without removing it
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Remove all generated state, downloads included
  Distclean {
    /// Show what would be removed without removing it
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Print resolved paths and flags for every target of an OS
  Vars {
    /// OS to inspect
    os: String,

    /// Restrict to one product
    #[arg(long)]
    product: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// List the aggregate targets per product, OS, SDK and architecture
  Targets {
    /// Products to list (default: all)
    products: Vec<String>,

    /// Restrict to these OSes
    #[arg(long = "os")]
    oses: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.global.verbose);

  match cli.command {
    Commands::Build {
      products,
      oses,
      sdks,
      dry_run,
      output,
    } => cmd::cmd_build(&cli.global, products, oses, sdks, dry_run, output),
    Commands::Clean {
      product,
      os,
      dry_run,
      output,
    } => cmd::cmd_clean(&cli.global, product, os, dry_run, output),
    Commands::Distclean { dry_run, output } => cmd::cmd_distclean(&cli.global, dry_run, output),
    Commands::Vars { os, product, format } => cmd::cmd_vars(&cli.global, &os, product, format),
    Commands::Targets { products, oses, output } => cmd::cmd_targets(&cli.global, products, oses, output),
  }
}

/// `RUST_LOG` wins; otherwise library progress at info, everything else at warn.
fn init_tracing(verbose: bool) {
  let default = if verbose {
    "warn,fatdeps_lib=debug,fatdeps_cli=debug"
  } else {
    "warn,fatdeps_lib=info"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
