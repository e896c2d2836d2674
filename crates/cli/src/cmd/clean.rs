//! Implementation of the `fatdeps clean` and `fatdeps distclean` commands.

use std::time::Instant;

use anyhow::{Context as _, Result};

use fatdeps_lib::build_lock::BuildLock;
use fatdeps_lib::clean::{CleanResult, CleanScope, clean};

use crate::GlobalArgs;
use crate::context::Context;
use crate::output::{OutputFormat, Status, format_bytes, format_duration, print_json, print_stat};

pub fn cmd_clean(
  args: &GlobalArgs,
  product: Option<String>,
  os: Option<String>,
  dry_run: bool,
  output: OutputFormat,
) -> Result<()> {
  let scope = match (product, os) {
    (Some(product), Some(os)) => CleanScope::ProductOs { product, os },
    (Some(product), None) => CleanScope::Product(product),
    (None, Some(os)) => CleanScope::Os(os),
    (None, None) => anyhow::bail!("Name a product or --os to clean; use distclean to remove everything"),
  };
  run(args, "clean", &scope, dry_run, output)
}

pub fn cmd_distclean(args: &GlobalArgs, dry_run: bool, output: OutputFormat) -> Result<()> {
  run(args, "distclean", &CleanScope::All, dry_run, output)
}

fn run(args: &GlobalArgs, command: &str, scope: &CleanScope, dry_run: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let ctx = Context::load(args)?;

  let _lock = if dry_run || !ctx.layout.root().exists() {
    None
  } else {
    Some(BuildLock::acquire(&ctx.layout, command).context("Failed to acquire build root lock")?)
  };

  let result = clean(&ctx.layout, &ctx.config.registry, scope, dry_run).context("Clean failed")?;

  if output.is_json() {
    print_json(&result)?;
  } else {
    print_result(&result, dry_run, start);
  }

  Ok(())
}

fn print_result(result: &CleanResult, dry_run: bool, start: Instant) {
  println!();
  if dry_run {
    for path in &result.deleted_paths {
      println!("  {}", path.display());
    }
    Status::Note.print("Dry run - no changes made");
  } else {
    Status::Done.print("Clean complete!");
  }
  print_stat("Paths removed", &result.deleted_paths.len().to_string());
  print_stat("Space freed", &format_bytes(result.bytes_freed));
  print_stat("Duration", &format_duration(start.elapsed()));
}
