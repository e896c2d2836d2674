//! Implementation of the `fatdeps build` command.
//!
//! Expands the requested products, OSes and SDKs into a stage graph, runs it under the build
//! root lock and reports per product. Any failed or skipped stage exits with status 1.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use serde::Serialize;

use fatdeps_lib::build_lock::BuildLock;
use fatdeps_lib::execute::{NodeOutcome, ProductSummary, RunReport, StageLabel};
use fatdeps_lib::pipeline::Pipeline;
use fatdeps_lib::target::TargetRequest;

use crate::GlobalArgs;
use crate::context::Context;
use crate::output::{OutputFormat, Status, format_duration, format_summary, print_json, print_stat};

#[derive(Serialize)]
struct FailureJson<'a> {
  label: &'a StageLabel,
  kind: &'static str,
  message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  log: Option<String>,
}

#[derive(Serialize)]
struct SkippedJson<'a> {
  label: &'a StageLabel,
  failed_dependency: &'a StageLabel,
}

#[derive(Serialize)]
struct BuildJson<'a> {
  success: bool,
  dry_run: bool,
  build_number: &'a str,
  products: Vec<ProductSummary>,
  pending: Vec<&'a StageLabel>,
  failures: Vec<FailureJson<'a>>,
  skipped: Vec<SkippedJson<'a>>,
}

pub fn cmd_build(
  args: &GlobalArgs,
  products: Vec<String>,
  oses: Vec<String>,
  sdks: Vec<String>,
  dry_run: bool,
  output: OutputFormat,
) -> Result<()> {
  let start = Instant::now();
  let ctx = Context::load(args)?;

  let request = TargetRequest { products, oses, sdks };
  let pipeline = Pipeline::new(&ctx.config, &ctx.layout, &request).context("Invalid build request")?;

  let _lock = if dry_run {
    None
  } else {
    Some(BuildLock::acquire(&ctx.layout, "build").context("Failed to acquire build root lock")?)
  };

  let execute = ctx.execute_config(dry_run);
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(Arc::new(pipeline).run(&execute))
    .context("Build failed")?;

  if output.is_json() {
    print_json(&build_json(&report, &ctx.config.build_number))?;
  } else {
    print_report(&report, start);
  }

  if !report.is_success() {
    std::process::exit(1);
  }
  Ok(())
}

fn build_json<'a>(report: &'a RunReport, build_number: &'a str) -> BuildJson<'a> {
  BuildJson {
    success: report.is_success(),
    dry_run: report.dry_run,
    build_number,
    products: report.products(),
    pending: report
      .nodes
      .iter()
      .filter(|n| matches!(n.outcome, NodeOutcome::Pending))
      .map(|n| &n.label)
      .collect(),
    failures: report
      .failures()
      .map(|e| FailureJson {
        label: e.label(),
        kind: e.kind(),
        message: e.to_string(),
        log: e.log().map(|p| p.display().to_string()),
      })
      .collect(),
    skipped: report
      .skipped()
      .map(|(label, dep)| SkippedJson {
        label,
        failed_dependency: &dep.0,
      })
      .collect(),
  }
}

fn print_report(report: &RunReport, start: Instant) {
  if report.dry_run {
    for node in &report.nodes {
      if matches!(node.outcome, NodeOutcome::Pending) {
        Status::Pending.print(&node.label.to_string());
      }
    }
    println!();
    Status::Note.print("Dry run - nothing was built");
  } else {
    for failure in report.failures() {
      Status::Failed.print(&failure.to_string());
    }
    let skipped = report.skipped().count();
    if skipped > 0 {
      Status::Warning.print(&format!("{} stage(s) skipped after a failed dependency", skipped));
    }
    println!();
  }

  for summary in report.products() {
    let line = format!("{}: {}", summary.product, format_summary(&summary));
    if summary.is_success() {
      Status::Done.print(&line);
    } else {
      Status::Failed.print(&line);
    }
  }
  print_stat("Duration", &format_duration(start.elapsed()));
}
