//! Implementation of the `fatdeps targets` command.

use anyhow::{Context as _, Result};
use owo_colors::{OwoColorize, Stream};

use fatdeps_lib::target::{AggregateLevel, TargetRequest, expand};

use crate::GlobalArgs;
use crate::context::Context;
use crate::output::{ARROW, OutputFormat, print_json};

pub fn cmd_targets(args: &GlobalArgs, products: Vec<String>, oses: Vec<String>, output: OutputFormat) -> Result<()> {
  let ctx = Context::load(args)?;

  let request = TargetRequest {
    products,
    oses,
    ..Default::default()
  };
  let set = expand(&ctx.config.registry, &ctx.layout, &ctx.config.build_number, &request)
    .context("Invalid request")?;
  let aggregates = set.aggregates();

  if output.is_json() {
    return print_json(&aggregates);
  }

  for aggregate in &aggregates {
    let indent = match aggregate.level {
      AggregateLevel::Os => "",
      AggregateLevel::Sdk => "  ",
      AggregateLevel::Arch => "    ",
    };
    if aggregate.children.is_empty() {
      println!("{}{}", indent, aggregate.name);
    } else {
      println!(
        "{}{} {} {}",
        indent,
        aggregate.name.if_supports_color(Stream::Stdout, |s| s.bold()),
        ARROW.if_supports_color(Stream::Stdout, |s| s.dimmed()),
        aggregate.children.join(" ")
      );
    }
  }

  Ok(())
}
