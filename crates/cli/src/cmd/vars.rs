//! Implementation of the `fatdeps vars` command: resolved paths and flags for debugging.

use anyhow::{Context as _, Result};

use fatdeps_lib::pipeline::Pipeline;
use fatdeps_lib::target::TargetRequest;

use crate::GlobalArgs;
use crate::context::Context;
use crate::output::{OutputFormat, print_json, print_stat};

pub fn cmd_vars(args: &GlobalArgs, os: &str, product: Option<String>, format: OutputFormat) -> Result<()> {
  let ctx = Context::load(args)?;

  let request = TargetRequest {
    products: product.into_iter().collect(),
    oses: vec![os.to_string()],
    ..Default::default()
  };
  let pipeline = Pipeline::new(&ctx.config, &ctx.layout, &request).context("Invalid request")?;
  let vars = pipeline.vars(os);

  if format.is_json() {
    return print_json(&vars);
  }

  print_stat("Root", &ctx.layout.root().display().to_string());
  print_stat("Build number", &ctx.config.build_number);
  for target in &vars {
    println!();
    println!("{}", target.target);
    print_stat("Version", &target.version);
    print_stat("Triple", &target.triple);
    print_stat("CFLAGS", &target.cflags);
    match (&target.sdk_root, &target.compiler) {
      (Some(root), Some(compiler)) => {
        print_stat("SDK root", &root.display().to_string());
        print_stat("CC", compiler);
      }
      _ => print_stat("SDK root", "unresolved"),
    }
    print_stat("Source", &target.srcdir.display().to_string());
    print_stat("Install", &target.install_dir.display().to_string());
    print_stat("Merge", &target.merge_dir.display().to_string());
    print_stat("Package", &target.package.display().to_string());
  }

  Ok(())
}
