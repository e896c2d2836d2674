use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn clean_product_keeps_siblings() {
  let env = TestEnv::new();
  env
    .fatdeps_cmd()
    .args(["build", "BZip2", "XZ", "--os", "macOS"])
    .assert()
    .success();

  env
    .fatdeps_cmd()
    .args(["clean", "XZ"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Clean complete"));

  assert!(!env.merge_dir("xz-5.4.7").exists());
  assert!(!env.dist("xz-5.4.7-custom-macosx.tar.gz").exists());
  assert!(env.merge_dir("bzip2-1.0.8").exists());
  assert!(env.dist("bzip2-1.0.8-custom-macosx.tar.gz").exists());

  env
    .fatdeps_cmd()
    .args(["build", "BZip2", "XZ", "--os", "macOS"])
    .assert()
    .success()
    .stdout(predicate::str::contains("BZip2: 9 fresh"))
    .stdout(predicate::str::contains("XZ: 8 built"));
}

#[test]
fn clean_dry_run_removes_nothing() {
  let env = TestEnv::new();
  env
    .fatdeps_cmd()
    .args(["build", "BZip2", "--os", "macOS"])
    .assert()
    .success();

  env
    .fatdeps_cmd()
    .args(["clean", "--os", "macOS", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"));

  assert!(env.merge_dir("bzip2-1.0.8").exists());
}

#[test]
fn distclean_removes_downloads() {
  let env = TestEnv::new();
  env
    .fatdeps_cmd()
    .args(["build", "BZip2", "--os", "macOS"])
    .assert()
    .success();
  assert!(env.root().join("downloads").join("bzip2-1.0.8.tar.gz").exists());

  env.fatdeps_cmd().arg("distclean").assert().success();

  assert!(!env.root().join("downloads").exists());
  assert!(!env.root().join("dist").exists());
}
