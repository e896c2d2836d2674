use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_packages_each_product() {
  let env = TestEnv::new();

  env
    .fatdeps_cmd()
    .args(["build", "--os", "macOS", "--build-number", "7", "-j", "2"])
    .assert()
    .success()
    .stdout(predicate::str::contains("BZip2: 9 built"))
    .stdout(predicate::str::contains("OpenSSL: 9 built"));

  for package in [
    "bzip2-1.0.8-7-macosx.tar.gz",
    "xz-5.4.7-7-macosx.tar.gz",
    "openssl-3.0.15-7-macosx.tar.gz",
  ] {
    assert!(env.dist(package).exists(), "{} missing", package);
  }

  let fat = std::fs::read_to_string(env.merge_dir("openssl-3.0.15").join("lib").join("libcrypto.a")).unwrap();
  assert_eq!(fat, "x86_64\narm64\n");
}

#[test]
fn second_build_is_fresh() {
  let env = TestEnv::new();

  env.fatdeps_cmd().args(["build", "BZip2", "--os", "macOS"]).assert().success();
  env
    .fatdeps_cmd()
    .args(["build", "BZip2", "--os", "macOS"])
    .assert()
    .success()
    .stdout(predicate::str::contains("BZip2: 9 fresh"));
}

#[test]
fn build_number_from_environment() {
  let env = TestEnv::new();

  env
    .fatdeps_cmd()
    .args(["build", "XZ", "--os", "macOS"])
    .env("FATDEPS_BUILD_NUMBER", "env-3")
    .assert()
    .success();

  assert!(env.dist("xz-5.4.7-env-3-macosx.tar.gz").exists());
}

#[test]
fn failing_patch_exits_nonzero_and_reports() {
  let patch_dir = tempfile::TempDir::new().unwrap();
  let patch = patch_dir.path().join("broken.patch");
  std::fs::write(&patch, "garbage\n").unwrap();

  let env = TestEnv::with_extra(&format!(
    "\n[[products.OpenSSL.patches]]\npath = \"{}\"\n",
    patch.display()
  ));

  // The system `patch` rejects the file; the other products still complete
  env
    .fatdeps_cmd()
    .args(["build", "--os", "macOS"])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("BZip2: 9 built"))
    .stdout(predicate::str::contains("XZ: 9 built"))
    .stderr(predicate::str::contains("OpenSSL/macOS/macosx.x86_64:unpack: patch"))
    .stderr(predicate::str::contains("openssl-3.0.15.unpack.log"));

  assert!(env.dist("bzip2-1.0.8-custom-macosx.tar.gz").exists());
  assert!(!env.dist("openssl-3.0.15-custom-macosx.tar.gz").exists());
}

#[test]
fn build_json_output_is_valid() {
  let env = TestEnv::new();

  let output = env
    .fatdeps_cmd()
    .args(["build", "BZip2", "--os", "macOS", "-o", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["success"], true);
  assert_eq!(report["build_number"], "custom");
  assert_eq!(report["products"][0]["product"], "BZip2");
  assert_eq!(report["products"][0]["built"], 9);
  assert!(report["failures"].as_array().unwrap().is_empty());
}
