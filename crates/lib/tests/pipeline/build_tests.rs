use fatdeps_lib::execute::{NodeOutcome, Stage, StageLabel};
use fatdeps_lib::target::SdkKey;

use super::common::{BZIP2, OPENSSL, TestRoot, archive_entries, archive_file};

fn macosx(product: &str) -> SdkKey {
  SdkKey {
    product: product.to_string(),
    os: "macOS".to_string(),
    sdk: "macosx".to_string(),
  }
}

#[tokio::test]
async fn bzip2_macos_package_holds_both_archs() {
  let root = TestRoot::new();
  let config = root.config("");

  let report = root.build(&config, &["BZip2"]).await;
  assert!(report.is_success(), "failures: {:?}", report.failures().collect::<Vec<_>>());

  let dist = root.layout().dist_dir();
  let packages: Vec<String> = std::fs::read_dir(&dist)
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  assert_eq!(packages, vec!["bzip2-1.0.8-42-macosx.tar.gz".to_string()]);

  let package = dist.join("bzip2-1.0.8-42-macosx.tar.gz");
  let entries = archive_entries(&package);
  assert!(entries.iter().all(|e| e.starts_with("lib") || e.starts_with("include")));
  assert!(entries.contains(&"include/bzlib.h".to_string()));

  // One constituent per declared arch, in declaration order
  assert_eq!(archive_file(&package, "lib/libbz2.a"), b"x86_64\narm64\n");
}

#[tokio::test]
async fn merged_arch_set_matches_sdk_archs() {
  let root = TestRoot::new();
  let config = root.config("");
  let pipeline = root.pipeline(&config, &["OpenSSL"]);

  let group = pipeline.targets().sdk_group(&macosx("OpenSSL")).unwrap().clone();
  let report = pipeline.run(&Default::default()).await.unwrap();
  assert!(report.is_success());

  for lib in OPENSSL.libraries {
    let merged = std::fs::read_to_string(group.merge_dir.join("lib").join(lib)).unwrap();
    let archs: Vec<&str> = merged.lines().collect();
    assert_eq!(archs, group.archs());
  }
}

#[tokio::test]
async fn every_stage_is_reported_per_product() {
  let root = TestRoot::new();
  let config = root.config("");

  let report = root.build(&config, &["BZip2", "XZ"]).await;
  let summaries = report.products();

  assert_eq!(summaries.len(), 2);
  for summary in &summaries {
    assert!(summary.is_success());
    // download, 2 x (unpack, compile, install), merge, package
    assert_eq!(summary.built, 9, "{}", summary.product);
  }
  assert!(matches!(
    report.outcome(&StageLabel::sdk(&macosx("XZ"), Stage::Package)),
    Some(NodeOutcome::Built)
  ));
}

#[tokio::test]
async fn dry_run_lists_stages_without_running_them() {
  let root = TestRoot::new();
  let config = root.config("");

  let report = root
    .pipeline(&config, &["BZip2"])
    .run(&fatdeps_lib::execute::ExecuteConfig {
      parallelism: 1,
      dry_run: true,
    })
    .await
    .unwrap();

  assert_eq!(report.executed().count(), 9);
  assert!(!root.layout().downloads_dir().exists());
  assert!(!root.merge_dir(BZIP2.dir).exists());
}
