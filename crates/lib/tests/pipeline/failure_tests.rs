use std::fs;
use std::sync::Arc;

use fatdeps_lib::execute::{NodeOutcome, Stage, StageError};
use fatdeps_lib::merge;

use super::common::{BASE_TOML, BZIP2, Concat, OPENSSL, TestRoot, XZ, archive_entries};

#[tokio::test]
async fn failing_openssl_patch_spares_other_products() {
  let root = TestRoot::new();
  let patch = root.path().join("broken.patch");
  fs::write(&patch, "not a patch\n").unwrap();
  let extra = format!(
    r#"
[tools]
patch = "false"

[[products.OpenSSL.patches]]
path = "{}"
"#,
    patch.display()
  );
  let config = root.config(&extra);

  let report = root.build(&config, &[]).await;
  assert!(!report.is_success());

  let failures: Vec<&StageError> = report.failures().collect();
  assert_eq!(failures.len(), 2, "one per OpenSSL arch");
  for failure in &failures {
    assert!(matches!(failure, StageError::Patch { .. }));
    assert_eq!(failure.label().product, "OpenSSL");
    assert!(failure.log().is_some());
  }

  for summary in report.products() {
    match summary.product.as_str() {
      "OpenSSL" => {
        assert_eq!(summary.failed, 2);
        assert!(summary.skipped > 0);
      }
      _ => assert!(summary.is_success(), "{:?}", summary),
    }
  }

  let dist = root.layout().dist_dir();
  assert!(dist.join("bzip2-1.0.8-42-macosx.tar.gz").exists());
  assert!(dist.join("xz-5.4.7-42-macosx.tar.gz").exists());
  assert!(!dist.join("openssl-3.0.15-42-macosx.tar.gz").exists());
  assert!(!root.merge_dir(OPENSSL.dir).exists());
}

#[tokio::test]
async fn merge_with_missing_arch_names_it() {
  let root = TestRoot::new();
  let mut toml = String::from(BASE_TOML);
  toml.push_str(&root.product_toml(&BZIP2, None));
  toml.push_str(&root.product_toml(&XZ, None));
  toml.push_str(&root.product_toml(&OPENSSL, Some(r#"test "$ARCH" != arm64"#)));
  let config = root.config_from(&toml);

  let pipeline = root.pipeline(&config, &["OpenSSL"]);
  let report = pipeline.clone().run(&Default::default()).await.unwrap();

  // x86_64 installs; arm64 fails to compile and merge never runs
  let failures: Vec<&StageError> = report.failures().collect();
  assert_eq!(failures.len(), 1);
  assert!(matches!(failures[0], StageError::Compile { .. }));
  assert_eq!(failures[0].label().arch.as_deref(), Some("arm64"));
  assert!(
    report
      .nodes
      .iter()
      .any(|n| n.label.stage == Stage::Merge && matches!(n.outcome, NodeOutcome::Skipped(_)))
  );

  let plan = pipeline.targets().plan("OpenSSL").unwrap();
  let group = plan.sdk_groups().next().unwrap();
  let err = merge::merge(&plan.product, group, Arc::new(Concat)).await.unwrap_err();

  match err {
    StageError::MissingArtifact { arch, .. } => assert_eq!(arch, "arm64"),
    other => panic!("expected missing artifact, got {}", other),
  }
  assert!(!group.merge_dir.join("lib").join("libssl.a").exists());
}

#[tokio::test]
async fn interrupted_install_reruns_before_merging() {
  let root = TestRoot::new();
  let headers_ready = root.path().join("headers-ready");
  let mut toml = String::from(BASE_TOML);
  toml.push_str(&root.guarded_product_toml(
    &BZIP2,
    None,
    Some(&format!("test -e {}", headers_ready.display())),
  ));
  let config = root.config_from(&toml);

  // Libraries land in the prefix, then install fails before the headers
  let first = root.build(&config, &["BZip2"]).await;
  let failures: Vec<&StageError> = first.failures().collect();
  assert_eq!(failures.len(), 2);
  assert!(failures.iter().all(|f| matches!(f, StageError::Install { .. })));

  fs::write(&headers_ready, "").unwrap();
  let second = root.build(&config, &["BZip2"]).await;
  assert!(second.is_success());

  let installs = second.executed().filter(|label| label.stage == Stage::Install).count();
  let compiles = second.executed().filter(|label| label.stage == Stage::Compile).count();
  assert_eq!(installs, 2);
  assert_eq!(compiles, 0);

  let package = root.layout().dist_dir().join("bzip2-1.0.8-42-macosx.tar.gz");
  assert!(archive_entries(&package).contains(&"include/bzlib.h".to_string()));
}
