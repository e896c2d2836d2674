use std::fs;

use fatdeps_lib::clean::{CleanScope, clean};
use fatdeps_lib::execute::{Stage, StageLabel};
use fatdeps_lib::target::SdkKey;

use fatdeps_lib::execute::actions::hash_bytes;

use super::common::{BASE_TOML, BZIP2, OPENSSL, TestRoot};

#[tokio::test]
async fn second_run_does_no_work() {
  let root = TestRoot::new();
  let config = root.config("");

  let first = root.build(&config, &[]).await;
  assert!(first.is_success());
  assert!(first.executed().count() > 0);

  let second = root.build(&config, &[]).await;
  assert!(second.is_success());
  assert_eq!(second.executed().collect::<Vec<_>>(), Vec::<&StageLabel>::new());
}

#[tokio::test]
async fn deleting_merged_artifact_rebuilds_merge_and_package_only() {
  let root = TestRoot::new();
  let config = root.config("");

  assert!(root.build(&config, &["BZip2"]).await.is_success());
  fs::remove_dir_all(root.merge_dir(BZIP2.dir)).unwrap();

  let report = root.build(&config, &["BZip2"]).await;
  assert!(report.is_success());

  let key = SdkKey {
    product: "BZip2".to_string(),
    os: "macOS".to_string(),
    sdk: "macosx".to_string(),
  };
  let executed: Vec<StageLabel> = report.executed().cloned().collect();
  assert_eq!(
    executed,
    vec![StageLabel::sdk(&key, Stage::Merge), StageLabel::sdk(&key, Stage::Package)]
  );
}

#[tokio::test]
async fn clean_of_one_product_leaves_others_fresh() {
  let root = TestRoot::new();
  let config = root.config("");

  assert!(root.build(&config, &[]).await.is_success());

  let result = clean(
    &root.layout(),
    &config.registry,
    &CleanScope::Product("OpenSSL".to_string()),
    false,
  )
  .unwrap();
  assert!(!result.deleted_paths.is_empty());
  assert!(!root.merge_dir(OPENSSL.dir).exists());
  assert!(root.merge_dir(BZIP2.dir).exists());

  let report = root.build(&config, &[]).await;
  assert!(report.is_success());
  assert!(report.executed().all(|label| label.product == "OpenSSL"));
  assert!(report.executed().any(|label| label.stage == Stage::Package));
}

#[tokio::test]
async fn newer_patch_reunpacks_the_tree() {
  let root = TestRoot::new();
  let patch = root.path().join("noop.patch");
  fs::write(&patch, "").unwrap();
  let extra = format!(
    r#"
[tools]
patch = "true"

[[products.XZ.patches]]
path = "{}"
"#,
    patch.display()
  );
  let config = root.config(&extra);

  assert!(root.build(&config, &["XZ"]).await.is_success());

  // Bump the patch past every output
  std::thread::sleep(std::time::Duration::from_millis(20));
  fs::write(&patch, "").unwrap();

  let report = root.build(&config, &["XZ"]).await;
  assert!(report.is_success());
  let unpacked = report
    .executed()
    .filter(|label| label.stage == Stage::Unpack)
    .count();
  assert_eq!(unpacked, 2);
}

#[tokio::test]
async fn pinned_archive_is_fetched_again_when_it_changes() {
  let root = TestRoot::new();
  let source = fs::read(root.archive_source(&BZIP2)).unwrap();
  let pinned = root.product_toml(&BZIP2, None).replacen(
    "libraries = [",
    &format!("sha256 = \"{}\"\nlibraries = [", hash_bytes(&source)),
    1,
  );
  let config = root.config_from(&format!("{}{}", BASE_TOML, pinned));

  assert!(root.build(&config, &["BZip2"]).await.is_success());
  let archive = root.layout().downloads_dir().join("bzip2-1.0.8.tar.gz");
  assert_eq!(fs::read(&archive).unwrap(), source);

  fs::write(&archive, "truncated").unwrap();
  let report = root.build(&config, &["BZip2"]).await;
  assert!(report.is_success());
  assert!(
    report
      .executed()
      .any(|label| *label == StageLabel::product("BZip2", Stage::Download))
  );
  assert_eq!(fs::read(&archive).unwrap(), source);
}
