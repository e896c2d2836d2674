//! Shared helpers for pipeline scenarios.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fatdeps_lib::config::Config;
use fatdeps_lib::execute::actions::{ActionError, create_tar_gz};
use fatdeps_lib::execute::{ExecuteConfig, RunReport};
use fatdeps_lib::layout::Layout;
use fatdeps_lib::pipeline::Pipeline;
use fatdeps_lib::target::TargetRequest;
use fatdeps_lib::toolchain::FatBinaryCombiner;
use tempfile::TempDir;

/// Fat "libraries" are the constituents concatenated in order.
pub struct Concat;

impl FatBinaryCombiner for Concat {
  fn combine(&self, inputs: &[PathBuf], output: &Path) -> Result<(), ActionError> {
    let mut content = Vec::new();
    for input in inputs {
      content.extend(fs::read(input)?);
    }
    fs::write(output, content)?;
    Ok(())
  }
}

/// A script product standing in for one of the built-in ones.
pub struct FakeProduct {
  pub name: &'static str,
  pub dir: &'static str,
  pub libraries: &'static [&'static str],
  pub header: &'static str,
}

pub const BZIP2: FakeProduct = FakeProduct {
  name: "BZip2",
  dir: "bzip2-1.0.8",
  libraries: &["libbz2.a"],
  header: "bzlib.h",
};

pub const XZ: FakeProduct = FakeProduct {
  name: "XZ",
  dir: "xz-5.4.7",
  libraries: &["liblzma.a"],
  header: "lzma.h",
};

pub const OPENSSL: FakeProduct = FakeProduct {
  name: "OpenSSL",
  dir: "openssl-3.0.15",
  libraries: &["libssl.a", "libcrypto.a"],
  header: "ssl.h",
};

/// Build number and pinned macOS SDK shared by every scenario.
pub const BASE_TOML: &str = r#"
build_number = "42"

[tools.sdk_paths]
macosx = "/sdk/MacOSX.sdk"
"#;

/// Isolated build root with a source archive per fake product.
pub struct TestRoot {
  pub temp: TempDir,
}

impl TestRoot {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let root = Self { temp };
    for product in [BZIP2, XZ, OPENSSL] {
      root.write_archive(&product);
    }
    root
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn layout(&self) -> Layout {
    Layout::new(self.path().join("out"))
  }

  pub fn archive_source(&self, product: &FakeProduct) -> PathBuf {
    self.path().join("sources").join(format!("{}.tar.gz", product.dir))
  }

  fn write_archive(&self, product: &FakeProduct) {
    let staging = self.path().join("staging").join(product.name);
    let tree = staging.join(product.dir);
    fs::create_dir_all(tree.join("include")).unwrap();
    fs::write(tree.join("Makefile"), "all:\n").unwrap();
    fs::write(tree.join("include").join(product.header), format!("/* {} */\n", product.name)).unwrap();

    let archive = self.archive_source(product);
    fs::create_dir_all(archive.parent().unwrap()).unwrap();
    create_tar_gz(&staging, &[product.dir], File::create(&archive).unwrap()).unwrap();
  }

  /// TOML for `product` built by shell scripts. `build_guard` runs before the build and
  /// fails it when false.
  pub fn product_toml(&self, product: &FakeProduct, build_guard: Option<&str>) -> String {
    self.guarded_product_toml(product, build_guard, None)
  }

  /// Like [`Self::product_toml`], with `install_guard` run after the libraries are copied
  /// and before the headers are.
  pub fn guarded_product_toml(
    &self,
    product: &FakeProduct,
    build_guard: Option<&str>,
    install_guard: Option<&str>,
  ) -> String {
    let libs = product.libraries.join(" ");
    let guard = build_guard.map(|g| format!("{} && ", g)).unwrap_or_default();
    let install_guard = install_guard.map(|g| format!("{} && ", g)).unwrap_or_default();
    format!(
      r#"
[products.{name}]
url = "file://{archive}"
libraries = [{lib_list}]

[products.{name}.script]
unpack_marker = "Makefile"
build = '{guard}for lib in {libs}; do printf "%s\n" "$ARCH" > "$lib"; done'
build_output = "{first}"
install = 'mkdir -p {{prefix}}/lib {{prefix}}/include && cp {libs} {{prefix}}/lib/ && {install_guard}cp include/*.h {{prefix}}/include/'
"#,
      name = product.name,
      archive = self.archive_source(product).display(),
      lib_list = product
        .libraries
        .iter()
        .map(|l| format!("\"{}\"", l))
        .collect::<Vec<_>>()
        .join(", "),
      guard = guard,
      install_guard = install_guard,
      libs = libs,
      first = product.libraries[0],
    )
  }

  /// Config with every fake product, pinned macOS SDK and `extra` appended.
  pub fn config(&self, extra: &str) -> Config {
    let mut toml = String::from(BASE_TOML);
    for product in [BZIP2, XZ, OPENSSL] {
      toml.push_str(&self.product_toml(&product, None));
    }
    toml.push_str(extra);
    self.config_from(&toml)
  }

  pub fn config_from(&self, toml: &str) -> Config {
    let origin = self.path().join("fatdeps.toml");
    let mut config = Config::builtin(self.path()).unwrap();
    config.apply_str(toml, &origin).unwrap();
    config
  }

  pub fn pipeline(&self, config: &Config, products: &[&str]) -> Arc<Pipeline> {
    let request = TargetRequest {
      products: products.iter().map(|p| p.to_string()).collect(),
      oses: vec!["macOS".to_string()],
      ..Default::default()
    };
    let pipeline = Pipeline::new(config, &self.layout(), &request).unwrap();
    Arc::new(pipeline.with_combiner(Arc::new(Concat)))
  }

  pub async fn build(&self, config: &Config, products: &[&str]) -> RunReport {
    self
      .pipeline(config, products)
      .run(&ExecuteConfig {
        parallelism: 4,
        dry_run: false,
      })
      .await
      .unwrap()
  }

  pub fn merge_dir(&self, product: &str) -> PathBuf {
    self.layout().merge_dir().join("macOS").join("macosx").join(product)
  }
}

/// Entry names of a gzip tarball.
pub fn archive_entries(path: &Path) -> Vec<String> {
  let file = File::open(path).unwrap();
  let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
  archive
    .entries()
    .unwrap()
    .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
    .collect()
}

/// Content of `name` inside a gzip tarball.
pub fn archive_file(path: &Path, name: &str) -> Vec<u8> {
  use std::io::Read;

  let file = File::open(path).unwrap();
  let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
  for entry in archive.entries().unwrap() {
    let mut entry = entry.unwrap();
    if entry.path().unwrap().to_string_lossy() == name {
      let mut content = Vec::new();
      entry.read_to_end(&mut content).unwrap();
      return content;
    }
  }
  panic!("{} not found in {}", name, path.display());
}
