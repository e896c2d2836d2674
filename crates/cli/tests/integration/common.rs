//! Shared test helpers for CLI integration tests.

use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use fatdeps_lib::execute::actions::create_tar_gz;
use tempfile::TempDir;

/// `lipo -create -output <out> <inputs...>` that concatenates the inputs.
const FAKE_LIPO: &str = "#!/bin/sh\nshift; shift; out=\"$1\"; shift; cat \"$@\" > \"$out\"\n";

struct FakeProduct {
  name: &'static str,
  dir: &'static str,
  libraries: &'static [&'static str],
}

const PRODUCTS: &[FakeProduct] = &[
  FakeProduct {
    name: "BZip2",
    dir: "bzip2-1.0.8",
    libraries: &["libbz2.a"],
  },
  FakeProduct {
    name: "XZ",
    dir: "xz-5.4.7",
    libraries: &["liblzma.a"],
  },
  FakeProduct {
    name: "OpenSSL",
    dir: "openssl-3.0.15",
    libraries: &["libssl.a", "libcrypto.a"],
  },
];

/// Isolated project directory with a `fatdeps.toml` describing stand-in products.
///
/// The build root is the default `.fatdeps` inside the project directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self::with_extra("")
  }

  /// `extra` is appended to the generated config.
  pub fn with_extra(extra: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };

    let lipo = env.path().join("bin").join("lipo");
    fs::create_dir_all(lipo.parent().unwrap()).unwrap();
    fs::write(&lipo, FAKE_LIPO).unwrap();
    fs::set_permissions(&lipo, fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = format!(
      "[tools]\nlipo = \"{}\"\n\n[tools.sdk_paths]\nmacosx = \"/sdk/MacOSX.sdk\"\n",
      lipo.display()
    );
    for product in PRODUCTS {
      config.push_str(&env.product(product));
    }
    config.push_str(extra);
    fs::write(env.path().join("fatdeps.toml"), config).unwrap();

    env
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  pub fn root(&self) -> PathBuf {
    self.path().join(".fatdeps")
  }

  pub fn dist(&self, package: &str) -> PathBuf {
    self.root().join("dist").join(package)
  }

  pub fn merge_dir(&self, dir: &str) -> PathBuf {
    self.root().join("merge").join("macOS").join("macosx").join(dir)
  }

  /// Write the source archive of `product` and return its config section.
  fn product(&self, product: &FakeProduct) -> String {
    let staging = self.path().join("staging").join(product.name);
    let tree = staging.join(product.dir);
    fs::create_dir_all(tree.join("include")).unwrap();
    fs::write(tree.join("Makefile"), "all:\n").unwrap();
    fs::write(tree.join("include").join("api.h"), "/* api */\n").unwrap();

    let archive = self.path().join(format!("{}.tar.gz", product.dir));
    create_tar_gz(&staging, &[product.dir], File::create(&archive).unwrap()).unwrap();

    let libs = product.libraries.join(" ");
    let lib_list: Vec<String> = product.libraries.iter().map(|l| format!("\"{}\"", l)).collect();
    format!(
      r#"
[products.{name}]
url = "file://{archive}"
libraries = [{lib_list}]

[products.{name}.script]
unpack_marker = "Makefile"
build = 'for lib in {libs}; do printf "%s\n" "$ARCH" > "$lib"; done'
build_output = "{first}"
install = 'mkdir -p {{prefix}}/lib {{prefix}}/include && cp {libs} {{prefix}}/lib/ && cp include/*.h {{prefix}}/include/'
"#,
      name = product.name,
      archive = archive.display(),
      lib_list = lib_list.join(", "),
      libs = libs,
      first = product.libraries[0],
    )
  }

  /// Get a Command for the fatdeps binary running in the project directory.
  pub fn fatdeps_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("fatdeps");
    cmd.current_dir(self.path());
    cmd.env_remove("FATDEPS_ROOT");
    cmd.env_remove("FATDEPS_CONFIG");
    cmd.env_remove("FATDEPS_BUILD_NUMBER");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
