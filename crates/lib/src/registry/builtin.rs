//! The products and OS profiles built when no config overrides them.

use super::types::{AdapterKind, ConfigurationError, OsProfile, Product};

pub const BZIP2_VERSION: &str = "1.0.8";
pub const XZ_VERSION: &str = "5.4.7";
pub const OPENSSL_VERSION: &str = "3.0.15";

pub fn products() -> Vec<Product> {
  vec![
    Product {
      name: "BZip2".to_string(),
      version: BZIP2_VERSION.to_string(),
      url_template: "https://sourceware.org/pub/bzip2/bzip2-{version}.tar.gz".to_string(),
      sha256: None,
      patches: Vec::new(),
      libraries: vec!["libbz2.a".to_string()],
      adapter: AdapterKind::Bzip2,
    },
    Product {
      name: "XZ".to_string(),
      version: XZ_VERSION.to_string(),
      url_template: "https://github.com/tukaani-project/xz/releases/download/v{version}/xz-{version}.tar.gz"
        .to_string(),
      sha256: None,
      patches: Vec::new(),
      libraries: vec!["liblzma.a".to_string()],
      adapter: AdapterKind::Xz,
    },
    Product {
      name: "OpenSSL".to_string(),
      version: OPENSSL_VERSION.to_string(),
      url_template: "https://github.com/openssl/openssl/releases/download/openssl-{version}/openssl-{version}.tar.gz"
        .to_string(),
      sha256: None,
      patches: Vec::new(),
      libraries: vec!["libssl.a".to_string(), "libcrypto.a".to_string()],
      adapter: AdapterKind::Openssl,
    },
  ]
}

pub fn os_profiles() -> Result<Vec<OsProfile>, ConfigurationError> {
  Ok(vec![
    OsProfile::from_targets(
      "macOS",
      "11.0",
      "-mmacosx-version-min={version}",
      &["macosx.x86_64", "macosx.arm64"],
    )?,
    OsProfile::from_targets(
      "iOS",
      "13.0",
      "-mios-version-min={version}",
      &["iphonesimulator.x86_64", "iphonesimulator.arm64", "iphoneos.arm64"],
    )?,
    OsProfile::from_targets(
      "tvOS",
      "12.0",
      "-mtvos-version-min={version}",
      &["appletvsimulator.x86_64", "appletvsimulator.arm64", "appletvos.arm64"],
    )?,
    OsProfile::from_targets(
      "watchOS",
      "4.0",
      "-mwatchos-version-min={version}",
      &["watchsimulator.x86_64", "watchsimulator.arm64", "watchos.arm64_32"],
    )?,
  ])
}

/// Default compiler flag template for an OS that a config adds without one.
pub fn default_cflags(os: &str) -> String {
  match os {
    "macOS" => "-mmacosx-version-min={version}".to_string(),
    other => format!("-m{}-version-min={{version}}", other.to_lowercase()),
  }
}
