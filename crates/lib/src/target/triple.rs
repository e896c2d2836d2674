//! Triples and compiler invocations derived from an OS profile.

use std::path::Path;

use crate::registry::{OsProfile, SdkProfile};

const MACOS_SDK: &str = "macosx";

/// LLVM target triple for `arch` on `sdk`.
///
/// macOS uses the unversioned darwin triple; the embedded OSes carry the minimum version and
/// a `-simulator` environment for simulator SDKs.
pub fn triple(os: &OsProfile, sdk: &SdkProfile, arch: &str) -> String {
  if sdk.name == MACOS_SDK {
    return format!("{}-apple-darwin", arch);
  }

  let mut triple = format!("{}-apple-{}{}", arch, os.name.to_lowercase(), os.version_min);
  if sdk.is_simulator() {
    triple.push_str("-simulator");
  }
  triple
}

/// The `CC` value for a target: `xcrun --sdk <sdk> clang -target <triple> --sysroot <root> <flags>`.
pub fn compiler(sdk: &str, triple: &str, sysroot: &Path, cflags: &str) -> String {
  let mut cc = format!(
    "xcrun --sdk {} clang -target {} --sysroot {}",
    sdk,
    triple,
    sysroot.display()
  );
  if !cflags.is_empty() {
    cc.push(' ');
    cc.push_str(cflags);
  }
  cc
}
