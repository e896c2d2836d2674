//! Host platform detection.

use std::fmt;

/// CPU architecture of the machine running the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
    }
  }

  /// Returns the name Apple toolchains use for this architecture.
  pub fn apple_name(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "arm64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// The `--build` triple handed to autoconf-style configure scripts.
///
/// Unknown host architectures fall back to `arm64`, the only other host Apple ships.
pub fn host_triple() -> String {
  let arch = Arch::current().unwrap_or(Arch::Aarch64);
  format!("{}-apple-darwin", arch.apple_name())
}
