use std::fmt;

use serde::Serialize;

/// Identifies one (product, OS, SDK) merge unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SdkKey {
  pub product: String,
  pub os: String,
  pub sdk: String,
}

impl fmt::Display for SdkKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.product, self.os, self.sdk)
  }
}

/// Identifies one (product, OS, SDK, architecture) build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetKey {
  pub product: String,
  pub os: String,
  pub sdk: String,
  pub arch: String,
}

impl TargetKey {
  pub fn sdk_key(&self) -> SdkKey {
    SdkKey {
      product: self.product.clone(),
      os: self.os.clone(),
      sdk: self.sdk.clone(),
    }
  }

  /// `<sdk>.<arch>`, the target string as written in OS profiles.
  pub fn name(&self) -> String {
    format!("{}.{}", self.sdk, self.arch)
  }
}

impl fmt::Display for TargetKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}.{}", self.product, self.os, self.sdk, self.arch)
  }
}
