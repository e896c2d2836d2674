//! Version/target registry.
//!
//! Holds the products that can be built and the operating systems they are built for.
//! Loaded once, then treated as immutable by everything downstream.

mod builtin;
mod types;

pub use builtin::{BZIP2_VERSION, OPENSSL_VERSION, XZ_VERSION, default_cflags};
pub use types::{AdapterKind, ConfigurationError, OsProfile, PatchRef, Product, ScriptSpec, SdkProfile};

pub(crate) use types::resolve_path;

/// Products and OS profiles, both kept in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
  products: Vec<Product>,
  os_profiles: Vec<OsProfile>,
}

impl Registry {
  pub fn new(products: Vec<Product>, os_profiles: Vec<OsProfile>) -> Self {
    Self { products, os_profiles }
  }

  /// BZip2, XZ and OpenSSL for macOS, iOS, tvOS and watchOS.
  pub fn builtin() -> Result<Self, ConfigurationError> {
    Ok(Self::new(builtin::products(), builtin::os_profiles()?))
  }

  pub fn products(&self) -> &[Product] {
    &self.products
  }

  pub fn os_profiles(&self) -> &[OsProfile] {
    &self.os_profiles
  }

  /// Look up a product by name, ignoring ASCII case.
  pub fn product(&self, name: &str) -> Result<&Product, ConfigurationError> {
    self
      .products
      .iter()
      .find(|p| p.name.eq_ignore_ascii_case(name))
      .ok_or_else(|| ConfigurationError::UnknownProduct(name.to_string()))
  }

  pub(crate) fn product_mut(&mut self, name: &str) -> Option<&mut Product> {
    self.products.iter_mut().find(|p| p.name.eq_ignore_ascii_case(name))
  }

  /// Look up an OS profile by name, ignoring ASCII case.
  pub fn os(&self, name: &str) -> Result<&OsProfile, ConfigurationError> {
    self
      .os_profiles
      .iter()
      .find(|o| o.name.eq_ignore_ascii_case(name))
      .ok_or_else(|| ConfigurationError::UnknownOs(name.to_string()))
  }

  /// Insert a product, replacing any existing one with the same name.
  pub fn upsert_product(&mut self, product: Product) {
    match self.product_mut(&product.name) {
      Some(existing) => *existing = product,
      None => self.products.push(product),
    }
  }

  /// Insert an OS profile, replacing any existing one with the same name.
  pub fn upsert_os(&mut self, profile: OsProfile) {
    match self.os_profiles.iter_mut().find(|o| o.name.eq_ignore_ascii_case(&profile.name)) {
      Some(existing) => *existing = profile,
      None => self.os_profiles.push(profile),
    }
  }
}
