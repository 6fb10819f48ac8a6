use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime or server-only packages that are useless inside a browser sandbox.
pub const DEFAULT_SKIP_PACKAGES: &[&str] = &[
  "@mtcute/bun",
  "@mtcute/node",
  "@mtcute/crypto-node",
  "@mtcute/deno",
  "@mtcute/create-bot",
  "@mtcute/test",
];

/// Endpoints and HTTP settings used by [`RegistryClient`](super::RegistryClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
  /// JSON map of package name to version specifier, the root of every update check.
  pub latest_versions_url: String,
  /// Base of the tarball URLs: `{registry_url}/{name}/-/{basename}-{version}.tgz`
  pub registry_url: String,
  /// Base of the specifier resolution endpoint: `{resolve_url}/{name}/resolved?specifier=...`
  pub resolve_url: String,
  /// Base of the manifest URLs: `{cdn_url}/{name}@{version}/package.json`
  pub cdn_url: String,
  pub user_agent: String,
  pub connect_timeout_secs: u64,
  /// Applies to the small JSON requests, not to tarball bodies.
  pub request_timeout_secs: u64,
  pub skip_packages: Vec<String>,
}

impl Default for RegistryConfig {
  fn default() -> Self {
    Self {
      latest_versions_url:
        "https://raw.githubusercontent.com/mtcute/mtcute/refs/heads/master/scripts/latest-versions.json"
          .to_string(),
      registry_url: "https://registry.npmjs.org".to_string(),
      resolve_url: "https://data.jsdelivr.com/v1/packages/npm".to_string(),
      cdn_url: "https://cdn.jsdelivr.net/npm".to_string(),
      user_agent: format!("npm-vfs/{}", env!("CARGO_PKG_VERSION")),
      connect_timeout_secs: 30,
      request_timeout_secs: 60,
      skip_packages: DEFAULT_SKIP_PACKAGES
        .iter()
        .map(ToString::to_string)
        .collect(),
    }
  }
}

impl RegistryConfig {
  /// Points every endpoint at one base URL, e.g. a local mirror or a mock server.
  #[must_use]
  pub fn with_base_url(base_url: &str) -> Self {
    let base_url = base_url.trim_end_matches('/');
    Self {
      latest_versions_url: format!("{base_url}/latest-versions.json"),
      registry_url: format!("{base_url}/registry"),
      resolve_url: format!("{base_url}/resolve"),
      cdn_url: format!("{base_url}/cdn"),
      ..Self::default()
    }
  }

  #[must_use]
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_secs(self.connect_timeout_secs)
  }

  #[must_use]
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  #[must_use]
  pub fn is_skipped(&self, package: &str) -> bool {
    self.skip_packages.iter().any(|skipped| skipped == package)
  }
}
