use std::collections::BTreeMap;

use futures::StreamExt as _;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::{
  registry::{HttpBodyReader, RegistryConfig},
  Error,
};

/// Package name to version specifier (exact version or semver range).
pub type PackageVersionMap = BTreeMap<String, String>;

/// A tarball response whose body has not been read yet.
pub struct TarballResponse {
  pub body: HttpBodyReader,
  /// Compressed size from `Content-Length`, if the server sent one.
  pub content_length: Option<u64>,
}

/// The registry operations the resolver and the downloader depend on.
pub trait Registry {
  /// Latest-versions manifest with skip-listed packages removed.
  async fn fetch_latest_versions(&self) -> Result<PackageVersionMap, Error>;

  /// Resolves a specifier such as `^1.2.0` to an exact version.
  async fn resolve_version(&self, package: &str, specifier: &str) -> Result<String, Error>;

  /// Production `dependencies` of an exact package version.
  async fn fetch_dependencies(&self, package: &str, version: &str) -> Result<PackageVersionMap, Error>;

  async fn fetch_tarball(
    &self,
    package: &str,
    version: &str,
    cancel: &CancellationToken,
  ) -> Result<TarballResponse, Error>;
}

#[derive(Deserialize)]
struct ResolvedVersion {
  version: Option<String>,
}

#[derive(Deserialize)]
struct DependencyManifest {
  #[serde(default)]
  dependencies: PackageVersionMap,
}

/// File name part of a tarball: `@scope/name` becomes `name`.
#[must_use]
pub fn tarball_basename(package: &str) -> &str {
  package.split_once('/').map_or(package, |(_, basename)| basename)
}

/// HTTP implementation of [`Registry`].
#[derive(Clone)]
pub struct RegistryClient {
  client: Client,
  config: RegistryConfig,
}

impl RegistryClient {
  pub fn new(config: RegistryConfig) -> Result<Self, Error> {
    let client = Client::builder()
      .connect_timeout(config.connect_timeout())
      .user_agent(&config.user_agent)
      .build()?;
    Ok(Self { client, config })
  }

  pub fn with_defaults() -> Result<Self, Error> {
    Self::new(RegistryConfig::default())
  }

  #[must_use]
  pub fn config(&self) -> &RegistryConfig {
    &self.config
  }

  pub fn tarball_url(&self, package: &str, version: &str) -> Result<Url, Error> {
    let base = self.config.registry_url.trim_end_matches('/');
    let basename = tarball_basename(package);
    Ok(Url::parse(&format!(
      "{base}/{package}/-/{basename}-{version}.tgz"
    ))?)
  }

  pub fn resolve_url(&self, package: &str, specifier: &str) -> Result<Url, Error> {
    let base = self.config.resolve_url.trim_end_matches('/');
    let mut url = Url::parse(&format!("{base}/{package}/resolved"))?;
    url.query_pairs_mut().append_pair("specifier", specifier);
    Ok(url)
  }

  pub fn manifest_url(&self, package: &str, version: &str) -> Result<Url, Error> {
    let base = self.config.cdn_url.trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/{package}@{version}/package.json"))?)
  }

  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
    let response = self
      .client
      .get(url.clone())
      .timeout(self.config.request_timeout())
      .send()
      .await?;
    if !response.status().is_success() {
      return Err(Error::HttpStatus {
        status: response.status().as_u16(),
        url: url.to_string(),
      });
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|source| Error::InvalidJson {
      url: url.to_string(),
      source,
    })
  }
}

impl Registry for RegistryClient {
  async fn fetch_latest_versions(&self) -> Result<PackageVersionMap, Error> {
    let url = Url::parse(&self.config.latest_versions_url)?;
    let mut versions: PackageVersionMap = self.get_json(url).await?;
    versions.retain(|package, _| !self.config.is_skipped(package));
    debug!(packages = versions.len(), "fetched latest versions");
    Ok(versions)
  }

  async fn resolve_version(&self, package: &str, specifier: &str) -> Result<String, Error> {
    let resolved: ResolvedVersion = self.get_json(self.resolve_url(package, specifier)?).await?;
    let version = resolved.version.ok_or_else(|| Error::UnresolvedVersion {
      package: package.to_string(),
      specifier: specifier.to_string(),
    })?;
    debug!(package, specifier, version, "resolved version");
    Ok(version)
  }

  async fn fetch_dependencies(&self, package: &str, version: &str) -> Result<PackageVersionMap, Error> {
    let manifest: DependencyManifest = self.get_json(self.manifest_url(package, version)?).await?;
    Ok(manifest.dependencies)
  }

  async fn fetch_tarball(
    &self,
    package: &str,
    version: &str,
    cancel: &CancellationToken,
  ) -> Result<TarballResponse, Error> {
    let url = self.tarball_url(package, version)?;
    debug!(package, version, %url, "fetching tarball");

    let response = tokio::select! {
      biased;
      () = cancel.cancelled() => return Err(Error::Cancelled),
      response = self.client.get(url.clone()).send() => response?,
    };
    if !response.status().is_success() {
      return Err(Error::HttpStatus {
        status: response.status().as_u16(),
        url: url.to_string(),
      });
    }

    let content_length = response.content_length();
    Ok(TarballResponse {
      body: HttpBodyReader::new(response.bytes_stream().boxed(), cancel.clone()),
      content_length,
    })
  }
}
