use std::collections::BTreeSet;

use relative_path::RelativePath;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
  registry::{
    BatchProgress, CacheInvalidator, DownloadScheduler, NoopCacheInvalidator, Registry,
    RegistryClient, RegistryConfig, ResolvedPackageSet, VersionResolver,
    DEFAULT_DOWNLOAD_CONCURRENCY,
  },
  vfs::{LibraryStorage, VfsLibraryRecord},
  Error,
};

/// Keeps CommonJS duplicates and plain-text documents out of the VFS.
#[must_use]
pub fn default_file_filter(path: &RelativePath) -> bool {
  let path = path.as_str();
  !(path.ends_with(".cjs") || path.ends_with(".d.cts") || path == "LICENSE" || path == "README.md")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
  pub registry: RegistryConfig,
  /// Packages resolved at the same time while walking dependencies.
  pub resolver_concurrency: usize,
  /// Tarballs downloaded at the same time.
  pub download_concurrency: usize,
}

impl Default for UpdaterConfig {
  fn default() -> Self {
    Self {
      registry: RegistryConfig::default(),
      resolver_concurrency: 8,
      download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
    }
  }
}

/// Brings the VFS up to date with the latest published package set.
pub struct VfsUpdater<G, S, C = NoopCacheInvalidator> {
  registry: G,
  storage: S,
  invalidator: C,
  config: UpdaterConfig,
}

impl<S: LibraryStorage> VfsUpdater<RegistryClient, S> {
  /// Updater talking to the registries named in `config`.
  pub fn connect(storage: S, config: UpdaterConfig) -> Result<Self, Error> {
    let registry = RegistryClient::new(config.registry.clone())?;
    Ok(Self::new(registry, storage, NoopCacheInvalidator, config))
  }
}

impl<G, S, C> VfsUpdater<G, S, C>
where
  G: Registry,
  S: LibraryStorage,
  C: CacheInvalidator,
{
  #[must_use]
  pub fn new(registry: G, storage: S, invalidator: C, config: UpdaterConfig) -> Self {
    Self {
      registry,
      storage,
      invalidator,
      config,
    }
  }

  #[must_use]
  pub fn storage(&self) -> &S {
    &self.storage
  }

  #[must_use]
  pub fn registry(&self) -> &G {
    &self.registry
  }

  /// Packages (name to exact version) that are missing or outdated in storage.
  pub async fn check_for_updates(&self) -> Result<ResolvedPackageSet, Error> {
    let latest = self.registry.fetch_latest_versions().await?;
    let stored = self.storage.stored_versions().await?;
    let resolver = VersionResolver::new(&self.registry, self.config.resolver_concurrency)
      .with_skip_packages(self.config.registry.skip_packages.iter().cloned());
    let packages = resolver.resolve(&latest, &stored).await?;
    info!(packages = packages.len(), "update check finished");
    Ok(packages)
  }

  pub async fn download_packages(
    &self,
    packages: &ResolvedPackageSet,
    on_progress: impl FnMut(BatchProgress),
    cancel: &CancellationToken,
  ) -> Result<(), Error> {
    DownloadScheduler::new(&self.registry, &self.storage, &self.invalidator)
      .with_concurrency(self.config.download_concurrency)
      .with_filter(&default_file_filter)
      .run(packages, on_progress, cancel)
      .await
  }

  /// Checks for updates and downloads them. Returns what was installed.
  pub async fn update(
    &self,
    on_progress: impl FnMut(BatchProgress),
    cancel: &CancellationToken,
  ) -> Result<ResolvedPackageSet, Error> {
    let packages = self.check_for_updates().await?;
    self.download_packages(&packages, on_progress, cancel).await?;
    Ok(packages)
  }

  pub async fn library_names(&self) -> Result<BTreeSet<String>, Error> {
    self.storage.available_libraries().await
  }

  pub async fn library(&self, name: &str) -> Result<Option<VfsLibraryRecord>, Error> {
    self.storage.read_library(name).await
  }
}
