use std::sync::{Mutex, PoisonError};

use futures::{stream, StreamExt as _};
use hashbrown::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  registry::{DownloadProgress, FileFilter, PackageDownloader, Registry, ResolvedPackageSet},
  vfs::LibraryStorage,
  Error,
};

/// Default number of tarballs fetched at the same time.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 6;

/// Progress over a whole batch in compressed bytes.
///
/// `total` grows as downloads start, since sizes are only known once response headers arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchProgress {
  pub downloaded: u64,
  pub total: u64,
}

/// Purges HTTP response caches before packages are fetched again.
pub trait CacheInvalidator {
  async fn invalidate(&self) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCacheInvalidator;

impl CacheInvalidator for NoopCacheInvalidator {
  async fn invalidate(&self) -> Result<(), Error> {
    Ok(())
  }
}

/// Folds per-package progress into [`BatchProgress`] without counting anything twice.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
  batch: BatchProgress,
  last_seen: HashMap<String, BatchProgress>,
}

impl ProgressAggregator {
  pub fn update(&mut self, package: &str, progress: DownloadProgress<'_>) -> BatchProgress {
    let last = self.last_seen.entry_ref(package).or_default();
    self.batch.total += progress.total.saturating_sub(last.total);
    self.batch.downloaded += progress.downloaded.saturating_sub(last.downloaded);
    last.total = last.total.max(progress.total);
    last.downloaded = last.downloaded.max(progress.downloaded);
    self.batch
  }

  #[must_use]
  pub fn batch(&self) -> BatchProgress {
    self.batch
  }
}

/// Downloads a resolved package set with bounded concurrency.
pub struct DownloadScheduler<'a, G, S, C> {
  registry: &'a G,
  storage: &'a S,
  invalidator: &'a C,
  concurrency: usize,
  filter: Option<&'a FileFilter>,
}

impl<'a, G, S, C> DownloadScheduler<'a, G, S, C>
where
  G: Registry,
  S: LibraryStorage,
  C: CacheInvalidator,
{
  #[must_use]
  pub fn new(registry: &'a G, storage: &'a S, invalidator: &'a C) -> Self {
    Self {
      registry,
      storage,
      invalidator,
      concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
      filter: None,
    }
  }

  #[must_use]
  pub fn with_concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency.max(1);
    self
  }

  #[must_use]
  pub fn with_filter(mut self, filter: &'a FileFilter) -> Self {
    self.filter = Some(filter);
    self
  }

  /// Downloads every package of `packages`.
  ///
  /// The first failure aborts the downloads still running. Packages that already finished stay
  /// in storage.
  pub async fn run(
    &self,
    packages: &ResolvedPackageSet,
    on_progress: impl FnMut(BatchProgress),
    cancel: &CancellationToken,
  ) -> Result<(), Error> {
    if packages.is_empty() {
      return Ok(());
    }
    self.invalidator.invalidate().await?;
    info!(packages = packages.len(), concurrency = self.concurrency, "downloading packages");

    let mut downloader = PackageDownloader::new(self.registry, self.storage);
    if let Some(filter) = self.filter {
      downloader = downloader.with_filter(filter);
    }
    let progress = Mutex::new((ProgressAggregator::default(), on_progress));

    let downloader = &downloader;
    let progress = &progress;
    let mut downloads = stream::iter(packages)
      .map(|(name, version)| async move {
        downloader
          .download(
            name,
            version,
            |package_progress| {
              let mut guard = progress.lock().unwrap_or_else(PoisonError::into_inner);
              let (aggregator, on_progress) = &mut *guard;
              on_progress(aggregator.update(name, package_progress));
            },
            cancel,
          )
          .await
          .map_err(|error| (name, version, error))
      })
      .buffer_unordered(self.concurrency);

    while let Some(result) = downloads.next().await {
      if let Err((name, version, error)) = result {
        if error.is_cancelled() {
          debug!(package = name, version, "batch cancelled");
        } else {
          warn!(package = name, version, %error, "download failed, aborting batch");
        }
        return Err(error);
      }
    }
    Ok(())
  }
}
