use hashbrown::HashMap;
use relative_path::{Component, RelativePath, RelativePathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  extended_streams::{
    compression::GunzipReader,
    tar::{TarEntryType, TarExtractor},
  },
  registry::{patches::patch_package, Registry, TarballResponse},
  vfs::{LibraryStorage, VfsFile},
  Error, Read,
};

/// Tarballs published to npm keep every file below this directory.
const PACKAGE_ROOT: &str = "package/";

/// Progress of a single package download in compressed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress<'a> {
  pub downloaded: u64,
  /// `Content-Length` of the tarball, 0 if the server did not send one.
  pub total: u64,
  /// The entry being processed, `None` for the final tick.
  pub file: Option<&'a str>,
}

/// Decides which files of a package are kept, given their path relative to the package root.
pub type FileFilter = dyn Fn(&RelativePath) -> bool + Send + Sync;

/// Path of an entry relative to the package root, or `None` if it would escape it.
#[must_use]
pub fn package_relative_path(entry_name: &str) -> Option<RelativePathBuf> {
  let stripped = entry_name.strip_prefix(PACKAGE_ROOT).unwrap_or(entry_name);
  let normalized = RelativePath::new(stripped).normalize();
  match normalized.components().next() {
    Some(Component::Normal(_)) => Some(normalized),
    _ => None,
  }
}

/// Files of a tarball and the compressed bytes consumed to extract them.
#[derive(Debug)]
pub struct IngestedTarball {
  pub files: Vec<VfsFile>,
  pub compressed_bytes_read: u64,
}

/// Streams a gzipped tarball into memory.
///
/// `on_progress` runs for every regular file before `filter` is consulted, so filtered files
/// still advance the progress. A path that appears twice keeps its last content.
pub async fn ingest_tarball<R>(
  package: &str,
  body: R,
  total: u64,
  on_progress: &mut impl FnMut(DownloadProgress<'_>),
  filter: Option<&FileFilter>,
) -> Result<IngestedTarball, Error>
where
  R: Read,
  R::ReadError: Into<Error>,
{
  let mut extractor = TarExtractor::new(GunzipReader::new(body));
  let mut files = Vec::<VfsFile>::new();
  let mut seen_files = HashMap::<RelativePathBuf, usize>::new();

  while let Some(mut entry) = extractor.next_entry().await? {
    let header = entry.header();
    if !matches!(
      header.entry_type,
      TarEntryType::File | TarEntryType::ContiguousFile
    ) {
      continue;
    }
    let name = header.name.clone();

    on_progress(DownloadProgress {
      downloaded: entry.source().compressed_bytes_read(),
      total,
      file: Some(&name),
    });

    let Some(path) = package_relative_path(&name) else {
      warn!(package, entry = name, "skipping entry outside the package root");
      continue;
    };
    if filter.is_some_and(|filter| !filter(path.as_relative_path())) {
      continue;
    }

    let mut file = VfsFile {
      path,
      contents: entry.read_content().await?,
    };
    patch_package(package, &mut file)?;

    match seen_files.get(&file.path) {
      Some(&index) => files[index] = file,
      None => {
        seen_files.insert(file.path.clone(), files.len());
        files.push(file);
      },
    }
  }

  Ok(IngestedTarball {
    files,
    compressed_bytes_read: extractor.get_ref().compressed_bytes_read(),
  })
}

/// Downloads one exact package version into storage.
pub struct PackageDownloader<'a, G, S> {
  registry: &'a G,
  storage: &'a S,
  filter: Option<&'a FileFilter>,
}

impl<'a, G: Registry, S: LibraryStorage> PackageDownloader<'a, G, S> {
  #[must_use]
  pub fn new(registry: &'a G, storage: &'a S) -> Self {
    Self {
      registry,
      storage,
      filter: None,
    }
  }

  #[must_use]
  pub fn with_filter(mut self, filter: &'a FileFilter) -> Self {
    self.filter = Some(filter);
    self
  }

  /// Fetches, extracts and stores `package@version`.
  ///
  /// Nothing is written unless the whole tarball was extracted. Cancellation surfaces as
  /// [`Error::Cancelled`].
  pub async fn download(
    &self,
    package: &str,
    version: &str,
    mut on_progress: impl FnMut(DownloadProgress<'_>),
    cancel: &CancellationToken,
  ) -> Result<(), Error> {
    let TarballResponse {
      body,
      content_length,
    } = self.registry.fetch_tarball(package, version, cancel).await?;
    let total = content_length.unwrap_or(0);

    let IngestedTarball {
      files,
      compressed_bytes_read,
    } = ingest_tarball(package, body, total, &mut on_progress, self.filter)
      .await
      .inspect_err(|error| {
        if error.is_cancelled() {
          debug!(package, version, "download cancelled");
        }
      })?;
    if cancel.is_cancelled() {
      debug!(package, version, "download cancelled before storing");
      return Err(Error::Cancelled);
    }

    let file_count = files.len();
    self.storage.write_library(package, version, files).await?;

    // Without a Content-Length the real byte count is the only total there is.
    let done = total.max(compressed_bytes_read);
    on_progress(DownloadProgress {
      downloaded: done,
      total: done,
      file: None,
    });
    info!(package, version, files = file_count, "installed package");
    Ok(())
  }
}
