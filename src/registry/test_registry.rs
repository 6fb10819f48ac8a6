//! In-memory [`Registry`] with call accounting, shared by the resolver, downloader and scheduler
//! tests.

use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
  },
  time::Duration,
};

use bytes::Bytes;
use futures::{stream, StreamExt as _};
use hashbrown::HashMap;
use tokio_util::sync::CancellationToken;

use crate::{
  extended_streams::{compression::gzip, tar::tar_test::TarBuilder},
  registry::{HttpBodyReader, PackageVersionMap, Registry, TarballResponse},
  Error,
};

/// Counts how many calls overlap.
#[derive(Default)]
pub(crate) struct Overlap {
  current: AtomicUsize,
  max: AtomicUsize,
  total: AtomicUsize,
}

impl Overlap {
  fn enter(&self) -> OverlapGuard<'_> {
    let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.max.fetch_max(current, Ordering::SeqCst);
    self.total.fetch_add(1, Ordering::SeqCst);
    OverlapGuard(self)
  }

  pub(crate) fn max(&self) -> usize {
    self.max.load(Ordering::SeqCst)
  }

  pub(crate) fn total(&self) -> usize {
    self.total.load(Ordering::SeqCst)
  }
}

struct OverlapGuard<'a>(&'a Overlap);

impl Drop for OverlapGuard<'_> {
  fn drop(&mut self) {
    self.0.current.fetch_sub(1, Ordering::SeqCst);
  }
}

/// Builds a gzipped npm-style tarball with every file under `package/`.
pub(crate) fn npm_tarball(files: &[(&str, &str)]) -> Vec<u8> {
  let mut builder = TarBuilder::default();
  for (path, contents) in files {
    builder.file(&format!("package/{path}"), contents.as_bytes());
  }
  gzip(&builder.finish())
}

#[derive(Default)]
pub(crate) struct FakeRegistry {
  pub latest: PackageVersionMap,
  /// `(name, specifier)` to exact version.
  pub ranges: HashMap<(String, String), String>,
  /// `(name, version)` to dependencies.
  pub dependencies: HashMap<(String, String), PackageVersionMap>,
  /// `(name, version)` to gzipped tarball.
  pub tarballs: HashMap<(String, String), Vec<u8>>,
  /// Delay before every response.
  pub latency: Duration,
  /// Tarball bodies are served in chunks of this size, 0 for a single chunk.
  pub chunk_size: usize,
  /// Tarball bodies never end after their bytes, so only cancellation stops them.
  pub stall_bodies: bool,
  /// Tarball responses carry no `Content-Length`.
  pub omit_content_length: bool,
  pub resolve_calls: Overlap,
  pub manifest_calls: Overlap,
  pub tarball_calls: Overlap,
  pub requested: Mutex<Vec<String>>,
}

impl FakeRegistry {
  pub(crate) fn range(mut self, name: &str, specifier: &str, version: &str) -> Self {
    self
      .ranges
      .insert((name.to_string(), specifier.to_string()), version.to_string());
    self
  }

  pub(crate) fn package(mut self, name: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
    self.dependencies.insert(
      (name.to_string(), version.to_string()),
      dependencies
        .iter()
        .map(|(name, specifier)| (name.to_string(), specifier.to_string()))
        .collect(),
    );
    self
  }

  pub(crate) fn tarball(mut self, name: &str, version: &str, tarball: Vec<u8>) -> Self {
    self
      .tarballs
      .insert((name.to_string(), version.to_string()), tarball);
    self
  }

  async fn respond(&self) {
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
  }
}

impl Registry for FakeRegistry {
  async fn fetch_latest_versions(&self) -> Result<PackageVersionMap, Error> {
    self.respond().await;
    Ok(self.latest.clone())
  }

  async fn resolve_version(&self, package: &str, specifier: &str) -> Result<String, Error> {
    let _guard = self.resolve_calls.enter();
    self.respond().await;
    self
      .ranges
      .get(&(package.to_string(), specifier.to_string()))
      .cloned()
      .ok_or_else(|| Error::UnresolvedVersion {
        package: package.to_string(),
        specifier: specifier.to_string(),
      })
  }

  async fn fetch_dependencies(&self, package: &str, version: &str) -> Result<PackageVersionMap, Error> {
    let _guard = self.manifest_calls.enter();
    self.respond().await;
    self
      .dependencies
      .get(&(package.to_string(), version.to_string()))
      .cloned()
      .ok_or_else(|| Error::HttpStatus {
        status: 404,
        url: format!("{package}@{version}/package.json"),
      })
  }

  async fn fetch_tarball(
    &self,
    package: &str,
    version: &str,
    cancel: &CancellationToken,
  ) -> Result<TarballResponse, Error> {
    let _guard = self.tarball_calls.enter();
    self
      .requested
      .lock()
      .unwrap()
      .push(format!("{package}@{version}"));
    self.respond().await;
    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    let Some(tarball) = self.tarballs.get(&(package.to_string(), version.to_string())) else {
      return Err(Error::HttpStatus {
        status: 404,
        url: format!("{package}-{version}.tgz"),
      });
    };
    let chunk_size = if self.chunk_size == 0 {
      tarball.len().max(1)
    } else {
      self.chunk_size
    };
    let chunks: Vec<reqwest::Result<Bytes>> = tarball
      .chunks(chunk_size)
      .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
      .collect();
    let body = if self.stall_bodies {
      stream::iter(chunks).chain(stream::pending()).boxed()
    } else {
      stream::iter(chunks).boxed()
    };
    Ok(TarballResponse {
      body: HttpBodyReader::new(body, cancel.clone()),
      content_length: (!self.omit_content_length).then_some(tarball.len() as u64),
    })
  }
}
