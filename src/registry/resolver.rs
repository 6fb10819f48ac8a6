use futures::{stream::FuturesUnordered, StreamExt as _};
use hashbrown::HashSet;
use tracing::{debug, trace};

use crate::{
  registry::{PackageVersionMap, Registry, WorkQueue},
  Error,
};

/// Package name to exact version, everything that needs to be downloaded.
pub type ResolvedPackageSet = PackageVersionMap;

/// Whether `specifier` is a plain `major.minor.patch` version that needs no resolution.
#[must_use]
pub fn is_exact_version(specifier: &str) -> bool {
  semver::Version::parse(specifier).is_ok_and(|version| version.pre.is_empty() && version.build.is_empty())
}

enum NodeOutcome {
  /// The stored version is already the requested one; dependencies are not walked again.
  UpToDate,
  Resolved {
    name: String,
    version: String,
    dependencies: PackageVersionMap,
  },
}

/// Turns requested specifiers into the set of exact versions missing from storage, following
/// production dependencies transitively.
pub struct VersionResolver<'a, G> {
  registry: &'a G,
  concurrency: usize,
  skip_packages: HashSet<String>,
}

impl<'a, G: Registry> VersionResolver<'a, G> {
  #[must_use]
  pub fn new(registry: &'a G, concurrency: usize) -> Self {
    Self {
      registry,
      concurrency: concurrency.max(1),
      skip_packages: HashSet::new(),
    }
  }

  /// Packages that are never resolved, neither requested nor as a dependency.
  #[must_use]
  pub fn with_skip_packages<I, P>(mut self, packages: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<String>,
  {
    self.skip_packages.extend(packages.into_iter().map(Into::into));
    self
  }

  fn is_skipped(&self, name: &str) -> bool {
    self.skip_packages.contains(name)
  }

  /// Resolves `requested` against what is `stored` (name to installed version).
  ///
  /// At most `concurrency` packages are resolved at a time. The first failure aborts.
  pub async fn resolve(
    &self,
    requested: &PackageVersionMap,
    stored: &PackageVersionMap,
  ) -> Result<ResolvedPackageSet, Error> {
    let mut queue = WorkQueue::new();
    for (name, specifier) in requested {
      if self.is_skipped(name) {
        trace!(name, "skipping package");
        continue;
      }
      queue.enqueue(name, (name.clone(), specifier.clone()));
    }

    let mut resolved = ResolvedPackageSet::new();
    let mut in_flight = FuturesUnordered::new();
    loop {
      while in_flight.len() < self.concurrency {
        let Some((name, specifier)) = queue.next() else {
          break;
        };
        in_flight.push(self.resolve_node(name, specifier, stored));
      }

      let Some(outcome) = in_flight.next().await else {
        break;
      };
      let outcome = outcome?;
      queue.complete();

      if let NodeOutcome::Resolved {
        name,
        version,
        dependencies,
      } = outcome
      {
        for (dependency, specifier) in dependencies {
          if self.is_skipped(&dependency) {
            continue;
          }
          queue.enqueue(&dependency, (dependency.clone(), specifier));
        }
        resolved.insert(name, version);
      }
    }
    debug_assert!(queue.is_done());

    debug!(packages = resolved.len(), "resolved packages to download");
    Ok(resolved)
  }

  async fn resolve_node(
    &self,
    name: String,
    specifier: String,
    stored: &PackageVersionMap,
  ) -> Result<NodeOutcome, Error> {
    let stored_version = stored.get(&name);
    if stored_version == Some(&specifier) {
      trace!(name, specifier, "already installed");
      return Ok(NodeOutcome::UpToDate);
    }

    let version = if is_exact_version(&specifier) {
      specifier
    } else {
      self.registry.resolve_version(&name, &specifier).await?
    };
    if stored_version == Some(&version) {
      trace!(name, version, "already installed");
      return Ok(NodeOutcome::UpToDate);
    }

    let dependencies = self.registry.fetch_dependencies(&name, &version).await?;
    Ok(NodeOutcome::Resolved {
      name,
      version,
      dependencies,
    })
  }
}
