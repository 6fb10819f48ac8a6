use std::collections::BTreeSet;

use hashbrown::HashMap;
use relative_path::{RelativePath, RelativePathBuf};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{registry::PackageVersionMap, Error};

/// One file of an installed package, relative to the package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsFile {
  pub path: RelativePathBuf,
  pub contents: Vec<u8>,
}

impl VfsFile {
  #[must_use]
  pub fn new(path: impl AsRef<RelativePath>, contents: Vec<u8>) -> Self {
    Self {
      path: path.as_ref().to_relative_path_buf(),
      contents,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsLibraryRecord {
  pub name: String,
  pub version: String,
  pub files: Vec<VfsFile>,
}

/// Metadata of a stored library, without the file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsLibraryInfo {
  pub name: String,
  pub version: String,
  pub files: Vec<RelativePathBuf>,
}

/// Persistent store of installed packages, keyed by package name.
///
/// A write replaces the whole record for that name. Writes for different names may run
/// concurrently; two writes for the same name never do.
pub trait LibraryStorage {
  async fn available_libraries(&self) -> Result<BTreeSet<String>, Error>;

  async fn existing_version(&self, name: &str) -> Result<Option<String>, Error>;

  async fn read_library(&self, name: &str) -> Result<Option<VfsLibraryRecord>, Error>;

  async fn write_library(&self, name: &str, version: &str, files: Vec<VfsFile>) -> Result<(), Error>;

  async fn delete_library(&self, name: &str) -> Result<(), Error>;

  /// Name to version of everything stored.
  async fn stored_versions(&self) -> Result<PackageVersionMap, Error> {
    let mut versions = PackageVersionMap::new();
    for name in self.available_libraries().await? {
      if let Some(version) = self.existing_version(&name).await? {
        versions.insert(name, version);
      }
    }
    Ok(versions)
  }
}

impl<S: LibraryStorage> LibraryStorage for &S {
  async fn available_libraries(&self) -> Result<BTreeSet<String>, Error> {
    (**self).available_libraries().await
  }

  async fn existing_version(&self, name: &str) -> Result<Option<String>, Error> {
    (**self).existing_version(name).await
  }

  async fn read_library(&self, name: &str) -> Result<Option<VfsLibraryRecord>, Error> {
    (**self).read_library(name).await
  }

  async fn write_library(&self, name: &str, version: &str, files: Vec<VfsFile>) -> Result<(), Error> {
    (**self).write_library(name, version, files).await
  }

  async fn delete_library(&self, name: &str) -> Result<(), Error> {
    (**self).delete_library(name).await
  }
}

/// Volatile storage, mostly useful for tests and short-lived tools.
#[derive(Default)]
pub struct MemoryStorage {
  libraries: Mutex<HashMap<String, VfsLibraryRecord>>,
}

impl MemoryStorage {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }
}

impl LibraryStorage for MemoryStorage {
  async fn available_libraries(&self) -> Result<BTreeSet<String>, Error> {
    Ok(self.libraries.lock().await.keys().cloned().collect())
  }

  async fn existing_version(&self, name: &str) -> Result<Option<String>, Error> {
    Ok(
      self
        .libraries
        .lock()
        .await
        .get(name)
        .map(|record| record.version.clone()),
    )
  }

  async fn read_library(&self, name: &str) -> Result<Option<VfsLibraryRecord>, Error> {
    Ok(self.libraries.lock().await.get(name).cloned())
  }

  async fn write_library(&self, name: &str, version: &str, files: Vec<VfsFile>) -> Result<(), Error> {
    let record = VfsLibraryRecord {
      name: name.to_string(),
      version: version.to_string(),
      files,
    };
    self.libraries.lock().await.insert(name.to_string(), record);
    Ok(())
  }

  async fn delete_library(&self, name: &str) -> Result<(), Error> {
    self.libraries.lock().await.remove(name);
    Ok(())
  }
}
