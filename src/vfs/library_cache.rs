use std::sync::Arc;

use hashbrown::HashMap;
use relative_path::{RelativePath, RelativePathBuf};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
  vfs::{generate_import_map, ImportMap, LibraryStorage},
  Error,
};

/// Type-definition-only packages never get an import map entry.
const TYPES_SCOPE: &str = "@types/";

/// Files of one library, by path relative to the package root.
pub type LibraryFiles = HashMap<RelativePathBuf, Arc<[u8]>>;

/// A file looked up through [`LibraryCache::resolve_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
  pub contents: Arc<[u8]>,
  pub mime_type: &'static str,
}

#[must_use]
pub fn mime_type_for(path: &str) -> &'static str {
  match path.rsplit_once('.').map(|(_, extension)| extension) {
    Some("js" | "mjs") => "application/javascript",
    Some("wasm") => "application/wasm",
    Some("json") => "application/json",
    _ => "application/octet-stream",
  }
}

/// Splits `<name>/<path>` where the name may be scoped (`@scope/name/<path>`).
#[must_use]
pub fn split_library_path(path: &str) -> Option<(&str, &str)> {
  let mut slash = path.find('/')?;
  if path.starts_with('@') {
    slash += 1 + path[slash + 1..].find('/')?;
  }
  Some((&path[..slash], &path[slash + 1..]))
}

/// Read side of the VFS: caches library contents and the generated import map.
///
/// Both caches live until [`LibraryCache::clear`], typically called after an update.
pub struct LibraryCache<S> {
  storage: S,
  libraries: Mutex<HashMap<String, Arc<LibraryFiles>>>,
  import_map: Mutex<Option<Arc<ImportMap>>>,
}

impl<S: LibraryStorage> LibraryCache<S> {
  #[must_use]
  pub fn new(storage: S) -> Self {
    Self {
      storage,
      libraries: Mutex::new(HashMap::new()),
      import_map: Mutex::new(None),
    }
  }

  #[must_use]
  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Files of library `name`, loaded from storage on first use. `None` if it is not installed.
  pub async fn load_library(&self, name: &str) -> Result<Option<Arc<LibraryFiles>>, Error> {
    if let Some(files) = self.libraries.lock().await.get(name) {
      return Ok(Some(files.clone()));
    }

    let Some(record) = self.storage.read_library(name).await? else {
      return Ok(None);
    };
    let files: Arc<LibraryFiles> = Arc::new(
      record
        .files
        .into_iter()
        .map(|file| (file.path, Arc::from(file.contents)))
        .collect(),
    );
    debug!(name, files = files.len(), "loaded library");

    let mut libraries = self.libraries.lock().await;
    Ok(Some(
      libraries.entry(name.to_string()).or_insert(files).clone(),
    ))
  }

  /// Looks up `<library>/<file>`, e.g. `@mtcute/core/index.js`.
  pub async fn resolve_file(&self, path: &str) -> Result<Option<ResolvedFile>, Error> {
    let Some((name, file_path)) = split_library_path(path) else {
      return Ok(None);
    };
    let Some(files) = self.load_library(name).await? else {
      return Ok(None);
    };
    Ok(files.get(RelativePath::new(file_path)).map(|contents| ResolvedFile {
      contents: contents.clone(),
      mime_type: mime_type_for(file_path),
    }))
  }

  /// Import map over every installed library except `@types/*`, built once and cached.
  pub async fn import_map(&self, prefix: &str) -> Result<Arc<ImportMap>, Error> {
    let mut cached = self.import_map.lock().await;
    if let Some(import_map) = cached.as_ref() {
      return Ok(import_map.clone());
    }

    let mut manifests = Vec::new();
    for name in self.storage.available_libraries().await? {
      if name.starts_with(TYPES_SCOPE) {
        continue;
      }
      let Some(files) = self.load_library(&name).await? else {
        continue;
      };
      let Some(manifest) = files.get(RelativePath::new("package.json")) else {
        warn!(name, "library has no package.json");
        continue;
      };
      let manifest: Value = serde_json::from_slice(manifest).map_err(|error| Error::InvalidManifest {
        package: name.clone(),
        reason: error.to_string(),
      })?;
      manifests.push(manifest);
    }

    let import_map = Arc::new(generate_import_map(&manifests, prefix)?);
    *cached = Some(import_map.clone());
    Ok(import_map)
  }

  /// Forgets every cached library and the import map.
  pub async fn clear(&self) {
    self.libraries.lock().await.clear();
    *self.import_map.lock().await = None;
  }
}
