use std::{
  collections::BTreeSet,
  io,
  path::{Path, PathBuf},
};

use relative_path::{Component, RelativePath};
use tokio::fs;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::{
  vfs::{LibraryStorage, VfsFile, VfsLibraryInfo, VfsLibraryRecord},
  Error,
};

const INFO_FILE: &str = "library.json";
const FILES_DIR: &str = "files";
const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";

/// Stores every library in its own directory below `root`.
///
/// ```text
/// root/%40mtcute%2Fcore/library.json
/// root/%40mtcute%2Fcore/files/index.js
/// ```
///
/// A write is staged in a sibling directory and swapped in with renames, so readers never see a
/// half-written library.
pub struct DirectoryStorage {
  root: PathBuf,
}

impl DirectoryStorage {
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
    let root = root.into();
    fs::create_dir_all(&root).await?;
    Ok(Self { root })
  }

  #[must_use]
  pub fn root(&self) -> &Path {
    &self.root
  }

  fn library_dir(&self, name: &str) -> PathBuf {
    self.root.join(encode_name(name))
  }

  async fn read_info(&self, name: &str) -> Result<Option<VfsLibraryInfo>, Error> {
    read_info_at(&self.library_dir(name)).await
  }
}

fn encode_name(name: &str) -> String {
  form_urlencoded::byte_serialize(name.as_bytes()).collect()
}

async fn read_info_at(dir: &Path) -> Result<Option<VfsLibraryInfo>, Error> {
  match fs::read(dir.join(INFO_FILE)).await {
    Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
    Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(error) => Err(error.into()),
  }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<(), Error> {
  match fs::remove_dir_all(dir).await {
    Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error.into()),
    _ => Ok(()),
  }
}

fn checked_file_path(base: &Path, path: &RelativePath) -> Result<PathBuf, Error> {
  let normalized = path.normalize();
  let escapes = normalized
    .components()
    .next()
    .map_or(true, |component| matches!(component, Component::ParentDir));
  if escapes {
    return Err(Error::Storage(io::Error::new(
      io::ErrorKind::InvalidInput,
      format!("file path `{path}` is outside the library"),
    )));
  }
  Ok(normalized.to_path(base))
}

impl LibraryStorage for DirectoryStorage {
  async fn available_libraries(&self) -> Result<BTreeSet<String>, Error> {
    let mut names = BTreeSet::new();
    let mut entries = fs::read_dir(&self.root).await?;
    while let Some(entry) = entries.next_entry().await? {
      let file_name = entry.file_name();
      let file_name = file_name.to_string_lossy();
      if file_name.starts_with(STAGING_PREFIX) || file_name.starts_with(RETIRED_PREFIX) {
        continue;
      }
      match read_info_at(&entry.path()).await? {
        Some(info) => {
          names.insert(info.name);
        },
        None => warn!(directory = %entry.path().display(), "ignoring directory without library info"),
      }
    }
    Ok(names)
  }

  async fn existing_version(&self, name: &str) -> Result<Option<String>, Error> {
    Ok(self.read_info(name).await?.map(|info| info.version))
  }

  async fn read_library(&self, name: &str) -> Result<Option<VfsLibraryRecord>, Error> {
    let dir = self.library_dir(name);
    let Some(info) = read_info_at(&dir).await? else {
      return Ok(None);
    };

    let files_dir = dir.join(FILES_DIR);
    let mut files = Vec::with_capacity(info.files.len());
    for path in info.files {
      let contents = fs::read(checked_file_path(&files_dir, &path)?).await?;
      files.push(VfsFile { path, contents });
    }
    Ok(Some(VfsLibraryRecord {
      name: info.name,
      version: info.version,
      files,
    }))
  }

  async fn write_library(&self, name: &str, version: &str, files: Vec<VfsFile>) -> Result<(), Error> {
    let encoded = encode_name(name);
    let staging = self.root.join(format!("{STAGING_PREFIX}{encoded}"));
    let retired = self.root.join(format!("{RETIRED_PREFIX}{encoded}"));
    let target = self.root.join(&encoded);

    remove_dir_if_exists(&staging).await?;
    let files_dir = staging.join(FILES_DIR);
    fs::create_dir_all(&files_dir).await?;

    let mut info = VfsLibraryInfo {
      name: name.to_string(),
      version: version.to_string(),
      files: Vec::with_capacity(files.len()),
    };
    for file in files {
      let path = checked_file_path(&files_dir, &file.path)?;
      if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
      }
      fs::write(&path, &file.contents).await?;
      info.files.push(file.path);
    }
    fs::write(staging.join(INFO_FILE), serde_json::to_vec_pretty(&info)?).await?;

    remove_dir_if_exists(&retired).await?;
    if fs::try_exists(&target).await? {
      fs::rename(&target, &retired).await?;
    }
    fs::rename(&staging, &target).await?;
    remove_dir_if_exists(&retired).await?;

    debug!(name, version, files = info.files.len(), "stored library");
    Ok(())
  }

  async fn delete_library(&self, name: &str) -> Result<(), Error> {
    remove_dir_if_exists(&self.library_dir(name)).await
  }
}
