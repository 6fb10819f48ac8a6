use serde_json::{json, Value};

use crate::{vfs::VfsFile, Error};

/// The one package whose published build is CommonJS only.
pub const MTCUTE_TL: &str = "@mtcute/tl";

const EXPORTS_SHIM: &str = "const exports = {};";

/// Named bindings re-exported from each CommonJS file of `@mtcute/tl`.
const TL_EXPORTS: &[(&str, &[&str])] = &[
  ("index.js", &["tl", "mtp"]),
  ("binary/reader.js", &["__tlReaderMap"]),
  ("binary/writer.js", &["__tlWriterMap"]),
  ("binary/rsa-keys.js", &["__publicKeyIndex"]),
];

/// Applies the content patch registered for `package`, if any.
pub fn patch_package(package: &str, file: &mut VfsFile) -> Result<(), Error> {
  if package == MTCUTE_TL {
    patch_mtcute_tl(file)?;
  }
  Ok(())
}

/// Wraps the CommonJS entry points of `@mtcute/tl` so they expose ESM named exports, and points
/// the manifest `exports` map at them.
///
/// Files that already contain `export const` are left alone.
pub fn patch_mtcute_tl(file: &mut VfsFile) -> Result<(), Error> {
  let path = file.path.as_str();
  if !(path.ends_with(".js") || path.ends_with(".json")) {
    return Ok(());
  }
  let Ok(text) = std::str::from_utf8(&file.contents) else {
    return Ok(());
  };
  if text.contains("export const") {
    return Ok(());
  }

  if path == "package.json" {
    let mut manifest: Value = serde_json::from_str(text).map_err(|error| Error::InvalidManifest {
      package: MTCUTE_TL.to_string(),
      reason: error.to_string(),
    })?;
    let Some(object) = manifest.as_object_mut() else {
      return Err(Error::InvalidManifest {
        package: MTCUTE_TL.to_string(),
        reason: "package.json is not an object".to_string(),
      });
    };
    object.insert(
      "exports".to_string(),
      json!({
        ".": "./index.js",
        "./binary/reader.js": "./binary/reader.js",
        "./binary/writer.js": "./binary/writer.js",
        "./binary/rsa-keys.js": "./binary/rsa-keys.js",
      }),
    );
    file.contents = serde_json::to_string_pretty(&manifest)?.into_bytes();
    return Ok(());
  }

  let Some((_, names)) = TL_EXPORTS.iter().find(|(target, _)| *target == path) else {
    return Ok(());
  };
  let mut patched = String::with_capacity(text.len() + 128);
  patched.push_str(EXPORTS_SHIM);
  patched.push_str(text);
  for name in *names {
    patched.push_str(&format!("export const {name} = exports.{name};"));
  }
  file.contents = patched.into_bytes();
  Ok(())
}
