use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::Error;

/// Bare module specifier to URL.
pub type ImportMap = BTreeMap<String, String>;

fn invalid(package: &str, reason: String) -> Error {
  Error::InvalidManifest {
    package: package.to_string(),
    reason,
  }
}

fn strip_dot_slash(target: &str) -> &str {
  target.strip_prefix("./").unwrap_or(target)
}

/// Picks the ESM file an `exports` target points at.
fn export_target<'a>(package: &str, key: &str, target: &'a Value) -> Result<&'a str, Error> {
  let target = match target {
    Value::Object(conditions) => {
      // { "import": "./index.js", "require": "./index.cjs" }
      let Some(import) = conditions.get("import") else {
        return Err(invalid(package, format!("export `{key}` has no import condition")));
      };
      match import {
        // { "import": { "types": "./index.d.ts", "default": "./index.js" } }
        Value::Object(nested) => nested
          .get("default")
          .ok_or_else(|| invalid(package, format!("export `{key}` has no default import")))?,
        other => other,
      }
    },
    other => other,
  };

  let Some(target) = target.as_str() else {
    return Err(invalid(package, format!("export `{key}` is not a string")));
  };
  let target = strip_dot_slash(target);
  if target.starts_with('.') {
    return Err(invalid(package, format!("export `{key}` points outside the package: {target}")));
  }
  Ok(target)
}

/// Adds the entries of one `package.json` to `import_map`.
///
/// `prefix` is the URL under which library files are served, e.g. `https://host/sw/runtime/`;
/// targets become `{prefix}{name}/{file}`.
pub fn add_package_to_import_map(
  import_map: &mut ImportMap,
  manifest: &Value,
  prefix: &str,
) -> Result<(), Error> {
  let Some(name) = manifest.get("name").and_then(Value::as_str) else {
    return Err(invalid("<unknown>", "package.json has no name".to_string()));
  };
  let base = format!("{prefix}{name}/");

  if let Some(exports) = manifest.get("exports").filter(|exports| !exports.is_null()) {
    let wrapped;
    let exports = match exports {
      Value::Object(map) if !(map.contains_key("import") || map.contains_key("require")) => map,
      single => {
        wrapped = Map::from_iter([(".".to_string(), single.clone())]);
        &wrapped
      },
    };

    for (key, target) in exports {
      let target = export_target(name, key, target)?;
      if key == "." {
        import_map.insert(name.to_string(), format!("{base}{target}"));
      } else if let Some(subpath) = key.strip_prefix("./") {
        import_map.insert(format!("{name}/{subpath}"), format!("{base}{target}"));
      } else {
        return Err(invalid(name, format!("unsupported export key `{key}`")));
      }
    }
  } else if let Some(module) = manifest.get("module").and_then(Value::as_str) {
    import_map.insert(name.to_string(), format!("{base}{}", strip_dot_slash(module)));
  } else if let Some(main) = manifest.get("main").and_then(Value::as_str) {
    let main = strip_dot_slash(main);
    let target = if main.ends_with(".js") {
      main.to_string()
    } else {
      format!("{main}.js")
    };
    import_map.insert(name.to_string(), format!("{base}{target}"));
  } else {
    import_map.insert(name.to_string(), format!("{base}index.js"));
  }
  Ok(())
}

/// Builds an import map covering every given manifest.
pub fn generate_import_map<'a>(
  manifests: impl IntoIterator<Item = &'a Value>,
  prefix: &str,
) -> Result<ImportMap, Error> {
  let mut import_map = ImportMap::new();
  for manifest in manifests {
    add_package_to_import_map(&mut import_map, manifest, prefix)?;
  }
  Ok(import_map)
}
