use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{Dependency, ParsedManifest, Provider};

const DEPENDENCY_TABLES: [&str; 3] = ["dependencies", "dev-dependencies", "build-dependencies"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CargoManifest {
    package: Option<CargoPackage>,
    workspace: Option<toml::Table>,
    target: toml::Table,
    patch: toml::Table,
    #[serde(flatten)]
    rest: toml::Table,
}

#[derive(Debug, Deserialize)]
struct CargoPackage {
    name: String,
}

/// Parser for `Cargo.toml`.
///
/// Only crates.io dependencies are reported: entries with `path`, `git`
/// or `workspace = true` are skipped. Crates patched under
/// `[patch.crates-io]` and the package itself are local.
pub struct CargoParser;

impl super::ManifestParser for CargoParser {
    fn provider(&self) -> Provider {
        Provider::Cargo
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name == "Cargo.toml"
    }

    fn parse(&self, path: &Path) -> Result<ParsedManifest> {
        let content = std::fs::read_to_string(path)?;
        let cargo: CargoManifest = toml::from_str(&content)
            .with_context(|| format!("invalid TOML in {}", path.display()))?;
        let mut manifest = ParsedManifest::default();

        let mut tables: Vec<&toml::Table> = DEPENDENCY_TABLES
            .iter()
            .filter_map(|key| cargo.rest.get(*key).and_then(|v| v.as_table()))
            .collect();

        // [target.'cfg(...)'.dependencies] and friends
        for target in cargo.target.values().filter_map(|v| v.as_table()) {
            tables.extend(
                DEPENDENCY_TABLES
                    .iter()
                    .filter_map(|key| target.get(*key).and_then(|v| v.as_table())),
            );
        }

        if let Some(deps) = cargo
            .workspace
            .as_ref()
            .and_then(|w| w.get("dependencies"))
            .and_then(|v| v.as_table())
        {
            tables.push(deps);
        }

        for table in tables {
            for (key, value) in table {
                match registry_dependency(key, value) {
                    Ok(Some((name, version))) => manifest.dependencies.push(Dependency::new(
                        name,
                        version,
                        Provider::Cargo,
                        Some(path.to_path_buf()),
                    )),
                    Ok(None) => {}
                    Err(reason) => {
                        tracing::warn!("{}: skipping dependency {}: {}", path.display(), key, reason)
                    }
                }
            }
        }

        if let Some(patched) = cargo.patch.get("crates-io").and_then(|v| v.as_table()) {
            manifest.local_packages.extend(patched.keys().cloned());
        }
        if let Some(package) = cargo.package {
            manifest.local_packages.push(package.name);
        }

        Ok(manifest)
    }
}

/// Resolve one dependency entry to `(crate name, version)`; `Ok(None)` for
/// entries that are not fetched from crates.io.
fn registry_dependency(
    key: &str,
    value: &toml::Value,
) -> Result<Option<(String, Option<String>)>, &'static str> {
    match value {
        toml::Value::String(version) => Ok(Some((key.to_string(), Some(trim_prerelease(version))))),
        toml::Value::Table(t) => {
            let local = t.contains_key("path") || t.contains_key("git");
            let inherited = t.get("workspace").and_then(|v| v.as_bool()) == Some(true);
            let alternate = t.contains_key("registry");
            if local || inherited || alternate {
                return Ok(None);
            }
            let name = t
                .get("package")
                .and_then(|v| v.as_str())
                .unwrap_or(key)
                .to_string();
            let version = t
                .get("version")
                .and_then(|v| v.as_str())
                .map(trim_prerelease);
            Ok(Some((name, version)))
        }
        _ => Err("expected a version string or a table"),
    }
}

/// `"1.0.0-beta.2"` → `"1.0.0"`
fn trim_prerelease(version: &str) -> String {
    version.split('-').next().unwrap_or(version).trim().to_string()
}
