use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::models::{Dependency, ParsedManifest, Provider};

/// Parser for `package.json`.
///
/// Reads `dependencies`, `devDependencies` and `optionalDependencies`.
/// Specs that resolve outside the registry (git, URLs, local paths,
/// workspace protocol) are skipped, and `npm:` aliases are resolved to the
/// aliased package. Workspace members are reported as local packages.
pub struct NpmParser;

const SECTIONS: [&str; 3] = ["dependencies", "devDependencies", "optionalDependencies"];

impl super::ManifestParser for NpmParser {
    fn provider(&self) -> Provider {
        Provider::Npm
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name == "package.json"
    }

    fn parse(&self, path: &Path) -> Result<ParsedManifest> {
        let content = std::fs::read_to_string(path)?;
        let json: Value = serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON in {}", path.display()))?;
        let mut manifest = ParsedManifest::default();

        for section in SECTIONS {
            let Some(pkgs) = json.get(section).and_then(|v| v.as_object()) else {
                continue;
            };
            for (name, spec) in pkgs {
                let Some(spec) = spec.as_str() else {
                    tracing::warn!(
                        "{}: skipping {} in {}: version is not a string",
                        path.display(),
                        name,
                        section
                    );
                    continue;
                };
                if let Some((name, version)) = resolve_spec(name, spec) {
                    manifest.dependencies.push(Dependency::new(
                        name,
                        version,
                        Provider::Npm,
                        Some(path.to_path_buf()),
                    ));
                }
            }
        }

        if let Some(root) = path.parent() {
            manifest.local_packages = workspace_members(&json, root);
        }

        Ok(manifest)
    }
}

/// Resolve a dependency entry to the registry name and version it fetches,
/// or `None` when it is not fetched from the registry at all.
fn resolve_spec(name: &str, spec: &str) -> Option<(String, Option<String>)> {
    let spec = spec.trim();
    let non_registry = ["http:", "https:", "git", "github:", "file:", "link:", "workspace:", "portal:"];
    if non_registry.iter().any(|p| spec.starts_with(p)) || spec.contains("://") {
        return None;
    }
    // Bare `user/repo` is a GitHub shorthand.
    if spec.contains('/') && !spec.starts_with("npm:") {
        return None;
    }

    if let Some(alias) = spec.strip_prefix("npm:") {
        // "npm:@scope/pkg@^1.0.0" or "npm:pkg@1.0.0" or "npm:pkg"
        let at = if let Some(scoped) = alias.strip_prefix('@') {
            scoped.find('@').map(|i| i + 1)
        } else {
            alias.find('@')
        };
        return Some(match at {
            Some(i) => (alias[..i].to_string(), Some(alias[i + 1..].to_string())),
            None => (alias.to_string(), None),
        });
    }

    Some((name.to_string(), Some(spec.to_string())))
}

/// Names declared by the workspace members of a root `package.json`.
///
/// Supports the array form and the `{ "packages": [...] }` form, with
/// patterns that are either a directory or a directory followed by `/*`
/// or `/**`.
fn workspace_members(json: &Value, root: &Path) -> Vec<String> {
    let patterns = match json.get("workspaces") {
        Some(Value::Array(list)) => list.clone(),
        Some(Value::Object(obj)) => obj
            .get("packages")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default(),
        _ => return Vec::new(),
    };

    let mut names = Vec::new();
    for pattern in patterns.iter().filter_map(|p| p.as_str()) {
        let (dir, wildcard) = match pattern
            .strip_suffix("/**")
            .or_else(|| pattern.strip_suffix("/*"))
        {
            Some(dir) => (dir, true),
            None => (pattern, false),
        };

        let base = root.join(dir);
        let candidates: Vec<_> = if wildcard {
            match std::fs::read_dir(&base) {
                Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
                Err(_) => continue,
            }
        } else {
            vec![base]
        };

        for candidate in candidates {
            if let Some(name) = read_package_name(&candidate.join("package.json")) {
                names.push(name);
            }
        }
    }
    names.sort();
    names
}

fn read_package_name(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let json: Value = serde_json::from_str(&content).ok()?;
    json.get("name").and_then(|v| v.as_str()).map(str::to_string)
}
