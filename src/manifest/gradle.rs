use std::path::Path;

use anyhow::Result;
use regex::Regex;

use crate::models::{Dependency, ParsedManifest, Provider};

/// Parser for `build.gradle` and `build.gradle.kts`.
///
/// Gradle scripts are programs, so this is a regex scan for the two common
/// declaration styles. Anything built dynamically is missed.
pub struct GradleParser;

impl super::ManifestParser for GradleParser {
    fn provider(&self) -> Provider {
        Provider::Gradle
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name == "build.gradle" || file_name == "build.gradle.kts"
    }

    fn parse(&self, path: &Path) -> Result<ParsedManifest> {
        let content = std::fs::read_to_string(path)?;
        parse_build_gradle(&content, path)
    }
}

fn parse_build_gradle(content: &str, path: &Path) -> Result<ParsedManifest> {
    let mut manifest = ParsedManifest::default();

    // implementation 'group:artifact:version'
    // implementation("group:artifact:version")
    let re_string = Regex::new(
        r#"(?m)^\s*\w+\s*\(?\s*['"]([A-Za-z0-9_.\-]+):([A-Za-z0-9_.\-]+)(?::([^'"\s]+))?['"]"#,
    )?;

    for caps in re_string.captures_iter(content) {
        let version = caps.get(3).and_then(|m| clean_version(m.as_str()));
        push(&mut manifest, path, &caps[1], &caps[2], version);
    }

    // implementation group: 'g', name: 'a', version: 'v'
    // implementation(group = "g", name = "a", version = "v")
    let re_map = Regex::new(
        r#"(?m)^\s*\w+\s*\(?\s*group\s*[:=]\s*['"]([^'"]+)['"]\s*,\s*name\s*[:=]\s*['"]([^'"]+)['"](?:\s*,\s*version\s*[:=]\s*['"]([^'"]+)['"])?"#,
    )?;

    for caps in re_map.captures_iter(content) {
        let version = caps.get(3).and_then(|m| clean_version(m.as_str()));
        push(&mut manifest, path, &caps[1], &caps[2], version);
    }

    Ok(manifest)
}

fn push(manifest: &mut ParsedManifest, path: &Path, group: &str, artifact: &str, version: Option<String>) {
    manifest.dependencies.push(Dependency::new(
        format!("{}:{}", group, artifact),
        version,
        Provider::Gradle,
        Some(path.to_path_buf()),
    ));
}

/// Drop classifiers (`1.0:sources`), artifact types (`1.0@aar`) and
/// interpolated versions (`$kotlinVersion`).
fn clean_version(raw: &str) -> Option<String> {
    let version = raw.split(&[':', '@'][..]).next().unwrap_or(raw);
    if version.is_empty() || version.contains('$') {
        tracing::debug!("ignoring dynamic gradle version {:?}", raw);
        return None;
    }
    Some(version.to_string())
}
