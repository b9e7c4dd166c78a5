use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::models::{Dependency, ParsedManifest, Provider};

/// Parser for `requirements*.txt` and `pyproject.toml`.
///
/// `pyproject.toml` is read for PEP 621 `[project]` dependencies as well as
/// Poetry's `[tool.poetry]` tables, including dependency groups.
pub struct PypiParser;

impl super::ManifestParser for PypiParser {
    fn provider(&self) -> Provider {
        Provider::Pypi
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name == "pyproject.toml"
            || (file_name.starts_with("requirements") && file_name.ends_with(".txt"))
    }

    fn parse(&self, path: &Path) -> Result<ParsedManifest> {
        let content = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e == "toml") {
            parse_pyproject_toml(&content, path)
        } else {
            parse_requirements_txt(&content, path)
        }
    }
}

fn requirement_re() -> Result<Regex> {
    Ok(Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._\-]*)\s*(?:\[[^\]]*\])?\s*(.*)$")?)
}

/// Parse one PEP 508 requirement into `(name, version)`.
///
/// Returns `Ok(None)` for direct references (`name @ url`), which are not
/// fetched from the index, and `Err(())` when the line is not a requirement.
fn parse_requirement(re: &Regex, line: &str) -> Result<Option<(String, Option<String>)>, ()> {
    let line = line.split(';').next().unwrap_or("").trim();
    let caps = re.captures(line).ok_or(())?;
    let name = caps[1].to_string();
    let rest = caps[2].trim();

    if rest.starts_with('@') {
        return Ok(None);
    }

    let version = rest
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            // Exact pins are stored bare; any other operator is kept.
            let v = v.strip_prefix("===").or_else(|| v.strip_prefix("==")).unwrap_or(v);
            v.trim().to_string()
        });

    Ok(Some((name, version)))
}

/// Parse a `requirements.txt` file.
///
/// Comments, pip options (`-r`, `-e`, `--index-url`, ...), URLs and local
/// paths are ignored. Lines that do not look like a requirement are logged
/// and skipped.
fn parse_requirements_txt(content: &str, path: &Path) -> Result<ParsedManifest> {
    let re = requirement_re()?;
    let mut manifest = ParsedManifest::default();

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.split(" #").next().unwrap_or("").trim();
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with('-')
            || line.starts_with('.')
            || line.starts_with('/')
            || line.contains("://")
        {
            continue;
        }

        match parse_requirement(&re, line) {
            Ok(Some((name, version))) => manifest.dependencies.push(Dependency::new(
                name,
                version,
                Provider::Pypi,
                Some(path.to_path_buf()),
            )),
            Ok(None) => {}
            Err(()) => tracing::warn!(
                "{}:{}: skipping unparseable requirement {:?}",
                path.display(),
                lineno + 1,
                line
            ),
        }
    }

    Ok(manifest)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pyproject {
    project: Option<PyprojectProject>,
    tool: Option<PyprojectTool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PyprojectProject {
    name: Option<String>,
    dependencies: Vec<String>,
    #[serde(rename = "optional-dependencies")]
    optional_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PyprojectTool {
    poetry: Option<Poetry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Poetry {
    name: Option<String>,
    dependencies: toml::Table,
    #[serde(rename = "dev-dependencies")]
    dev_dependencies: toml::Table,
    group: BTreeMap<String, PoetryGroup>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PoetryGroup {
    dependencies: toml::Table,
}

fn parse_pyproject_toml(content: &str, path: &Path) -> Result<ParsedManifest> {
    let pyproject: Pyproject = toml::from_str(content)
        .with_context(|| format!("invalid TOML in {}", path.display()))?;
    let re = requirement_re()?;
    let mut manifest = ParsedManifest::default();
    let source = Some(path.to_path_buf());

    if let Some(project) = pyproject.project {
        manifest.local_packages.extend(project.name);
        let optional = project.optional_dependencies.into_values().flatten();
        for requirement in project.dependencies.into_iter().chain(optional) {
            match parse_requirement(&re, &requirement) {
                Ok(Some((name, version))) => manifest.dependencies.push(Dependency::new(
                    name,
                    version,
                    Provider::Pypi,
                    source.clone(),
                )),
                Ok(None) => {}
                Err(()) => tracing::warn!(
                    "{}: skipping unparseable requirement {:?}",
                    path.display(),
                    requirement
                ),
            }
        }
    }

    if let Some(poetry) = pyproject.tool.and_then(|t| t.poetry) {
        manifest.local_packages.extend(poetry.name);
        let groups = poetry.group.into_values().map(|g| g.dependencies);
        let tables = [poetry.dependencies, poetry.dev_dependencies]
            .into_iter()
            .chain(groups);

        for table in tables {
            for (name, value) in table {
                if name.eq_ignore_ascii_case("python") {
                    continue;
                }
                match poetry_version(&value) {
                    Some(version) => manifest.dependencies.push(Dependency::new(
                        name,
                        version,
                        Provider::Pypi,
                        source.clone(),
                    )),
                    None => tracing::debug!("{}: {} is not an index dependency", path.display(), name),
                }
            }
        }
    }

    Ok(manifest)
}

/// Version of a Poetry dependency entry. The outer `None` means the entry
/// does not come from the package index (path, git or URL source).
fn poetry_version(value: &toml::Value) -> Option<Option<String>> {
    match value {
        toml::Value::String(v) => Some(Some(v.clone())),
        toml::Value::Table(t) => {
            if ["path", "git", "url"].iter().any(|k| t.contains_key(*k)) {
                return None;
            }
            Some(t.get("version").and_then(|v| v.as_str()).map(str::to_string))
        }
        // Multiple-constraint lists differ per platform; no single version.
        _ => Some(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestParser;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    #[test]
    fn test_parse_requirements_txt() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "-r base.txt").unwrap();
        writeln!(f, "requests==2.28.1").unwrap();
        writeln!(f, "flask>=2.0.0,<3").unwrap();
        writeln!(f, "numpy==1.24.0 ; python_version >= '3.8'").unwrap();
        writeln!(f, "uvicorn[standard]").unwrap();
        writeln!(f, "mylib @ https://example.com/mylib.tar.gz").unwrap();
        writeln!(f, "git+https://github.com/acme/tool.git").unwrap();
        writeln!(f, "!!!not a requirement").unwrap();
        writeln!(f, "black  # formatter").unwrap();

        let manifest = PypiParser.parse(f.path()).unwrap();
        let deps: Vec<_> = manifest
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), d.version.as_deref()))
            .collect();
        assert_eq!(
            deps,
            vec![
                ("requests", Some("2.28.1")),
                ("flask", Some(">=2.0.0")),
                ("numpy", Some("1.24.0")),
                ("uvicorn", None),
                ("black", None),
            ]
        );
    }

    #[test]
    fn test_parse_pyproject_pep621() {
        let content = r#"
[project]
name = "acme-service"
dependencies = ["httpx>=0.24", "pydantic==2.5.0", "acme-internal"]

[project.optional-dependencies]
dev = ["pytest==7.4.0"]
"#;
        let manifest = parse_pyproject_toml(content, Path::new("pyproject.toml")).unwrap();
        let names: Vec<_> = manifest.dependencies.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["httpx", "pydantic", "acme-internal", "pytest"]);
        assert_eq!(manifest.dependencies[1].version.as_deref(), Some("2.5.0"));
        assert_eq!(manifest.local_packages, vec!["acme-service"]);
    }

    #[test]
    fn test_parse_pyproject_poetry() {
        let content = r#"
[tool.poetry]
name = "acme"

[tool.poetry.dependencies]
python = "^3.10"
requests = "^2.31"
shared = { path = "../shared" }
fastapi = { version = "0.100.0", extras = ["all"] }

[tool.poetry.group.test.dependencies]
pytest = "7.4.0"
"#;
        let manifest = parse_pyproject_toml(content, Path::new("pyproject.toml")).unwrap();
        let mut deps: Vec<_> = manifest
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), d.version.as_deref()))
            .collect();
        deps.sort();
        assert_eq!(
            deps,
            vec![("fastapi", Some("0.100.0")), ("pytest", Some("7.4.0")), ("requests", Some("^2.31"))]
        );
    }

    #[test]
    fn test_invalid_pyproject_is_an_error() {
        let mut f = Builder::new().suffix(".toml").tempfile().unwrap();
        write!(f, "[project\ndependencies = [").unwrap();
        assert!(PypiParser.parse(f.path()).is_err());
    }
}
