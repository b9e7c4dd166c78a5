use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::models::{Dependency, ParsedManifest, Provider};

/// Parser for Maven `pom.xml`.
///
/// Dependencies are named `groupId:artifactId`. `${...}` versions are
/// resolved against `<properties>` and the project's own version; the
/// project's coordinates are reported as local.
pub struct MavenParser;

impl super::ManifestParser for MavenParser {
    fn provider(&self) -> Provider {
        Provider::Maven
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name == "pom.xml"
    }

    fn parse(&self, path: &Path) -> Result<ParsedManifest> {
        let content = std::fs::read_to_string(path)?;
        parse_pom_xml(&content, path)
    }
}

#[derive(Default)]
struct RawDependency {
    group_id: String,
    artifact_id: String,
    version: String,
}

fn parse_pom_xml(content: &str, path: &Path) -> Result<ParsedManifest> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    // Element names from the root down to the current element.
    let mut stack: Vec<String> = Vec::new();

    let mut raw_deps: Vec<RawDependency> = Vec::new();
    let mut current: Option<RawDependency> = None;
    let mut properties: HashMap<String, String> = HashMap::new();
    let mut project = RawDependency::default();
    let mut parent_group = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if name == "dependency" && stack.last().is_some_and(|p| p == "dependencies") {
                    current = Some(RawDependency::default());
                }
                stack.push(name);
            }
            Ok(Event::End(_)) => {
                if let Some(name) = stack.pop() {
                    if name == "dependency" {
                        if let Some(dep) = current.take() {
                            raw_deps.push(dep);
                        }
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                let depth = stack.len();
                let tag = stack.last().map(String::as_str).unwrap_or("");
                let parent = if depth >= 2 { stack[depth - 2].as_str() } else { "" };

                if let Some(dep) = current.as_mut().filter(|_| parent == "dependency") {
                    match tag {
                        "groupId" => dep.group_id = text,
                        "artifactId" => dep.artifact_id = text,
                        "version" => dep.version = text,
                        _ => {}
                    }
                } else if parent == "properties" && depth == 3 {
                    properties.insert(tag.to_string(), text);
                } else if parent == "project" && depth == 2 {
                    match tag {
                        "groupId" => project.group_id = text,
                        "artifactId" => project.artifact_id = text,
                        "version" => project.version = text,
                        _ => {}
                    }
                } else if parent == "parent" && depth == 3 && tag == "groupId" {
                    parent_group = text;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("invalid XML in {}: {}", path.display(), e),
            _ => {}
        }
        buf.clear();
    }

    if project.group_id.is_empty() {
        project.group_id = parent_group;
    }
    properties.insert("project.version".to_string(), project.version.clone());
    properties.insert("project.groupId".to_string(), project.group_id.clone());

    let mut manifest = ParsedManifest::default();
    for dep in raw_deps {
        if dep.group_id.is_empty() || dep.artifact_id.is_empty() {
            tracing::warn!(
                "{}: skipping dependency without groupId/artifactId ({}:{})",
                path.display(),
                dep.group_id,
                dep.artifact_id
            );
            continue;
        }
        let group_id = interpolate(&dep.group_id, &properties);
        let version = Some(interpolate(&dep.version, &properties)).filter(|v| !v.contains("${"));
        manifest.dependencies.push(Dependency::new(
            format!("{}:{}", group_id, dep.artifact_id),
            version,
            Provider::Maven,
            Some(path.to_path_buf()),
        ));
    }

    if !project.group_id.is_empty() && !project.artifact_id.is_empty() {
        manifest
            .local_packages
            .push(format!("{}:{}", project.group_id, project.artifact_id));
    }

    Ok(manifest)
}

/// Replace `${name}` placeholders with known property values.
fn interpolate(value: &str, properties: &HashMap<String, String>) -> String {
    let mut out = value.to_string();
    for _ in 0..4 {
        let Some(start) = out.find("${") else { break };
        let Some(len) = out[start..].find('}') else { break };
        let key = &out[start + 2..start + len];
        match properties.get(key) {
            Some(v) => out = format!("{}{}{}", &out[..start], v, &out[start + len + 1..]),
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pom_xml() {
        let xml = r#"<?xml version="1.0"?>
<project>
  <groupId>com.acme</groupId>
  <artifactId>billing</artifactId>
  <version>2.1.0</version>
  <properties>
    <commons.version>3.12.0</commons.version>
  </properties>
  <dependencies>
    <dependency>
      <groupId>org.apache.commons</groupId>
      <artifactId>commons-lang3</artifactId>
      <version>${commons.version}</version>
    </dependency>
    <dependency>
      <groupId>com.acme</groupId>
      <artifactId>billing-api</artifactId>
      <version>${project.version}</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
    </dependency>
    <dependency>
      <artifactId>orphan</artifactId>
    </dependency>
  </dependencies>
  <build>
    <plugins>
      <plugin>
        <groupId>org.apache.maven.plugins</groupId>
        <artifactId>maven-compiler-plugin</artifactId>
      </plugin>
    </plugins>
  </build>
</project>"#;

        let manifest = parse_pom_xml(xml, Path::new("pom.xml")).unwrap();
        let deps: Vec<_> = manifest
            .dependencies
            .iter()
            .map(|d| (d.name.as_str(), d.version.as_deref()))
            .collect();
        assert_eq!(
            deps,
            vec![
                ("org.apache.commons:commons-lang3", Some("3.12.0")),
                ("com.acme:billing-api", Some("2.1.0")),
                ("junit:junit", None),
            ]
        );
        assert_eq!(manifest.local_packages, vec!["com.acme:billing"]);
    }

    #[test]
    fn test_unresolved_property_drops_version() {
        let xml = r#"<project><dependencies><dependency>
            <groupId>g</groupId><artifactId>a</artifactId><version>${missing}</version>
        </dependency></dependencies></project>"#;
        let manifest = parse_pom_xml(xml, Path::new("pom.xml")).unwrap();
        assert_eq!(manifest.dependencies[0].version, None);
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let xml = "<project><dependencies></project>";
        assert!(parse_pom_xml(xml, Path::new("pom.xml")).is_err());
    }
}
