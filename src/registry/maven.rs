use std::collections::BTreeSet;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use serde::Deserialize;

use super::{fetch_json, fetch_text, latest_by_semver, RegistryClient};
use crate::error::LookupError;
use crate::models::RegistryRecord;

const SEARCH_URL: &str = "https://search.maven.org/solrsearch/select";
const CENTRAL_URL: &str = "https://repo1.maven.org/maven2";
const SEARCH_ROWS: &str = "200";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    num_found: u64,
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    v: String,
}

/// Looks `groupId:artifactId` coordinates up on Maven Central. Also used
/// for Gradle dependencies.
pub struct MavenClient {
    http: Client,
    with_maintainers: bool,
}

impl MavenClient {
    pub fn new(http: Client, with_maintainers: bool) -> Self {
        MavenClient {
            http,
            with_maintainers,
        }
    }

    /// Developer emails from the POM of `version`. Best effort: a missing
    /// or broken POM yields no emails.
    async fn developer_emails(&self, group_id: &str, artifact_id: &str, version: &str) -> BTreeSet<String> {
        let group_path = group_id.replace('.', "/");
        let pom_url = format!(
            "{}/{}/{}/{}/{}-{}.pom",
            CENTRAL_URL, group_path, artifact_id, version, artifact_id, version
        );

        match fetch_text(self.http.get(&pom_url)).await {
            Ok(pom) => extract_developer_emails(&pom),
            Err(e) => {
                tracing::debug!("no POM for {}:{}:{}: {}", group_id, artifact_id, version, e);
                BTreeSet::new()
            }
        }
    }
}

#[async_trait]
impl RegistryClient for MavenClient {
    async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError> {
        let Some((group_id, artifact_id)) = name.split_once(':') else {
            return Err(LookupError::Transient(format!(
                "not a groupId:artifactId coordinate: {}",
                name
            )));
        };

        let query = format!("g:\"{}\" AND a:\"{}\"", group_id, artifact_id);
        let search: SearchResponse = fetch_json(self.http.get(SEARCH_URL).query(&[
            ("q", query.as_str()),
            ("core", "gav"),
            ("rows", SEARCH_ROWS),
            ("wt", "json"),
        ]))
        .await?;

        let mut record = into_record(search)?;
        if self.with_maintainers {
            if let Some(latest) = record.latest_version.clone() {
                record.maintainer_emails = self.developer_emails(group_id, artifact_id, &latest).await;
            }
        }
        Ok(record)
    }
}

fn into_record(search: SearchResponse) -> Result<RegistryRecord, LookupError> {
    if search.response.num_found == 0 {
        return Err(LookupError::NotFound);
    }

    let num_found = search.response.num_found;
    let mut versions: Vec<String> = search.response.docs.into_iter().map(|d| d.v).collect();
    // The search API returns newest first; fall back to that for
    // versions that are not semver-shaped.
    let latest_version = latest_by_semver(&versions).or_else(|| versions.first().cloned());

    // A truncated page is not the published set; an empty list skips the
    // version check.
    if num_found > versions.len() as u64 {
        tracing::debug!("search returned {} of {} versions", versions.len(), num_found);
        versions.clear();
    }

    Ok(RegistryRecord {
        exists: true,
        latest_version,
        versions,
        ..Default::default()
    })
}

/// Collect `<developers><developer><email>` values from a POM.
fn extract_developer_emails(xml: &str) -> BTreeSet<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut emails = BTreeSet::new();
    let mut in_developers = false;
    let mut in_developer = false;
    let mut in_email = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                match tag.as_str() {
                    "developers" => in_developers = true,
                    "developer" if in_developers => in_developer = true,
                    "email" if in_developer => in_email = true,
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) if in_email => {
                if let Ok(text) = e.unescape() {
                    let email = text.trim();
                    if email.contains('@') {
                        emails.insert(email.to_string());
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                match tag.as_str() {
                    "email" => in_email = false,
                    "developer" => in_developer = false,
                    "developers" => in_developers = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    emails
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{classify, Outcome};
    use crate::config::VersionPolicy;
    use crate::models::{Dependency, Provider};

    #[test]
    fn test_search_response_to_record() {
        let body = r#"{
            "responseHeader": {"status": 0},
            "response": {"numFound": 3, "start": 0, "docs": [
                {"id": "junit:junit:4.13.2", "g": "junit", "a": "junit", "v": "4.13.2"},
                {"id": "junit:junit:4.13.1", "g": "junit", "a": "junit", "v": "4.13.1"},
                {"id": "junit:junit:4.9", "g": "junit", "a": "junit", "v": "4.9"}
            ]}
        }"#;
        let record = into_record(serde_json::from_str(body).unwrap()).unwrap();
        assert_eq!(record.versions, vec!["4.13.2", "4.13.1", "4.9"]);
        assert_eq!(record.latest_version.as_deref(), Some("4.13.2"));
    }

    #[test]
    fn test_truncated_search_keeps_no_version_list() {
        let docs: Vec<String> = (300..500)
            .rev()
            .map(|patch| format!(r#"{{"v": "1.11.{}"}}"#, patch))
            .collect();
        let body = format!(
            r#"{{"response": {{"numFound": 500, "start": 0, "docs": [{}]}}}}"#,
            docs.join(",")
        );
        let record = into_record(serde_json::from_str(&body).unwrap()).unwrap();
        assert!(record.exists);
        assert!(record.versions.is_empty());
        assert_eq!(record.latest_version.as_deref(), Some("1.11.499"));

        let dep = Dependency::new("com.amazonaws:aws-java-sdk-s3", Some("1.11.0".into()), Provider::Maven, None);
        let outcome = classify(&dep, &Ok(record), VersionPolicy::Published);
        assert_eq!(outcome, Outcome::Clean);
    }

    #[test]
    fn test_empty_search_is_not_found() {
        let body = r#"{"response": {"numFound": 0, "start": 0, "docs": []}}"#;
        let result = into_record(serde_json::from_str(body).unwrap());
        assert_eq!(result, Err(LookupError::NotFound));
    }

    #[test]
    fn test_extract_developer_emails() {
        let pom = r#"<?xml version="1.0"?>
<project>
  <developers>
    <developer>
      <id>jdoe</id>
      <email>jdoe@acme-legacy.io</email>
    </developer>
    <developer>
      <name>No Email</name>
    </developer>
  </developers>
  <contributors>
    <contributor><email>helper@example.com</email></contributor>
  </contributors>
</project>"#;
        let emails: Vec<_> = extract_developer_emails(pom).into_iter().collect();
        assert_eq!(emails, vec!["jdoe@acme-legacy.io"]);
    }
}
