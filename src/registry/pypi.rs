use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{fetch_json, RegistryClient};
use crate::error::LookupError;
use crate::models::RegistryRecord;

#[derive(Debug, Deserialize)]
struct ProjectJson {
    info: ProjectInfo,
    #[serde(default)]
    releases: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    version: Option<String>,
    author_email: Option<String>,
    maintainer_email: Option<String>,
}

pub struct PypiClient {
    http: Client,
}

impl PypiClient {
    pub fn new(http: Client) -> Self {
        PypiClient { http }
    }
}

#[async_trait]
impl RegistryClient for PypiClient {
    async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError> {
        let url = format!("https://pypi.org/pypi/{}/json", name);
        let project: ProjectJson = fetch_json(self.http.get(&url)).await?;
        Ok(into_record(project))
    }
}

fn into_record(project: ProjectJson) -> RegistryRecord {
    let mut maintainer_emails = BTreeSet::new();
    for field in [&project.info.author_email, &project.info.maintainer_email]
        .into_iter()
        .flatten()
    {
        maintainer_emails.extend(extract_emails(field));
    }

    RegistryRecord {
        exists: true,
        latest_version: project.info.version.filter(|v| !v.is_empty()),
        versions: project.releases.into_keys().collect(),
        maintainer_emails,
    }
}

/// PyPI email fields are free text such as
/// `"Jane Doe <jane@example.com>, ops@example.org"`.
fn extract_emails(field: &str) -> impl Iterator<Item = String> + '_ {
    field
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(|token| token.trim_matches(|c: char| matches!(c, '<' | '>' | '"' | '\'' | '(' | ')')))
        .filter(|token| {
            token
                .split_once('@')
                .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'))
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_json_to_record() {
        let body = r#"{
            "info": {
                "name": "requests",
                "version": "2.31.0",
                "author_email": "Kenneth Reitz <me@kennethreitz.org>",
                "maintainer_email": ""
            },
            "releases": {"0.2.0": [], "2.31.0": []}
        }"#;
        let record = into_record(serde_json::from_str(body).unwrap());
        assert_eq!(record.latest_version.as_deref(), Some("2.31.0"));
        assert_eq!(record.versions, vec!["0.2.0", "2.31.0"]);
        assert_eq!(
            record.maintainer_emails.into_iter().collect::<Vec<_>>(),
            vec!["me@kennethreitz.org"]
        );
    }

    #[test]
    fn test_extract_emails_from_free_text() {
        let emails: Vec<_> =
            extract_emails("Jane Doe <jane@example.com>, ops@example.org; not-an-email @ nowhere")
                .collect();
        assert_eq!(emails, vec!["jane@example.com", "ops@example.org"]);
    }
}
