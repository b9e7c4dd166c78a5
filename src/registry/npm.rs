use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{fetch_json, RegistryClient};
use crate::error::LookupError;
use crate::models::RegistryRecord;

const REGISTRY_URL: &str = "https://registry.npmjs.org";

/// The subset of an npm packument we care about.
#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default)]
    versions: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "dist-tags", default)]
    dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    maintainers: Vec<Maintainer>,
}

#[derive(Debug, Deserialize)]
struct Maintainer {
    email: Option<String>,
}

pub struct NpmClient {
    http: Client,
}

impl NpmClient {
    pub fn new(http: Client) -> Self {
        NpmClient { http }
    }
}

#[async_trait]
impl RegistryClient for NpmClient {
    async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError> {
        // Scoped packages need URL encoding: @scope/pkg → %40scope%2Fpkg
        let encoded_name = name.replace('@', "%40").replace('/', "%2F");
        let url = format!("{}/{}", REGISTRY_URL, encoded_name);

        let packument: Packument = fetch_json(
            self.http
                .get(&url)
                .header("Accept", "application/json"),
        )
        .await?;
        Ok(into_record(packument))
    }
}

fn into_record(packument: Packument) -> RegistryRecord {
    RegistryRecord {
        exists: true,
        latest_version: packument.dist_tags.get("latest").cloned(),
        versions: packument.versions.into_keys().collect(),
        maintainer_emails: packument
            .maintainers
            .into_iter()
            .filter_map(|m| m.email)
            .map(|e| e.trim().to_string())
            .filter(|e| e.contains('@'))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packument_to_record() {
        let body = r#"{
            "name": "left-pad",
            "dist-tags": {"latest": "1.3.0", "next": "2.0.0-rc.1"},
            "versions": {"1.0.0": {}, "1.3.0": {}},
            "maintainers": [
                {"name": "alice", "email": "alice@example.com"},
                {"name": "ghost"}
            ]
        }"#;
        let record = into_record(serde_json::from_str(body).unwrap());
        assert!(record.exists);
        assert_eq!(record.latest_version.as_deref(), Some("1.3.0"));
        assert_eq!(record.versions, vec!["1.0.0", "1.3.0"]);
        assert_eq!(
            record.maintainer_emails.into_iter().collect::<Vec<_>>(),
            vec!["alice@example.com"]
        );
    }

    #[test]
    fn test_unpublished_packument_has_no_versions() {
        let body = r#"{"name": "gone", "time": {"unpublished": {}}}"#;
        let record = into_record(serde_json::from_str(body).unwrap());
        assert!(record.exists);
        assert!(record.versions.is_empty());
        assert_eq!(record.latest_version, None);
    }
}
