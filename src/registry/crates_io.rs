use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{fetch_json, RegistryClient};
use crate::error::LookupError;
use crate::models::RegistryRecord;

#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
    #[serde(default)]
    versions: Vec<CrateVersion>,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    max_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrateVersion {
    num: String,
}

/// crates.io does not publish owner emails, so records carry none.
pub struct CratesIoClient {
    http: Client,
}

impl CratesIoClient {
    pub fn new(http: Client) -> Self {
        CratesIoClient { http }
    }
}

#[async_trait]
impl RegistryClient for CratesIoClient {
    async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError> {
        let url = format!("https://crates.io/api/v1/crates/{}", name);
        let response: CrateResponse = fetch_json(self.http.get(&url)).await?;
        Ok(into_record(response))
    }
}

fn into_record(response: CrateResponse) -> RegistryRecord {
    RegistryRecord {
        exists: true,
        latest_version: response.krate.max_version,
        versions: response.versions.into_iter().map(|v| v.num).collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_response_to_record() {
        let body = r#"{
            "crate": {"name": "serde", "max_version": "1.0.193"},
            "versions": [{"num": "1.0.193", "yanked": false}, {"num": "1.0.0", "yanked": false}]
        }"#;
        let record = into_record(serde_json::from_str(body).unwrap());
        assert_eq!(record.latest_version.as_deref(), Some("1.0.193"));
        assert_eq!(record.versions, vec!["1.0.193", "1.0.0"]);
        assert!(record.maintainer_emails.is_empty());
    }
}
