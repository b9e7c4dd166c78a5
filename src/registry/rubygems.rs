use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{fetch_json, RegistryClient};
use crate::error::LookupError;
use crate::models::RegistryRecord;

const API_URL: &str = "https://rubygems.org/api/v1";

#[derive(Debug, Deserialize)]
struct GemVersion {
    number: String,
    #[serde(default)]
    prerelease: bool,
}

#[derive(Debug, Deserialize)]
struct GemOwner {
    email: Option<String>,
}

pub struct RubygemsClient {
    http: Client,
    with_maintainers: bool,
}

impl RubygemsClient {
    pub fn new(http: Client, with_maintainers: bool) -> Self {
        RubygemsClient {
            http,
            with_maintainers,
        }
    }

    async fn owner_emails(&self, name: &str) -> BTreeSet<String> {
        let url = format!("{}/gems/{}/owners.json", API_URL, name);
        match fetch_json::<Vec<GemOwner>>(self.http.get(&url)).await {
            Ok(owners) => owners
                .into_iter()
                .filter_map(|o| o.email)
                .filter(|e| e.contains('@'))
                .collect(),
            Err(e) => {
                tracing::debug!("no owners for gem {}: {}", name, e);
                BTreeSet::new()
            }
        }
    }
}

#[async_trait]
impl RegistryClient for RubygemsClient {
    async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError> {
        let url = format!("{}/versions/{}.json", API_URL, name);
        let versions: Vec<GemVersion> = fetch_json(self.http.get(&url)).await?;

        let mut record = into_record(versions);
        if self.with_maintainers {
            record.maintainer_emails = self.owner_emails(name).await;
        }
        Ok(record)
    }
}

/// Versions arrive newest first; the latest is the newest non-prerelease.
fn into_record(versions: Vec<GemVersion>) -> RegistryRecord {
    let latest_version = versions
        .iter()
        .find(|v| !v.prerelease)
        .or(versions.first())
        .map(|v| v.number.clone());

    RegistryRecord {
        exists: true,
        latest_version,
        versions: versions.into_iter().map(|v| v.number).collect(),
        ..Default::default()
    }
}
