//! Async clients for the public package registries.
//!
//! Each client answers one question for a package name: does it exist
//! upstream, which versions are published, and who maintains it. A 404 (or
//! 410) is reported as [`LookupError::NotFound`]; anything that prevents an
//! answer (network errors, timeouts, 429, 5xx, undecodable bodies) is
//! [`LookupError::Transient`] and is retried by [`lookup_with_retry`].

pub mod crates_io;
pub mod go_proxy;
pub mod maven;
pub mod npm;
pub mod pypi;
pub mod rubygems;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::analyzer::parse_version;
use crate::error::LookupError;
use crate::models::{Provider, RegistryRecord};

#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError>;
}

/// Look `name` up, retrying transient failures `retries` times. Attempt
/// `n` waits `n * backoff` first.
pub async fn lookup_with_retry(
    client: &dyn RegistryClient,
    name: &str,
    retries: u32,
    backoff: Duration,
) -> Result<RegistryRecord, LookupError> {
    let mut attempt = 0;

    loop {
        match client.lookup(name).await {
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                tracing::debug!("{}: {} (retry {}/{})", name, e, attempt, retries);
                tokio::time::sleep(backoff * attempt).await;
            }
            result => return result,
        }
    }
}

/// Registry client per provider.
pub struct Registries {
    clients: BTreeMap<Provider, Arc<dyn RegistryClient>>,
}

impl Registries {
    pub fn empty() -> Self {
        Registries {
            clients: BTreeMap::new(),
        }
    }

    /// Clients for every public registry. `with_maintainers` enables the
    /// extra requests some registries need to list maintainer emails.
    pub fn public(http: Client, with_maintainers: bool) -> Self {
        let maven: Arc<dyn RegistryClient> =
            Arc::new(maven::MavenClient::new(http.clone(), with_maintainers));

        Registries::empty()
            .with(Provider::Npm, npm::NpmClient::new(http.clone()))
            .with(Provider::Pypi, pypi::PypiClient::new(http.clone()))
            .with(Provider::Cargo, crates_io::CratesIoClient::new(http.clone()))
            .with(Provider::Go, go_proxy::GoProxyClient::new(http.clone()))
            .with_shared(Provider::Maven, maven.clone())
            .with_shared(Provider::Gradle, maven)
            .with(
                Provider::Rubygems,
                rubygems::RubygemsClient::new(http, with_maintainers),
            )
    }

    pub fn with(self, provider: Provider, client: impl RegistryClient + 'static) -> Self {
        self.with_shared(provider, Arc::new(client))
    }

    pub fn with_shared(mut self, provider: Provider, client: Arc<dyn RegistryClient>) -> Self {
        self.clients.insert(provider, client);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&dyn RegistryClient> {
        self.clients.get(&provider).map(|c| c.as_ref())
    }
}

/// Send a request and decode a JSON body, mapping HTTP status to
/// [`LookupError`].
pub(crate) async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, LookupError> {
    let response = send(request).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| LookupError::Transient(format!("invalid response body: {}", e)))
}

pub(crate) async fn fetch_text(request: RequestBuilder) -> Result<String, LookupError> {
    let response = send(request).await?;
    Ok(response.text().await?)
}

async fn send(request: RequestBuilder) -> Result<reqwest::Response, LookupError> {
    let response = request.send().await?;
    let status = response.status();
    tracing::debug!("GET {} -> {}", response.url(), status);

    match status {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(LookupError::NotFound),
        s => Err(LookupError::Transient(format!("HTTP {}", s))),
    }
}

/// Greatest version by semver; versions that do not parse are ignored.
pub(crate) fn latest_by_semver<'a>(versions: impl IntoIterator<Item = &'a String>) -> Option<String> {
    versions
        .into_iter()
        .filter_map(|v| parse_version(v).map(|parsed| (parsed, v)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, v)| v.clone())
}
