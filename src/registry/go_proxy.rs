use async_trait::async_trait;
use reqwest::Client;

use super::{fetch_text, latest_by_semver, RegistryClient};
use crate::error::LookupError;
use crate::models::RegistryRecord;

const PROXY_URL: &str = "https://proxy.golang.org";

/// Looks modules up on the Go module proxy. The proxy exposes no
/// maintainer information.
pub struct GoProxyClient {
    http: Client,
}

impl GoProxyClient {
    pub fn new(http: Client) -> Self {
        GoProxyClient { http }
    }
}

#[async_trait]
impl RegistryClient for GoProxyClient {
    async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError> {
        let url = format!("{}/{}/@v/list", PROXY_URL, escape_module_path(name));
        let body = fetch_text(self.http.get(&url)).await?;
        Ok(parse_version_list(&body))
    }
}

/// Module paths are case-escaped: every capital letter becomes `!` plus its
/// lowercase form (`github.com/Azure/x` → `github.com/!azure/x`).
fn escape_module_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn parse_version_list(body: &str) -> RegistryRecord {
    let versions: Vec<String> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    RegistryRecord {
        exists: true,
        latest_version: latest_by_semver(&versions),
        versions,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_module_path() {
        assert_eq!(
            escape_module_path("github.com/BurntSushi/toml"),
            "github.com/!burnt!sushi/toml"
        );
        assert_eq!(escape_module_path("golang.org/x/sys"), "golang.org/x/sys");
    }

    #[test]
    fn test_parse_version_list() {
        let record = parse_version_list("v1.8.1\nv1.9.3\nv1.10.0\n\n");
        assert_eq!(record.versions, vec!["v1.8.1", "v1.9.3", "v1.10.0"]);
        assert_eq!(record.latest_version.as_deref(), Some("v1.10.0"));
    }

    #[test]
    fn test_empty_list_still_exists() {
        let record = parse_version_list("");
        assert!(record.exists);
        assert!(record.versions.is_empty());
        assert_eq!(record.latest_version, None);
    }
}
