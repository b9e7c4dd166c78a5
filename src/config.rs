use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Root configuration structure, deserialized from `.depsquat/config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filesystem walk settings.
    pub scan: ScanConfig,
    /// HTTP and DNS behaviour.
    pub network: NetworkConfig,
    /// Confusion heuristics.
    pub analysis: AnalysisConfig,
    /// Names to leave out of the analysis entirely.
    pub ignore: IgnoreConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory names that are never descended into.
    pub skip_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            skip_dirs: vec![".git".to_string(), "node_modules".to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout, also applied to DNS resolution.
    pub timeout_secs: u64,
    /// Extra attempts after a transient registry failure.
    pub retries: u32,
    /// Base delay between attempts; attempt `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    pub user_agent: String,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            timeout_secs: 10,
            retries: 2,
            retry_backoff_ms: 500,
            user_agent: concat!("depsquat/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub version_policy: VersionPolicy,
}

/// How a declared version is compared against what the registry publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    /// Flag a pinned version that is missing from the published set.
    #[default]
    Published,
    /// Flag a pinned version that is newer than the latest release.
    Latest,
    /// Only check that the name exists.
    Off,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names to skip. `*` matches any run of characters,
    /// e.g. `"@mycorp/*"`.
    pub packages: Vec<String>,
}

impl IgnoreConfig {
    pub fn should_ignore(&self, name: &str) -> bool {
        self.packages.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, name)
            } else {
                pattern == name
            }
        })
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `<project_path>/.depsquat/config.toml`
/// 3. `~/.config/depsquat/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: Option<&Path>, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    if let Some(project_path) = project_path {
        let project_config = project_path.join(".depsquat").join("config.toml");
        if project_config.exists() {
            return read_config(&project_config);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("depsquat").join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

/// Wildcard match where `*` stands for any (possibly empty) run of characters.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || !text.ends_with(last) || text.len() < first.len() + last.len() {
        return false;
    }

    let mut remaining = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match remaining.find(part) {
            Some(pos) => remaining = &remaining[pos + part.len()..],
            None => return false,
        }
    }
    true
}
