use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A package ecosystem with its own manifest format and public registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Npm,
    Pypi,
    Cargo,
    Go,
    Maven,
    Gradle,
    Rubygems,
}

impl Provider {
    /// Every provider, in the order `--provider all` scans them.
    pub const ALL: [Provider; 7] = [
        Provider::Npm,
        Provider::Pypi,
        Provider::Cargo,
        Provider::Go,
        Provider::Maven,
        Provider::Gradle,
        Provider::Rubygems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Npm => "npm",
            Provider::Pypi => "pypi",
            Provider::Cargo => "cargo",
            Provider::Go => "go",
            Provider::Maven => "maven",
            Provider::Gradle => "gradle",
            Provider::Rubygems => "rubygems",
        }
    }

    /// Maven and Gradle name packages `group:artifact`, so a `:` in a
    /// dependency spec belongs to the name rather than separating a version.
    pub fn uses_coordinates(&self) -> bool {
        matches!(self, Provider::Maven | Provider::Gradle)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dependency declared by a manifest, or supplied on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
    pub provider: Provider,
    /// `None` when the dependency came from `--dependency`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
}

impl Dependency {
    pub fn new(
        name: impl Into<String>,
        version: Option<String>,
        provider: Provider,
        source_file: Option<PathBuf>,
    ) -> Self {
        let version = version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self {
            name: name.into(),
            version,
            provider,
            source_file,
        }
    }

    /// Parse a `--dependency` argument: `name[:version]`, or
    /// `group:artifact[:version]` for Maven and Gradle.
    pub fn from_spec(spec: &str, provider: Provider) -> Option<Self> {
        let spec = spec.trim();
        let (name, version) = if provider.uses_coordinates() {
            let mut parts = spec.splitn(3, ':');
            let group = parts.next().filter(|g| !g.is_empty())?;
            let artifact = parts.next().filter(|a| !a.is_empty())?;
            (format!("{}:{}", group, artifact), parts.next())
        } else {
            match spec.split_once(':') {
                Some((name, version)) => (name.to_string(), Some(version)),
                None => (spec.to_string(), None),
            }
        };

        let name = name.trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(Dependency::new(name, version.map(str::to_string), provider, None))
    }

    /// `name:version`, or just `name` when no version was declared.
    pub fn display_spec(&self) -> String {
        match &self.version {
            Some(v) => format!("{}:{}", self.name, v),
            None => self.name.clone(),
        }
    }
}

/// What the public registry knows about a package name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryRecord {
    pub exists: bool,
    pub latest_version: Option<String>,
    /// Published versions; empty when the registry does not list them.
    pub versions: Vec<String>,
    pub maintainer_emails: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    /// The name (or declared version) is unclaimed upstream.
    Confusable,
    /// A maintainer's email domain can be registered by anyone.
    TakeoverCandidate,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingKind::Confusable => write!(f, "confusable"),
            FindingKind::TakeoverCandidate => write!(f, "takeover-candidate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub dependency: Dependency,
    pub kind: FindingKind,
    pub detail: String,
}

impl Finding {
    pub fn confusable(dependency: &Dependency, detail: impl Into<String>) -> Self {
        Self {
            dependency: dependency.clone(),
            kind: FindingKind::Confusable,
            detail: detail.into(),
        }
    }

    pub fn takeover(dependency: &Dependency, detail: impl Into<String>) -> Self {
        Self {
            dependency: dependency.clone(),
            kind: FindingKind::TakeoverCandidate,
            detail: detail.into(),
        }
    }

    /// Ordering key used for stable report files.
    pub fn sort_key(&self) -> (Provider, &str, FindingKind, &str) {
        (
            self.dependency.provider,
            self.dependency.name.as_str(),
            self.kind,
            self.detail.as_str(),
        )
    }
}

/// Dependencies extracted from one manifest file.
#[derive(Debug, Default)]
pub struct ParsedManifest {
    pub dependencies: Vec<Dependency>,
    /// Names that resolve inside the scanned tree (workspace members,
    /// patched crates, local replacements) and can never be hijacked.
    pub local_packages: Vec<String>,
}
