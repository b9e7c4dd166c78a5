//! The scan pipeline: locate manifests, parse them, look every dependency
//! up in its registry, classify it and hand findings to the reporter.

use std::collections::HashSet;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::analyzer::{classify, Outcome};
use crate::config::Config;
use crate::email::EmailChecker;
use crate::locator::locate;
use crate::manifest::parser_for;
use crate::models::{Dependency, Provider};
use crate::registry::{lookup_with_retry, Registries};
use crate::report::terminal::Reporter;

/// What to scan.
#[derive(Debug, Clone)]
pub enum Target {
    /// Every manifest under `root` belonging to one of `providers`.
    Path { root: PathBuf, providers: Vec<Provider> },
    /// A single dependency given on the command line.
    Dependency(Dependency),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub dependencies: usize,
    pub looked_up: usize,
    /// Lookups that still failed after retries.
    pub unknown: usize,
    pub interrupted: bool,
}

impl ScanSummary {
    /// At least one lookup was attempted and none of them got an answer.
    pub fn total_network_failure(&self) -> bool {
        self.looked_up > 0 && self.unknown == self.looked_up
    }
}

pub struct Scanner<'a> {
    registries: &'a Registries,
    config: &'a Config,
    email: Option<EmailChecker>,
    progress: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(registries: &'a Registries, config: &'a Config) -> Self {
        Scanner {
            registries,
            config,
            email: None,
            progress: false,
        }
    }

    pub fn with_email_checker(mut self, checker: EmailChecker) -> Self {
        self.email = Some(checker);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Dependencies to analyze for `target`, each `(provider, name)` once.
    ///
    /// Manifests that fail to parse are logged and skipped. Packages that
    /// are local to the tree and names matching `[ignore]` are dropped.
    pub fn dependencies(&self, target: &Target) -> Result<Vec<Dependency>> {
        let (root, providers) = match target {
            Target::Dependency(dep) => return Ok(vec![dep.clone()]),
            Target::Path { root, providers } => (root, providers),
        };

        let mut declared = Vec::new();
        let mut local: HashSet<(Provider, String)> = HashSet::new();

        for (provider, path) in locate(root, providers, &self.config.scan.skip_dirs)? {
            let parser = parser_for(provider);
            match parser.parse(&path) {
                Ok(manifest) => {
                    tracing::debug!(
                        "{} {}: {} dependencies",
                        parser.provider(),
                        path.display(),
                        manifest.dependencies.len()
                    );
                    declared.extend(manifest.dependencies);
                    local.extend(
                        manifest
                            .local_packages
                            .into_iter()
                            .map(|name| (namespace(provider), name)),
                    );
                }
                Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
            }
        }

        let mut seen: HashSet<(Provider, String)> = HashSet::new();
        let dependencies: Vec<Dependency> = declared
            .into_iter()
            .filter(|dep| seen.insert((dep.provider, dep.name.clone())))
            .filter(|dep| {
                if local.contains(&(namespace(dep.provider), dep.name.clone())) {
                    tracing::debug!("{} is local to the tree", dep.name);
                    return false;
                }
                !self.config.ignore.should_ignore(&dep.name)
            })
            .collect();

        for provider in providers {
            let count = dependencies.iter().filter(|d| d.provider == *provider).count();
            if count > 0 {
                tracing::info!("{}: {} dependencies", provider, count);
            }
        }
        for provider in providers_without_packages(providers, &dependencies) {
            if providers.len() == 1 {
                tracing::warn!("no {} packages found under {}", provider, root.display());
            } else {
                tracing::info!("no {} packages found", provider);
            }
        }

        Ok(dependencies)
    }

    /// Run the scan, stopping early (with the findings so far) when
    /// `shutdown` completes.
    pub async fn run<W: Write>(
        &mut self,
        target: &Target,
        reporter: &mut Reporter<W>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<ScanSummary> {
        let dependencies = self.dependencies(target)?;
        let mut summary = ScanSummary {
            dependencies: dependencies.len(),
            ..Default::default()
        };

        let pb = self.progress_bar(dependencies.len() as u64)?;
        let completed = tokio::select! {
            result = self.analyze(&dependencies, reporter, &pb, &mut summary) => {
                result?;
                true
            }
            _ = shutdown => false,
        };
        pb.finish_and_clear();

        if !completed {
            tracing::warn!("interrupted, reporting partial results");
            summary.interrupted = true;
        }
        Ok(summary)
    }

    async fn analyze<W: Write>(
        &mut self,
        dependencies: &[Dependency],
        reporter: &mut Reporter<W>,
        pb: &ProgressBar,
        summary: &mut ScanSummary,
    ) -> Result<()> {
        let network = &self.config.network;
        let policy = self.config.analysis.version_policy;

        for dep in dependencies {
            pb.set_message(dep.display_spec());

            let Some(client) = self.registries.get(dep.provider) else {
                tracing::warn!("no registry client for {}", dep.provider);
                pb.inc(1);
                continue;
            };

            let lookup = lookup_with_retry(client, &dep.name, network.retries, network.backoff()).await;
            summary.looked_up += 1;

            match classify(dep, &lookup, policy) {
                Outcome::Confusable(finding) => pb.suspend(|| reporter.record(finding))?,
                Outcome::Unknown(reason) => {
                    summary.unknown += 1;
                    tracing::warn!("{} {}: status unknown: {}", dep.provider, dep.display_spec(), reason);
                }
                Outcome::Clean => {
                    if let (Some(checker), Ok(record)) = (self.email.as_mut(), &lookup) {
                        for finding in checker.check(dep, &record.maintainer_emails).await {
                            pb.suspend(|| reporter.record(finding))?;
                        }
                    }
                }
            }

            pb.inc(1);
        }

        Ok(())
    }

    fn progress_bar(&self, len: u64) -> Result<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Ok(pb)
    }
}

fn providers_without_packages(providers: &[Provider], dependencies: &[Dependency]) -> Vec<Provider> {
    providers
        .iter()
        .copied()
        .filter(|p| !dependencies.iter().any(|d| d.provider == *p))
        .collect()
}

/// Maven and Gradle share one coordinate namespace.
fn namespace(provider: Provider) -> Provider {
    match provider {
        Provider::Gradle => Provider::Maven,
        p => p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VersionPolicy;
    use crate::email::{DomainResolver, DomainStatus};
    use crate::error::{LookupError, ResolveError};
    use crate::models::{Finding, FindingKind, RegistryRecord};
    use crate::registry::RegistryClient;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Registry that knows a fixed set of packages; everything else is 404.
    #[derive(Default)]
    struct StubRegistry {
        packages: HashMap<String, RegistryRecord>,
        offline: bool,
    }

    impl StubRegistry {
        fn with(mut self, name: &str, versions: &[&str], emails: &[&str]) -> Self {
            self.packages.insert(
                name.to_string(),
                RegistryRecord {
                    exists: true,
                    latest_version: versions.last().map(|v| v.to_string()),
                    versions: versions.iter().map(|v| v.to_string()).collect(),
                    maintainer_emails: emails.iter().map(|e| e.to_string()).collect(),
                },
            );
            self
        }
    }

    #[async_trait]
    impl RegistryClient for StubRegistry {
        async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError> {
            if self.offline {
                return Err(LookupError::Transient("connection refused".into()));
            }
            self.packages.get(name).cloned().ok_or(LookupError::NotFound)
        }
    }

    struct StubResolver;

    #[async_trait]
    impl DomainResolver for StubResolver {
        async fn resolve(&self, domain: &str) -> Result<DomainStatus, ResolveError> {
            if domain == "expired-domain.test" {
                Ok(DomainStatus::Unregistered)
            } else {
                Ok(DomainStatus::Registered)
            }
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.network.retries = 1;
        config.network.retry_backoff_ms = 0;
        config
    }

    fn path_target(root: &Path) -> Target {
        Target::Path {
            root: root.to_path_buf(),
            providers: Provider::ALL.to_vec(),
        }
    }

    async fn scan(
        registries: &Registries,
        config: &Config,
        target: &Target,
        checker: Option<EmailChecker>,
        stream: bool,
    ) -> (Vec<Finding>, ScanSummary, String) {
        let mut out = Vec::new();
        let (findings, summary) = {
            let mut reporter = Reporter::new(&mut out, stream, true);
            let mut scanner = Scanner::new(registries, config);
            if let Some(checker) = checker {
                scanner = scanner.with_email_checker(checker);
            }
            let summary = scanner
                .run(target, &mut reporter, std::future::pending())
                .await
                .unwrap();
            reporter.finish().unwrap();
            (reporter.findings().to_vec(), summary)
        };
        (findings, summary, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_absent_package_is_one_confusable_finding() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"internal-lib": "1.0.0", "express": "4.18.2"}}"#,
        )
        .unwrap();
        let registries = Registries::empty()
            .with(Provider::Npm, StubRegistry::default().with("express", &["4.18.2"], &[]));

        let (findings, summary, _) = scan(&registries, &config(), &path_target(dir.path()), None, false).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].dependency.name, "internal-lib");
        assert_eq!(findings[0].kind, FindingKind::Confusable);
        assert_eq!(summary.looked_up, 2);
    }

    #[tokio::test]
    async fn test_matching_version_has_no_finding() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("requirements.txt"), "requests==2.31.0\n").unwrap();
        let registries = Registries::empty().with(
            Provider::Pypi,
            StubRegistry::default().with("requests", &["2.30.0", "2.31.0"], &[]),
        );

        let (findings, _, _) = scan(&registries, &config(), &path_target(dir.path()), None, false).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_internal_requirement_is_confusable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("requirements.txt"), "some-internal-pkg==1.0.0\n").unwrap();
        let registries = Registries::empty().with(Provider::Pypi, StubRegistry::default());

        let (findings, _, _) = scan(&registries, &config(), &path_target(dir.path()), None, false).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].dependency.name, "some-internal-pkg");
        assert_eq!(findings[0].dependency.version.as_deref(), Some("1.0.0"));
        assert_eq!(findings[0].kind, FindingKind::Confusable);
    }

    #[tokio::test]
    async fn test_scans_are_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("svc")).unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"@acme/ui": "2.0.0", "lodash": "4.17.21"}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("svc/requirements.txt"), "acme-core==0.3\nflask\n").unwrap();
        let registries = Registries::empty()
            .with(Provider::Npm, StubRegistry::default().with("lodash", &["4.17.21"], &[]))
            .with(Provider::Pypi, StubRegistry::default().with("flask", &["3.0.0"], &[]));

        let target = path_target(dir.path());
        let (first, _, _) = scan(&registries, &config(), &target, None, false).await;
        let (second, _, _) = scan(&registries, &config(), &target, None, false).await;
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_manifest_is_isolated() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("broken")).unwrap();
        fs::write(dir.path().join("broken/package.json"), "{ not json").unwrap();
        fs::write(dir.path().join("package.json"), r#"{"dependencies": {"ghost-pkg": "1.0.0"}}"#).unwrap();
        let registries = Registries::empty().with(Provider::Npm, StubRegistry::default());

        let (findings, _, _) = scan(&registries, &config(), &path_target(dir.path()), None, false).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].dependency.name, "ghost-pkg");
    }

    #[tokio::test]
    async fn test_single_dependency_unpublished_version() {
        let registries = Registries::empty().with(
            Provider::Pypi,
            StubRegistry::default().with("requests", &["2.30.0", "2.31.0"], &[]),
        );
        let dep = Dependency::from_spec("requests:0.1.0", Provider::Pypi).unwrap();

        let (findings, _, _) = scan(&registries, &config(), &Target::Dependency(dep), None, false).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::Confusable);
        assert!(findings[0].detail.contains("0.1.0"));
    }

    #[tokio::test]
    async fn test_expired_maintainer_domain_is_takeover_candidate() {
        let registries = Registries::empty().with(
            Provider::Npm,
            StubRegistry::default().with("left-pad", &["1.3.0"], &["owner@expired-domain.test"]),
        );
        let dep = Dependency::from_spec("left-pad", Provider::Npm).unwrap();
        let checker = EmailChecker::new(Box::new(StubResolver));

        let (findings, _, _) =
            scan(&registries, &config(), &Target::Dependency(dep), Some(checker), false).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::TakeoverCandidate);
        assert!(findings[0].detail.contains("owner@expired-domain.test"));
    }

    #[tokio::test]
    async fn test_emails_ignored_without_checker() {
        let registries = Registries::empty().with(
            Provider::Npm,
            StubRegistry::default().with("left-pad", &["1.3.0"], &["owner@expired-domain.test"]),
        );
        let dep = Dependency::from_spec("left-pad", Provider::Npm).unwrap();

        let (findings, _, _) = scan(&registries, &config(), &Target::Dependency(dep), None, false).await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_print_takeover_streams_before_summary() {
        let registries = Registries::empty().with(Provider::Npm, StubRegistry::default());
        let dep = Dependency::from_spec("internal-lib:1.0.0", Provider::Npm).unwrap();

        let (_, _, output) = scan(&registries, &config(), &Target::Dependency(dep), None, true).await;
        let streamed = output.find("internal-lib:1.0.0").unwrap();
        let summary = output.find("Scan complete: 1 finding(s)").unwrap();
        assert!(streamed < summary);
    }

    #[tokio::test]
    async fn test_total_network_failure() {
        let registries = Registries::empty().with(
            Provider::Npm,
            StubRegistry {
                offline: true,
                ..Default::default()
            },
        );
        let dep = Dependency::from_spec("anything", Provider::Npm).unwrap();

        let (findings, summary, _) = scan(&registries, &config(), &Target::Dependency(dep), None, false).await;
        assert!(findings.is_empty());
        assert_eq!(summary.unknown, 1);
        assert!(summary.total_network_failure());
    }

    #[test]
    fn test_local_and_ignored_packages_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            r#"
[package]
name = "acme-app"

[dependencies]
acme-internal = "=0.1.0"
acme-secret = "1"
"#,
        )
        .unwrap();
        fs::write(dir.path().join("requirements.txt"), "acme-app==1.0\n").unwrap();
        let mut config = config();
        config.ignore.packages = vec!["acme-sec*".to_string()];
        let registries = Registries::empty()
            .with(Provider::Cargo, StubRegistry::default())
            .with(Provider::Pypi, StubRegistry::default());

        let scanner = Scanner::new(&registries, &config);
        let deps = scanner.dependencies(&path_target(dir.path())).unwrap();
        let names: Vec<_> = deps.iter().map(|d| (d.provider, d.name.as_str())).collect();
        // the Cargo package name does not make the PyPI name local
        assert_eq!(
            names,
            vec![(Provider::Cargo, "acme-internal"), (Provider::Pypi, "acme-app")]
        );
    }

    #[tokio::test]
    async fn test_version_policy_off_skips_version_check() {
        let registries = Registries::empty().with(
            Provider::Pypi,
            StubRegistry::default().with("requests", &["2.31.0"], &[]),
        );
        let mut config = config();
        config.analysis.version_policy = VersionPolicy::Off;
        let dep = Dependency::from_spec("requests:0.1.0", Provider::Pypi).unwrap();

        let (findings, _, _) = scan(&registries, &config, &Target::Dependency(dep), None, false).await;
        assert!(findings.is_empty());
    }

    #[test]
    fn test_reports_providers_without_packages() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("go.mod"), "module example.com/app\n\ngo 1.21\n").unwrap();
        fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
        let config = config();
        let registries = Registries::empty();
        let scanner = Scanner::new(&registries, &config);

        let target = Target::Path {
            root: dir.path().to_path_buf(),
            providers: vec![Provider::Go, Provider::Pypi],
        };
        let deps = scanner.dependencies(&target).unwrap();
        assert_eq!(
            providers_without_packages(&[Provider::Go, Provider::Pypi], &deps),
            vec![Provider::Go]
        );
    }

    /// Answers 404 for `aaa-internal`; on any other name it fires `shutdown`
    /// and never answers.
    struct StallingRegistry {
        shutdown: std::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    }

    #[async_trait]
    impl RegistryClient for StallingRegistry {
        async fn lookup(&self, name: &str) -> Result<RegistryRecord, LookupError> {
            if name == "aaa-internal" {
                return Err(LookupError::NotFound);
            }
            let tx = self.shutdown.lock().unwrap().take();
            if let Some(tx) = tx {
                let _ = tx.send(());
            }
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_shutdown_keeps_partial_results() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"aaa-internal": "1.0.0", "zzz-stalls": "1.0.0"}}"#,
        )
        .unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let registries = Registries::empty().with(
            Provider::Npm,
            StallingRegistry {
                shutdown: std::sync::Mutex::new(Some(tx)),
            },
        );
        let config = config();

        let mut out = Vec::new();
        let mut reporter = Reporter::new(&mut out, false, true);
        let shutdown = async {
            let _ = rx.await;
        };
        let summary = Scanner::new(&registries, &config)
            .run(&path_target(dir.path()), &mut reporter, shutdown)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.dependencies, 2);
        let findings = reporter.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].dependency.name, "aaa-internal");
        assert_eq!(findings[0].kind, FindingKind::Confusable);
    }
}
