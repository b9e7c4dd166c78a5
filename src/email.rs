//! Maintainer email takeover checks.
//!
//! A maintainer whose email domain has lapsed can be impersonated: anyone
//! may register the domain and request a password reset for the account.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError as DnsError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::TokioAsyncResolver;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::ResolveError;
use crate::models::{Dependency, Finding};

const RDAP_URL: &str = "https://rdap.org/domain";
const RDAP_BOOTSTRAP_HOST: &str = "rdap.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainStatus {
    Registered,
    Unregistered,
}

#[async_trait]
pub trait DomainResolver: Send + Sync {
    async fn resolve(&self, domain: &str) -> Result<DomainStatus, ResolveError>;
}

/// What DNS says about a name across the record types we ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DnsAnswer {
    /// At least one NS, MX or A record.
    Records,
    /// The name exists but holds none of those records.
    NoData,
    /// NXDOMAIN for every query.
    NxDomain,
}

/// Resolves through DNS first. Only a domain that does not exist in DNS
/// is checked against RDAP, and only an RDAP "not found" from the TLD's
/// own server counts as unregistered.
pub struct DnsRdapResolver {
    dns: TokioAsyncResolver,
    http: Client,
}

impl DnsRdapResolver {
    pub fn new(http: Client, timeout: Duration) -> Self {
        let (config, mut opts) = read_system_conf().unwrap_or_else(|e| {
            tracing::warn!("no system DNS configuration ({}), using defaults", e);
            (ResolverConfig::default(), ResolverOpts::default())
        });
        opts.timeout = timeout;
        DnsRdapResolver {
            dns: TokioAsyncResolver::tokio(config, opts),
            http,
        }
    }

    async fn dns_answer(&self, domain: &str) -> Result<DnsAnswer, ResolveError> {
        let fqdn = format!("{}.", domain);
        let mut exists = false;

        for record_type in [RecordType::NS, RecordType::MX, RecordType::A] {
            match self.dns.lookup(fqdn.as_str(), record_type).await {
                Ok(lookup) if lookup.iter().next().is_some() => return Ok(DnsAnswer::Records),
                Ok(_) => exists = true,
                Err(e) => match nx_domain(&e) {
                    Some(true) => {}
                    Some(false) => exists = true,
                    None => return Err(dns_failure(domain, &e)),
                },
            }
        }

        Ok(if exists { DnsAnswer::NoData } else { DnsAnswer::NxDomain })
    }

    async fn rdap(&self, domain: &str) -> Result<DomainStatus, ResolveError> {
        let url = format!("{}/{}", RDAP_URL, domain);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/rdap+json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ResolveError::Timeout(domain.to_string())
                } else {
                    ResolveError::Inconclusive {
                        domain: domain.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let host = response.url().host_str().map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        tracing::debug!("RDAP {} -> {} from {:?}", domain, status, host);
        rdap_status(domain, status, host.as_deref(), &body)
    }
}

#[async_trait]
impl DomainResolver for DnsRdapResolver {
    async fn resolve(&self, domain: &str) -> Result<DomainStatus, ResolveError> {
        match self.dns_answer(domain).await? {
            DnsAnswer::Records | DnsAnswer::NoData => Ok(DomainStatus::Registered),
            DnsAnswer::NxDomain => self.rdap(domain).await,
        }
    }
}

/// `Some(true)` for NXDOMAIN, `Some(false)` for an empty answer on an
/// existing name, `None` for failures that say nothing about the name.
fn nx_domain(e: &DnsError) -> Option<bool> {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            Some(*response_code == ResponseCode::NXDomain)
        }
        _ => None,
    }
}

fn dns_failure(domain: &str, e: &DnsError) -> ResolveError {
    match e.kind() {
        ResolveErrorKind::Timeout => ResolveError::Timeout(domain.to_string()),
        _ => ResolveError::Inconclusive {
            domain: domain.to_string(),
            reason: format!("DNS lookup failed: {}", e),
        },
    }
}

/// RFC 9083 error response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RdapError {
    error_code: Option<u16>,
    rdap_conformance: Option<Vec<String>>,
}

/// Interpret an RDAP answer. The bootstrap service answers 404 itself for
/// TLDs it has no server for; that says nothing about the domain.
fn rdap_status(
    domain: &str,
    status: StatusCode,
    host: Option<&str>,
    body: &str,
) -> Result<DomainStatus, ResolveError> {
    let inconclusive = |reason: String| ResolveError::Inconclusive {
        domain: domain.to_string(),
        reason,
    };

    if status.is_success() {
        return Ok(DomainStatus::Registered);
    }
    if status != StatusCode::NOT_FOUND {
        return Err(inconclusive(format!("RDAP returned HTTP {}", status)));
    }

    let authoritative = host.is_some_and(|h| !h.eq_ignore_ascii_case(RDAP_BOOTSTRAP_HOST));
    if !authoritative {
        return Err(inconclusive("no RDAP server for this TLD".to_string()));
    }
    match serde_json::from_str::<RdapError>(body) {
        Ok(err) if err.error_code == Some(404) || err.rdap_conformance.is_some() => {
            Ok(DomainStatus::Unregistered)
        }
        _ => Err(inconclusive("RDAP 404 without an RDAP error body".to_string())),
    }
}

/// `"Jane <Jane@Example.COM>"` → `"example.com"`
pub fn domain_of(email: &str) -> Option<String> {
    let (_, domain) = email.rsplit_once('@')?;
    let domain = domain
        .trim()
        .trim_end_matches(|c: char| c == '>' || c == '.')
        .to_ascii_lowercase();
    if domain.is_empty() || !domain.contains('.') {
        return None;
    }
    Some(domain)
}

/// Checks maintainer emails, resolving each domain at most once per run.
pub struct EmailChecker {
    resolver: Box<dyn DomainResolver>,
    cache: HashMap<String, Option<DomainStatus>>,
}

impl EmailChecker {
    pub fn new(resolver: Box<dyn DomainResolver>) -> Self {
        EmailChecker {
            resolver,
            cache: HashMap::new(),
        }
    }

    pub async fn check(&mut self, dep: &Dependency, emails: &BTreeSet<String>) -> Vec<Finding> {
        let mut findings = Vec::new();

        for email in emails {
            let Some(domain) = domain_of(email) else {
                tracing::debug!("{}: ignoring malformed maintainer email {:?}", dep.name, email);
                continue;
            };

            let status = match self.cache.get(&domain).copied() {
                Some(status) => status,
                None => {
                    let status = match self.resolver.resolve(&domain).await {
                        Ok(status) => Some(status),
                        Err(e) => {
                            tracing::warn!("{}: {}", dep.name, e);
                            None
                        }
                    };
                    self.cache.insert(domain, status);
                    status
                }
            };

            if status == Some(DomainStatus::Unregistered) {
                findings.push(Finding::takeover(
                    dep,
                    format!("maintainer email domain unregistered ({})", email),
                ));
            }
        }

        findings
    }
}
