//! Compare a declared dependency with what its public registry reports.

use semver::Version;

use crate::config::VersionPolicy;
use crate::error::LookupError;
use crate::manifest::strip_operator;
use crate::models::{Dependency, Finding, Provider, RegistryRecord};

/// Result of analyzing one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The name (or declared version) can be claimed upstream.
    Confusable(Finding),
    /// The package exists and matches; its maintainers may still be checked.
    Clean,
    /// The registry could not be reached; says nothing about the name.
    Unknown(String),
}

pub fn classify(
    dep: &Dependency,
    lookup: &Result<RegistryRecord, LookupError>,
    policy: VersionPolicy,
) -> Outcome {
    let record = match lookup {
        Err(LookupError::NotFound) => {
            return Outcome::Confusable(Finding::confusable(dep, "package does not exist upstream"))
        }
        Err(LookupError::Transient(reason)) => return Outcome::Unknown(reason.clone()),
        Ok(record) if !record.exists => {
            return Outcome::Confusable(Finding::confusable(dep, "package does not exist upstream"))
        }
        Ok(record) => record,
    };

    let Some(declared) = dep.version.as_deref() else {
        return Outcome::Clean;
    };

    let flagged = match policy {
        VersionPolicy::Off => false,
        VersionPolicy::Published => {
            !record.versions.is_empty()
                && is_exact_pin(dep.provider, declared)
                && !(dep.provider == Provider::Go && is_go_pseudo_version(declared))
                && normalize(declared).is_some_and(|v| {
                    !record
                        .versions
                        .iter()
                        .any(|p| same_version(dep.provider, p, v))
                })
        }
        VersionPolicy::Latest => normalize(declared)
            .and_then(parse_version)
            .zip(record.latest_version.as_deref().and_then(parse_version))
            .is_some_and(|(declared, latest)| declared > latest),
    };

    if flagged {
        let detail = match policy {
            VersionPolicy::Latest => format!(
                "declared version {} is newer than upstream latest {}",
                declared,
                record.latest_version.as_deref().unwrap_or("?")
            ),
            _ => format!("declared version {} not published upstream", declared),
        };
        Outcome::Confusable(Finding::confusable(dep, detail))
    } else {
        Outcome::Clean
    }
}

/// Reduce a declared constraint to a single comparable version, or `None`
/// when it is still a range or wildcard.
pub(crate) fn normalize(declared: &str) -> Option<&str> {
    if declared.contains('*') {
        return None;
    }
    let v = strip_operator(declared.trim()).trim();
    let v = strip_v(v);

    let ranged = v.is_empty()
        || v.contains(|c: char| c.is_whitespace() || c == ',' || c == '*' || c == '[' || c == '(')
        || v.contains("||")
        || v.eq_ignore_ascii_case("latest")
        || v.split('.').any(|part| part.eq_ignore_ascii_case("x"));
    if ranged {
        None
    } else {
        Some(v)
    }
}

/// Whether a declaration names one exact version in this ecosystem's
/// syntax. Only exact pins can be "missing" from the published set.
fn is_exact_pin(provider: Provider, declared: &str) -> bool {
    let d = declared.trim();
    let bare = d.starts_with(|c: char| c.is_ascii_digit());
    match provider {
        // a bare Cargo version is a caret requirement
        Provider::Cargo => d.starts_with('=') && !d.starts_with("=="),
        Provider::Npm => bare || d.starts_with('v') || (d.starts_with('=') && !d.starts_with("==")),
        Provider::Pypi | Provider::Maven | Provider::Gradle => bare,
        Provider::Go => true,
        Provider::Rubygems => bare || d.starts_with('='),
    }
}

/// Whether a published version string equals the normalized declared one.
/// PyPI, Maven, Gradle and RubyGems treat missing trailing components as
/// zero (`2.31` is `2.31.0`); npm, Cargo and Go versions are full semver.
fn same_version(provider: Provider, published: &str, declared: &str) -> bool {
    let published = strip_v(published.trim());
    if published == declared {
        return true;
    }
    match provider {
        Provider::Pypi | Provider::Maven | Provider::Gradle | Provider::Rubygems => {
            match (parse_version(published), parse_version(declared)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        Provider::Npm | Provider::Cargo | Provider::Go => false,
    }
}

/// Go pseudo-versions (`v0.0.0-20210921155107-089bfa567519`,
/// `v1.2.4-0.20191109021931-daa7c04131f5`) name a commit. The proxy's
/// version list only carries tags, so they never appear there.
fn is_go_pseudo_version(declared: &str) -> bool {
    let v = declared.trim();
    let v = v.strip_suffix("+incompatible").unwrap_or(v);
    let Some((rest, hash)) = v.rsplit_once('-') else {
        return false;
    };
    if hash.len() != 12 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }
    let Some(split) = rest.len().checked_sub(14).filter(|&i| rest.is_char_boundary(i)) else {
        return false;
    };
    let (head, timestamp) = rest.split_at(split);
    timestamp.bytes().all(|b| b.is_ascii_digit()) && (head.ends_with('-') || head.ends_with('.'))
}

fn strip_v(v: &str) -> &str {
    match v.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => v,
    }
}

/// Parse a version leniently: a leading `v` is ignored and missing minor or
/// patch components are padded (`1.2` → `1.2.0`).
pub(crate) fn parse_version(raw: &str) -> Option<Version> {
    let raw = strip_v(raw.trim());
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }
    let split = raw.find(|c| c == '-' || c == '+').unwrap_or(raw.len());
    let (core, rest) = raw.split_at(split);
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        _ => return None,
    };
    Version::parse(&padded).ok()
}
