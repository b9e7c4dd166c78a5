//! Manifest parsers, one per provider.
//!
//! Each parser is best-effort: an entry it cannot make sense of is logged
//! and skipped, and only a file that cannot be read or decoded at all is
//! returned as an error.

use std::path::Path;

use anyhow::Result;

use crate::models::{ParsedManifest, Provider};

pub mod cargo;
pub mod go;
pub mod gradle;
pub mod maven;
pub mod npm;
pub mod pypi;
pub mod rubygems;

pub trait ManifestParser {
    fn provider(&self) -> Provider;

    /// Whether a file with this name is a manifest for the provider.
    fn matches(&self, file_name: &str) -> bool;

    fn parse(&self, path: &Path) -> Result<ParsedManifest>;
}

pub fn parser_for(provider: Provider) -> &'static dyn ManifestParser {
    match provider {
        Provider::Npm => &npm::NpmParser,
        Provider::Pypi => &pypi::PypiParser,
        Provider::Cargo => &cargo::CargoParser,
        Provider::Go => &go::GoParser,
        Provider::Maven => &maven::MavenParser,
        Provider::Gradle => &gradle::GradleParser,
        Provider::Rubygems => &rubygems::RubygemsParser,
    }
}

/// Strip one leading comparison operator from a version constraint,
/// e.g. `"~> 1.2"` → `"1.2"`, `">=2.0"` → `"2.0"`.
pub(crate) fn strip_operator(constraint: &str) -> &str {
    const OPERATORS: [&str; 11] = ["===", "==", "~=", "~>", ">=", "<=", "!=", "=", "^", "~", ">"];
    let constraint = constraint.trim();
    let rest = OPERATORS
        .iter()
        .find_map(|op| constraint.strip_prefix(op))
        .or_else(|| constraint.strip_prefix('<'))
        .unwrap_or(constraint);
    rest.trim()
}
