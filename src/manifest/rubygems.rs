use std::path::Path;

use anyhow::Result;
use regex::Regex;

use crate::models::{Dependency, ParsedManifest, Provider};

/// Parser for `Gemfile`.
pub struct RubygemsParser;

impl super::ManifestParser for RubygemsParser {
    fn provider(&self) -> Provider {
        Provider::Rubygems
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name == "Gemfile"
    }

    fn parse(&self, path: &Path) -> Result<ParsedManifest> {
        let content = std::fs::read_to_string(path)?;
        parse_gemfile(&content, path)
    }
}

fn parse_gemfile(content: &str, path: &Path) -> Result<ParsedManifest> {
    let gem_re = Regex::new(r#"^gem\s*\(?\s*['"]([^'"]+)['"]\s*(.*)$"#)?;
    let constraint_re = Regex::new(r#"^\s*,\s*['"]([^'"]+)['"]"#)?;
    let mut manifest = ParsedManifest::default();

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || !line.starts_with("gem") {
            continue;
        }

        let Some(caps) = gem_re.captures(line) else {
            tracing::warn!("{}:{}: skipping unparseable gem line {:?}", path.display(), lineno + 1, line);
            continue;
        };
        let name = caps[1].to_string();
        let rest = caps[2].split('#').next().unwrap_or("");

        if ["path:", "git:", "github:", ":path", ":git", ":github"]
            .iter()
            .any(|opt| rest.contains(opt))
        {
            continue;
        }

        // Only the first constraint is kept, with an exact `=` dropped.
        let version = constraint_re.captures(rest).map(|c| {
            let constraint = c[1].trim();
            match constraint.strip_prefix('=') {
                Some(pinned) => pinned.trim().to_string(),
                None => constraint.to_string(),
            }
        });

        manifest.dependencies.push(Dependency::new(
            name,
            version,
            Provider::Rubygems,
            Some(path.to_path_buf()),
        ));
    }

    Ok(manifest)
}
