use std::path::Path;

use anyhow::Result;

use crate::models::{Dependency, ParsedManifest, Provider};

/// Parser for `go.mod`.
///
/// Handles both `require ( ... )` blocks and single-line `require`
/// directives. Modules replaced by a local directory are reported as local.
pub struct GoParser;

impl super::ManifestParser for GoParser {
    fn provider(&self) -> Provider {
        Provider::Go
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name == "go.mod"
    }

    fn parse(&self, path: &Path) -> Result<ParsedManifest> {
        let content = std::fs::read_to_string(path)?;
        Ok(parse_go_mod(&content, path))
    }
}

#[derive(PartialEq)]
enum Block {
    None,
    Require,
    Replace,
}

fn parse_go_mod(content: &str, path: &Path) -> ParsedManifest {
    let mut manifest = ParsedManifest::default();
    let mut block = Block::None;

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        if block != Block::None {
            if line == ")" {
                block = Block::None;
                continue;
            }
        } else if let Some(rest) = line.strip_prefix("module ") {
            manifest.local_packages.push(unquote(rest.trim()));
            continue;
        } else if line.starts_with("require") && line.ends_with('(') {
            block = Block::Require;
            continue;
        } else if line.starts_with("replace") && line.ends_with('(') {
            block = Block::Replace;
            continue;
        }

        let (kind, directive) = if let Some(rest) = line.strip_prefix("require ") {
            (Block::Require, rest)
        } else if let Some(rest) = line.strip_prefix("replace ") {
            (Block::Replace, rest)
        } else if block == Block::Require {
            (Block::Require, line)
        } else if block == Block::Replace {
            (Block::Replace, line)
        } else {
            continue;
        };

        match kind {
            Block::Require => {
                let parts: Vec<&str> = directive.split_whitespace().collect();
                if parts.len() < 2 {
                    tracing::warn!(
                        "{}:{}: skipping malformed require {:?}",
                        path.display(),
                        lineno + 1,
                        directive
                    );
                    continue;
                }
                manifest.dependencies.push(Dependency::new(
                    unquote(parts[0]),
                    Some(parts[1].to_string()),
                    Provider::Go,
                    Some(path.to_path_buf()),
                ));
            }
            Block::Replace => {
                // old [version] => ./local/dir
                if let Some((old, new)) = directive.split_once("=>") {
                    let target = new.trim();
                    if target.starts_with("./") || target.starts_with("../") || target.starts_with('/') {
                        if let Some(module) = old.split_whitespace().next() {
                            manifest.local_packages.push(unquote(module));
                        }
                    }
                }
            }
            Block::None => {}
        }
    }

    manifest
}

fn unquote(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '`').to_string()
}
