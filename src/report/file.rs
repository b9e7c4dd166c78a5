use std::path::Path;

use anyhow::{Context, Result};

use super::OutputFormat;
use crate::models::Finding;

/// Write findings to `path`, sorted by provider, name, kind and detail so
/// that repeated scans produce identical files.
pub fn write_findings(path: &Path, findings: &[Finding], format: OutputFormat) -> Result<()> {
    let content = render(findings, format)?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("wrote {} finding(s) to {}", findings.len(), path.display());
    Ok(())
}

pub fn render(findings: &[Finding], format: OutputFormat) -> Result<String> {
    let mut sorted: Vec<&Finding> = findings.iter().collect();
    sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    match format {
        OutputFormat::Text => Ok(sorted
            .iter()
            .map(|f| {
                format!(
                    "{}\t{}\t{}\t{}\n",
                    f.dependency.provider,
                    f.kind,
                    f.dependency.display_spec(),
                    f.detail
                )
            })
            .collect()),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&sorted)?;
            json.push('\n');
            Ok(json)
        }
    }
}
