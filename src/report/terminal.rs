use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use crate::models::{Finding, FindingKind, Provider};

/// Collects findings as they are produced and renders the final summary.
///
/// With `stream` set, each finding is also printed the moment it is
/// recorded (`--print-takeover`). With `quiet` set, only the closing
/// `Scan complete` line is printed.
pub struct Reporter<W: Write> {
    out: W,
    findings: Vec<Finding>,
    stream: bool,
    quiet: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, stream: bool, quiet: bool) -> Self {
        Reporter {
            out,
            findings: Vec::new(),
            stream,
            quiet,
        }
    }

    pub fn record(&mut self, finding: Finding) -> Result<()> {
        if self.stream {
            writeln!(
                self.out,
                "{} {} {}: {}",
                kind_tag(finding.kind),
                finding.dependency.provider,
                finding.dependency.display_spec(),
                finding.detail
            )?;
            self.out.flush()?;
        }
        self.findings.push(finding);
        Ok(())
    }

    /// Findings in the order they were recorded.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn finish(&mut self) -> Result<()> {
        let confusable = self.count(FindingKind::Confusable);
        let takeover = self.count(FindingKind::TakeoverCandidate);

        if !self.quiet && !self.findings.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "{}", render_table(&self.findings))?;
            self.render_scopes()?;
        }

        writeln!(
            self.out,
            "Scan complete: {} finding(s) ({} confusable, {} takeover candidate(s))",
            self.findings.len(),
            confusable,
            takeover
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn count(&self, kind: FindingKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    /// A missing scoped npm package usually means the whole scope is
    /// unclaimed, which is worth more than the individual names.
    fn render_scopes(&mut self) -> Result<()> {
        let mut scopes: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for finding in self.findings.iter().filter(|f| {
            f.kind == FindingKind::Confusable && f.dependency.provider == Provider::Npm
        }) {
            if let Some((scope, _)) = finding.dependency.name.split_once('/') {
                if scope.starts_with('@') {
                    scopes.entry(scope).or_default().push(&finding.dependency.name);
                }
            }
        }

        if scopes.is_empty() {
            return Ok(());
        }

        writeln!(self.out, " {} Scoped npm packages:\n", "[SCOPE]".yellow().bold())?;
        for (scope, names) in &scopes {
            writeln!(self.out, "  {} ({})", scope.bold(), names.join(", "))?;
        }
        writeln!(
            self.out,
            "\n  If your organisation does not own these scopes on npmjs.com, \
             anyone can register them and publish the packages above.\n"
        )?;
        Ok(())
    }
}

fn kind_tag(kind: FindingKind) -> ColoredString {
    match kind {
        FindingKind::Confusable => "[confusable]".red().bold(),
        FindingKind::TakeoverCandidate => "[takeover-candidate]".magenta().bold(),
    }
}

fn render_table(findings: &[Finding]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Provider").add_attribute(Attribute::Bold),
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Kind").add_attribute(Attribute::Bold),
            Cell::new("Detail").add_attribute(Attribute::Bold),
            Cell::new("Source").add_attribute(Attribute::Bold),
        ]);

    for finding in findings {
        let dep = &finding.dependency;
        let kind_color = match finding.kind {
            FindingKind::Confusable => Color::Red,
            FindingKind::TakeoverCandidate => Color::Magenta,
        };
        let source = dep
            .source_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "--dependency".to_string());

        table.add_row(vec![
            Cell::new(dep.provider.to_string()),
            Cell::new(&dep.name),
            Cell::new(dep.version.as_deref().unwrap_or("-")),
            Cell::new(finding.kind.to_string()).fg(kind_color),
            Cell::new(&finding.detail),
            Cell::new(source),
        ]);
    }

    table
}
