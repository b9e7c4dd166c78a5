//! `depsquat` finds dependency-confusion and maintainer-takeover candidates.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and set up logging.
//! 2. Load config ([`config::load_config`]); CLI flags override it.
//! 3. Locate manifests ([`locator`]) and parse them ([`manifest`]), or take
//!    the single `--dependency`.
//! 4. Look every dependency up in its public registry ([`registry`]) and
//!    classify it ([`analyzer`]).
//! 5. Optionally check maintainer email domains (`--check-email`, [`email`]).
//! 6. Summarize and write the output file ([`report`]).
//! 7. Exit `0`, or `1` on fatal errors and when every lookup failed.

mod analyzer;
mod cli;
mod config;
mod email;
mod error;
mod locator;
mod manifest;
mod models;
mod registry;
mod report;
mod scan;

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::load_config;
use email::{DnsRdapResolver, EmailChecker};
use models::Dependency;
use registry::Registries;
use report::terminal::Reporter;
use scan::{Scanner, Target};

mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const INTERRUPTED: u8 = 130;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises the default `warn` level.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<u8> {
    let target = match (&cli.path, &cli.dependency) {
        (Some(path), _) => Target::Path {
            root: path.canonicalize().unwrap_or_else(|_| path.clone()),
            providers: cli.provider.providers(),
        },
        (None, Some(spec)) => {
            let Some(provider) = cli.provider.provider() else {
                bail!("--dependency needs a concrete --provider, not `all`");
            };
            let Some(dep) = Dependency::from_spec(spec, provider) else {
                bail!("invalid dependency spec for {}: {:?}", provider, spec);
            };
            Target::Dependency(dep)
        }
        (None, None) => bail!("one of --path or --dependency is required"),
    };

    let project_path = match &target {
        Target::Path { root, .. } => Some(root.as_path()),
        Target::Dependency(_) => None,
    };
    let mut config = load_config(project_path, cli.config.as_deref())?;
    if let Some(policy) = cli.version_policy {
        config.analysis.version_policy = policy;
    }

    let http = reqwest::Client::builder()
        .timeout(config.network.timeout())
        .user_agent(config.network.user_agent.clone())
        .build()
        .context("building HTTP client")?;

    let registries = Registries::public(http.clone(), cli.check_email);
    let mut scanner = Scanner::new(&registries, &config).with_progress(!cli.quiet);
    if cli.check_email {
        let resolver = DnsRdapResolver::new(http, config.network.timeout());
        scanner = scanner.with_email_checker(EmailChecker::new(Box::new(resolver)));
    }

    let stdout = std::io::stdout();
    let mut reporter = Reporter::new(stdout.lock(), cli.print_takeover, cli.quiet);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available: never interrupt.
            std::future::pending::<()>().await;
        }
    };
    let summary = scanner.run(&target, &mut reporter, shutdown).await?;
    tracing::info!(
        "{} dependencies, {} lookups, {} unknown",
        summary.dependencies,
        summary.looked_up,
        summary.unknown
    );

    reporter.finish()?;
    if let Some(path) = &cli.output_file {
        report::file::write_findings(path, reporter.findings(), cli.output_format)?;
    }

    if summary.interrupted {
        return Ok(exit_codes::INTERRUPTED);
    }
    if summary.total_network_failure() {
        tracing::error!(
            "all {} registry lookups failed; check network access",
            summary.looked_up
        );
        return Ok(exit_codes::ERROR);
    }
    Ok(exit_codes::SUCCESS)
}
