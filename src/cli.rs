use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgGroup, Parser};

use crate::config::VersionPolicy;
use crate::models::Provider;
use crate::report::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "depsquat",
    about = "Find dependency-confusion and maintainer-takeover candidates in project manifests",
    version
)]
#[command(group(ArgGroup::new("target").required(true).args(["path", "dependency"])))]
pub struct Cli {
    /// Package ecosystem to scan
    #[arg(long, value_name = "PROVIDER")]
    pub provider: ProviderArg,

    /// Directory (or manifest tree) to scan recursively
    #[arg(long, value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Check a single package: NAME[:VERSION], or GROUP:ARTIFACT[:VERSION] for maven/gradle
    #[arg(long, value_name = "SPEC")]
    pub dependency: Option<String>,

    /// Print each finding as soon as it is found
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub print_takeover: bool,

    /// Write sorted findings to this file
    #[arg(long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Format of --output-file
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub output_format: OutputFormat,

    /// Check whether maintainer email domains can be registered
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub check_email: bool,

    /// How declared versions are compared with the registry [default: from config, else published]
    #[arg(long, value_name = "POLICY")]
    pub version_policy: Option<VersionPolicy>,

    /// Config file [default: <path>/.depsquat/config.toml, fallback ~/.config/depsquat/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print the summary line; no progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderArg {
    Npm,
    Pypi,
    Cargo,
    Go,
    Maven,
    Gradle,
    Rubygems,
    All,
}

impl ProviderArg {
    /// `None` for `all`.
    pub fn provider(self) -> Option<Provider> {
        match self {
            ProviderArg::Npm => Some(Provider::Npm),
            ProviderArg::Pypi => Some(Provider::Pypi),
            ProviderArg::Cargo => Some(Provider::Cargo),
            ProviderArg::Go => Some(Provider::Go),
            ProviderArg::Maven => Some(Provider::Maven),
            ProviderArg::Gradle => Some(Provider::Gradle),
            ProviderArg::Rubygems => Some(Provider::Rubygems),
            ProviderArg::All => None,
        }
    }

    pub fn providers(self) -> Vec<Provider> {
        match self.provider() {
            Some(p) => vec![p],
            None => Provider::ALL.to_vec(),
        }
    }
}
