use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic, Result};
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};
use std::path::PathBuf;

mod common;
mod daemon;

#[derive(Debug, Subcommand)]
enum Command {
    Daemon(daemon::Args),
}

#[derive(Debug, Parser)]
#[clap(name = "Farol")]
#[clap(bin_name = "farol")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    config: Option<PathBuf>,
}

#[derive(Deserialize)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[serde_as]
#[derive(Deserialize, Default, Debug)]
pub struct LoggingConfig {
    #[serde_as(as = "Option<DisplayFromStr>")]
    max_level: Option<tracing::Level>,

    #[serde(default)]
    include_pallas: bool,

    #[serde(default)]
    include_tower: bool,
}

#[derive(Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub upstream: farol::sync::UpstreamConfig,

    #[serde(default)]
    pub sync: farol::sync::SyncConfig,

    pub serve: farol::serve::ServeConfig,

    /// Patterns installed at startup, merged with whatever the store
    /// already holds.
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Layered lookup, weakest first: the system-wide file, then one in
    /// the working directory, then a file named on the command line
    /// (which must exist), with `FAROL_*` env vars on top.
    pub fn new(explicit_file: &Option<PathBuf>) -> Result<Self, config::ConfigError> {
        let mut s = config::Config::builder();

        s = s.add_source(config::File::with_name("/etc/farol/daemon.toml").required(false));
        s = s.add_source(config::File::with_name("farol.toml").required(false));

        if let Some(explicit) = explicit_file.as_ref().and_then(|x| x.to_str()) {
            s = s.add_source(config::File::with_name(explicit).required(true));
        }

        s = s.add_source(config::Environment::with_prefix("FAROL").separator("_"));

        s.build()?.try_deserialize()
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = Config::new(&args.config)
        .into_diagnostic()
        .context("parsing configuration")?;

    match args.command {
        Command::Daemon(x) => daemon::run(config, &x)?,
    };

    Ok(())
}
