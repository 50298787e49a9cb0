//! Config command implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use frameperf_agent::EngineConfig;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// TOML configuration file; defaults plus FRAMEPERF_* variables otherwise
    #[arg(short, long, env = "FRAMEPERF_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Configuration from a file when given, else from the environment
pub fn load(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_toml_file(path),
        None => Ok(EngineConfig::from_env()),
    }
}

pub fn run(args: ConfigArgs) -> Result<()> {
    let config = load(args.config.as_ref())?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}
