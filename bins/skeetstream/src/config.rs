use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use skeet_collector::CollectorConfig;

use crate::error::AppError;

#[derive(Parser)]
#[command(name = "skeetstream", about = "Collects a WebSocket event feed into compressed JSON Lines files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the feed and collect until interrupted
    Run(RunArgs),
    /// Print the records of an artifact as JSON lines
    Cat(CatArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Path to TOML config file (missing file = defaults)
    #[arg(long, default_value = "skeetstream.toml", env = "SKEETSTREAM_CONFIG")]
    pub config: String,

    /// Feed host, overrides [feed].host
    #[arg(long, env = "SKEETSTREAM_HOST")]
    pub host: Option<String>,

    /// Records per artifact, overrides [buffer].purge_after
    #[arg(long)]
    pub purge_after: Option<usize>,

    /// Output directory, overrides [storage].data_dir
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct CatArgs {
    /// Artifact to decompress
    pub path: PathBuf,
}

impl RunArgs {
    /// config file < env/CLI, then validated.
    pub fn effective_config(&self) -> Result<CollectorConfig, AppError> {
        let mut config = CollectorConfig::load_or_default(&self.config)?;

        if let Some(host) = &self.host {
            config.feed.host = host.clone();
        }
        if let Some(purge_after) = self.purge_after {
            config.buffer.purge_after = purge_after;
        }
        if let Some(data_dir) = &self.data_dir {
            config.storage.data_dir = data_dir.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
