use crate::config::toml_config::EtlConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "health-etl")]
#[command(about = "Exports COVID-19 case and vaccination records to CSV", version)]
pub struct CliConfig {
    /// TOML configuration (defaults to ./health-etl.toml, then the built-in region lists)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides `output.directory`
    #[arg(short, long, global = true)]
    pub output_dir: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log as JSON lines")]
    pub json_logs: bool,

    #[arg(long, global = true, help = "Log CPU and memory usage per pipeline")]
    pub monitor: bool,

    #[arg(long, global = true, help = "Hide the progress bar")]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Latest case and death counts for the configured regions
    Cases,
    /// Vaccination records for the configured locations, one CSV each
    Vaccinations {
        /// Only export these location labels (repeatable)
        #[arg(short, long = "location")]
        locations: Vec<String>,
    },
}

impl CliConfig {
    /// Command-line flags take precedence over the file.
    pub fn apply_overrides(&self, config: &mut EtlConfig) {
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
    }
}
