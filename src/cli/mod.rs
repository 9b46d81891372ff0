pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Incremental harvester for infinite-scroll listing feeds
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a harvest against a feed
    Harvest {
        /// Feed URL to open (defaults to the profile's entry URL)
        #[arg(short, long)]
        url: Option<String>,

        /// Configuration profile to use
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Maximum records to collect (0 = unbounded)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Consecutive empty cycles before giving up
        #[arg(long)]
        max_dead_cycles: Option<u32>,

        /// Consecutive missing slots tolerated inside a segment
        #[arg(long)]
        gap_tolerance: Option<u32>,

        /// Path for the progress checkpoint file
        #[arg(short, long)]
        checkpoint: Option<PathBuf>,

        /// Resume from the checkpoint file if it exists
        #[arg(short, long)]
        resume: bool,

        /// Where to write the collected records
        #[arg(short, long, default_value = "harvest.json")]
        output: PathBuf,
    },

    /// Inspect or list configuration profiles
    Config {
        /// Profile to show (defaults to the default profile)
        #[arg(short, long)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,

        /// Save the selected configuration under a new profile name
        #[arg(long, value_name = "NAME")]
        save_profile: Option<String>,
    },
}

/// Parse command-line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the parsed command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Harvest {
            url,
            profile,
            limit,
            max_dead_cycles,
            gap_tolerance,
            checkpoint,
            resume,
            output,
        } => {
            commands::harvest(
                url,
                &profile,
                limit,
                max_dead_cycles,
                gap_tolerance,
                checkpoint,
                resume,
                output,
            )
            .await
        }
        Commands::Config {
            profile,
            list,
            save_profile,
        } => {
            if let Some(name) = save_profile {
                commands::save_profile(profile.as_deref(), &name).await
            } else if list {
                commands::list_profiles().await
            } else {
                commands::show_config(profile.as_deref()).await
            }
        }
    }
}
