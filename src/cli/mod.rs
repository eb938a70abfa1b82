//! CLI module for Drawbridge
//!
//! Provides commands:
//! - `edit`: Run an editing session against the local scene cache
//! - `cache`: Inspect or clear cached scene snapshots

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;

pub mod cache;
pub mod edit;

/// Drawbridge CLI
#[derive(Parser, Debug)]
#[command(name = "drawbridge")]
#[command(about = "Session persistence for embedded drawing canvases")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open an editing session; each stdin line is added as a JSON element
    Edit(EditArgs),
    /// Inspect the local scene cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Mount target identifying the session
    pub target: String,
    /// Scene file to open when nothing is cached
    #[arg(long)]
    pub scene: Option<PathBuf>,
    /// Export in dark mode by default
    #[arg(long)]
    pub dark: bool,
    /// Render height
    #[arg(long)]
    pub height: Option<u32>,
    /// End the session after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
    /// Write a PNG export here when the session ends
    #[arg(long)]
    pub export_png: Option<PathBuf>,
    /// Write a JSON export here when the session ends
    #[arg(long)]
    pub export_json: Option<PathBuf>,
    /// Leave the session open so its snapshot is restored next time
    #[arg(long)]
    pub detach: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List stored keys
    List,
    /// Print the cached snapshot of a mount target
    Show { target: String },
    /// Remove the cached snapshot of a mount target
    Clear { target: String },
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Edit(args)) => edit::run(args, &config).await,
        Some(Commands::Cache { command }) => cache::run(command, &config),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
