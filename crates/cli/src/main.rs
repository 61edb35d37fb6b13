//! swipefeed CLI - seen-aware, double-buffered feed player

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use swipefeed::{config::Config, dirs};

mod commands;
mod logging;
mod simulate;

use commands::{
  PlayOptions, cmd_config_init, cmd_config_show, cmd_filter_check, cmd_filter_reset, cmd_filter_stats, cmd_play,
};
use logging::init_logging;

#[derive(Parser)]
#[command(name = "swipefeed")]
#[command(about = "Seen-aware, double-buffered feed player")]
#[command(after_help = "\
QUICK START:
  swipefeed config init                       # Write default config
  swipefeed play --candidates feed.json       # Swipe through a feed
  swipefeed filter stats                      # Inspect the seen-filter

CONFIG LOCATIONS:
  User:    ~/.config/swipefeed/config.toml
  Filter:  ~/.local/share/swipefeed/seen.filter")]
struct Cli {
  /// Config file (default: user config, then built-in defaults)
  #[arg(long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

/// Subcommands for `swipefeed filter`
#[derive(Subcommand)]
pub enum FilterCommand {
  /// Show filter geometry and fill
  Stats {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
  /// Check whether ids have been seen
  Check {
    /// Item ids to check
    #[arg(required = true)]
    ids: Vec<String>,
  },
  /// Forget everything seen so far
  Reset,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
  /// Show the effective configuration
  Show,
  /// Write the default configuration to the user config path
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
}

#[derive(Subcommand)]
enum Commands {
  /// Swipe through a candidate file with simulated media
  #[command(after_help = "\
CANDIDATE FILE:
  A JSON array of {\"id\", \"media_ref\", \"description\", \"creator\", \"created_at\"}.
  Refs starting with missing:// always fail to load.

EXAMPLES:
  swipefeed play --candidates demos/feed.json --steps 20 --autoplay
  swipefeed play --candidates feed.json --load-ms 300 --fail-every 4
  swipefeed play --candidates feed.json --ephemeral")]
  Play {
    /// JSON array of candidate items
    #[arg(long, value_name = "FILE")]
    candidates: PathBuf,
    /// Number of items to show before stopping
    #[arg(long, default_value = "10")]
    steps: usize,
    /// Start playback as soon as an item is on screen
    #[arg(long)]
    autoplay: bool,
    /// Simulated load time per item
    #[arg(long, default_value = "50")]
    load_ms: u64,
    /// Simulated viewing time per item
    #[arg(long, default_value = "0")]
    dwell_ms: u64,
    /// Make every Nth load fail
    #[arg(long)]
    fail_every: Option<u64>,
    /// Seen-filter file (default: <data dir>/seen.filter)
    #[arg(long, value_name = "FILE")]
    filter: Option<PathBuf>,
    /// Keep the seen-filter in memory only
    #[arg(long, conflicts_with = "filter")]
    ephemeral: bool,
    /// Print a JSON summary instead of each item
    #[arg(long)]
    json: bool,
  },
  /// Inspect or reset the seen-filter
  Filter {
    /// Seen-filter file (default: <data dir>/seen.filter)
    #[arg(long, value_name = "FILE")]
    path: Option<PathBuf>,
    #[command(subcommand)]
    command: FilterCommand,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let config = Config::load(cli.config.as_deref());
  init_logging(&config.log.level);

  match cli.command {
    Commands::Play {
      candidates,
      steps,
      autoplay,
      load_ms,
      dwell_ms,
      fail_every,
      filter,
      ephemeral,
      json,
    } => {
      let opts = PlayOptions {
        candidates,
        steps,
        autoplay,
        load_ms,
        dwell_ms,
        fail_every,
        filter_path: filter,
        ephemeral,
        json,
      };
      cmd_play(&config, opts).await
    }

    // Filter subcommands
    Commands::Filter { path, command } => {
      let path = path.unwrap_or_else(dirs::default_filter_path);
      match command {
        FilterCommand::Stats { json } => cmd_filter_stats(&config, &path, json).await,
        FilterCommand::Check { ids } => cmd_filter_check(&config, &path, &ids).await,
        FilterCommand::Reset => cmd_filter_reset(&path).await,
      }
    }

    // Config subcommands
    Commands::Config { command } => match command {
      ConfigCommand::Show => cmd_config_show(&config, cli.config.as_deref()).await,
      ConfigCommand::Init { force } => cmd_config_init(force).await,
    },
  }
}
