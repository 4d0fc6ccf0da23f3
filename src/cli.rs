//! CLI argument parsing

use std::path::PathBuf;

use clap::{Args, Parser};

/// Apply a Hue scene to a room, or switch the room off
#[derive(Debug, Parser)]
#[command(
    name = "huectl",
    author,
    version,
    about = "Apply a Hue scene to a room, or switch the room off",
    after_help = "Examples:\n  huectl relax\n  huectl off kitchen\n  huectl \"bright\" \"living room\""
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    /// Scene name to apply, or "off" to switch the room off
    pub action: String,

    /// Room name (defaults to the configured default room)
    pub room: Option<String>,
}

/// Global options
#[derive(Debug, Clone, Args)]
pub struct GlobalOpts {
    /// Bridge application key
    #[arg(long, env = "HUE_APP_KEY", hide_env_values = true)]
    pub app_key: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Ignore the cached bridge address and ids for this run
    #[arg(long)]
    pub fresh: bool,

    /// Override config file path
    #[arg(long, value_name = "PATH", env = "HUECTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reduce output to only errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase logging verbosity (stackable: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Enable debug logging (equivalent to -vv)
    #[arg(long)]
    pub debug: bool,

    /// Enable trace logging
    #[arg(long)]
    pub trace: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,
}
