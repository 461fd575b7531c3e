//! Command-line definition for `busview`

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::traffic_view::ExportFormat;

/// busview -- simulated in-vehicle network analyzer
#[derive(Debug, Parser)]
#[command(
    name = "busview",
    version,
    about = "Simulate CAN/LIN/FlexRay traffic from virtual ECUs",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Settings file (defaults to $XDG_CONFIG_HOME/busview/settings.json)
    #[arg(long, env = "BUSVIEW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the synthesizer headless and write an export
    Run(RunArgs),

    /// Open an interactive console driving a live session
    Console(SessionArgs),

    /// Show or initialize the settings file
    Settings {
        /// Write the current settings (defaults if absent) to disk
        #[arg(long)]
        init: bool,
    },
}

/// Options shared by every command that builds a session
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// Fixed random seed for reproducible traffic
    #[arg(long)]
    pub seed: Option<u64>,

    /// Start without the four default nodes
    #[arg(long)]
    pub no_default_nodes: bool,

    /// Redraw the tick period before every tick
    #[arg(long)]
    pub jitter: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Number of ticks to synthesize
    #[arg(long, short = 'n', conflicts_with = "duration")]
    pub ticks: Option<usize>,

    /// Run in real time for this many seconds instead of a fixed tick count
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,

    /// Export format
    #[arg(long, short = 'f', value_enum)]
    pub format: Option<ExportFormat>,

    /// Output file (stdout when omitted)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}
