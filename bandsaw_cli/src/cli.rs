//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "bandsaw", version, about = "Adaptive band-saw controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/bandsaw.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the poll loop until Ctrl-C or the tick budget is spent
    Run {
        /// Strategy to start with (none|expert|fuzzy|linear|ml); overrides control.strategy
        #[arg(long, value_name = "NAME")]
        strategy: Option<String>,
        /// Stop after this many poll ticks
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
        /// Print per-strategy run/error counts and tick latency on exit
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Connect and read one register block
    SelfCheck,
    /// Print one decoded machine snapshot
    Snapshot,
    /// Zero both speed setpoints
    EmergencyStop,
}
