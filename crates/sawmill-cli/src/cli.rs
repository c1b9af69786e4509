//! Command-line interface definitions and parsing

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (sawmill.toml)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the listening port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the client inactivity timeout, in seconds
    #[arg(long)]
    pub inactivity_timeout: Option<u64>,
}
