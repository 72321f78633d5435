use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fopbox")]
#[command(about = "HTTP service running file operations against object storage", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    pub config: PathBuf,
}
