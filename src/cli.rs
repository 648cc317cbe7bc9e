use crate::config::ConfigOverrides;
use clap::Parser;
use std::path::PathBuf;

/// An agent that works on a task inside one directory
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Working directory the agent is confined to
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,

    /// Run this request and exit instead of starting an interactive session
    #[arg(short, long)]
    pub prompt: Option<String>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}
