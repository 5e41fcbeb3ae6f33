use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/quill/quill.toml";

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill - multi-provider LLM routing for the paper reader", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
}

impl Cli {
    /// Config path with `~` and environment variables expanded
    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.config).map_or_else(
            |_| self.config.clone(),
            |expanded| expanded.into_owned(),
        ))
    }
}

#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Provider id from the config file
    #[arg(long, conflicts_with = "scene")]
    pub provider: Option<String>,

    /// Model id (defaults to the provider's first listed model)
    #[arg(long, requires = "provider")]
    pub model: Option<String>,

    /// Scene whose provider and model to use (summary, translation, qa, tags)
    #[arg(long)]
    pub scene: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a sample config file
    Init {
        /// Path for new config file (defaults to --config)
        path: Option<PathBuf>,
    },
    /// List configured providers
    Providers,
    /// Test connectivity and latency for one or every provider
    Ping {
        /// Only this provider id
        #[arg(long)]
        provider: Option<String>,

        /// Model id (defaults to the provider's first listed model)
        #[arg(long)]
        model: Option<String>,

        /// Print reports as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Send a prompt and print the answer
    Ask {
        #[command(flatten)]
        target: Target,

        /// Optional system prompt
        #[arg(long)]
        system: Option<String>,

        /// Wait for the full answer instead of streaming chunks
        #[arg(long)]
        no_stream: bool,

        /// Prompt text
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
}
