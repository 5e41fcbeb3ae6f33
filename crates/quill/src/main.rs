mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use quill_llm::{Router, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    quill_llm::init_logging();

    let cli = Cli::parse();
    let config_path = cli.config_path();

    // Handle init command early (doesn't need config)
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(path.as_deref().unwrap_or(&config_path));
    }

    let settings = Settings::load(&config_path)?;
    let router = Router::from_settings(&settings.http)?;

    match cli.command {
        Commands::Init { .. } => {
            // Already handled above
            unreachable!()
        }
        Commands::Providers => commands::providers::execute(&settings),
        Commands::Ping {
            provider,
            model,
            json,
        } => commands::ping::execute(&router, &settings, provider, model, json).await?,
        Commands::Ask {
            target,
            system,
            no_stream,
            prompt,
        } => {
            commands::ask::execute(
                &router,
                &settings,
                &target,
                system,
                prompt.join(" "),
                !no_stream,
            )
            .await?
        }
    }

    Ok(())
}
