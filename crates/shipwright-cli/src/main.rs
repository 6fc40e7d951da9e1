//! Shipwright CLI entrypoint.

use clap::Parser;

mod commands;
mod config;
mod graph;
mod handlers;
mod report;

#[cfg(test)]
mod run_tests;

use commands::{Commands, ConfigCommands};
use config::CliConfig;
use handlers::RunOptions;

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(author, version, about = "Build-and-release pipeline runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = CliConfig::load().unwrap_or_default();

    match cli.command {
        Commands::Init => handlers::init().await?,
        Commands::Validate { path } => handlers::validate(&path).await?,
        Commands::Graph { path } => handlers::graph(&path).await?,
        Commands::Run {
            file,
            event,
            git_ref,
            tag,
            vars,
            index,
            workspace,
            keep_artifacts,
        } => {
            let ok = handlers::run_pipeline(
                &config,
                RunOptions {
                    file,
                    event,
                    git_ref,
                    tag,
                    vars,
                    index,
                    workspace,
                    keep_artifacts,
                },
            )
            .await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }

    Ok(())
}
