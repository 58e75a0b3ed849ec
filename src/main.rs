use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use agent_pricing::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();
    let command = args.get_command();

    if matches!(command, cli::Commands::Version) {
        println!("agent-pricing v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cfg = config::load_config(&args.config)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    // Dispatch to appropriate command handler
    match command {
        cli::Commands::Serve => commands::serve::execute(cfg).await?,
        cli::Commands::Cost(cost_args) => commands::cost::execute(&cfg, cost_args).await?,
        cli::Commands::Refresh { model } => commands::refresh::execute(&cfg, model).await?,
        cli::Commands::Models => commands::models::execute(&cfg).await?,
        cli::Commands::Status => commands::status::execute(&cfg).await?,
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&cfg)?,
            cli::ConfigCommands::Validate => commands::config::validate(&cfg)?,
        },
        cli::Commands::Version => {}
    }

    Ok(())
}
