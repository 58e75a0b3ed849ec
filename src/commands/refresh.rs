use anyhow::Result;
use colored::Colorize;
use agent_pricing::{config::Config, server};

/// Execute the refresh command
///
/// Refreshes every provider, or a single canonical model when `model` is given.
pub async fn execute(cfg: &Config, model: Option<String>) -> Result<()> {
    let service = server::build_service(cfg).await?;

    match model {
        Some(model) => {
            let record = service.refresh_model(&model).await?;
            println!(
                "{} {} from {}",
                "✓ Refreshed".green(),
                record.canonical_model,
                record.provider
            );
        }
        None => {
            println!("{}", "Refreshing provider pricing...".yellow());
            let outcomes = service.refresh_all().await;
            if outcomes.is_empty() {
                println!("{}", "No providers enabled".yellow());
            }
            for outcome in outcomes {
                match outcome.error {
                    None => println!(
                        "  {} {}: {} models",
                        "✓".green(),
                        outcome.provider,
                        outcome.models_updated
                    ),
                    Some(e) => println!("  {} {}: {}", "✗".red(), outcome.provider, e),
                }
            }
        }
    }

    Ok(())
}
