use anyhow::Result;
use colored::Colorize;
use agent_pricing::{config::Config, pricing::CacheStatus, server};
use std::time::Duration;
use tracing::debug;

/// Execute the status command
///
/// Asks a running server first, since only it holds live provider snapshots.
/// Falls back to reading the database directly.
pub async fn execute(cfg: &Config) -> Result<()> {
    let status = match fetch_from_server(cfg).await {
        Ok(status) => {
            println!("{}", "(from running server)".dimmed());
            status
        }
        Err(e) => {
            debug!("Server not reachable, reading database: {}", e);
            server::build_service(cfg).await?.get_cache_status().await?
        }
    };

    println!("{}", "Pricing Status:".bold());
    println!("  Stored models: {}", status.total_models);
    println!("  Expired rows: {}", status.expired_count);
    println!();

    println!("{}", "Providers:".cyan());
    if status.providers.is_empty() {
        println!("    (none report cache status)");
    }
    for provider in &status.providers {
        let freshness = if provider.is_stale {
            "stale".yellow()
        } else {
            "fresh".green()
        };
        let fetched = provider
            .last_fetched_at
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
        println!(
            "    {}: {} ({} models, fetched {})",
            provider.provider, freshness, provider.cached_models, fetched
        );
        if let Some(error) = &provider.last_error {
            println!("      {} {}", "last error:".red(), error);
        }
    }

    Ok(())
}

async fn fetch_from_server(cfg: &Config) -> Result<CacheStatus> {
    let url = format!(
        "http://{}:{}/api/pricing/cache-status",
        cfg.server.host, cfg.server.port
    );
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;
    let status = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json::<CacheStatus>()
        .await?;
    Ok(status)
}
