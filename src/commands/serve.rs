use anyhow::Result;
use agent_pricing::{config::Config, server};
use tracing::info;

/// Execute the serve command
pub async fn execute(cfg: Config) -> Result<()> {
    info!(
        database = %cfg.database.url,
        refresh = cfg.refresh.enabled,
        "Starting pricing server"
    );
    server::start_server(cfg).await
}
