use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    config::Config,
    handlers::pricing::{self, PricingState},
    pricing::{
        providers::{LiteLlmProvider, OpenRouterProvider},
        PricingProvider, PricingRefresher, PricingService, SqliteRepository,
    },
    signals::setup_signal_handlers,
};

/// Build the enabled upstream providers from configuration
pub fn build_providers(config: &Config) -> Result<Vec<Arc<dyn PricingProvider>>> {
    let mut providers: Vec<Arc<dyn PricingProvider>> = Vec::new();

    let openrouter = &config.providers.openrouter;
    if openrouter.enabled {
        providers.push(Arc::new(OpenRouterProvider::new(
            &openrouter.base_url,
            openrouter.api_key.clone(),
            Duration::from_secs(openrouter.timeout_seconds),
            Duration::from_secs(openrouter.refresh_interval_seconds),
        )?));
    }

    let litellm = &config.providers.litellm;
    if litellm.enabled {
        providers.push(Arc::new(LiteLlmProvider::new(
            &litellm.url,
            Duration::from_secs(litellm.timeout_seconds),
            Duration::from_secs(litellm.refresh_interval_seconds),
        )?));
    }

    Ok(providers)
}

/// Open the database and wire the pricing service
pub async fn build_service(config: &Config) -> Result<Arc<PricingService>> {
    // Ensure parent directory exists
    if let Some(parent) = database_file(&config.database.url).and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let repository = SqliteRepository::connect(&config.database.url).await?;
    let providers = build_providers(config)?;

    if providers.is_empty() {
        warn!("No pricing providers enabled, serving stored and override pricing only");
    }

    Ok(Arc::new(PricingService::new(Arc::new(repository), providers)))
}

/// File path of a `sqlite:` URL, or `None` for in-memory databases
fn database_file(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path.contains(":memory:") {
        None
    } else {
        Some(Path::new(path))
    }
}

/// Start the pricing server
///
/// This function:
/// 1. Opens the database and builds the pricing service
/// 2. Sets up signal handlers for graceful shutdown
/// 3. Starts the background refresher
/// 4. Serves requests with graceful shutdown support
pub async fn start_server(config: Config) -> Result<()> {
    let service = build_service(&config).await?;

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let refresher_handle = match service.min_refresh_interval() {
        Some(interval) if config.refresh.enabled => {
            let refresher = PricingRefresher::new(
                service.clone(),
                interval,
                Duration::from_secs(config.refresh.cleanup_interval_seconds),
                config.refresh.refresh_on_startup,
            );
            Some(refresher.spawn(shutdown_tx.subscribe()))
        }
        _ => None,
    };

    let state = PricingState {
        service: service.clone(),
        request_timeout: Duration::from_secs(config.server.request_timeout_seconds),
    };
    let app = create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting pricing service on {}", addr);
    info!("Providers: {}", service.provider_names().join(", "));

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    if let Some(handle) = refresher_handle {
        handle.await?;
    }
    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: PricingState) -> Router {
    let api = Router::new()
        .route("/cost", post(pricing::calculate_cost))
        .route("/effective", get(pricing::get_effective_pricing))
        .route("/resolve", get(pricing::resolve_model))
        .route("/models", get(pricing::list_models))
        .route("/cache-status", get(pricing::cache_status))
        .route("/refresh", post(pricing::refresh_all))
        .route("/refresh/model", post(pricing::refresh_model))
        .route(
            "/aliases",
            get(pricing::list_aliases)
                .put(pricing::upsert_alias)
                .delete(pricing::delete_alias),
        )
        .route(
            "/overrides",
            get(pricing::get_overrides)
                .put(pricing::set_override)
                .delete(pricing::delete_override),
        )
        .route(
            "/settings",
            get(pricing::get_settings).put(pricing::update_settings),
        )
        .route("/usage", post(pricing::record_usage))
        .with_state(state);

    Router::new()
        .route("/health", get(pricing::health_check))
        .nest("/api/pricing", api)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_file() {
        assert_eq!(
            database_file("sqlite://./data/pricing.db"),
            Some(Path::new("./data/pricing.db"))
        );
        assert_eq!(
            database_file("sqlite:pricing.db?mode=rwc"),
            Some(Path::new("pricing.db"))
        );
        assert_eq!(database_file("sqlite::memory:"), None);
    }

    #[test]
    fn test_build_providers_respects_enabled_flags() {
        let mut config = Config::default();
        let names: Vec<String> = build_providers(&config)
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["openrouter"]);

        config.providers.openrouter.enabled = false;
        config.providers.litellm.enabled = true;
        let providers = build_providers(&config).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "litellm");
    }
}
