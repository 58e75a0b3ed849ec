use async_trait::async_trait;
use std::time::Duration;

use crate::pricing::models::{ModelPricing, ProviderCacheStatus};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode catalog: {0}")]
    Decode(String),
}

/// Upstream pricing catalog.
///
/// Providers own their resilience (timeouts, retries); the service calls each
/// method at most once per operation.
#[async_trait]
pub trait PricingProvider: Send + Sync + 'static {
    /// Short name stored on every row this provider produces (e.g. "openrouter")
    fn name(&self) -> &str;

    fn supports_model(&self, canonical_model: &str) -> bool;

    /// Every model the catalog prices.
    async fn fetch_all(&self) -> Result<Vec<ModelPricing>, ProviderError>;

    /// `Ok(None)` when the catalog does not know the model.
    async fn fetch_model(&self, canonical_model: &str)
        -> Result<Option<ModelPricing>, ProviderError>;

    /// How often the background refresher should re-pull this catalog.
    fn refresh_interval(&self) -> Duration;

    /// Optional introspection capability.
    fn cache_probe(&self) -> Option<&dyn ProviderCacheProbe> {
        None
    }
}

/// Implemented by providers that keep a local catalog snapshot.
#[async_trait]
pub trait ProviderCacheProbe: Send + Sync {
    async fn cache_status(&self) -> ProviderCacheStatus;
}
