pub mod litellm;
pub mod openrouter;

pub use litellm::LiteLlmProvider;
pub use openrouter::OpenRouterProvider;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::pricing::models::{ModelPricing, ProviderCacheStatus};

/// Parse a decimal price, rejecting negative and non-finite values.
pub(crate) fn parse_price(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

pub(crate) fn valid_price(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

#[derive(Default)]
struct CatalogState {
    models: HashMap<String, ModelPricing>,
    fetched_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Last catalog download of a provider, reused until it is older than `max_age`.
pub(crate) struct CatalogSnapshot {
    max_age: Duration,
    state: RwLock<CatalogState>,
}

impl CatalogSnapshot {
    pub(crate) fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            state: RwLock::new(CatalogState::default()),
        }
    }

    fn is_fresh(&self, fetched_at: Option<DateTime<Utc>>) -> bool {
        match fetched_at {
            Some(at) => Utc::now()
                .signed_duration_since(at)
                .to_std()
                .map(|age| age < self.max_age)
                .unwrap_or(true),
            None => false,
        }
    }

    /// `Some(lookup)` while the snapshot is fresh, `None` when a download is due.
    pub(crate) async fn lookup(&self, canonical_model: &str) -> Option<Option<ModelPricing>> {
        let state = self.state.read().await;
        if !self.is_fresh(state.fetched_at) {
            return None;
        }
        Some(state.models.get(canonical_model).cloned())
    }

    pub(crate) async fn store(&self, records: &[ModelPricing]) {
        let mut state = self.state.write().await;
        state.models = records
            .iter()
            .map(|r| (r.canonical_model.clone(), r.clone()))
            .collect();
        state.fetched_at = Some(Utc::now());
        state.last_error = None;
    }

    pub(crate) async fn record_error(&self, error: String) {
        self.state.write().await.last_error = Some(error);
    }

    pub(crate) async fn status(&self, provider: &str) -> ProviderCacheStatus {
        let state = self.state.read().await;
        ProviderCacheStatus {
            provider: provider.to_string(),
            cached_models: state.models.len(),
            last_fetched_at: state.fetched_at,
            is_stale: !self.is_fresh(state.fetched_at),
            last_error: state.last_error.clone(),
        }
    }
}
