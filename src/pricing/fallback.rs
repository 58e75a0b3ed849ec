//! Per-component price resolution: manual override > provider > historical average.
//!
//! The provider level is the base record itself. The other levels are overlay
//! passes run in order over a private copy of it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::pricing::models::{
    ModelPricing, PriceSource, PricingComponent, PricingSettings,
};
use crate::pricing::repository::PricingRepository;

/// One level of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    /// Active overrides replace whatever the record holds.
    Overrides,
    /// Historical averages fill components that are still missing, and only
    /// when a core token axis is missing.
    History,
}

pub const DEFAULT_OVERLAYS: [Overlay; 2] = [Overlay::Overrides, Overlay::History];

pub struct FallbackResolver {
    repository: Arc<dyn PricingRepository>,
    overlays: Vec<Overlay>,
}

impl FallbackResolver {
    pub fn new(repository: Arc<dyn PricingRepository>) -> Self {
        Self::with_overlays(repository, DEFAULT_OVERLAYS.to_vec())
    }

    pub fn with_overlays(repository: Arc<dyn PricingRepository>, overlays: Vec<Overlay>) -> Self {
        Self {
            repository,
            overlays,
        }
    }

    /// Produce the effective record for `canonical_model`.
    ///
    /// `base` is never modified. A missing base yields an empty placeholder
    /// carrying only the model name and `provider`.
    pub async fn resolve(
        &self,
        base: Option<&ModelPricing>,
        canonical_model: &str,
        provider: &str,
    ) -> ModelPricing {
        let mut record = match base {
            Some(record) => record.clone(),
            None => ModelPricing::placeholder(canonical_model, provider),
        };

        for overlay in &self.overlays {
            match overlay {
                Overlay::Overrides => self.apply_overrides(&mut record).await,
                Overlay::History => self.apply_history(&mut record).await,
            }
        }

        record
    }

    async fn apply_overrides(&self, record: &mut ModelPricing) {
        let overrides = match self.repository.get_overrides(&record.canonical_model).await {
            Ok(overrides) => overrides,
            Err(e) => {
                warn!(
                    canonical_model = %record.canonical_model,
                    error = %e,
                    "Failed to read pricing overrides, skipping"
                );
                return;
            }
        };

        let now = Utc::now();
        for ov in overrides.iter().filter(|ov| ov.is_active_at(now)) {
            record
                .prices
                .set(ov.component, ov.price_per_unit, PriceSource::ManualOverride);
        }
    }

    async fn apply_history(&self, record: &mut ModelPricing) {
        let prices = &record.prices;
        if !prices.is_missing(PricingComponent::InputTokens)
            && !prices.is_missing(PricingComponent::OutputTokens)
        {
            return;
        }

        let settings = match self.repository.get_settings().await {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to read pricing settings, using defaults");
                PricingSettings::default()
            }
        };
        let since = settings.window_start(Utc::now());

        let history = match self
            .repository
            .get_historical_averages(&record.canonical_model, since)
            .await
        {
            Ok(Some(history)) if history.is_usable() => history,
            Ok(_) => return,
            Err(e) => {
                warn!(
                    canonical_model = %record.canonical_model,
                    error = %e,
                    "Failed to read historical pricing, skipping"
                );
                return;
            }
        };

        debug!(
            canonical_model = %record.canonical_model,
            samples = history.sample_count,
            "Filling missing prices from history"
        );
        for component in PricingComponent::ALL {
            if !record.prices.is_missing(component) {
                continue;
            }
            if let Some(avg) = history.average(component) {
                record
                    .prices
                    .set(component, avg, PriceSource::HistoricalAverage);
            }
        }
    }
}
