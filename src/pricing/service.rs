use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::PricingError;
use crate::pricing::alias::AliasResolver;
use crate::pricing::cache::PricingCache;
use crate::pricing::calculator;
use crate::pricing::fallback::FallbackResolver;
use crate::pricing::models::{
    CacheStatus, CostCalculation, CostRequest, ModelAlias, ModelPricing, ModelPricingView,
    PricingComponent, PricingOverride, PricingSettings, RefreshOutcome, ResolvedModel,
    RunUsageEvent, MAX_HISTORICAL_WINDOW_DAYS, MAX_PROVIDER_CACHE_TTL_SECONDS,
};
use crate::pricing::provider::PricingProvider;
use crate::pricing::repository::PricingRepository;

/// Pricing service: alias resolution, effective pricing, cost calculation and
/// the administrative operations around them.
///
/// Safe to share across request handlers behind an `Arc`. Every method may be
/// cancelled by dropping its future; the cache lock is never held across I/O.
pub struct PricingService {
    repository: Arc<dyn PricingRepository>,
    providers: Vec<Arc<dyn PricingProvider>>,
    resolver: AliasResolver,
    fallback: FallbackResolver,
    cache: PricingCache,
}

impl PricingService {
    pub fn new(
        repository: Arc<dyn PricingRepository>,
        providers: Vec<Arc<dyn PricingProvider>>,
    ) -> Self {
        Self {
            resolver: AliasResolver::new(repository.clone()),
            fallback: FallbackResolver::new(repository.clone()),
            cache: PricingCache::new(),
            repository,
            providers,
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Shortest refresh interval among registered providers.
    pub fn min_refresh_interval(&self) -> Option<std::time::Duration> {
        self.providers.iter().map(|p| p.refresh_interval()).min()
    }

    // ===== Cost =====

    pub async fn calculate_cost(&self, request: &CostRequest) -> Result<CostCalculation, PricingError> {
        validate_usage(request)?;

        let resolved = self.resolver.resolve(&request.model, &request.runner_type).await?;
        let effective = self.effective_pricing(&resolved).await?;

        if effective.prices.iter().next().is_none() {
            debug!(
                canonical_model = %resolved.canonical_model,
                found = resolved.found,
                "No pricing data for model, returning zero cost"
            );
            return Ok(calculator::zero_cost(request, &resolved));
        }

        let calculation = calculator::calculate(request, &resolved, &effective);
        debug!(
            canonical_model = %calculation.canonical_model,
            total_cost = calculation.total_cost,
            "Calculated run cost"
        );
        Ok(calculation)
    }

    /// Effective pricing record for a runner model, after overrides and history.
    pub async fn get_model_pricing(
        &self,
        runner_model: &str,
        runner_type: &str,
    ) -> Result<ModelPricing, PricingError> {
        let resolved = self.resolver.resolve(runner_model, runner_type).await?;
        self.effective_pricing(&resolved).await
    }

    async fn effective_pricing(&self, resolved: &ResolvedModel) -> Result<ModelPricing, PricingError> {
        let canonical = resolved.canonical_model.as_str();
        let provider = self.serving_provider(canonical, &resolved.provider);
        let provider_name = provider.map_or(resolved.provider.as_str(), |p| p.name());

        if let Some(hit) = self.cache.get(canonical, provider_name).await {
            return Ok(self.fallback.resolve(Some(&hit), canonical, provider_name).await);
        }

        let mut working = self.repository.get_pricing(canonical, provider_name).await?;

        let stale = working.as_ref().map_or(true, |r| r.is_expired());
        if stale {
            if let Some(provider) = provider {
                match provider.fetch_model(canonical).await {
                    Ok(Some(fetched)) => working = Some(self.persist_fetched(fetched).await),
                    Ok(None) => {
                        debug!(
                            canonical_model = canonical,
                            provider = provider.name(),
                            "Provider has no pricing for model"
                        );
                    }
                    Err(e) => {
                        debug!(
                            canonical_model = canonical,
                            provider = provider.name(),
                            error = %e,
                            "Provider fetch failed, using stored pricing"
                        );
                    }
                }
            }
        }

        if let Some(record) = &working {
            self.cache.insert(record).await;
        }

        Ok(self
            .fallback
            .resolve(working.as_ref(), canonical, provider_name)
            .await)
    }

    /// Provider named by the resolution when it can serve the model, else the
    /// first registered provider that can.
    fn serving_provider(&self, canonical: &str, preferred: &str) -> Option<&Arc<dyn PricingProvider>> {
        self.providers
            .iter()
            .find(|p| p.name() == preferred && p.supports_model(canonical))
            .or_else(|| self.providers.iter().find(|p| p.supports_model(canonical)))
    }

    /// Stamp the configured TTL and upsert. On failure the fetched record is
    /// still returned for the current call.
    async fn persist_fetched(&self, mut fetched: ModelPricing) -> ModelPricing {
        let ttl = self.effective_settings().await.provider_cache_ttl();
        fetched.stamp_ttl(ttl);

        match self.repository.upsert_pricing(&fetched).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    canonical_model = %fetched.canonical_model,
                    provider = %fetched.provider,
                    error = %e,
                    "Failed to persist fetched pricing"
                );
                fetched
            }
        }
    }

    async fn effective_settings(&self) -> PricingSettings {
        match self.repository.get_settings().await {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to read pricing settings, using defaults");
                PricingSettings::default()
            }
        }
    }

    // ===== Refresh =====

    /// Pull every provider's catalog into the repository, then empty the cache.
    ///
    /// A failing provider is logged and skipped.
    pub async fn refresh_all(&self) -> Vec<RefreshOutcome> {
        let ttl = self.effective_settings().await.provider_cache_ttl();
        let mut outcomes = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let name = provider.name().to_string();
            let result = match provider.fetch_all().await {
                Ok(mut records) => {
                    for record in &mut records {
                        record.stamp_ttl(ttl);
                    }
                    self.repository
                        .bulk_upsert_pricing(&records)
                        .await
                        .map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(count) => {
                    info!(provider = %name, models = count, "Refreshed provider pricing");
                    outcomes.push(RefreshOutcome {
                        provider: name,
                        models_updated: count,
                        error: None,
                    });
                }
                Err(e) => {
                    error!(provider = %name, error = %e, "Failed to refresh provider pricing");
                    outcomes.push(RefreshOutcome {
                        provider: name,
                        models_updated: 0,
                        error: Some(e),
                    });
                }
            }
        }

        self.cache.clear().await;
        outcomes
    }

    /// Re-fetch one canonical model from the first provider that supports it.
    pub async fn refresh_model(&self, canonical_model: &str) -> Result<ModelPricing, PricingError> {
        let canonical = canonical_model.trim();
        if canonical.is_empty() {
            return Err(PricingError::invalid("canonical_model must not be empty"));
        }

        let provider = self
            .providers
            .iter()
            .find(|p| p.supports_model(canonical))
            .ok_or_else(|| {
                PricingError::NotFound(format!("no provider supports model {}", canonical))
            })?;

        let mut fetched = provider.fetch_model(canonical).await?.ok_or_else(|| {
            PricingError::NotFound(format!(
                "provider {} has no pricing for {}",
                provider.name(),
                canonical
            ))
        })?;

        let ttl = self.effective_settings().await.provider_cache_ttl();
        fetched.stamp_ttl(ttl);
        let stored = self.repository.upsert_pricing(&fetched).await?;

        self.cache.remove_model(canonical).await;
        info!(
            canonical_model = canonical,
            provider = provider.name(),
            "Refreshed model pricing"
        );
        Ok(stored)
    }

    // ===== Introspection =====

    pub async fn get_cache_status(&self) -> Result<CacheStatus, PricingError> {
        let rows = self.repository.get_all_pricing().await?;
        let now = chrono::Utc::now();
        let expired_count = rows.iter().filter(|r| r.is_expired_at(now)).count();

        let probes = self
            .providers
            .iter()
            .filter_map(|p| p.cache_probe())
            .map(|probe| probe.cache_status());
        let providers = join_all(probes).await;

        Ok(CacheStatus {
            total_models: rows.len(),
            expired_count,
            providers,
        })
    }

    pub async fn list_models_with_pricing(&self) -> Result<Vec<ModelPricingView>, PricingError> {
        let mut rows = self.repository.get_all_pricing().await?;
        rows.sort_by(|a, b| {
            a.canonical_model
                .cmp(&b.canonical_model)
                .then_with(|| a.provider.cmp(&b.provider))
        });
        Ok(rows.iter().map(ModelPricingView::from).collect())
    }

    // ===== Aliases =====

    pub async fn resolve_canonical(
        &self,
        runner_model: &str,
        runner_type: &str,
    ) -> Result<ResolvedModel, PricingError> {
        self.resolver.resolve(runner_model, runner_type).await
    }

    pub async fn upsert_alias(&self, alias: &ModelAlias) -> Result<ModelAlias, PricingError> {
        let mut alias = alias.clone();
        alias.runner_model = alias.runner_model.trim().to_string();
        alias.canonical_model = alias.canonical_model.trim().to_string();

        require_non_empty("runner_model", &alias.runner_model)?;
        require_non_empty("runner_type", &alias.runner_type)?;
        require_non_empty("canonical_model", &alias.canonical_model)?;
        require_non_empty("provider", &alias.provider)?;

        Ok(self.repository.upsert_alias(&alias).await?)
    }

    pub async fn list_aliases(&self, runner_type: Option<&str>) -> Result<Vec<ModelAlias>, PricingError> {
        Ok(self.repository.list_aliases(runner_type).await?)
    }

    pub async fn delete_alias(&self, runner_model: &str, runner_type: &str) -> Result<(), PricingError> {
        Ok(self
            .repository
            .delete_alias(runner_model.trim(), runner_type)
            .await?)
    }

    // ===== Overrides =====

    /// Store an override. Cost calculations started after this returns see it.
    pub async fn set_override(
        &self,
        pricing_override: &PricingOverride,
    ) -> Result<PricingOverride, PricingError> {
        let mut ov = pricing_override.clone();
        ov.canonical_model = ov.canonical_model.trim().to_string();

        require_non_empty("canonical_model", &ov.canonical_model)?;
        if !ov.price_per_unit.is_finite() || ov.price_per_unit < 0.0 {
            return Err(PricingError::invalid(format!(
                "price_per_unit must be a non-negative number, got {}",
                ov.price_per_unit
            )));
        }

        let stored = self.repository.upsert_override(&ov).await?;
        self.cache.remove_model(&stored.canonical_model).await;

        info!(
            canonical_model = %stored.canonical_model,
            component = %stored.component,
            price = stored.price_per_unit,
            "Pricing override set"
        );
        Ok(stored)
    }

    pub async fn get_overrides(&self, canonical_model: &str) -> Result<Vec<PricingOverride>, PricingError> {
        Ok(self.repository.get_overrides(canonical_model.trim()).await?)
    }

    pub async fn delete_override(
        &self,
        canonical_model: &str,
        component: PricingComponent,
    ) -> Result<(), PricingError> {
        let canonical = canonical_model.trim();
        self.repository.delete_override(canonical, component).await?;
        self.cache.remove_model(canonical).await;

        info!(canonical_model = canonical, component = %component, "Pricing override deleted");
        Ok(())
    }

    pub async fn cleanup_expired_overrides(&self) -> Result<u64, PricingError> {
        let deleted = self.repository.cleanup_expired_overrides().await?;
        if deleted > 0 {
            info!(deleted, "Removed expired pricing overrides");
        }
        Ok(deleted)
    }

    // ===== Settings =====

    pub async fn get_settings(&self) -> Result<PricingSettings, PricingError> {
        Ok(self.repository.get_settings().await?.unwrap_or_default())
    }

    pub async fn update_settings(&self, settings: &PricingSettings) -> Result<PricingSettings, PricingError> {
        if !(1..=MAX_HISTORICAL_WINDOW_DAYS).contains(&settings.historical_window_days) {
            return Err(PricingError::invalid(format!(
                "historical_window_days must be between 1 and {}",
                MAX_HISTORICAL_WINDOW_DAYS
            )));
        }
        if !(1..=MAX_PROVIDER_CACHE_TTL_SECONDS).contains(&settings.provider_cache_ttl_seconds) {
            return Err(PricingError::invalid(format!(
                "provider_cache_ttl_seconds must be between 1 and {}",
                MAX_PROVIDER_CACHE_TTL_SECONDS
            )));
        }
        Ok(self.repository.update_settings(settings).await?)
    }

    // ===== Usage history =====

    pub async fn record_usage(&self, event: &RunUsageEvent) -> Result<(), PricingError> {
        require_non_empty("canonical_model", event.canonical_model.trim())?;

        let counts = [
            ("input_tokens", event.input_tokens),
            ("output_tokens", event.output_tokens),
            ("cache_read_tokens", event.cache_read_tokens),
            ("cache_creation_tokens", event.cache_creation_tokens),
        ];
        if let Some((field, _)) = counts.iter().find(|(_, v)| *v < 0) {
            return Err(PricingError::invalid(format!("{} must not be negative", field)));
        }

        let costs = [
            ("input_cost_usd", event.input_cost_usd),
            ("output_cost_usd", event.output_cost_usd),
            ("cache_read_cost_usd", event.cache_read_cost_usd),
            ("cache_creation_cost_usd", event.cache_creation_cost_usd),
        ];
        if let Some((field, _)) = costs.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(PricingError::invalid(format!(
                "{} must be a non-negative number",
                field
            )));
        }

        Ok(self.repository.record_usage_event(event).await?)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), PricingError> {
    if value.trim().is_empty() {
        return Err(PricingError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_usage(request: &CostRequest) -> Result<(), PricingError> {
    for component in PricingComponent::ALL {
        if request.count(component) < 0 {
            return Err(PricingError::invalid(format!(
                "usage count for {} must not be negative",
                component
            )));
        }
    }
    Ok(())
}
