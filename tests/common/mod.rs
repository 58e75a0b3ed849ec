#![allow(dead_code)]

use agent_pricing::pricing::{
    memory::InMemoryRepository,
    models::{
        HistoricalPricing, ModelAlias, ModelPricing, PriceSource, PricingComponent,
        PricingOverride, PricingSettings, RunUsageEvent,
    },
    PricingProvider, PricingRepository, PricingService, ProviderError, RepositoryError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const OPUS: &str = "anthropic/claude-3-opus";

pub fn assert_close(actual: f64, expected: f64) {
    let tolerance = 1e-12_f64.max(expected.abs() * 1e-9);
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// Provider serving a scripted catalog
pub struct ScriptedProvider {
    name: String,
    prefix: String,
    records: Mutex<Vec<ModelPricing>>,
    failing: AtomicBool,
    pub fetch_model_calls: AtomicUsize,
    pub fetch_all_calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Provider supporting every canonical model starting with `prefix`
    pub fn new(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            records: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            fetch_model_calls: AtomicUsize::new(0),
            fetch_all_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_record(self, record: ModelPricing) -> Self {
        self.set_records(vec![record]);
        self
    }

    pub fn set_records(&self, records: Vec<ModelPricing>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PricingProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_model(&self, canonical_model: &str) -> bool {
        canonical_model.starts_with(&self.prefix)
    }

    async fn fetch_all(&self) -> Result<Vec<ModelPricing>, ProviderError> {
        self.fetch_all_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.records.lock().unwrap().clone())
    }

    async fn fetch_model(
        &self,
        canonical_model: &str,
    ) -> Result<Option<ModelPricing>, ProviderError> {
        self.fetch_model_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.canonical_model == canonical_model)
            .cloned())
    }

    fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(3600)
    }
}

/// Provider row with `provider_api` prices
pub fn provider_row(canonical: &str, provider: &str, prices: &[(PricingComponent, f64)]) -> ModelPricing {
    prices.iter().fold(
        ModelPricing::new(canonical, provider, Duration::hours(6)),
        |record, (component, price)| record.with_price(*component, *price, PriceSource::ProviderApi),
    )
}

/// One usage event whose token-weighted averages are exactly the given prices
pub fn usage_event(canonical: &str, input_avg: f64, output_avg: f64, samples: i64) -> Vec<RunUsageEvent> {
    (0..samples)
        .map(|_| RunUsageEvent {
            canonical_model: canonical.to_string(),
            runner_type: "claude-code".to_string(),
            occurred_at: Utc::now() - Duration::hours(1),
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            input_cost_usd: input_avg * 1_000_000.0,
            output_cost_usd: output_avg * 1_000_000.0,
            cache_read_cost_usd: 0.0,
            cache_creation_cost_usd: 0.0,
        })
        .collect()
}

pub fn service_with(
    repo: Arc<dyn PricingRepository>,
    providers: Vec<Arc<dyn PricingProvider>>,
) -> Arc<PricingService> {
    Arc::new(PricingService::new(repo, providers))
}

pub fn alias(runner_model: &str, runner_type: &str, canonical: &str) -> ModelAlias {
    ModelAlias::new(runner_model, runner_type, canonical, "openrouter")
}

/// In-memory repository whose reads can be made to fail on demand
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: InMemoryRepository,
    pub fail_overrides: AtomicBool,
    pub fail_pricing: AtomicBool,
    pub fail_upserts: AtomicBool,
}

fn injected() -> RepositoryError {
    RepositoryError::Corrupt("injected failure".to_string())
}

#[async_trait]
impl PricingRepository for FlakyRepository {
    async fn get_pricing(
        &self,
        canonical_model: &str,
        provider: &str,
    ) -> Result<Option<ModelPricing>, RepositoryError> {
        if self.fail_pricing.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.get_pricing(canonical_model, provider).await
    }

    async fn get_all_pricing(&self) -> Result<Vec<ModelPricing>, RepositoryError> {
        self.inner.get_all_pricing().await
    }

    async fn get_pricing_by_provider(&self, provider: &str) -> Result<Vec<ModelPricing>, RepositoryError> {
        self.inner.get_pricing_by_provider(provider).await
    }

    async fn get_expired_pricing(&self, before: DateTime<Utc>) -> Result<Vec<ModelPricing>, RepositoryError> {
        self.inner.get_expired_pricing(before).await
    }

    async fn upsert_pricing(&self, record: &ModelPricing) -> Result<ModelPricing, RepositoryError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.upsert_pricing(record).await
    }

    async fn bulk_upsert_pricing(&self, records: &[ModelPricing]) -> Result<usize, RepositoryError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.bulk_upsert_pricing(records).await
    }

    async fn delete_pricing(&self, canonical_model: &str, provider: &str) -> Result<(), RepositoryError> {
        self.inner.delete_pricing(canonical_model, provider).await
    }

    async fn get_alias(
        &self,
        runner_model: &str,
        runner_type: &str,
    ) -> Result<Option<ModelAlias>, RepositoryError> {
        self.inner.get_alias(runner_model, runner_type).await
    }

    async fn list_aliases(&self, runner_type: Option<&str>) -> Result<Vec<ModelAlias>, RepositoryError> {
        self.inner.list_aliases(runner_type).await
    }

    async fn upsert_alias(&self, alias: &ModelAlias) -> Result<ModelAlias, RepositoryError> {
        self.inner.upsert_alias(alias).await
    }

    async fn delete_alias(&self, runner_model: &str, runner_type: &str) -> Result<(), RepositoryError> {
        self.inner.delete_alias(runner_model, runner_type).await
    }

    async fn get_overrides(&self, canonical_model: &str) -> Result<Vec<PricingOverride>, RepositoryError> {
        if self.fail_overrides.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.get_overrides(canonical_model).await
    }

    async fn upsert_override(
        &self,
        pricing_override: &PricingOverride,
    ) -> Result<PricingOverride, RepositoryError> {
        self.inner.upsert_override(pricing_override).await
    }

    async fn delete_override(
        &self,
        canonical_model: &str,
        component: PricingComponent,
    ) -> Result<(), RepositoryError> {
        self.inner.delete_override(canonical_model, component).await
    }

    async fn cleanup_expired_overrides(&self) -> Result<u64, RepositoryError> {
        self.inner.cleanup_expired_overrides().await
    }

    async fn record_usage_event(&self, event: &RunUsageEvent) -> Result<(), RepositoryError> {
        self.inner.record_usage_event(event).await
    }

    async fn get_historical_averages(
        &self,
        canonical_model: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<HistoricalPricing>, RepositoryError> {
        self.inner.get_historical_averages(canonical_model, since).await
    }

    async fn get_settings(&self) -> Result<Option<PricingSettings>, RepositoryError> {
        self.inner.get_settings().await
    }

    async fn update_settings(&self, settings: &PricingSettings) -> Result<PricingSettings, RepositoryError> {
        self.inner.update_settings(settings).await
    }
}
