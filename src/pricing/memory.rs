use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::pricing::models::{
    HistoricalPricing, ModelAlias, ModelPricing, PricingComponent, PricingOverride,
    PricingSettings, RunUsageEvent,
};
use crate::pricing::repository::{weighted_average, PricingRepository, RepositoryError};

#[derive(Default)]
struct State {
    pricing: HashMap<(String, String), ModelPricing>,
    aliases: HashMap<(String, String), ModelAlias>,
    overrides: HashMap<(String, PricingComponent), PricingOverride>,
    events: Vec<RunUsageEvent>,
    settings: Option<PricingSettings>,
}

/// Process-local repository.
///
/// Used by tests and by embedders that do not need persistence. Every read
/// returns a clone, so callers never alias stored state.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert_pricing_locked(state: &mut State, record: &ModelPricing, now: DateTime<Utc>) -> ModelPricing {
        let key = (record.canonical_model.clone(), record.provider.clone());
        let mut stored = record.clone();

        match state.pricing.get(&key) {
            Some(existing) => {
                stored.id = existing.id.clone();
                stored.created_at = existing.created_at;
            }
            None => {
                stored.id = Uuid::new_v4().to_string();
                stored.created_at = now;
            }
        }
        stored.updated_at = now;
        stored.synthesized = false;

        state.pricing.insert(key, stored.clone());
        stored
    }
}

#[async_trait]
impl PricingRepository for InMemoryRepository {
    async fn get_pricing(
        &self,
        canonical_model: &str,
        provider: &str,
    ) -> Result<Option<ModelPricing>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .pricing
            .get(&(canonical_model.to_string(), provider.to_string()))
            .cloned())
    }

    async fn get_all_pricing(&self) -> Result<Vec<ModelPricing>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.pricing.values().cloned().collect())
    }

    async fn get_pricing_by_provider(
        &self,
        provider: &str,
    ) -> Result<Vec<ModelPricing>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .pricing
            .values()
            .filter(|p| p.provider == provider)
            .cloned()
            .collect())
    }

    async fn get_expired_pricing(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<ModelPricing>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .pricing
            .values()
            .filter(|p| p.is_expired_at(before))
            .cloned()
            .collect())
    }

    async fn upsert_pricing(&self, record: &ModelPricing) -> Result<ModelPricing, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(Self::upsert_pricing_locked(&mut state, record, Utc::now()))
    }

    async fn bulk_upsert_pricing(&self, records: &[ModelPricing]) -> Result<usize, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        for record in records {
            Self::upsert_pricing_locked(&mut state, record, now);
        }
        Ok(records.len())
    }

    async fn delete_pricing(
        &self,
        canonical_model: &str,
        provider: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state
            .pricing
            .remove(&(canonical_model.to_string(), provider.to_string()));
        Ok(())
    }

    async fn get_alias(
        &self,
        runner_model: &str,
        runner_type: &str,
    ) -> Result<Option<ModelAlias>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .aliases
            .get(&(runner_model.to_string(), runner_type.to_string()))
            .cloned())
    }

    async fn list_aliases(
        &self,
        runner_type: Option<&str>,
    ) -> Result<Vec<ModelAlias>, RepositoryError> {
        let state = self.state.read().await;
        let mut aliases: Vec<ModelAlias> = state
            .aliases
            .values()
            .filter(|a| runner_type.map_or(true, |t| a.runner_type == t))
            .cloned()
            .collect();
        aliases.sort_by(|a, b| {
            (&a.runner_type, &a.runner_model).cmp(&(&b.runner_type, &b.runner_model))
        });
        Ok(aliases)
    }

    async fn upsert_alias(&self, alias: &ModelAlias) -> Result<ModelAlias, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let key = (alias.runner_model.clone(), alias.runner_type.clone());
        let mut stored = alias.clone();

        match state.aliases.get(&key) {
            Some(existing) => {
                stored.id = existing.id.clone();
                stored.created_at = existing.created_at;
            }
            None => {
                stored.id = Uuid::new_v4().to_string();
                stored.created_at = now;
            }
        }
        stored.updated_at = now;

        state.aliases.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_alias(&self, runner_model: &str, runner_type: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state
            .aliases
            .remove(&(runner_model.to_string(), runner_type.to_string()));
        Ok(())
    }

    async fn get_overrides(
        &self,
        canonical_model: &str,
    ) -> Result<Vec<PricingOverride>, RepositoryError> {
        let state = self.state.read().await;
        let mut overrides: Vec<PricingOverride> = state
            .overrides
            .values()
            .filter(|o| o.canonical_model == canonical_model)
            .cloned()
            .collect();
        overrides.sort_by_key(|o| o.component);
        Ok(overrides)
    }

    async fn upsert_override(
        &self,
        pricing_override: &PricingOverride,
    ) -> Result<PricingOverride, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let key = (
            pricing_override.canonical_model.clone(),
            pricing_override.component,
        );
        let mut stored = pricing_override.clone();

        match state.overrides.get(&key) {
            Some(existing) => {
                stored.id = existing.id.clone();
                stored.created_at = existing.created_at;
            }
            None => {
                stored.id = Uuid::new_v4().to_string();
                stored.created_at = now;
            }
        }
        stored.updated_at = now;

        state.overrides.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_override(
        &self,
        canonical_model: &str,
        component: PricingComponent,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state
            .overrides
            .remove(&(canonical_model.to_string(), component));
        Ok(())
    }

    async fn cleanup_expired_overrides(&self) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let before = state.overrides.len();
        state
            .overrides
            .retain(|_, o| o.expires_at.map_or(true, |expiry| expiry > now));
        Ok((before - state.overrides.len()) as u64)
    }

    async fn record_usage_event(&self, event: &RunUsageEvent) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.events.push(event.clone());
        Ok(())
    }

    async fn get_historical_averages(
        &self,
        canonical_model: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<HistoricalPricing>, RepositoryError> {
        let state = self.state.read().await;

        let mut sample_count = 0i64;
        let mut tokens = [0i64; 4];
        let mut costs = [0f64; 4];

        for event in state
            .events
            .iter()
            .filter(|e| e.canonical_model == canonical_model && e.occurred_at >= since)
        {
            sample_count += 1;
            tokens[0] += event.input_tokens;
            tokens[1] += event.output_tokens;
            tokens[2] += event.cache_read_tokens;
            tokens[3] += event.cache_creation_tokens;
            costs[0] += event.input_cost_usd;
            costs[1] += event.output_cost_usd;
            costs[2] += event.cache_read_cost_usd;
            costs[3] += event.cache_creation_cost_usd;
        }

        if sample_count == 0 {
            return Ok(None);
        }

        Ok(Some(HistoricalPricing {
            canonical_model: canonical_model.to_string(),
            input_avg: weighted_average(costs[0], tokens[0]),
            output_avg: weighted_average(costs[1], tokens[1]),
            cache_read_avg: weighted_average(costs[2], tokens[2]),
            cache_creation_avg: weighted_average(costs[3], tokens[3]),
            sample_count,
        }))
    }

    async fn get_settings(&self) -> Result<Option<PricingSettings>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.settings.clone())
    }

    async fn update_settings(
        &self,
        settings: &PricingSettings,
    ) -> Result<PricingSettings, RepositoryError> {
        let mut state = self.state.write().await;
        let mut stored = settings.clone();
        stored.updated_at = Utc::now();
        state.settings = Some(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::models::PriceSource;
    use chrono::Duration;

    fn sample_record() -> ModelPricing {
        ModelPricing::new("anthropic/claude-3-opus", "openrouter", Duration::hours(6))
            .with_price(PricingComponent::InputTokens, 3e-6, PriceSource::ProviderApi)
            .with_price(PricingComponent::OutputTokens, 15e-6, PriceSource::ProviderApi)
    }

    #[tokio::test]
    async fn test_upsert_then_get_round_trip() {
        let repo = InMemoryRepository::new();
        let stored = repo.upsert_pricing(&sample_record()).await.unwrap();
        assert!(stored.is_persisted());

        let fetched = repo
            .get_pricing("anthropic/claude-3-opus", "openrouter")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_upsert_twice_preserves_identity() {
        let repo = InMemoryRepository::new();
        let first = repo.upsert_pricing(&sample_record()).await.unwrap();

        let mut changed = sample_record();
        changed
            .prices
            .set(PricingComponent::InputTokens, 4e-6, PriceSource::ProviderApi);
        let second = repo.upsert_pricing(&changed).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.prices.price(PricingComponent::InputTokens), Some(4e-6));
    }

    #[tokio::test]
    async fn test_returned_records_are_copies() {
        let repo = InMemoryRepository::new();
        repo.upsert_pricing(&sample_record()).await.unwrap();

        let mut fetched = repo
            .get_pricing("anthropic/claude-3-opus", "openrouter")
            .await
            .unwrap()
            .unwrap();
        fetched.prices.clear(PricingComponent::InputTokens);

        let again = repo
            .get_pricing("anthropic/claude-3-opus", "openrouter")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.prices.price(PricingComponent::InputTokens), Some(3e-6));
    }

    #[tokio::test]
    async fn test_cleanup_expired_overrides_is_idempotent() {
        let repo = InMemoryRepository::new();
        let mut expired = PricingOverride::new("openai/gpt-4o", PricingComponent::InputTokens, 1e-6);
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        let mut active = PricingOverride::new("openai/gpt-4o", PricingComponent::OutputTokens, 2e-6);
        active.expires_at = Some(Utc::now() + Duration::hours(1));
        let permanent = PricingOverride::new("openai/gpt-4o", PricingComponent::CacheRead, 1e-7);

        for o in [&expired, &active, &permanent] {
            repo.upsert_override(o).await.unwrap();
        }

        assert_eq!(repo.cleanup_expired_overrides().await.unwrap(), 1);
        assert_eq!(repo.cleanup_expired_overrides().await.unwrap(), 0);
        assert_eq!(repo.get_overrides("openai/gpt-4o").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_historical_averages_respect_window() {
        let repo = InMemoryRepository::new();
        let now = Utc::now();

        repo.record_usage_event(&RunUsageEvent {
            canonical_model: "openai/gpt-4o".to_string(),
            runner_type: "codex".to_string(),
            occurred_at: now - Duration::days(30),
            input_tokens: 1000,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            input_cost_usd: 1.0,
            output_cost_usd: 0.0,
            cache_read_cost_usd: 0.0,
            cache_creation_cost_usd: 0.0,
        })
        .await
        .unwrap();

        assert!(repo
            .get_historical_averages("openai/gpt-4o", now - Duration::days(7))
            .await
            .unwrap()
            .is_none());

        repo.record_usage_event(&RunUsageEvent {
            canonical_model: "openai/gpt-4o".to_string(),
            runner_type: "codex".to_string(),
            occurred_at: now,
            input_tokens: 2000,
            output_tokens: 500,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            input_cost_usd: 0.004,
            output_cost_usd: 0.005,
            cache_read_cost_usd: 0.0,
            cache_creation_cost_usd: 0.0,
        })
        .await
        .unwrap();

        let hist = repo
            .get_historical_averages("openai/gpt-4o", now - Duration::days(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hist.sample_count, 1);
        assert!((hist.input_avg.unwrap() - 2e-6).abs() < 1e-15);
        assert!((hist.output_avg.unwrap() - 1e-5).abs() < 1e-15);
        assert_eq!(hist.cache_read_avg, None);
    }

    #[tokio::test]
    async fn test_settings_singleton() {
        let repo = InMemoryRepository::new();
        assert!(repo.get_settings().await.unwrap().is_none());

        let settings = PricingSettings {
            historical_window_days: 14,
            ..Default::default()
        };
        repo.update_settings(&settings).await.unwrap();

        let stored = repo.get_settings().await.unwrap().unwrap();
        assert_eq!(stored.historical_window_days, 14);
    }
}
