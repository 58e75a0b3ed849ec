use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::pricing::models::ModelPricing;

struct CacheEntry {
    record: ModelPricing,
    expires_at: DateTime<Utc>,
}

/// Process-local accelerator keyed by `canonical:provider`.
///
/// Every read and write copies the record, so no caller shares state with an
/// entry. Guards are dropped before returning and never live across I/O.
#[derive(Default)]
pub struct PricingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

pub fn cache_key(canonical_model: &str, provider: &str) -> String {
    format!("{}:{}", canonical_model, provider)
}

impl PricingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the entry if it is still fresh.
    pub async fn get(&self, canonical_model: &str, provider: &str) -> Option<ModelPricing> {
        self.get_at(canonical_model, provider, Utc::now()).await
    }

    pub async fn get_at(
        &self,
        canonical_model: &str,
        provider: &str,
        now: DateTime<Utc>,
    ) -> Option<ModelPricing> {
        let entries = self.entries.read().await;
        entries
            .get(&cache_key(canonical_model, provider))
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.record.clone())
    }

    /// Store a copy, valid until the record's own `expires_at`.
    pub async fn insert(&self, record: &ModelPricing) {
        let key = cache_key(&record.canonical_model, &record.provider);
        let entry = CacheEntry {
            record: record.clone(),
            expires_at: record.expires_at,
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn remove(&self, canonical_model: &str, provider: &str) {
        self.entries
            .write()
            .await
            .remove(&cache_key(canonical_model, provider));
    }

    /// Drop every entry of a canonical model, whatever its provider.
    pub async fn remove_model(&self, canonical_model: &str) -> usize {
        let prefix = format!("{}:", canonical_model);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::models::{PriceSource, PricingComponent};
    use chrono::Duration;

    fn record(canonical: &str, provider: &str) -> ModelPricing {
        ModelPricing::new(canonical, provider, Duration::hours(1)).with_price(
            PricingComponent::InputTokens,
            3e-6,
            PriceSource::ProviderApi,
        )
    }

    #[tokio::test]
    async fn test_hit_returns_independent_copy() {
        let cache = PricingCache::new();
        cache.insert(&record("openai/gpt-4o", "openrouter")).await;

        let mut hit = cache.get("openai/gpt-4o", "openrouter").await.unwrap();
        hit.prices.clear(PricingComponent::InputTokens);

        let again = cache.get("openai/gpt-4o", "openrouter").await.unwrap();
        assert_eq!(again.prices.price(PricingComponent::InputTokens), Some(3e-6));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = PricingCache::new();
        let entry = record("openai/gpt-4o", "openrouter");
        cache.insert(&entry).await;

        assert!(cache
            .get_at("openai/gpt-4o", "openrouter", entry.expires_at)
            .await
            .is_none());
        assert!(cache
            .get_at("openai/gpt-4o", "openrouter", entry.expires_at - Duration::seconds(1))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_remove_model_matches_whole_canonical_only() {
        let cache = PricingCache::new();
        cache.insert(&record("openai/gpt-4o", "openrouter")).await;
        cache.insert(&record("openai/gpt-4o", "litellm")).await;
        cache.insert(&record("openai/gpt-4o-mini", "openrouter")).await;

        assert_eq!(cache.remove_model("openai/gpt-4o").await, 2);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("openai/gpt-4o-mini", "openrouter").await.is_some());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = PricingCache::new();
        cache.insert(&record("openai/gpt-4o", "openrouter")).await;
        cache.insert(&record("anthropic/claude-3-opus", "openrouter")).await;

        cache.remove("openai/gpt-4o", "openrouter").await;
        assert!(cache.get("openai/gpt-4o", "openrouter").await.is_none());
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
