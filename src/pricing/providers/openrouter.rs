use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{parse_price, CatalogSnapshot};
use crate::pricing::models::{
    ModelPricing, PriceSource, PricingComponent, ProviderCacheStatus,
    DEFAULT_PROVIDER_CACHE_TTL_SECONDS,
};
use crate::pricing::provider::{PricingProvider, ProviderCacheProbe, ProviderError};

pub const PROVIDER_NAME: &str = "openrouter";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Structs for the `/models` endpoint. Prices are decimal strings in USD per token.

#[derive(Deserialize)]
struct ModelsListResponse {
    data: Vec<ModelListItem>,
}

#[derive(Deserialize)]
struct ModelListItem {
    id: String,
    #[serde(default)]
    pricing: Option<ModelListPricing>,
}

#[derive(Deserialize, Default)]
struct ModelListPricing {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    completion: Option<String>,
    #[serde(default)]
    input_cache_read: Option<String>,
    #[serde(default)]
    input_cache_write: Option<String>,
    #[serde(default)]
    web_search: Option<String>,
}

/// Catalog backed by OpenRouter's public model list
pub struct OpenRouterProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    refresh_interval: Duration,
    snapshot: CatalogSnapshot,
}

impl OpenRouterProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        refresh_interval: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            refresh_interval,
            snapshot: CatalogSnapshot::new(refresh_interval),
        })
    }

    async fn download(&self) -> Result<Vec<ModelPricing>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        debug!(url = %url, "Fetching OpenRouter model catalog");

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ModelsListResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let records: Vec<ModelPricing> = body.data.into_iter().filter_map(map_model).collect();
        info!(models = records.len(), "Fetched OpenRouter pricing");
        Ok(records)
    }
}

fn map_model(item: ModelListItem) -> Option<ModelPricing> {
    let pricing = item.pricing?;
    let mut record = ModelPricing::new(
        &item.id,
        PROVIDER_NAME,
        ChronoDuration::seconds(DEFAULT_PROVIDER_CACHE_TTL_SECONDS as i64),
    );

    let fields = [
        (PricingComponent::InputTokens, &pricing.prompt),
        (PricingComponent::OutputTokens, &pricing.completion),
        (PricingComponent::CacheRead, &pricing.input_cache_read),
        (PricingComponent::CacheCreation, &pricing.input_cache_write),
        (PricingComponent::WebSearch, &pricing.web_search),
    ];
    for (component, value) in fields {
        if let Some(price) = value.as_deref().and_then(parse_price) {
            record.prices.set(component, price, PriceSource::ProviderApi);
        }
    }

    if record.prices.iter().next().is_none() {
        return None;
    }
    Some(record)
}

#[async_trait]
impl PricingProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_model(&self, canonical_model: &str) -> bool {
        canonical_model.contains('/')
    }

    async fn fetch_all(&self) -> Result<Vec<ModelPricing>, ProviderError> {
        match self.download().await {
            Ok(records) => {
                self.snapshot.store(&records).await;
                Ok(records)
            }
            Err(e) => {
                self.snapshot.record_error(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn fetch_model(
        &self,
        canonical_model: &str,
    ) -> Result<Option<ModelPricing>, ProviderError> {
        if let Some(hit) = self.snapshot.lookup(canonical_model).await {
            return Ok(hit);
        }

        let records = self.fetch_all().await?;
        Ok(records
            .into_iter()
            .find(|r| r.canonical_model == canonical_model))
    }

    fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    fn cache_probe(&self) -> Option<&dyn ProviderCacheProbe> {
        Some(self)
    }
}

#[async_trait]
impl ProviderCacheProbe for OpenRouterProvider {
    async fn cache_status(&self) -> ProviderCacheStatus {
        self.snapshot.status(PROVIDER_NAME).await
    }
}
