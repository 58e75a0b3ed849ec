use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

use super::{valid_price, CatalogSnapshot};
use crate::pricing::models::{
    ModelPricing, PriceSource, PricingComponent, ProviderCacheStatus,
    DEFAULT_PROVIDER_CACHE_TTL_SECONDS,
};
use crate::pricing::provider::{PricingProvider, ProviderCacheProbe, ProviderError};

pub const PROVIDER_NAME: &str = "litellm";
pub const DEFAULT_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";

/// LiteLLM provider tags we map, with the canonical vendor prefix they become.
const VENDORS: &[(&str, &str)] = &[
    ("openai", "openai"),
    ("anthropic", "anthropic"),
    ("gemini", "google"),
];

/// Individual model pricing data
#[derive(Debug, Deserialize)]
struct ModelPriceData {
    #[serde(default)]
    input_cost_per_token: Option<f64>,
    #[serde(default)]
    output_cost_per_token: Option<f64>,
    #[serde(default)]
    cache_creation_input_token_cost: Option<f64>,
    #[serde(default)]
    cache_read_input_token_cost: Option<f64>,
    #[serde(default)]
    search_context_cost_per_query: Option<SearchContextCost>,
    #[serde(default)]
    litellm_provider: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchContextCost {
    #[serde(default)]
    search_context_size_medium: Option<f64>,
}

/// Catalog backed by the LiteLLM community price sheet
pub struct LiteLlmProvider {
    client: reqwest::Client,
    url: String,
    refresh_interval: Duration,
    snapshot: CatalogSnapshot,
}

impl LiteLlmProvider {
    pub fn new(url: &str, timeout: Duration, refresh_interval: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            refresh_interval,
            snapshot: CatalogSnapshot::new(refresh_interval),
        })
    }

    async fn download(&self) -> Result<Vec<ModelPricing>, ProviderError> {
        info!("Downloading pricing data from: {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content = response.text().await?;
        debug!("Downloaded {} bytes of pricing data", content.len());
        parse_pricing_json(&content)
    }
}

/// Parse the LiteLLM document into provider rows.
///
/// Entries that fail to decode are skipped rather than failing the whole sheet.
fn parse_pricing_json(json: &str) -> Result<Vec<ModelPricing>, ProviderError> {
    let data: HashMap<String, serde_json::Value> =
        serde_json::from_str(json).map_err(|e| ProviderError::Decode(e.to_string()))?;

    // Sorted so unprefixed keys ("gemini-2.0-flash") win over routed ones ("gemini/gemini-2.0-flash")
    let sorted: BTreeMap<String, serde_json::Value> = data.into_iter().collect();
    let ttl = ChronoDuration::seconds(DEFAULT_PROVIDER_CACHE_TTL_SECONDS as i64);
    let mut records: BTreeMap<String, ModelPricing> = BTreeMap::new();

    for (model_name, value) in sorted {
        if model_name == "sample_spec" {
            continue;
        }

        let Ok(price_data) = serde_json::from_value::<ModelPriceData>(value) else {
            continue;
        };

        // Only include chat models
        if price_data.mode.as_deref() != Some("chat") {
            continue;
        }

        let Some(vendor) = price_data
            .litellm_provider
            .as_deref()
            .and_then(|p| VENDORS.iter().find(|(tag, _)| *tag == p).map(|(_, v)| *v))
        else {
            continue;
        };

        let base_name = model_name.rsplit('/').next().unwrap_or(&model_name);
        let canonical = format!("{}/{}", vendor, base_name);
        if records.contains_key(&canonical) {
            continue;
        }

        let mut record = ModelPricing::new(&canonical, PROVIDER_NAME, ttl);
        let fields = [
            (PricingComponent::InputTokens, price_data.input_cost_per_token),
            (PricingComponent::OutputTokens, price_data.output_cost_per_token),
            (PricingComponent::CacheRead, price_data.cache_read_input_token_cost),
            (PricingComponent::CacheCreation, price_data.cache_creation_input_token_cost),
            (
                PricingComponent::WebSearch,
                price_data
                    .search_context_cost_per_query
                    .and_then(|c| c.search_context_size_medium),
            ),
        ];
        for (component, value) in fields {
            if let Some(price) = valid_price(value) {
                record.prices.set(component, price, PriceSource::ProviderApi);
            }
        }

        // Skip models without pricing data
        if record.prices.iter().next().is_none() {
            continue;
        }
        records.insert(canonical, record);
    }

    info!("Parsed {} model prices", records.len());
    Ok(records.into_values().collect())
}

#[async_trait]
impl PricingProvider for LiteLlmProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn supports_model(&self, canonical_model: &str) -> bool {
        VENDORS.iter().any(|(_, vendor)| {
            canonical_model
                .strip_prefix(vendor)
                .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
        })
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
impl ProviderCacheProbe for LiteLlmProvider {
    async fn cache_status(&self) -> ProviderCacheStatus {
        self.snapshot.status(PROVIDER_NAME).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "sample_spec": { "max_tokens": "LEGACY parameter", "mode": "one of chat, embedding" },
        "claude-3-opus-20240229": {
            "input_cost_per_token": 0.000015,
            "output_cost_per_token": 0.000075,
            "cache_read_input_token_cost": 0.0000015,
            "litellm_provider": "anthropic",
            "mode": "chat"
        },
        "gpt-4o": {
            "input_cost_per_token": 0.0000025,
            "output_cost_per_token": 0.00001,
            "search_context_cost_per_query": { "search_context_size_medium": 0.035 },
            "litellm_provider": "openai",
            "mode": "chat"
        },
        "gemini-2.0-flash": {
            "input_cost_per_token": 1e-7,
            "output_cost_per_token": 4e-7,
            "litellm_provider": "gemini",
            "mode": "chat"
        },
        "gemini/gemini-2.0-flash": {
            "input_cost_per_token": 9e-7,
            "output_cost_per_token": 9e-7,
            "litellm_provider": "gemini",
            "mode": "chat"
        },
        "text-embedding-3-small": {
            "input_cost_per_token": 2e-8,
            "litellm_provider": "openai",
            "mode": "embedding"
        },
        "bedrock/claude": {
            "input_cost_per_token": 1e-6,
            "litellm_provider": "bedrock",
            "mode": "chat"
        }
    }"#;

    #[test]
    fn test_parse_pricing_json_maps_vendors() {
        let records = parse_pricing_json(SAMPLE).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.canonical_model.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "anthropic/claude-3-opus-20240229",
                "google/gemini-2.0-flash",
                "openai/gpt-4o"
            ]
        );

        let gemini = &records[1];
        assert_eq!(gemini.prices.price(PricingComponent::InputTokens), Some(1e-7));

        let gpt = &records[2];
        assert_eq!(gpt.prices.price(PricingComponent::WebSearch), Some(0.035));
        assert_eq!(gpt.provider, "litellm");
    }

    #[test]
    fn test_parse_pricing_json_rejects_garbage() {
        assert!(matches!(
            parse_pricing_json("not json"),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_supports_model() {
        let provider =
            LiteLlmProvider::new(DEFAULT_URL, Duration::from_secs(5), Duration::from_secs(60)).unwrap();
        assert!(provider.supports_model("anthropic/claude-3-opus"));
        assert!(provider.supports_model("google/gemini-2.0-flash"));
        assert!(!provider.supports_model("meta-llama/llama-3.1-70b-instruct"));
        assert!(!provider.supports_model("openai/"));
        assert!(!provider.supports_model("openaix/gpt"));
    }
}
