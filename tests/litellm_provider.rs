use agent_pricing::pricing::{
    providers::LiteLlmProvider, PricingComponent, PricingProvider, ProviderError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn price_sheet() -> serde_json::Value {
    json!({
        "sample_spec": { "input_cost_per_token": 0.0, "mode": "chat", "litellm_provider": "openai" },
        "gpt-4o": {
            "input_cost_per_token": 2.5e-6,
            "output_cost_per_token": 1e-5,
            "cache_read_input_token_cost": 1.25e-6,
            "search_context_cost_per_query": {
                "search_context_size_low": 0.03,
                "search_context_size_medium": 0.035
            },
            "litellm_provider": "openai",
            "mode": "chat"
        },
        "claude-3-opus-20240229": {
            "input_cost_per_token": 1.5e-5,
            "output_cost_per_token": 7.5e-5,
            "cache_creation_input_token_cost": 1.875e-5,
            "litellm_provider": "anthropic",
            "mode": "chat"
        },
        "gemini/gemini-2.0-flash": {
            "input_cost_per_token": 1e-7,
            "output_cost_per_token": 4e-7,
            "litellm_provider": "gemini",
            "mode": "chat"
        },
        "text-embedding-3-small": {
            "input_cost_per_token": 2e-8,
            "litellm_provider": "openai",
            "mode": "embedding"
        },
        "bedrock/anthropic.claude-v2": {
            "input_cost_per_token": 8e-6,
            "litellm_provider": "bedrock",
            "mode": "chat"
        },
        "broken-entry": { "input_cost_per_token": "not a number", "mode": "chat" }
    })
}

async fn serve(body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prices.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn provider(server: &MockServer) -> LiteLlmProvider {
    LiteLlmProvider::new(
        &format!("{}/prices.json", server.uri()),
        Duration::from_secs(5),
        Duration::from_secs(3600),
    )
    .unwrap()
}

#[tokio::test]
async fn test_fetch_all_keeps_chat_models_of_known_vendors() {
    let server = serve(price_sheet()).await;
    let records = provider(&server).fetch_all().await.unwrap();

    let mut names: Vec<&str> = records.iter().map(|r| r.canonical_model.as_str()).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "anthropic/claude-3-opus-20240229",
            "google/gemini-2.0-flash",
            "openai/gpt-4o",
        ]
    );
    assert!(records.iter().all(|r| r.provider == "litellm"));
}

#[tokio::test]
async fn test_component_mapping() {
    let server = serve(price_sheet()).await;
    let provider = provider(&server);

    let gpt = provider.fetch_model("openai/gpt-4o").await.unwrap().unwrap();
    assert_eq!(gpt.prices.price(PricingComponent::InputTokens), Some(2.5e-6));
    assert_eq!(gpt.prices.price(PricingComponent::CacheRead), Some(1.25e-6));
    assert_eq!(gpt.prices.price(PricingComponent::WebSearch), Some(0.035));
    assert_eq!(gpt.prices.price(PricingComponent::CacheCreation), None);

    let opus = provider
        .fetch_model("anthropic/claude-3-opus-20240229")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opus.prices.price(PricingComponent::CacheCreation), Some(1.875e-5));

    assert!(provider.fetch_model("openai/gpt-unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn test_supports_model() {
    let server = MockServer::start().await;
    let provider = provider(&server);

    assert!(provider.supports_model("openai/gpt-4o"));
    assert!(provider.supports_model("google/gemini-2.5-pro"));
    assert!(!provider.supports_model("openai/"));
    assert!(!provider.supports_model("openaix/gpt"));
    assert!(!provider.supports_model("meta-llama/llama-3.1-70b-instruct"));
    assert!(!provider.supports_model("gpt-4o"));
}

#[tokio::test]
async fn test_non_object_document_is_decode_error() {
    let server = serve(json!(["not", "a", "map"])).await;
    let err = provider(&server).fetch_all().await.unwrap_err();
    assert!(matches!(err, ProviderError::Decode(_)));
}

#[tokio::test]
async fn test_missing_sheet_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = provider(&server).fetch_all().await.unwrap_err();
    assert!(matches!(err, ProviderError::Status { status: 404, .. }));
}
