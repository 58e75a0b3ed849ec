//! Pricing HTTP API handlers
//!
//! Thin JSON layer over `PricingService`. Every handler runs under the
//! configured request timeout; expiry is reported as 504.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::PricingError;
use crate::pricing::models::{
    CacheStatus, CostCalculation, CostRequest, ModelAlias, ModelPricingView, PricingComponent,
    PricingOverride, PricingSettings, RefreshOutcome, ResolvedModel, RunUsageEvent,
};
use crate::pricing::service::PricingService;

/// Shared state for pricing API
#[derive(Clone)]
pub struct PricingState {
    pub service: Arc<PricingService>,
    pub request_timeout: Duration,
}

async fn with_deadline<T>(
    state: &PricingState,
    fut: impl Future<Output = Result<T, PricingError>>,
) -> Result<T, PricingError> {
    tokio::time::timeout(state.request_timeout, fut).await?
}

/// Query parameters naming a runner model
#[derive(Debug, Deserialize)]
pub struct ModelQuery {
    pub model: String,
    #[serde(default)]
    pub runner_type: String,
}

#[derive(Debug, Deserialize)]
pub struct AliasListQuery {
    pub runner_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AliasKeyQuery {
    pub runner_model: String,
    #[serde(default)]
    pub runner_type: String,
}

#[derive(Debug, Deserialize)]
pub struct OverrideListQuery {
    pub canonical_model: String,
}

#[derive(Debug, Deserialize)]
pub struct OverrideKeyQuery {
    pub canonical_model: String,
    pub component: PricingComponent,
}

#[derive(Debug, Deserialize)]
pub struct RefreshModelRequest {
    pub canonical_model: String,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub total: usize,
    pub models: Vec<ModelPricingView>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub providers: Vec<RefreshOutcome>,
}

/// POST /api/pricing/cost
pub async fn calculate_cost(
    State(state): State<PricingState>,
    Json(request): Json<CostRequest>,
) -> Result<Json<CostCalculation>, PricingError> {
    let calculation = with_deadline(&state, state.service.calculate_cost(&request)).await?;
    Ok(Json(calculation))
}

/// GET /api/pricing/effective?model=claude-3-opus&runner_type=claude-code
pub async fn get_effective_pricing(
    State(state): State<PricingState>,
    Query(params): Query<ModelQuery>,
) -> Result<Json<ModelPricingView>, PricingError> {
    let record = with_deadline(
        &state,
        state.service.get_model_pricing(&params.model, &params.runner_type),
    )
    .await?;
    Ok(Json(ModelPricingView::from(&record)))
}

/// GET /api/pricing/resolve?model=gpt-4o&runner_type=codex
pub async fn resolve_model(
    State(state): State<PricingState>,
    Query(params): Query<ModelQuery>,
) -> Result<Json<ResolvedModel>, PricingError> {
    let resolved = with_deadline(
        &state,
        state.service.resolve_canonical(&params.model, &params.runner_type),
    )
    .await?;
    Ok(Json(resolved))
}

/// GET /api/pricing/models
pub async fn list_models(
    State(state): State<PricingState>,
) -> Result<Json<ModelsResponse>, PricingError> {
    let models = with_deadline(&state, state.service.list_models_with_pricing()).await?;
    Ok(Json(ModelsResponse {
        total: models.len(),
        models,
    }))
}

/// GET /api/pricing/cache-status
pub async fn cache_status(
    State(state): State<PricingState>,
) -> Result<Json<CacheStatus>, PricingError> {
    let status = with_deadline(&state, state.service.get_cache_status()).await?;
    Ok(Json(status))
}

/// POST /api/pricing/refresh
pub async fn refresh_all(
    State(state): State<PricingState>,
) -> Result<Json<RefreshResponse>, PricingError> {
    let providers = with_deadline(&state, async { Ok(state.service.refresh_all().await) }).await?;
    Ok(Json(RefreshResponse { providers }))
}

/// POST /api/pricing/refresh/model
pub async fn refresh_model(
    State(state): State<PricingState>,
    Json(request): Json<RefreshModelRequest>,
) -> Result<Json<ModelPricingView>, PricingError> {
    let record = with_deadline(&state, state.service.refresh_model(&request.canonical_model)).await?;
    Ok(Json(ModelPricingView::from(&record)))
}

/// GET /api/pricing/aliases?runner_type=codex
pub async fn list_aliases(
    State(state): State<PricingState>,
    Query(params): Query<AliasListQuery>,
) -> Result<Json<Vec<ModelAlias>>, PricingError> {
    let aliases = with_deadline(
        &state,
        state.service.list_aliases(params.runner_type.as_deref()),
    )
    .await?;
    Ok(Json(aliases))
}

/// PUT /api/pricing/aliases
pub async fn upsert_alias(
    State(state): State<PricingState>,
    Json(alias): Json<ModelAlias>,
) -> Result<Json<ModelAlias>, PricingError> {
    let stored = with_deadline(&state, state.service.upsert_alias(&alias)).await?;
    Ok(Json(stored))
}

/// DELETE /api/pricing/aliases?runner_model=fast&runner_type=codex
pub async fn delete_alias(
    State(state): State<PricingState>,
    Query(params): Query<AliasKeyQuery>,
) -> Result<StatusCode, PricingError> {
    with_deadline(
        &state,
        state
            .service
            .delete_alias(&params.runner_model, &params.runner_type),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/pricing/overrides?canonical_model=openai/gpt-4o
pub async fn get_overrides(
    State(state): State<PricingState>,
    Query(params): Query<OverrideListQuery>,
) -> Result<Json<Vec<PricingOverride>>, PricingError> {
    let overrides = with_deadline(&state, state.service.get_overrides(&params.canonical_model)).await?;
    Ok(Json(overrides))
}

/// PUT /api/pricing/overrides
pub async fn set_override(
    State(state): State<PricingState>,
    Json(pricing_override): Json<PricingOverride>,
) -> Result<Json<PricingOverride>, PricingError> {
    let stored = with_deadline(&state, state.service.set_override(&pricing_override)).await?;
    Ok(Json(stored))
}

/// DELETE /api/pricing/overrides?canonical_model=openai/gpt-4o&component=input_tokens
pub async fn delete_override(
    State(state): State<PricingState>,
    Query(params): Query<OverrideKeyQuery>,
) -> Result<StatusCode, PricingError> {
    with_deadline(
        &state,
        state
            .service
            .delete_override(&params.canonical_model, params.component),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/pricing/settings
pub async fn get_settings(
    State(state): State<PricingState>,
) -> Result<Json<PricingSettings>, PricingError> {
    let settings = with_deadline(&state, state.service.get_settings()).await?;
    Ok(Json(settings))
}

/// PUT /api/pricing/settings
pub async fn update_settings(
    State(state): State<PricingState>,
    Json(settings): Json<PricingSettings>,
) -> Result<Json<PricingSettings>, PricingError> {
    let stored = with_deadline(&state, state.service.update_settings(&settings)).await?;
    Ok(Json(stored))
}

/// POST /api/pricing/usage
pub async fn record_usage(
    State(state): State<PricingState>,
    Json(event): Json<RunUsageEvent>,
) -> Result<StatusCode, PricingError> {
    with_deadline(&state, state.service.record_usage(&event)).await?;
    Ok(StatusCode::CREATED)
}

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
