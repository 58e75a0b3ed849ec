//! Persistence seam for pricing data.
//!
//! Implementations must hand out independent copies: callers are free to
//! mutate anything they get back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::pricing::models::{
    HistoricalPricing, ModelAlias, ModelPricing, PricingComponent, PricingOverride,
    PricingSettings, RunUsageEvent,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    /// A stored row violates a record invariant
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait PricingRepository: Send + Sync + 'static {
    // Pricing rows, keyed by (canonical_model, provider)

    /// Returns `None` when the row does not exist.
    async fn get_pricing(
        &self,
        canonical_model: &str,
        provider: &str,
    ) -> Result<Option<ModelPricing>, RepositoryError>;

    async fn get_all_pricing(&self) -> Result<Vec<ModelPricing>, RepositoryError>;

    async fn get_pricing_by_provider(
        &self,
        provider: &str,
    ) -> Result<Vec<ModelPricing>, RepositoryError>;

    /// Rows whose `expires_at` is at or before `before`.
    async fn get_expired_pricing(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<ModelPricing>, RepositoryError>;

    /// Insert or update. Assigns `id` and `created_at` on insert, keeps both on
    /// update, always stamps `updated_at`. Returns the stored row.
    async fn upsert_pricing(&self, record: &ModelPricing) -> Result<ModelPricing, RepositoryError>;

    /// Same as sequential upserts. Returns the number of rows written.
    async fn bulk_upsert_pricing(&self, records: &[ModelPricing]) -> Result<usize, RepositoryError>;

    /// Idempotent.
    async fn delete_pricing(&self, canonical_model: &str, provider: &str)
        -> Result<(), RepositoryError>;

    // Aliases, keyed by (runner_model, runner_type)

    async fn get_alias(
        &self,
        runner_model: &str,
        runner_type: &str,
    ) -> Result<Option<ModelAlias>, RepositoryError>;

    /// All aliases, or those of one runner type.
    async fn list_aliases(&self, runner_type: Option<&str>)
        -> Result<Vec<ModelAlias>, RepositoryError>;

    async fn upsert_alias(&self, alias: &ModelAlias) -> Result<ModelAlias, RepositoryError>;

    async fn delete_alias(&self, runner_model: &str, runner_type: &str)
        -> Result<(), RepositoryError>;

    // Overrides, keyed by (canonical_model, component)

    async fn get_overrides(
        &self,
        canonical_model: &str,
    ) -> Result<Vec<PricingOverride>, RepositoryError>;

    async fn upsert_override(
        &self,
        pricing_override: &PricingOverride,
    ) -> Result<PricingOverride, RepositoryError>;

    async fn delete_override(
        &self,
        canonical_model: &str,
        component: PricingComponent,
    ) -> Result<(), RepositoryError>;

    /// Deletes every override with a non-null expiry in the past.
    async fn cleanup_expired_overrides(&self) -> Result<u64, RepositoryError>;

    // Historical usage

    async fn record_usage_event(&self, event: &RunUsageEvent) -> Result<(), RepositoryError>;

    /// Token-weighted average prices over events since `since`.
    async fn get_historical_averages(
        &self,
        canonical_model: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<HistoricalPricing>, RepositoryError>;

    // Settings singleton

    /// `None` means "use defaults".
    async fn get_settings(&self) -> Result<Option<PricingSettings>, RepositoryError>;

    async fn update_settings(
        &self,
        settings: &PricingSettings,
    ) -> Result<PricingSettings, RepositoryError>;
}

/// Token-weighted mean `cost / tokens`, or `None` when no tokens were seen.
pub(crate) fn weighted_average(total_cost: f64, total_tokens: i64) -> Option<f64> {
    if total_tokens > 0 {
        Some(total_cost / total_tokens as f64)
    } else {
        None
    }
}
