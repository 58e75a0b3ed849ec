mod common;

use agent_pricing::pricing::{
    models::PricingSettings, PriceSource, PricingComponent, PricingOverride, PricingRepository,
    SqliteRepository,
};
use chrono::{Duration, Utc};
use common::*;
use tempfile::TempDir;

use PricingComponent::{CacheCreation, InputTokens, OutputTokens, WebSearch};

#[tokio::test]
async fn test_pricing_round_trip() -> anyhow::Result<()> {
    let repo = SqliteRepository::in_memory().await?;

    let mut record = provider_row(
        OPUS,
        "openrouter",
        &[(InputTokens, 15e-6), (OutputTokens, 75e-6), (WebSearch, 0.01)],
    );
    record.provider_version = Some("2025-01".to_string());

    let stored = repo.upsert_pricing(&record).await?;
    assert!(stored.is_persisted());
    assert_eq!(stored.prices, record.prices);
    assert_eq!(stored.prices.source(CacheCreation), PriceSource::Unknown);
    assert_eq!(stored.provider_version.as_deref(), Some("2025-01"));
    assert_eq!(
        stored.expires_at.timestamp_millis(),
        record.expires_at.timestamp_millis()
    );

    let loaded = repo.get_pricing(OPUS, "openrouter").await?.unwrap();
    assert_eq!(loaded, stored);
    assert!(repo.get_pricing(OPUS, "litellm").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_upsert_preserves_identity() -> anyhow::Result<()> {
    let repo = SqliteRepository::in_memory().await?;

    let first = repo
        .upsert_pricing(&provider_row(OPUS, "openrouter", &[(InputTokens, 15e-6)]))
        .await?;
    let second = repo
        .upsert_pricing(&provider_row(OPUS, "openrouter", &[(OutputTokens, 75e-6)]))
        .await?;

    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    // Upsert replaces the whole price set
    assert_eq!(second.prices.price(InputTokens), None);
    assert_eq!(second.prices.price(OutputTokens), Some(75e-6));
    assert_eq!(repo.get_all_pricing().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_provider_and_expiry_queries() -> anyhow::Result<()> {
    let repo = SqliteRepository::in_memory().await?;

    let mut stale = provider_row("openai/gpt-4o", "litellm", &[(InputTokens, 2.5e-6)]);
    stale.fetched_at = Utc::now() - Duration::hours(12);
    stale.expires_at = Utc::now() - Duration::hours(6);

    let written = repo
        .bulk_upsert_pricing(&[
            provider_row(OPUS, "openrouter", &[(InputTokens, 15e-6)]),
            provider_row("openai/gpt-4o", "openrouter", &[(InputTokens, 2.5e-6)]),
            stale,
        ])
        .await?;
    assert_eq!(written, 3);
    assert_eq!(repo.bulk_upsert_pricing(&[]).await?, 0);

    assert_eq!(repo.get_pricing_by_provider("openrouter").await?.len(), 2);
    let expired = repo.get_expired_pricing(Utc::now()).await?;
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].provider, "litellm");

    repo.delete_pricing("openai/gpt-4o", "litellm").await?;
    assert!(repo.get_expired_pricing(Utc::now()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_alias_crud() -> anyhow::Result<()> {
    let repo = SqliteRepository::in_memory().await?;

    let first = repo
        .upsert_alias(&alias("opus", "claude-code", OPUS))
        .await?;
    let updated = repo
        .upsert_alias(&alias("opus", "claude-code", "anthropic/claude-opus-4"))
        .await?;
    assert_eq!(updated.id, first.id);
    assert_eq!(updated.canonical_model, "anthropic/claude-opus-4");

    repo.upsert_alias(&alias("gpt-4o", "codex", "openai/gpt-4o"))
        .await?;
    assert_eq!(repo.list_aliases(None).await?.len(), 2);
    assert_eq!(repo.list_aliases(Some("codex")).await?.len(), 1);
    assert!(repo.get_alias("opus", "codex").await?.is_none());

    repo.delete_alias("opus", "claude-code").await?;
    assert!(repo.get_alias("opus", "claude-code").await?.is_none());
    // Deleting twice is fine
    repo.delete_alias("opus", "claude-code").await?;
    Ok(())
}

#[tokio::test]
async fn test_override_crud_and_cleanup() -> anyhow::Result<()> {
    let repo = SqliteRepository::in_memory().await?;

    let mut pinned = PricingOverride::new(OPUS, InputTokens, 5e-6);
    pinned.note = Some("negotiated rate".to_string());
    pinned.created_by = "ops".to_string();
    let stored = repo.upsert_override(&pinned).await?;
    assert!(!stored.id.is_empty());
    assert_eq!(stored.note.as_deref(), Some("negotiated rate"));
    assert_eq!(stored.expires_at, None);

    let replaced = repo
        .upsert_override(&PricingOverride::new(OPUS, InputTokens, 6e-6))
        .await?;
    assert_eq!(replaced.id, stored.id);
    assert_eq!(replaced.price_per_unit, 6e-6);

    let mut expired = PricingOverride::new(OPUS, OutputTokens, 1e-6);
    expired.expires_at = Some(Utc::now() - Duration::minutes(1));
    repo.upsert_override(&expired).await?;
    assert_eq!(repo.get_overrides(OPUS).await?.len(), 2);

    assert_eq!(repo.cleanup_expired_overrides().await?, 1);
    assert_eq!(repo.cleanup_expired_overrides().await?, 0);

    repo.delete_override(OPUS, InputTokens).await?;
    assert!(repo.get_overrides(OPUS).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_historical_averages() -> anyhow::Result<()> {
    let repo = SqliteRepository::in_memory().await?;
    let since = Utc::now() - Duration::days(7);

    assert!(repo.get_historical_averages(OPUS, since).await?.is_none());

    for event in usage_event(OPUS, 4e-6, 12e-6, 5) {
        repo.record_usage_event(&event).await?;
    }
    // Outside the window
    let mut old = usage_event(OPUS, 100e-6, 100e-6, 1).remove(0);
    old.occurred_at = Utc::now() - Duration::days(30);
    repo.record_usage_event(&old).await?;

    let history = repo.get_historical_averages(OPUS, since).await?.unwrap();
    assert_eq!(history.sample_count, 5);
    assert_close(history.input_avg.unwrap(), 4e-6);
    assert_close(history.output_avg.unwrap(), 12e-6);
    // No cache tokens recorded
    assert_eq!(history.cache_read_avg, None);
    assert!(history.is_usable());
    Ok(())
}

#[tokio::test]
async fn test_settings_round_trip() -> anyhow::Result<()> {
    let repo = SqliteRepository::in_memory().await?;
    assert!(repo.get_settings().await?.is_none());

    let settings = PricingSettings {
        historical_window_days: 14,
        provider_cache_ttl_seconds: 3600,
        ..PricingSettings::default()
    };
    let stored = repo.update_settings(&settings).await?;
    assert_eq!(stored.historical_window_days, 14);
    assert_eq!(stored.provider_cache_ttl_seconds, 3600);
    assert_eq!(repo.get_settings().await?, Some(stored));
    Ok(())
}

#[tokio::test]
async fn test_file_database_persists_across_connections() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let url = format!("sqlite://{}", dir.path().join("pricing.db").display());

    {
        let repo = SqliteRepository::connect(&url).await?;
        repo.upsert_pricing(&provider_row(OPUS, "openrouter", &[(InputTokens, 15e-6)]))
            .await?;
        repo.pool().close().await;
    }

    // Migrations are idempotent on reconnect
    let repo = SqliteRepository::connect(&url).await?;
    let loaded = repo.get_pricing(OPUS, "openrouter").await?.unwrap();
    assert_eq!(loaded.prices.price(InputTokens), Some(15e-6));
    Ok(())
}
