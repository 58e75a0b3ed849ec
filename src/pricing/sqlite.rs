//! SQLite implementation of the pricing repository
//!
//! - Connection pooling with WAL mode for concurrent reads/writes
//! - Embedded migrations run on connect
//! - Timestamps stored as Unix milliseconds

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::pricing::models::{
    ComponentPrices, HistoricalPricing, ModelAlias, ModelPricing, PriceSource, PricingComponent,
    PricingOverride, PricingSettings, RunUsageEvent,
};
use crate::pricing::repository::{weighted_average, PricingRepository, RepositoryError};

const PRICING_COLUMNS: &str = "id, canonical_model, provider,
    input_tokens_price, input_tokens_source,
    output_tokens_price, output_tokens_source,
    cache_read_price, cache_read_source,
    cache_creation_price, cache_creation_source,
    web_search_price, web_search_source,
    server_tool_use_price, server_tool_use_source,
    fetched_at, expires_at, provider_version, created_at, updated_at";

// Component column pairs follow `PricingComponent::ALL` order.
const UPSERT_PRICING_SQL: &str = "INSERT INTO model_pricing (
        id, canonical_model, provider,
        input_tokens_price, input_tokens_source,
        output_tokens_price, output_tokens_source,
        cache_read_price, cache_read_source,
        cache_creation_price, cache_creation_source,
        web_search_price, web_search_source,
        server_tool_use_price, server_tool_use_source,
        fetched_at, expires_at, provider_version, created_at, updated_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(canonical_model, provider) DO UPDATE SET
        input_tokens_price = excluded.input_tokens_price,
        input_tokens_source = excluded.input_tokens_source,
        output_tokens_price = excluded.output_tokens_price,
        output_tokens_source = excluded.output_tokens_source,
        cache_read_price = excluded.cache_read_price,
        cache_read_source = excluded.cache_read_source,
        cache_creation_price = excluded.cache_creation_price,
        cache_creation_source = excluded.cache_creation_source,
        web_search_price = excluded.web_search_price,
        web_search_source = excluded.web_search_source,
        server_tool_use_price = excluded.server_tool_use_price,
        server_tool_use_source = excluded.server_tool_use_source,
        fetched_at = excluded.fetched_at,
        expires_at = excluded.expires_at,
        provider_version = excluded.provider_version,
        updated_at = excluded.updated_at";

/// Pricing repository backed by a SQLite pool
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect to a SQLite database file and run migrations
    ///
    /// # Arguments
    ///
    /// * `database_url` - e.g. `sqlite:./data/pricing.db`
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database.
    ///
    /// Every `:memory:` connection is its own database, so the pool is pinned
    /// to a single connection that never expires.
    pub async fn in_memory() -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, running migrations first
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, RepositoryError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Pricing database migrations completed");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_pricing_where(
        &self,
        clause: &str,
        bind: Option<SqlValue<'_>>,
    ) -> Result<Vec<ModelPricing>, RepositoryError> {
        let sql = format!("SELECT {} FROM model_pricing {}", PRICING_COLUMNS, clause);
        let mut query = sqlx::query(&sql);
        match bind {
            Some(SqlValue::Text(value)) => query = query.bind(value),
            Some(SqlValue::Millis(value)) => query = query.bind(value),
            None => {}
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(pricing_from_row).collect()
    }
}

enum SqlValue<'a> {
    Text(&'a str),
    Millis(i64),
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| RepositoryError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn bind_pricing<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    record: &'q ModelPricing,
    id: String,
    now: i64,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = query
        .bind(id)
        .bind(&record.canonical_model)
        .bind(&record.provider);

    for component in PricingComponent::ALL {
        query = query
            .bind(record.prices.price(component))
            .bind(record.prices.source(component).as_str());
    }

    query
        .bind(record.fetched_at.timestamp_millis())
        .bind(record.expires_at.timestamp_millis())
        .bind(&record.provider_version)
        .bind(now)
        .bind(now)
}

fn pricing_from_row(row: &SqliteRow) -> Result<ModelPricing, RepositoryError> {
    let canonical_model: String = row.try_get("canonical_model")?;
    let mut prices = ComponentPrices::default();

    for component in PricingComponent::ALL {
        let price_column = format!("{}_price", component.as_str());
        let source_column = format!("{}_source", component.as_str());
        let price: Option<f64> = row.try_get(price_column.as_str())?;
        let source: String = row.try_get(source_column.as_str())?;

        if let Some(price) = price {
            let source = PriceSource::from_str(&source).map_err(RepositoryError::Corrupt)?;
            if source == PriceSource::Unknown {
                return Err(RepositoryError::Corrupt(format!(
                    "{} has a {} price with source unknown",
                    canonical_model, component
                )));
            }
            prices.set(component, price, source);
        }
    }

    Ok(ModelPricing {
        id: row.try_get("id")?,
        canonical_model,
        provider: row.try_get("provider")?,
        prices,
        fetched_at: from_millis(row.try_get("fetched_at")?)?,
        expires_at: from_millis(row.try_get("expires_at")?)?,
        provider_version: row.try_get("provider_version")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
        synthesized: false,
    })
}

fn alias_from_row(row: &SqliteRow) -> Result<ModelAlias, RepositoryError> {
    Ok(ModelAlias {
        id: row.try_get("id")?,
        runner_model: row.try_get("runner_model")?,
        runner_type: row.try_get("runner_type")?,
        canonical_model: row.try_get("canonical_model")?,
        provider: row.try_get("provider")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

fn override_from_row(row: &SqliteRow) -> Result<PricingOverride, RepositoryError> {
    let component: String = row.try_get("component")?;
    let expires_at: Option<i64> = row.try_get("expires_at")?;

    Ok(PricingOverride {
        id: row.try_get("id")?,
        canonical_model: row.try_get("canonical_model")?,
        component: PricingComponent::from_str(&component).map_err(RepositoryError::Corrupt)?,
        price_per_unit: row.try_get("price_per_unit")?,
        expires_at: expires_at.map(from_millis).transpose()?,
        note: row.try_get("note")?,
        created_by: row.try_get("created_by")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}

#[async_trait]
impl PricingRepository for SqliteRepository {
    async fn get_pricing(
        &self,
        canonical_model: &str,
        provider: &str,
    ) -> Result<Option<ModelPricing>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM model_pricing WHERE canonical_model = ? AND provider = ?",
            PRICING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(canonical_model)
            .bind(provider)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(pricing_from_row).transpose()
    }

    async fn get_all_pricing(&self) -> Result<Vec<ModelPricing>, RepositoryError> {
        self.fetch_pricing_where("ORDER BY provider, canonical_model", None)
            .await
    }

    async fn get_pricing_by_provider(
        &self,
        provider: &str,
    ) -> Result<Vec<ModelPricing>, RepositoryError> {
        self.fetch_pricing_where(
            "WHERE provider = ? ORDER BY canonical_model",
            Some(SqlValue::Text(provider)),
        )
        .await
    }

    async fn get_expired_pricing(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<ModelPricing>, RepositoryError> {
        self.fetch_pricing_where(
            "WHERE expires_at <= ? ORDER BY expires_at",
            Some(SqlValue::Millis(before.timestamp_millis())),
        )
        .await
    }

    async fn upsert_pricing(&self, record: &ModelPricing) -> Result<ModelPricing, RepositoryError> {
        let now = Utc::now().timestamp_millis();
        bind_pricing(
            sqlx::query(UPSERT_PRICING_SQL),
            record,
            Uuid::new_v4().to_string(),
            now,
        )
        .execute(&self.pool)
        .await?;

        self.get_pricing(&record.canonical_model, &record.provider)
            .await?
            .ok_or_else(|| {
                RepositoryError::Corrupt(format!(
                    "{}:{} missing after upsert",
                    record.canonical_model, record.provider
                ))
            })
    }

    async fn bulk_upsert_pricing(&self, records: &[ModelPricing]) -> Result<usize, RepositoryError> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        for record in records {
            bind_pricing(
                sqlx::query(UPSERT_PRICING_SQL),
                record,
                Uuid::new_v4().to_string(),
                now,
            )
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn delete_pricing(
        &self,
        canonical_model: &str,
        provider: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM model_pricing WHERE canonical_model = ? AND provider = ?")
            .bind(canonical_model)
            .bind(provider)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_alias(
        &self,
        runner_model: &str,
        runner_type: &str,
    ) -> Result<Option<ModelAlias>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, runner_model, runner_type, canonical_model, provider, created_at, updated_at
             FROM model_aliases
             WHERE runner_model = ? AND runner_type = ?",
        )
        .bind(runner_model)
        .bind(runner_type)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(alias_from_row).transpose()
    }

    async fn list_aliases(
        &self,
        runner_type: Option<&str>,
    ) -> Result<Vec<ModelAlias>, RepositoryError> {
        let rows = match runner_type {
            Some(runner_type) => {
                sqlx::query(
                    "SELECT id, runner_model, runner_type, canonical_model, provider, created_at, updated_at
                     FROM model_aliases
                     WHERE runner_type = ?
                     ORDER BY runner_type, runner_model",
                )
                .bind(runner_type)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, runner_model, runner_type, canonical_model, provider, created_at, updated_at
                     FROM model_aliases
                     ORDER BY runner_type, runner_model",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(alias_from_row).collect()
    }

    async fn upsert_alias(&self, alias: &ModelAlias) -> Result<ModelAlias, RepositoryError> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO model_aliases
             (id, runner_model, runner_type, canonical_model, provider, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(runner_model, runner_type) DO UPDATE SET
             canonical_model = excluded.canonical_model,
             provider = excluded.provider,
             updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&alias.runner_model)
        .bind(&alias.runner_type)
        .bind(&alias.canonical_model)
        .bind(&alias.provider)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_alias(&alias.runner_model, &alias.runner_type)
            .await?
            .ok_or_else(|| RepositoryError::Corrupt("alias missing after upsert".to_string()))
    }

    async fn delete_alias(&self, runner_model: &str, runner_type: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM model_aliases WHERE runner_model = ? AND runner_type = ?")
            .bind(runner_model)
            .bind(runner_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_overrides(
        &self,
        canonical_model: &str,
    ) -> Result<Vec<PricingOverride>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, canonical_model, component, price_per_unit, expires_at, note, created_by,
                    created_at, updated_at
             FROM pricing_overrides
             WHERE canonical_model = ?
             ORDER BY component",
        )
        .bind(canonical_model)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(override_from_row).collect()
    }

    async fn upsert_override(
        &self,
        pricing_override: &PricingOverride,
    ) -> Result<PricingOverride, RepositoryError> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO pricing_overrides
             (id, canonical_model, component, price_per_unit, expires_at, note, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(canonical_model, component) DO UPDATE SET
             price_per_unit = excluded.price_per_unit,
             expires_at = excluded.expires_at,
             note = excluded.note,
             created_by = excluded.created_by,
             updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&pricing_override.canonical_model)
        .bind(pricing_override.component.as_str())
        .bind(pricing_override.price_per_unit)
        .bind(pricing_override.expires_at.map(|t| t.timestamp_millis()))
        .bind(&pricing_override.note)
        .bind(&pricing_override.created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, canonical_model, component, price_per_unit, expires_at, note, created_by,
                    created_at, updated_at
             FROM pricing_overrides
             WHERE canonical_model = ? AND component = ?",
        )
        .bind(&pricing_override.canonical_model)
        .bind(pricing_override.component.as_str())
        .fetch_one(&self.pool)
        .await?;

        override_from_row(&row)
    }

    async fn delete_override(
        &self,
        canonical_model: &str,
        component: PricingComponent,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM pricing_overrides WHERE canonical_model = ? AND component = ?")
            .bind(canonical_model)
            .bind(component.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cleanup_expired_overrides(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM pricing_overrides WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn record_usage_event(&self, event: &RunUsageEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO run_usage_events
             (canonical_model, runner_type, occurred_at,
              input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens,
              input_cost_usd, output_cost_usd, cache_read_cost_usd, cache_creation_cost_usd)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.canonical_model)
        .bind(&event.runner_type)
        .bind(event.occurred_at.timestamp_millis())
        .bind(event.input_tokens)
        .bind(event.output_tokens)
        .bind(event.cache_read_tokens)
        .bind(event.cache_creation_tokens)
        .bind(event.input_cost_usd)
        .bind(event.output_cost_usd)
        .bind(event.cache_read_cost_usd)
        .bind(event.cache_creation_cost_usd)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_historical_averages(
        &self,
        canonical_model: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<HistoricalPricing>, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS sample_count,
                    CAST(COALESCE(SUM(input_tokens), 0) AS INTEGER) AS input_tokens,
                    CAST(COALESCE(SUM(output_tokens), 0) AS INTEGER) AS output_tokens,
                    CAST(COALESCE(SUM(cache_read_tokens), 0) AS INTEGER) AS cache_read_tokens,
                    CAST(COALESCE(SUM(cache_creation_tokens), 0) AS INTEGER) AS cache_creation_tokens,
                    CAST(COALESCE(SUM(input_cost_usd), 0) AS REAL) AS input_cost,
                    CAST(COALESCE(SUM(output_cost_usd), 0) AS REAL) AS output_cost,
                    CAST(COALESCE(SUM(cache_read_cost_usd), 0) AS REAL) AS cache_read_cost,
                    CAST(COALESCE(SUM(cache_creation_cost_usd), 0) AS REAL) AS cache_creation_cost
             FROM run_usage_events
             WHERE canonical_model = ? AND occurred_at >= ?",
        )
        .bind(canonical_model)
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        let sample_count: i64 = row.try_get("sample_count")?;
        if sample_count == 0 {
            return Ok(None);
        }

        Ok(Some(HistoricalPricing {
            canonical_model: canonical_model.to_string(),
            input_avg: weighted_average(row.try_get("input_cost")?, row.try_get("input_tokens")?),
            output_avg: weighted_average(row.try_get("output_cost")?, row.try_get("output_tokens")?),
            cache_read_avg: weighted_average(
                row.try_get("cache_read_cost")?,
                row.try_get("cache_read_tokens")?,
            ),
            cache_creation_avg: weighted_average(
                row.try_get("cache_creation_cost")?,
                row.try_get("cache_creation_tokens")?,
            ),
            sample_count,
        }))
    }

    async fn get_settings(&self) -> Result<Option<PricingSettings>, RepositoryError> {
        let row = sqlx::query(
            "SELECT historical_window_days, provider_cache_ttl_seconds, updated_at
             FROM pricing_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let window_days: i64 = row.try_get("historical_window_days")?;
        let ttl_seconds: i64 = row.try_get("provider_cache_ttl_seconds")?;

        Ok(Some(PricingSettings {
            historical_window_days: u32::try_from(window_days)
                .map_err(|_| RepositoryError::Corrupt(format!("window days: {}", window_days)))?,
            provider_cache_ttl_seconds: u64::try_from(ttl_seconds)
                .map_err(|_| RepositoryError::Corrupt(format!("cache ttl: {}", ttl_seconds)))?,
            updated_at: from_millis(row.try_get("updated_at")?)?,
        }))
    }

    async fn update_settings(
        &self,
        settings: &PricingSettings,
    ) -> Result<PricingSettings, RepositoryError> {
        let ttl_seconds = i64::try_from(settings.provider_cache_ttl_seconds).map_err(|_| {
            RepositoryError::Corrupt(format!("cache ttl: {}", settings.provider_cache_ttl_seconds))
        })?;

        sqlx::query(
            "INSERT INTO pricing_settings (id, historical_window_days, provider_cache_ttl_seconds, updated_at)
             VALUES (1, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
             historical_window_days = excluded.historical_window_days,
             provider_cache_ttl_seconds = excluded.provider_cache_ttl_seconds,
             updated_at = excluded.updated_at",
        )
        .bind(settings.historical_window_days as i64)
        .bind(ttl_seconds)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.get_settings()
            .await?
            .ok_or_else(|| RepositoryError::Corrupt("settings missing after update".to_string()))
    }
}
