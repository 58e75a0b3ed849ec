use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tokens per "million" display unit.
const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Default look-back window for historical averaging.
pub const DEFAULT_HISTORICAL_WINDOW_DAYS: u32 = 7;

/// Default freshness of a fetched provider row.
pub const DEFAULT_PROVIDER_CACHE_TTL_SECONDS: u64 = 6 * 60 * 60;

/// Upper bound accepted for the historical window.
pub const MAX_HISTORICAL_WINDOW_DAYS: u32 = 3650;

/// Upper bound accepted for the provider cache TTL (one year).
pub const MAX_PROVIDER_CACHE_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Provider tag used when a model is not tied to a specific catalog.
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// Convert a per-token (or per-unit) price to a per-million price.
pub fn per_million(per_token: f64) -> f64 {
    per_token * TOKENS_PER_MILLION
}

/// Convert a per-million price back to a per-token price.
pub fn per_token(per_million: f64) -> f64 {
    per_million / TOKENS_PER_MILLION
}

/// One of the six billable axes of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingComponent {
    InputTokens,
    OutputTokens,
    CacheRead,
    CacheCreation,
    WebSearch,
    ServerToolUse,
}

impl PricingComponent {
    pub const ALL: [PricingComponent; 6] = [
        PricingComponent::InputTokens,
        PricingComponent::OutputTokens,
        PricingComponent::CacheRead,
        PricingComponent::CacheCreation,
        PricingComponent::WebSearch,
        PricingComponent::ServerToolUse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingComponent::InputTokens => "input_tokens",
            PricingComponent::OutputTokens => "output_tokens",
            PricingComponent::CacheRead => "cache_read",
            PricingComponent::CacheCreation => "cache_creation",
            PricingComponent::WebSearch => "web_search",
            PricingComponent::ServerToolUse => "server_tool_use",
        }
    }

    fn index(&self) -> usize {
        match self {
            PricingComponent::InputTokens => 0,
            PricingComponent::OutputTokens => 1,
            PricingComponent::CacheRead => 2,
            PricingComponent::CacheCreation => 3,
            PricingComponent::WebSearch => 4,
            PricingComponent::ServerToolUse => 5,
        }
    }
}

impl fmt::Display for PricingComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PricingComponent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PricingComponent::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown pricing component: {}", s))
    }
}

/// Where a component's price came from. Metadata only, never arithmetic input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    ManualOverride,
    ProviderApi,
    HistoricalAverage,
    #[default]
    Unknown,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::ManualOverride => "manual_override",
            PriceSource::ProviderApi => "provider_api",
            PriceSource::HistoricalAverage => "historical_average",
            PriceSource::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_override" => Ok(PriceSource::ManualOverride),
            "provider_api" => Ok(PriceSource::ProviderApi),
            "historical_average" => Ok(PriceSource::HistoricalAverage),
            "unknown" => Ok(PriceSource::Unknown),
            other => Err(format!("unknown price source: {}", other)),
        }
    }
}

/// A present price together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentPrice {
    /// USD per unit of the component's axis
    pub price: f64,
    pub source: PriceSource,
}

/// Fixed table of per-component prices.
///
/// A slot is either absent or holds `(price, source)` with a known source, so
/// "price present iff source is not unknown" holds by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<PricingComponent, ComponentPrice>",
    into = "BTreeMap<PricingComponent, ComponentPrice>"
)]
pub struct ComponentPrices {
    slots: [Option<ComponentPrice>; 6],
}

impl ComponentPrices {
    pub fn get(&self, component: PricingComponent) -> Option<ComponentPrice> {
        self.slots[component.index()]
    }

    pub fn price(&self, component: PricingComponent) -> Option<f64> {
        self.get(component).map(|p| p.price)
    }

    pub fn source(&self, component: PricingComponent) -> PriceSource {
        self.get(component)
            .map(|p| p.source)
            .unwrap_or(PriceSource::Unknown)
    }

    pub fn is_missing(&self, component: PricingComponent) -> bool {
        self.get(component).is_none()
    }

    /// Set a price. Passing `PriceSource::Unknown` clears the slot instead.
    pub fn set(&mut self, component: PricingComponent, price: f64, source: PriceSource) {
        self.slots[component.index()] = match source {
            PriceSource::Unknown => None,
            source => Some(ComponentPrice { price, source }),
        };
    }

    pub fn clear(&mut self, component: PricingComponent) {
        self.slots[component.index()] = None;
    }

    /// Iterate present components in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (PricingComponent, ComponentPrice)> + '_ {
        PricingComponent::ALL
            .into_iter()
            .filter_map(|c| self.get(c).map(|p| (c, p)))
    }
}

impl From<BTreeMap<PricingComponent, ComponentPrice>> for ComponentPrices {
    fn from(map: BTreeMap<PricingComponent, ComponentPrice>) -> Self {
        let mut prices = ComponentPrices::default();
        for (component, entry) in map {
            prices.set(component, entry.price, entry.source);
        }
        prices
    }
}

impl From<ComponentPrices> for BTreeMap<PricingComponent, ComponentPrice> {
    fn from(prices: ComponentPrices) -> Self {
        prices.iter().collect()
    }
}

/// Authoritative price sheet for a `(canonical_model, provider)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Empty until the record has been persisted
    #[serde(default)]
    pub id: String,
    pub canonical_model: String,
    pub provider: String,
    #[serde(default)]
    pub prices: ComponentPrices,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub provider_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set on placeholders that no repository row or provider backs
    #[serde(skip)]
    pub synthesized: bool,
}

impl ModelPricing {
    /// A fresh, unpersisted record with no prices, valid for `ttl` from now.
    pub fn new(canonical_model: &str, provider: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            canonical_model: canonical_model.to_string(),
            provider: provider.to_string(),
            prices: ComponentPrices::default(),
            fetched_at: now,
            expires_at: expiry_after(now, ttl),
            provider_version: None,
            created_at: now,
            updated_at: now,
            synthesized: false,
        }
    }

    /// Record synthesized when no source has a row for the model.
    pub fn placeholder(canonical_model: &str, provider: &str) -> Self {
        Self {
            synthesized: true,
            ..Self::new(canonical_model, provider, PricingSettings::default_cache_ttl())
        }
    }

    /// Move `expires_at` to `ttl` after `fetched_at`.
    pub fn stamp_ttl(&mut self, ttl: Duration) {
        self.expires_at = expiry_after(self.fetched_at, ttl);
    }

    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Builder-style helper for provider mappings and tests.
    pub fn with_price(mut self, component: PricingComponent, price: f64, source: PriceSource) -> Self {
        self.prices.set(component, price, source);
        self
    }
}

/// Maps a runner-supplied model name to a canonical model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAlias {
    #[serde(default)]
    pub id: String,
    pub runner_model: String,
    pub runner_type: String,
    pub canonical_model: String,
    pub provider: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ModelAlias {
    pub fn new(runner_model: &str, runner_type: &str, canonical_model: &str, provider: &str) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            runner_model: runner_model.to_string(),
            runner_type: runner_type.to_string(),
            canonical_model: canonical_model.to_string(),
            provider: provider.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Administratively injected price for one component of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingOverride {
    #[serde(default)]
    pub id: String,
    pub canonical_model: String,
    pub component: PricingComponent,
    /// USD per unit of the component's axis
    pub price_per_unit: f64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl PricingOverride {
    pub fn new(canonical_model: &str, component: PricingComponent, price_per_unit: f64) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            canonical_model: canonical_model.to_string(),
            component,
            price_per_unit,
            expires_at: None,
            note: None,
            created_by: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expiry| expiry > now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// Averaged per-token prices observed over recorded run events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPricing {
    pub canonical_model: String,
    pub input_avg: Option<f64>,
    pub output_avg: Option<f64>,
    pub cache_read_avg: Option<f64>,
    pub cache_creation_avg: Option<f64>,
    pub sample_count: i64,
}

impl HistoricalPricing {
    /// Average for a component; only the token axes are aggregated.
    pub fn average(&self, component: PricingComponent) -> Option<f64> {
        match component {
            PricingComponent::InputTokens => self.input_avg,
            PricingComponent::OutputTokens => self.output_avg,
            PricingComponent::CacheRead => self.cache_read_avg,
            PricingComponent::CacheCreation => self.cache_creation_avg,
            PricingComponent::WebSearch | PricingComponent::ServerToolUse => None,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.sample_count > 0
    }
}

/// Usage and spend observed for one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunUsageEvent {
    pub canonical_model: String,
    #[serde(default)]
    pub runner_type: String,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cache_read_tokens: i64,
    #[serde(default)]
    pub cache_creation_tokens: i64,
    #[serde(default)]
    pub input_cost_usd: f64,
    #[serde(default)]
    pub output_cost_usd: f64,
    #[serde(default)]
    pub cache_read_cost_usd: f64,
    #[serde(default)]
    pub cache_creation_cost_usd: f64,
}

/// Global pricing knobs. Singleton; absence means defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSettings {
    pub historical_window_days: u32,
    pub provider_cache_ttl_seconds: u64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            historical_window_days: DEFAULT_HISTORICAL_WINDOW_DAYS,
            provider_cache_ttl_seconds: DEFAULT_PROVIDER_CACHE_TTL_SECONDS,
            updated_at: Utc::now(),
        }
    }
}

impl PricingSettings {
    /// Look-back window; out-of-range stored values fall back to the default.
    pub fn historical_window(&self) -> Duration {
        let days = match self.historical_window_days {
            days @ 1..=MAX_HISTORICAL_WINDOW_DAYS => days,
            _ => DEFAULT_HISTORICAL_WINDOW_DAYS,
        };
        Duration::days(i64::from(days))
    }

    /// Provider row TTL; out-of-range stored values fall back to the default.
    pub fn provider_cache_ttl(&self) -> Duration {
        match self.provider_cache_ttl_seconds {
            seconds @ 1..=MAX_PROVIDER_CACHE_TTL_SECONDS => Duration::seconds(seconds as i64),
            _ => Self::default_cache_ttl(),
        }
    }

    /// Start of the look-back window ending at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.historical_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn default_cache_ttl() -> Duration {
        Duration::seconds(DEFAULT_PROVIDER_CACHE_TTL_SECONDS as i64)
    }
}

/// `from + ttl`, saturating at the end of representable time.
fn expiry_after(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    from.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Usage vector of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostRequest {
    pub model: String,
    #[serde(default)]
    pub runner_type: String,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cache_read_tokens: i64,
    #[serde(default)]
    pub cache_creation_tokens: i64,
    #[serde(default)]
    pub web_search_requests: i64,
    #[serde(default)]
    pub server_tool_uses: i64,
}

impl CostRequest {
    pub fn new(model: &str, runner_type: &str) -> Self {
        Self {
            model: model.to_string(),
            runner_type: runner_type.to_string(),
            ..Default::default()
        }
    }

    pub fn count(&self, component: PricingComponent) -> i64 {
        match component {
            PricingComponent::InputTokens => self.input_tokens,
            PricingComponent::OutputTokens => self.output_tokens,
            PricingComponent::CacheRead => self.cache_read_tokens,
            PricingComponent::CacheCreation => self.cache_creation_tokens,
            PricingComponent::WebSearch => self.web_search_requests,
            PricingComponent::ServerToolUse => self.server_tool_uses,
        }
    }
}

/// Per-component USD sub-costs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub cache_read_cost: f64,
    pub cache_creation_cost: f64,
    pub web_search_cost: f64,
    pub server_tool_use_cost: f64,
}

impl CostBreakdown {
    pub fn get(&self, component: PricingComponent) -> f64 {
        match component {
            PricingComponent::InputTokens => self.input_cost,
            PricingComponent::OutputTokens => self.output_cost,
            PricingComponent::CacheRead => self.cache_read_cost,
            PricingComponent::CacheCreation => self.cache_creation_cost,
            PricingComponent::WebSearch => self.web_search_cost,
            PricingComponent::ServerToolUse => self.server_tool_use_cost,
        }
    }

    pub fn set(&mut self, component: PricingComponent, cost: f64) {
        let slot = match component {
            PricingComponent::InputTokens => &mut self.input_cost,
            PricingComponent::OutputTokens => &mut self.output_cost,
            PricingComponent::CacheRead => &mut self.cache_read_cost,
            PricingComponent::CacheCreation => &mut self.cache_creation_cost,
            PricingComponent::WebSearch => &mut self.web_search_cost,
            PricingComponent::ServerToolUse => &mut self.server_tool_use_cost,
        };
        *slot = cost;
    }

    /// Sum of the six sub-costs
    pub fn total(&self) -> f64 {
        PricingComponent::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// Result of a cost calculation, with per-component provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCalculation {
    pub usage: CostRequest,
    pub canonical_model: String,
    pub provider: String,
    pub costs: CostBreakdown,
    pub total_cost: f64,
    pub sources: BTreeMap<PricingComponent, PriceSource>,
    pub pricing_fetched_at: Option<DateTime<Utc>>,
    pub pricing_version: Option<String>,
}

/// Display view of a pricing row. Every price is per million units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricingView {
    pub canonical_model: String,
    pub provider: String,
    pub input_price_per_million: Option<f64>,
    pub output_price_per_million: Option<f64>,
    pub cache_read_price_per_million: Option<f64>,
    pub cache_creation_price_per_million: Option<f64>,
    pub web_search_price_per_million: Option<f64>,
    pub server_tool_use_price_per_million: Option<f64>,
    pub sources: BTreeMap<PricingComponent, PriceSource>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
    pub provider_version: Option<String>,
}

impl From<&ModelPricing> for ModelPricingView {
    fn from(record: &ModelPricing) -> Self {
        let display = |component: PricingComponent| record.prices.price(component).map(per_million);

        Self {
            canonical_model: record.canonical_model.clone(),
            provider: record.provider.clone(),
            input_price_per_million: display(PricingComponent::InputTokens),
            output_price_per_million: display(PricingComponent::OutputTokens),
            cache_read_price_per_million: display(PricingComponent::CacheRead),
            cache_creation_price_per_million: display(PricingComponent::CacheCreation),
            web_search_price_per_million: display(PricingComponent::WebSearch),
            server_tool_use_price_per_million: display(PricingComponent::ServerToolUse),
            sources: record.prices.iter().map(|(c, p)| (c, p.source)).collect(),
            fetched_at: record.fetched_at,
            expires_at: record.expires_at,
            is_expired: record.is_expired(),
            provider_version: record.provider_version.clone(),
        }
    }
}

/// Result of alias resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedModel {
    pub canonical_model: String,
    pub provider: String,
    /// False when no rule matched and the input was passed through
    pub found: bool,
}

/// Freshness of one provider's in-process catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCacheStatus {
    pub provider: String,
    pub cached_models: usize,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub is_stale: bool,
    pub last_error: Option<String>,
}

/// Result of refreshing one provider's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub provider: String,
    pub models_updated: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub total_models: usize,
    pub expired_count: usize,
    pub providers: Vec<ProviderCacheStatus>,
}
