pub mod alias;
pub mod cache;
pub mod calculator;
pub mod fallback;
pub mod memory;
pub mod models;
pub mod provider;
pub mod providers;
pub mod refresher;
pub mod repository;
pub mod service;
pub mod sqlite;

pub use alias::AliasResolver;
pub use cache::PricingCache;
pub use fallback::{FallbackResolver, Overlay};
pub use memory::InMemoryRepository;
pub use models::{
    CacheStatus, CostBreakdown, CostCalculation, CostRequest, ModelAlias, ModelPricing,
    ModelPricingView, PriceSource, PricingComponent, PricingOverride, PricingSettings,
    RefreshOutcome, ResolvedModel, RunUsageEvent,
};
pub use provider::{PricingProvider, ProviderCacheProbe, ProviderError};
pub use refresher::PricingRefresher;
pub use repository::{PricingRepository, RepositoryError};
pub use service::PricingService;
pub use sqlite::SqliteRepository;
