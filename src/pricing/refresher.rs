use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::pricing::service::PricingService;
use crate::signals::ShutdownSignal;

/// Background task that periodically refreshes provider pricing and sweeps
/// expired overrides.
pub struct PricingRefresher {
    service: Arc<PricingService>,
    refresh_interval: Duration,
    cleanup_interval: Duration,
    refresh_on_startup: bool,
}

impl PricingRefresher {
    pub fn new(
        service: Arc<PricingService>,
        refresh_interval: Duration,
        cleanup_interval: Duration,
        refresh_on_startup: bool,
    ) -> Self {
        Self {
            service,
            refresh_interval,
            cleanup_interval,
            refresh_on_startup,
        }
    }

    /// Start background task; it exits when a shutdown signal arrives.
    pub fn spawn(self, shutdown: broadcast::Receiver<ShutdownSignal>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        info!(
            "Starting pricing refresher (refresh: {:?}, cleanup: {:?})",
            self.refresh_interval, self.cleanup_interval
        );

        let first_refresh = if self.refresh_on_startup {
            Instant::now()
        } else {
            Instant::now() + self.refresh_interval
        };
        let mut refresh = interval_at(first_refresh, self.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cleanup = interval_at(Instant::now() + self.cleanup_interval, self.cleanup_interval);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    let outcomes = self.service.refresh_all().await;
                    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
                    let updated: usize = outcomes.iter().map(|o| o.models_updated).sum();
                    info!(updated, failed, "Pricing refresh finished");
                }
                _ = cleanup.tick() => {
                    if let Err(e) = self.service.cleanup_expired_overrides().await {
                        error!("Override cleanup failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Pricing refresher stopping");
                    break;
                }
            }
        }
    }
}
