use std::sync::Arc;
use std::time::Duration;

use admit_limit::LimiterRegistry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Periodically evict idle buckets from `registry`.
///
/// Only useful when the registry was built with
/// [`LimiterRegistry::with_idle_ttl`]. The task holds a weak reference and
/// finishes on its own once the registry is dropped.
pub fn spawn_sweeper(registry: &Arc<LimiterRegistry>, period: Duration) -> JoinHandle<()> {
    let registry = Arc::downgrade(registry);

    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticks.tick().await;

        loop {
            ticks.tick().await;
            let Some(registry) = registry.upgrade() else {
                debug!("registry dropped; stopping sweeper");
                break;
            };
            registry.evict_idle();
        }
    })
}
