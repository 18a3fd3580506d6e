//! Periodic cleanup of expired security state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use wabot_guard::SecurityManager;

/// Run [`SecurityManager::sweep`] every `interval` until the handle is
/// aborted. The first sweep happens one interval after spawning.
pub fn spawn_sweeper(manager: Arc<SecurityManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = manager.sweep();
            if report.total() > 0 {
                debug!(
                    expired_blocks = report.expired_blocks,
                    suspicious_events = report.suspicious_events,
                    rate_windows = report.rate_windows,
                    cooldowns = report.cooldowns,
                    "security sweep"
                );
            }
        }
    })
}
