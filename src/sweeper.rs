use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::broker::Broker;

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

/// Periodic maintenance task: each tick reclaims expired visibility
/// timeouts, promotes over-retried messages to their DLQ, drops
/// retention-expired messages, and evicts aged dedup entries and delete
/// tombstones. Purely advisory for correctness; the receive path performs
/// the same checks inline.
pub fn spawn(broker: Arc<Broker>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let summary = broker.sweep();
            if summary.redriven > 0 || summary.dropped > 0 {
                debug!(
                    redriven = summary.redriven,
                    dropped = summary.dropped,
                    "sweep tick"
                );
            }
        }
    })
}
