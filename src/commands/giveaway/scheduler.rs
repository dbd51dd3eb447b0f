use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::commands::giveaway::manager::GiveawayManager;
use crate::commands::giveaway::models::now_epoch;

// Polls the store for giveaways whose end timestamp has passed and
// resolves them. Each giveaway is handled independently, so one bad
// channel never blocks the rest of the sweep.
pub struct ExpiryScheduler {
    manager: Arc<GiveawayManager>,
    poll_interval: Duration,
}

impl ExpiryScheduler {
    pub fn new(manager: Arc<GiveawayManager>, poll_interval_secs: u64) -> Self {
        ExpiryScheduler {
            manager,
            poll_interval: Duration::from_secs(poll_interval_secs),
        }
    }

    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            self.tick(now_epoch()).await;
        }
    }

    // One sweep pass. Returns how many expired giveaways it picked up.
    pub async fn tick(&self, now: i64) -> usize {
        let expired = self.manager.store().list_expired_active(now);
        let count = expired.len();

        for giveaway in expired {
            let giveaway_id = giveaway.message_id;
            match self.manager.finalize_giveaway(&giveaway_id).await {
                Ok(winners) => {
                    info!(
                        "The giveaway {} expired and resolved with {} winner(s)",
                        giveaway_id,
                        winners.len()
                    );
                }
                Err(err) => {
                    // The resolution path already parked the giveaway
                    // in the error state where that applies.
                    warn!("Can't resolve the expired giveaway {}: {}", giveaway_id, err);
                }
            }
        }
        count
    }
}
