use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::commands::giveaway::manager::GiveawayManager;
use crate::commands::giveaway::models::FillPlanStatus;

// Re-attaches workers to fill plans that were left active by a prior
// process exit. Runs once at startup and then periodically, so a
// worker that died mid-flight is picked up again as well.
pub struct RecoveryMonitor {
    manager: Arc<GiveawayManager>,
    interval: Duration,
}

impl RecoveryMonitor {
    pub fn new(manager: Arc<GiveawayManager>, interval_secs: u64) -> Self {
        RecoveryMonitor {
            manager,
            interval: Duration::from_secs(interval_secs),
        }
    }

    pub async fn run(&self) {
        loop {
            self.run_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    // One recovery pass. Returns how many plans got a worker attached.
    pub async fn run_once(&self) -> usize {
        let store = self.manager.store();
        let registry = self.manager.fill().registry();
        let mut resumed = 0;

        for plan in store.list_active_fill_plans() {
            let giveaway_id = plan.giveaway_id.clone();
            if registry.is_running(&giveaway_id) {
                continue;
            }

            match store.get_giveaway(&giveaway_id) {
                Some(giveaway) if giveaway.is_active() => {
                    self.manager.fill().resume(plan).await;
                    resumed += 1;
                }
                // The giveaway finished while no worker was attached;
                // close the orphaned plan out.
                _ => {
                    let _ = store.set_fill_plan_status(
                        &giveaway_id,
                        FillPlanStatus::Cancelled,
                        None,
                    );
                }
            }
        }

        if resumed > 0 {
            info!("Recovered {} orphaned fill plan(s)", resumed);
        }
        resumed
    }
}
