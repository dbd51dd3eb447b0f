use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::seq::IndexedRandom;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::commands::giveaway::models::{now_epoch, Entrant, FillPlan, FillPlanStatus};
use crate::commands::giveaway::notifier::GiveawayNotifier;
use crate::commands::giveaway::store::GiveawayStore;
use crate::error::{Error, Result};

struct FillHandle {
    // Distinguishes this worker from a replacement registered under
    // the same giveaway id.
    run_id: Uuid,
    token: CancellationToken,
    task: JoinHandle<()>,
}

// The one piece of shared mutable state between user commands, the
// expiry scheduler and the recovery monitor: which giveaways have a
// fill worker running right now. At most one worker per giveaway id.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, FillHandle>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        TaskRegistry::default()
    }

    pub fn is_running(&self, giveaway_id: &str) -> bool {
        self.tasks
            .get(giveaway_id)
            .map(|entry| !entry.task.is_finished())
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|entry| !entry.task.is_finished())
            .count()
    }

    // Requests cooperative cancellation and waits until the worker
    // has written its terminal plan status and exited.
    pub async fn cancel_and_wait(&self, giveaway_id: &str) -> bool {
        match self.tasks.remove(giveaway_id) {
            Some((_, handle)) => {
                handle.token.cancel();
                let _ = handle.task.await;
                true
            }
            None => false,
        }
    }

    // Deterministic teardown on shutdown.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for giveaway_id in ids {
            self.cancel_and_wait(&giveaway_id).await;
        }
    }

    fn register(&self, giveaway_id: &str, handle: FillHandle) {
        self.tasks.insert(giveaway_id.to_string(), handle);
    }

    // Workers remove themselves on exit. The run id guard makes sure
    // a finished worker never evicts its own replacement.
    fn release(&self, giveaway_id: &str, run_id: Uuid) {
        self.tasks
            .remove_if(giveaway_id, |_, handle| handle.run_id == run_id);
    }
}

// How a fill worker run came to an end.
enum FillOutcome {
    // Every planned entry was placed.
    Completed,
    // The deadline arrived first; the remainder is simply not placed.
    DeadlineReached,
    Cancelled,
    // The giveaway was resolved or cancelled while the plan ran.
    GiveawayClosed,
}

// Paces synthetic entries into running giveaways. One cancellable
// worker per giveaway, progress persisted after every insert so a
// restart resumes instead of starting over.
pub struct FillEngine {
    store: Arc<GiveawayStore>,
    registry: Arc<TaskRegistry>,
    notifier: Arc<dyn GiveawayNotifier>,
}

impl FillEngine {
    pub fn new(
        store: Arc<GiveawayStore>,
        registry: Arc<TaskRegistry>,
        notifier: Arc<dyn GiveawayNotifier>,
    ) -> Self {
        FillEngine {
            store,
            registry,
            notifier,
        }
    }

    pub fn registry(&self) -> Arc<TaskRegistry> {
        self.registry.clone()
    }

    // Creates a fresh plan for the giveaway and spawns its worker.
    // An already-running plan for the same giveaway is cancelled and
    // replaced in place.
    pub async fn start(
        &self,
        giveaway_id: &str,
        member_pool: Vec<u64>,
        total: u32,
        deadline: i64,
        created_by: u64,
    ) -> Result<()> {
        let giveaway = match self.store.get_giveaway(giveaway_id) {
            Some(giveaway) => giveaway,
            None => {
                let message = format!("The giveaway {} was not found.", giveaway_id);
                return Err(Error::NotFound(message));
            }
        };
        if !giveaway.is_active() {
            let message = format!(
                "Entries can only be filled into an active giveaway, this one is {}.",
                giveaway.status.as_str()
            );
            return Err(Error::Validation(message));
        }
        if member_pool.is_empty() {
            let message = "The member pool for the fill is empty.".to_string();
            return Err(Error::Validation(message));
        }

        self.registry.cancel_and_wait(giveaway_id).await;

        let plan = FillPlan::new(
            giveaway_id,
            giveaway.channel_id,
            member_pool,
            total,
            deadline,
            created_by,
        );
        self.store.upsert_fill_plan(plan.clone());
        self.spawn_worker(plan);
        Ok(())
    }

    // Re-attaches a worker to a plan that was left active by a prior
    // process exit. Progress continues from the persisted counters.
    pub async fn resume(&self, plan: FillPlan) {
        self.registry.cancel_and_wait(&plan.giveaway_id).await;
        info!(
            "Resuming the fill plan for the giveaway {} with {} of {} entries left",
            plan.giveaway_id, plan.remaining, plan.total
        );
        self.spawn_worker(plan);
    }

    // Stops any running worker for the giveaway and closes out its
    // plan. Used when the giveaway itself is resolved or cancelled.
    pub async fn stop(&self, giveaway_id: &str) {
        self.registry.cancel_and_wait(giveaway_id).await;

        // A plan can be left active without a worker (e.g. right
        // after a restart); close it out here as well.
        if let Some(plan) = self.store.get_fill_plan(giveaway_id) {
            if plan.status == FillPlanStatus::Active {
                let _ = self
                    .store
                    .set_fill_plan_status(giveaway_id, FillPlanStatus::Cancelled, None);
            }
        }
    }

    fn spawn_worker(&self, plan: FillPlan) {
        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        let giveaway_id = plan.giveaway_id.clone();

        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let registry = self.registry.clone();
        let worker_token = token.clone();

        let task = tokio::spawn(async move {
            let outcome = fill_worker_loop(&store, &notifier, &worker_token, &plan).await;
            let (status, detail) = match outcome {
                Ok(FillOutcome::Completed) | Ok(FillOutcome::DeadlineReached) => {
                    (FillPlanStatus::Completed, None)
                }
                Ok(FillOutcome::Cancelled) | Ok(FillOutcome::GiveawayClosed) => {
                    (FillPlanStatus::Cancelled, None)
                }
                Err(err) => (FillPlanStatus::Error, Some(err.to_string())),
            };

            if let Some(ref detail) = detail {
                warn!(
                    "The fill plan for the giveaway {} failed: {}",
                    plan.giveaway_id, detail
                );
            }
            let _ = store.set_fill_plan_status(&plan.giveaway_id, status, detail.as_deref());
            registry.release(&plan.giveaway_id, run_id);
        });

        self.registry.register(
            &giveaway_id,
            FillHandle {
                run_id,
                token,
                task,
            },
        );
    }
}

// Samples the next pause before placing an entry. `None` means the
// delay would run past the deadline and the worker should stop.
fn pacing_delay(now: i64, deadline: i64, remaining: u32) -> Option<f64> {
    if now >= deadline {
        return None;
    }

    let avg = ((deadline - now) as f64 / remaining.max(1) as f64).max(1.0);
    let delay = rand::rng().random_range(0.5 * avg..=1.5 * avg);
    match now as f64 + delay > deadline as f64 {
        true => None,
        false => Some(delay),
    }
}

// Prefers a pool member that hasn't been used as a synthetic source
// for this giveaway yet; falls back to reuse once the pool runs dry.
fn choose_source(member_pool: &[u64], used: &HashSet<u64>) -> Option<u64> {
    let unused: Vec<u64> = member_pool
        .iter()
        .copied()
        .filter(|id| !used.contains(id))
        .collect();

    let mut rng = rand::rng();
    match unused.choose(&mut rng) {
        Some(id) => Some(*id),
        None => member_pool.choose(&mut rng).copied(),
    }
}

async fn fill_worker_loop(
    store: &Arc<GiveawayStore>,
    notifier: &Arc<dyn GiveawayNotifier>,
    token: &CancellationToken,
    plan: &FillPlan,
) -> Result<FillOutcome> {
    // Rebuild the used-source set from persisted rows so the reuse
    // policy survives restarts.
    let mut used: HashSet<u64> = store
        .list_entrants(&plan.giveaway_id)
        .iter()
        .filter(|row| row.is_fake())
        .map(|row| row.origin_id())
        .collect();

    loop {
        let current = match store.get_fill_plan(&plan.giveaway_id) {
            Some(current) => current,
            None => return Ok(FillOutcome::Cancelled),
        };
        if current.status != FillPlanStatus::Active {
            return Ok(FillOutcome::Cancelled);
        }
        if current.remaining == 0 {
            return Ok(FillOutcome::Completed);
        }

        let delay = match pacing_delay(now_epoch(), current.deadline, current.remaining) {
            Some(delay) => delay,
            None => return Ok(FillOutcome::DeadlineReached),
        };

        tokio::select! {
            _ = token.cancelled() => return Ok(FillOutcome::Cancelled),
            _ = sleep(Duration::from_secs_f64(delay)) => {}
        }

        // The giveaway may have been resolved or cancelled while the
        // worker slept; leave quietly in that case.
        let giveaway = match store.get_giveaway(&plan.giveaway_id) {
            Some(giveaway) => giveaway,
            None => return Ok(FillOutcome::GiveawayClosed),
        };
        if !giveaway.is_active() {
            return Ok(FillOutcome::GiveawayClosed);
        }
        if token.is_cancelled() {
            return Ok(FillOutcome::Cancelled);
        }

        let source = match choose_source(&current.member_pool, &used) {
            Some(source) => source,
            None => {
                let message = format!(
                    "The fill plan for the giveaway {} has an empty member pool.",
                    plan.giveaway_id
                );
                return Err(Error::Validation(message));
            }
        };
        used.insert(source);

        let entrant = Entrant::fake(source);
        let entrant_id = entrant.entrant_id.clone();
        store.upsert_entrant(&plan.giveaway_id, entrant);
        store.decrement_fill_plan(&plan.giveaway_id, current.remaining - 1, &entrant_id)?;

        // Progress display updates are fire-and-forget.
        if let Err(err) = notifier.fill_progress(&giveaway, current.remaining - 1).await {
            warn!(
                "Can't update the fill progress for the giveaway {}: {}",
                plan.giveaway_id, err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::commands::giveaway::fill::{
        choose_source, pacing_delay, FillEngine, TaskRegistry,
    };
    use crate::commands::giveaway::models::{
        now_epoch, FillPlanStatus, Giveaway, GiveawayStatus,
    };
    use crate::commands::giveaway::notifier::testing::RecordingNotifier;
    use crate::commands::giveaway::store::GiveawayStore;

    fn engine_with_giveaway(id: &str) -> (FillEngine, Arc<GiveawayStore>) {
        let store = Arc::new(GiveawayStore::new());
        store
            .create_giveaway(Giveaway::new(id, 1, 42, "A game key", 1, now_epoch() + 3600))
            .unwrap();
        let engine = FillEngine::new(
            store.clone(),
            Arc::new(TaskRegistry::new()),
            RecordingNotifier::new(),
        );
        (engine, store)
    }

    async fn wait_for_terminal_plan(store: &GiveawayStore, id: &str, max_secs: u64) {
        for _ in 0..max_secs * 10 {
            if let Some(plan) = store.get_fill_plan(id) {
                if plan.status.is_terminal() {
                    return;
                }
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("the fill plan did not reach a terminal state in time");
    }

    #[test]
    fn test_pacing_delay_stays_within_the_jitter_window() {
        for _ in 0..100 {
            let delay = pacing_delay(0, 100, 10).unwrap();
            assert_eq!(delay >= 5.0 && delay <= 15.0, true);
        }
    }

    #[test]
    fn test_pacing_delay_is_clamped_to_at_least_half_a_second() {
        for _ in 0..100 {
            // Lots of entries in a tiny window: the average is clamped
            // to one second before jitter is applied.
            if let Some(delay) = pacing_delay(0, 2, 1000) {
                assert_eq!(delay >= 0.5, true);
            }
        }
    }

    #[test]
    fn test_pacing_delay_never_crosses_the_deadline() {
        for _ in 0..100 {
            if let Some(delay) = pacing_delay(95, 100, 1) {
                assert_eq!(95.0 + delay <= 100.0, true);
            }
        }
    }

    #[test]
    fn test_pacing_delay_after_the_deadline_is_none() {
        assert_eq!(pacing_delay(101, 100, 5).is_none(), true);
        assert_eq!(pacing_delay(100, 100, 5).is_none(), true);
    }

    #[test]
    fn test_choose_source_prefers_unused_members() {
        let pool = vec![1, 2, 3];
        let used: HashSet<u64> = HashSet::from([1, 2]);

        for _ in 0..20 {
            assert_eq!(choose_source(&pool, &used), Some(3));
        }
    }

    #[test]
    fn test_choose_source_falls_back_to_reuse() {
        let pool = vec![1, 2];
        let used: HashSet<u64> = HashSet::from([1, 2]);

        let source = choose_source(&pool, &used).unwrap();
        assert_eq!(pool.contains(&source), true);
    }

    #[test]
    fn test_choose_source_with_empty_pool_is_none() {
        assert_eq!(choose_source(&[], &HashSet::new()), None);
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_giveaway() {
        let store = Arc::new(GiveawayStore::new());
        let engine = FillEngine::new(
            store,
            Arc::new(TaskRegistry::new()),
            RecordingNotifier::new(),
        );

        let result = engine.start("100", vec![1], 5, now_epoch() + 60, 42).await;
        assert_eq!(result.is_err(), true);
    }

    #[tokio::test]
    async fn test_start_rejects_ended_giveaway() {
        let (engine, store) = engine_with_giveaway("100");
        store.resolve_giveaway("100", &[]).unwrap();

        let result = engine.start("100", vec![1], 5, now_epoch() + 60, 42).await;
        assert_eq!(result.is_err(), true);
    }

    #[tokio::test]
    async fn test_start_rejects_empty_member_pool() {
        let (engine, _store) = engine_with_giveaway("100");

        let result = engine.start("100", vec![], 5, now_epoch() + 60, 42).await;
        assert_eq!(result.is_err(), true);
    }

    #[tokio::test]
    async fn test_cancelled_plan_never_exceeds_its_total() {
        let (engine, store) = engine_with_giveaway("100");
        engine
            .start("100", vec![1, 2, 3, 4, 5], 5, now_epoch() + 60, 42)
            .await
            .unwrap();
        assert_eq!(engine.registry().is_running("100"), true);

        sleep(Duration::from_millis(200)).await;
        engine.stop("100").await;

        let plan = store.get_fill_plan("100").unwrap();
        assert_eq!(plan.status, FillPlanStatus::Cancelled);
        assert_eq!(plan.spawned_ids.len() <= 5, true);
        assert_eq!(plan.spawned_ids.len() as u32, plan.total - plan.remaining);
        assert_eq!(engine.registry().is_running("100"), false);

        let fake_rows = store
            .list_entrants("100")
            .iter()
            .filter(|row| row.is_fake())
            .count();
        assert_eq!(fake_rows, plan.spawned_ids.len());
    }

    #[tokio::test]
    async fn test_worker_places_paced_entries_and_terminates() {
        let (engine, store) = engine_with_giveaway("100");
        // A three-second window for two entries: the first insert
        // always fits, the second may be dropped by the deadline check.
        engine
            .start("100", vec![7, 8], 2, now_epoch() + 3, 42)
            .await
            .unwrap();

        wait_for_terminal_plan(&store, "100", 10).await;

        let plan = store.get_fill_plan("100").unwrap();
        assert_eq!(plan.status, FillPlanStatus::Completed);
        assert_eq!(plan.spawned_ids.is_empty(), false);
        assert_eq!(plan.spawned_ids.len() as u32, plan.total - plan.remaining);
        assert_eq!(engine.registry().is_running("100"), false);

        // Synthetic rows are attributed to distinct pool members while
        // unused ones remain.
        let sources: HashSet<u64> = store
            .list_entrants("100")
            .iter()
            .filter(|row| row.is_fake())
            .map(|row| row.origin_id())
            .collect();
        assert_eq!(sources.len(), plan.spawned_ids.len());
    }

    #[tokio::test]
    async fn test_resumed_plan_with_nothing_left_completes_immediately() {
        let (engine, store) = engine_with_giveaway("100");
        engine
            .start("100", vec![1], 3, now_epoch() + 3600, 42)
            .await
            .unwrap();
        engine.registry().cancel_and_wait("100").await;

        // Simulate a plan that was fully drained before the restart.
        let mut plan = store.get_fill_plan("100").unwrap();
        plan.status = FillPlanStatus::Active;
        plan.remaining = 0;
        store.upsert_fill_plan(plan);

        engine.resume(store.get_fill_plan("100").unwrap()).await;
        wait_for_terminal_plan(&store, "100", 5).await;

        let plan = store.get_fill_plan("100").unwrap();
        assert_eq!(plan.status, FillPlanStatus::Completed);
    }

    #[tokio::test]
    async fn test_starting_a_new_plan_replaces_the_old_worker() {
        let (engine, store) = engine_with_giveaway("100");
        engine
            .start("100", vec![1, 2], 10, now_epoch() + 120, 42)
            .await
            .unwrap();
        engine
            .start("100", vec![1, 2], 3, now_epoch() + 120, 42)
            .await
            .unwrap();

        assert_eq!(engine.registry().running_count(), 1);

        let plan = store.get_fill_plan("100").unwrap();
        assert_eq!(plan.total, 3);
        assert_eq!(plan.status, FillPlanStatus::Active);

        engine.registry().shutdown_all().await;
        assert_eq!(engine.registry().running_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_leaves_quietly_when_the_giveaway_closes() {
        let (engine, store) = engine_with_giveaway("100");
        engine
            .start("100", vec![1, 2, 3], 3, now_epoch() + 4, 42)
            .await
            .unwrap();

        store.resolve_giveaway("100", &[]).unwrap();
        assert_eq!(
            store.get_giveaway("100").unwrap().status,
            GiveawayStatus::Ended
        );

        wait_for_terminal_plan(&store, "100", 10).await;
        let plan = store.get_fill_plan("100").unwrap();
        assert_eq!(plan.status, FillPlanStatus::Cancelled);
    }
}
