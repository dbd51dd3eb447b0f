use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::commands::giveaway::entries::{EntriesPage, EntriesQueryService};
use crate::commands::giveaway::fill::{FillEngine, TaskRegistry};
use crate::commands::giveaway::models::{now_epoch, Entrant, Giveaway, GiveawayStatus};
use crate::commands::giveaway::notifier::GiveawayNotifier;
use crate::commands::giveaway::parser::parse_duration;
use crate::commands::giveaway::selector::select_winners;
use crate::commands::giveaway::store::GiveawayStore;
use crate::config::{
    BotConfig, MAX_FILL_ENTRIES, MAX_FILL_MINUTES, MAX_GIVEAWAY_SECONDS, MAX_WINNERS,
    MIN_FILL_ENTRIES, MIN_FILL_MINUTES, MIN_GIVEAWAY_SECONDS, MIN_WINNERS,
};
use crate::error::{Error, Result};

// The command surface of the giveaway core. Validates input, owns the
// per-giveaway resolution guards and drives the store, the winner
// selection and the fill engine.
pub struct GiveawayManager {
    store: Arc<GiveawayStore>,
    fill: FillEngine,
    entries: EntriesQueryService,
    notifier: Arc<dyn GiveawayNotifier>,
    // Serializes the expiry sweep against manual end/reroll commands
    // for the same giveaway. Created on demand, one per giveaway id,
    // so unrelated giveaways never wait on each other.
    resolution_guards: DashMap<String, Arc<Mutex<()>>>,
    bot_id: u64,
}

impl GiveawayManager {
    pub fn new(
        store: Arc<GiveawayStore>,
        notifier: Arc<dyn GiveawayNotifier>,
        config: &BotConfig,
        bot_id: u64,
    ) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let fill = FillEngine::new(store.clone(), registry, notifier.clone());
        let entries = EntriesQueryService::new(store.clone(), bot_id, config.entries_page_size);

        GiveawayManager {
            store,
            fill,
            entries,
            notifier,
            resolution_guards: DashMap::new(),
            bot_id,
        }
    }

    pub fn store(&self) -> Arc<GiveawayStore> {
        self.store.clone()
    }

    pub fn fill(&self) -> &FillEngine {
        &self.fill
    }

    // Registers a new giveaway under the announcement message id.
    pub async fn start_giveaway(
        &self,
        message_id: &str,
        channel_id: u64,
        host_id: u64,
        duration_spec: &str,
        winner_count: u32,
        prize: &str,
    ) -> Result<Giveaway> {
        let duration = parse_duration(duration_spec)?;
        if !(MIN_GIVEAWAY_SECONDS..=MAX_GIVEAWAY_SECONDS).contains(&duration.seconds) {
            let message = format!(
                "The giveaway duration must be between {} seconds and 30 days.",
                MIN_GIVEAWAY_SECONDS
            );
            return Err(Error::Validation(message));
        }
        if !(MIN_WINNERS..=MAX_WINNERS).contains(&winner_count) {
            let message = format!(
                "The winner count must be between {} and {}.",
                MIN_WINNERS, MAX_WINNERS
            );
            return Err(Error::Validation(message));
        }
        if prize.trim().is_empty() {
            let message = "The giveaway needs a prize description.".to_string();
            return Err(Error::Validation(message));
        }

        let ends_at = now_epoch() + duration.seconds as i64;
        let giveaway = Giveaway::new(
            message_id,
            channel_id,
            host_id,
            prize.trim(),
            winner_count,
            ends_at,
        );
        self.store.create_giveaway(giveaway.clone())?;

        // The announcement refresh is best-effort; the giveaway is
        // already committed.
        if let Err(err) = self.notifier.giveaway_started(&giveaway).await {
            warn!(
                "Can't publish the announcement for the giveaway {}: {}",
                message_id, err
            );
        }
        Ok(giveaway)
    }

    // The opt-in reaction path. Returns whether a new entry appeared.
    pub async fn join_giveaway(&self, giveaway_id: &str, user_id: u64) -> Result<bool> {
        let giveaway = self.require_giveaway(giveaway_id)?;
        if !giveaway.is_active() {
            return Ok(false);
        }
        if user_id == self.bot_id {
            return Ok(false);
        }
        Ok(self.store.upsert_entrant(giveaway_id, Entrant::real(user_id)))
    }

    // The opt-out path. Forced and synthetic entries stay put.
    pub async fn leave_giveaway(&self, giveaway_id: &str, user_id: u64) -> Result<bool> {
        self.require_giveaway(giveaway_id)?;
        Ok(self
            .store
            .remove_entrant(giveaway_id, &user_id.to_string()))
    }

    // Manual resolution ahead of the timer.
    pub async fn end_giveaway_now(&self, giveaway_id: &str) -> Result<Vec<String>> {
        let guard = self.giveaway_guard(giveaway_id);
        let _locked = guard.lock().await;

        let giveaway = self.require_giveaway(giveaway_id)?;
        if !giveaway.is_active() {
            let message = format!(
                "The giveaway {} is already {}.",
                giveaway_id,
                giveaway.status.as_str()
            );
            return Err(Error::Validation(message));
        }
        self.resolve_locked(&giveaway).await
    }

    // The expiry-sweep entry point. Unlike the manual command it is a
    // silent no-op when someone else resolved the giveaway between
    // the scan and the guard acquisition.
    pub async fn finalize_giveaway(&self, giveaway_id: &str) -> Result<Vec<String>> {
        let guard = self.giveaway_guard(giveaway_id);
        let _locked = guard.lock().await;

        let giveaway = self.require_giveaway(giveaway_id)?;
        match giveaway.status {
            GiveawayStatus::Active => self.resolve_locked(&giveaway).await,
            GiveawayStatus::Ended => Ok(giveaway.winner_ids),
            _ => Ok(Vec::new()),
        }
    }

    // Re-runs the winner selection. On an active giveaway this simply
    // resolves it; on an ended one it draws a fresh set excluding
    // everyone already recorded as a winner.
    pub async fn reroll_giveaway(&self, giveaway_id: &str, actor_id: u64) -> Result<Vec<String>> {
        let guard = self.giveaway_guard(giveaway_id);
        let _locked = guard.lock().await;

        let giveaway = self.require_giveaway(giveaway_id)?;
        match giveaway.status {
            GiveawayStatus::Active => self.resolve_locked(&giveaway).await,
            GiveawayStatus::Ended => {
                let previous: HashSet<String> = giveaway.winner_ids.iter().cloned().collect();
                let pool: HashSet<String> = self
                    .entrant_pool(giveaway_id)
                    .into_iter()
                    .filter(|id| !previous.contains(id))
                    .collect();
                if pool.is_empty() {
                    return Err(Error::NoEligibleParticipants);
                }

                let winners = select_winners(&pool, &[], giveaway.winner_count as usize);
                self.notifier
                    .giveaway_ended(&giveaway, &winners)
                    .await?;
                self.store.replace_winners(giveaway_id, &winners, actor_id)?;
                Ok(winners)
            }
            status => {
                let message = format!(
                    "The giveaway {} can't be rerolled from the {} state.",
                    giveaway_id,
                    status.as_str()
                );
                Err(Error::Validation(message))
            }
        }
    }

    // Replaces the guaranteed-winner list of a running giveaway.
    pub async fn force_winners(&self, giveaway_id: &str, user_ids: &[u64]) -> Result<()> {
        let giveaway = self.require_giveaway(giveaway_id)?;
        if !giveaway.is_active() {
            let message = format!(
                "Winners can only be forced while the giveaway is active, this one is {}.",
                giveaway.status.as_str()
            );
            return Err(Error::Validation(message));
        }
        self.store.set_forced_winners(giveaway_id, user_ids)
    }

    // Schedules a gradual synthetic fill toward `total` extra entries
    // spread over the given window.
    pub async fn fill_giveaway(
        &self,
        giveaway_id: &str,
        member_pool: Vec<u64>,
        total: u32,
        window_minutes: u64,
        created_by: u64,
    ) -> Result<()> {
        if !(MIN_FILL_ENTRIES..=MAX_FILL_ENTRIES).contains(&total) {
            let message = format!(
                "The amount of filled entries must be between {} and {}.",
                MIN_FILL_ENTRIES, MAX_FILL_ENTRIES
            );
            return Err(Error::Validation(message));
        }
        if !(MIN_FILL_MINUTES..=MAX_FILL_MINUTES).contains(&window_minutes) {
            let message = format!(
                "The fill window must be between {} minute and {} minutes.",
                MIN_FILL_MINUTES, MAX_FILL_MINUTES
            );
            return Err(Error::Validation(message));
        }

        let deadline = now_epoch() + (window_minutes * 60) as i64;
        self.fill
            .start(giveaway_id, member_pool, total, deadline, created_by)
            .await
    }

    // Stops a running giveaway without picking winners.
    pub async fn cancel_giveaway(&self, giveaway_id: &str) -> Result<()> {
        let guard = self.giveaway_guard(giveaway_id);
        let _locked = guard.lock().await;

        self.store.cancel_giveaway(giveaway_id)?;
        self.fill.stop(giveaway_id).await;
        Ok(())
    }

    // Builds one page of the de-duplicated entries view and pushes it
    // to the presentation layer.
    pub async fn entries_page(&self, giveaway_id: &str, page_index: usize) -> Result<EntriesPage> {
        let giveaway = self.require_giveaway(giveaway_id)?;
        let page = self.entries.get_page(giveaway_id, page_index)?;

        if let Err(err) = self.notifier.entries_page(&giveaway, &page).await {
            warn!(
                "Can't publish the entries page for the giveaway {}: {}",
                giveaway_id, err
            );
        }
        Ok(page)
    }

    // Resolution shared by the timer sweep, the manual end command
    // and the reroll of a still-active giveaway. The caller holds the
    // per-giveaway guard.
    async fn resolve_locked(&self, giveaway: &Giveaway) -> Result<Vec<String>> {
        let giveaway_id = &giveaway.message_id;
        let pool = self.entrant_pool(giveaway_id);
        let winners = select_winners(
            &pool,
            &giveaway.forced_winner_ids,
            giveaway.winner_count as usize,
        );

        // The outward announcement doubles as the reachability probe:
        // if the channel is gone the giveaway is parked in the error
        // state instead of being retried forever.
        if let Err(err) = self.notifier.giveaway_ended(giveaway, &winners).await {
            let _ = self
                .store
                .mark_giveaway_error(giveaway_id, &err.to_string());
            self.fill.stop(giveaway_id).await;
            return Err(err);
        }

        self.store.resolve_giveaway(giveaway_id, &winners)?;
        self.fill.stop(giveaway_id).await;
        Ok(winners)
    }

    // Everyone entered, minus the bot's own membership on the
    // announcement message.
    fn entrant_pool(&self, giveaway_id: &str) -> HashSet<String> {
        let bot_key = self.bot_id.to_string();
        self.store
            .list_entrants(giveaway_id)
            .into_iter()
            .map(|row| row.entrant_id)
            .filter(|id| *id != bot_key)
            .collect()
    }

    fn require_giveaway(&self, giveaway_id: &str) -> Result<Giveaway> {
        self.store.get_giveaway(giveaway_id).ok_or_else(|| {
            let message = format!("The giveaway {} was not found.", giveaway_id);
            Error::NotFound(message)
        })
    }

    fn giveaway_guard(&self, giveaway_id: &str) -> Arc<Mutex<()>> {
        self.resolution_guards
            .entry(giveaway_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
