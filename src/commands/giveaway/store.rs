use std::collections::HashMap;

use dashmap::DashMap;

use crate::commands::giveaway::models::{
    now_epoch, Entrant, FillPlan, FillPlanStatus, Giveaway, GiveawayStatus,
};
use crate::error::{Error, Result};

// The single owner of durable giveaway state. Everything above this
// layer treats a returned record as a snapshot; all mutation goes
// through the keyed operations below so that the expiry scan, manual
// commands and fill workers never lose updates to each other.
#[derive(Debug, Default)]
pub struct GiveawayStore {
    giveaways: DashMap<String, Giveaway>,
    // Entrants per giveaway, keyed by entrant id inside the entry.
    entrants: DashMap<String, HashMap<String, Entrant>>,
    fill_plans: DashMap<String, FillPlan>,
}

impl GiveawayStore {
    pub fn new() -> Self {
        GiveawayStore::default()
    }

    pub fn create_giveaway(&self, giveaway: Giveaway) -> Result<()> {
        if self.giveaways.contains_key(&giveaway.message_id) {
            let message = format!(
                "A giveaway is already registered for the message {}.",
                giveaway.message_id
            );
            return Err(Error::DuplicateKey(message));
        }

        self.giveaways
            .insert(giveaway.message_id.clone(), giveaway);
        Ok(())
    }

    pub fn get_giveaway(&self, giveaway_id: &str) -> Option<Giveaway> {
        self.giveaways
            .get(giveaway_id)
            .map(|entry| entry.value().clone())
    }

    // Used only by the expiry scheduler.
    pub fn list_expired_active(&self, now: i64) -> Vec<Giveaway> {
        self.giveaways
            .iter()
            .filter(|entry| entry.value().is_active() && entry.value().ends_at <= now)
            .map(|entry| entry.value().clone())
            .collect()
    }

    // Insert-or-ignore on the (giveaway id, entrant id) composite key.
    // Returns whether a new row was actually created.
    pub fn upsert_entrant(&self, giveaway_id: &str, entrant: Entrant) -> bool {
        let mut rows = self.entrants.entry(giveaway_id.to_string()).or_default();
        match rows.contains_key(&entrant.entrant_id) {
            true => false,
            false => {
                rows.insert(entrant.entrant_id.clone(), entrant);
                true
            }
        }
    }

    // The reaction-removal path. Forced and synthetic rows survive it.
    pub fn remove_entrant(&self, giveaway_id: &str, entrant_id: &str) -> bool {
        let mut rows = match self.entrants.get_mut(giveaway_id) {
            Some(rows) => rows,
            None => return false,
        };

        let removable = rows
            .get(entrant_id)
            .map(|row| !row.is_fake() && !row.forced)
            .unwrap_or(false);
        if removable {
            rows.remove(entrant_id);
        }
        removable
    }

    pub fn list_entrants(&self, giveaway_id: &str) -> Vec<Entrant> {
        self.entrants
            .get(giveaway_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    // Replaces the forced-winner list and makes sure every forced id
    // is present as a forced entrant row.
    pub fn set_forced_winners(&self, giveaway_id: &str, user_ids: &[u64]) -> Result<()> {
        let mut giveaway = self.get_giveaway_mut(giveaway_id)?;
        giveaway.forced_winner_ids = user_ids.iter().map(|id| id.to_string()).collect();
        drop(giveaway);

        let mut rows = self.entrants.entry(giveaway_id.to_string()).or_default();
        for user_id in user_ids {
            let key = user_id.to_string();
            match rows.get_mut(&key) {
                Some(row) => row.forced = true,
                None => {
                    rows.insert(key, Entrant::forced(*user_id));
                }
            }
        }
        Ok(())
    }

    // Freezes the result. A second resolution of an ended giveaway is
    // a no-op so that rerolls never trip over it.
    pub fn resolve_giveaway(&self, giveaway_id: &str, winner_ids: &[String]) -> Result<()> {
        let mut giveaway = self.get_giveaway_mut(giveaway_id)?;
        match giveaway.status {
            GiveawayStatus::Active => {
                giveaway.status = GiveawayStatus::Ended;
                giveaway.winner_ids = winner_ids.to_vec();
                giveaway.resolved_at = Some(now_epoch());
                Ok(())
            }
            GiveawayStatus::Ended => Ok(()),
            status => {
                let message = format!(
                    "The giveaway {} can't be resolved from the {} state.",
                    giveaway_id,
                    status.as_str()
                );
                Err(Error::Validation(message))
            }
        }
    }

    // Reroll support: swaps the winner list of an ended giveaway
    // without touching its terminal status.
    pub fn replace_winners(
        &self,
        giveaway_id: &str,
        winner_ids: &[String],
        actor_id: u64,
    ) -> Result<()> {
        let mut giveaway = self.get_giveaway_mut(giveaway_id)?;
        match giveaway.status {
            GiveawayStatus::Ended => {
                giveaway.winner_ids = winner_ids.to_vec();
                giveaway.rerolled_at = Some(now_epoch());
                giveaway.rerolled_by = Some(actor_id);
                Ok(())
            }
            status => {
                let message = format!(
                    "Winners of the giveaway {} can't be replaced in the {} state.",
                    giveaway_id,
                    status.as_str()
                );
                Err(Error::Validation(message))
            }
        }
    }

    // Terminal transition from active. Ignored for giveaways that
    // already reached a terminal state.
    pub fn mark_giveaway_error(&self, giveaway_id: &str, detail: &str) -> Result<()> {
        let mut giveaway = self.get_giveaway_mut(giveaway_id)?;
        if giveaway.is_active() {
            giveaway.status = GiveawayStatus::Error;
            giveaway.error_detail = Some(detail.to_string());
        }
        Ok(())
    }

    pub fn cancel_giveaway(&self, giveaway_id: &str) -> Result<()> {
        let mut giveaway = self.get_giveaway_mut(giveaway_id)?;
        match giveaway.status {
            GiveawayStatus::Active => {
                giveaway.status = GiveawayStatus::Cancelled;
                Ok(())
            }
            status => {
                let message = format!(
                    "The giveaway {} can't be cancelled from the {} state.",
                    giveaway_id,
                    status.as_str()
                );
                Err(Error::Validation(message))
            }
        }
    }

    // A new plan replaces any previous one for the same giveaway.
    pub fn upsert_fill_plan(&self, plan: FillPlan) {
        self.fill_plans.insert(plan.giveaway_id.clone(), plan);
    }

    pub fn get_fill_plan(&self, giveaway_id: &str) -> Option<FillPlan> {
        self.fill_plans
            .get(giveaway_id)
            .map(|entry| entry.value().clone())
    }

    pub fn list_active_fill_plans(&self) -> Vec<FillPlan> {
        self.fill_plans
            .iter()
            .filter(|entry| entry.value().status == FillPlanStatus::Active)
            .map(|entry| entry.value().clone())
            .collect()
    }

    // Persists one step of fill progress: the decremented counter and
    // the entrant id that was just placed, in a single update.
    pub fn decrement_fill_plan(
        &self,
        giveaway_id: &str,
        new_remaining: u32,
        spawned_id: &str,
    ) -> Result<()> {
        let mut plan = match self.fill_plans.get_mut(giveaway_id) {
            Some(plan) => plan,
            None => {
                let message = format!("There is no fill plan for the giveaway {}.", giveaway_id);
                return Err(Error::NotFound(message));
            }
        };

        if plan.status != FillPlanStatus::Active {
            let message = format!(
                "The fill plan for the giveaway {} is already {}.",
                giveaway_id,
                plan.status.as_str()
            );
            return Err(Error::Validation(message));
        }
        if new_remaining >= plan.remaining {
            let message = format!(
                "The remaining counter of the fill plan {} can only decrease.",
                giveaway_id
            );
            return Err(Error::Validation(message));
        }

        plan.remaining = new_remaining;
        plan.spawned_ids.push(spawned_id.to_string());
        Ok(())
    }

    // Writes a terminal plan status. No-op once the plan is terminal,
    // so a cancelled worker and the scheduler can't fight over it.
    pub fn set_fill_plan_status(
        &self,
        giveaway_id: &str,
        status: FillPlanStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        let mut plan = match self.fill_plans.get_mut(giveaway_id) {
            Some(plan) => plan,
            None => {
                let message = format!("There is no fill plan for the giveaway {}.", giveaway_id);
                return Err(Error::NotFound(message));
            }
        };

        if !plan.status.is_terminal() {
            plan.status = status;
            plan.error_detail = detail.map(|text| text.to_string());
        }
        Ok(())
    }

    fn get_giveaway_mut(
        &self,
        giveaway_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, Giveaway>> {
        self.giveaways.get_mut(giveaway_id).ok_or_else(|| {
            let message = format!("The giveaway {} was not found.", giveaway_id);
            Error::NotFound(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::giveaway::models::{
        Entrant, FillPlan, FillPlanStatus, Giveaway, GiveawayStatus,
    };
    use crate::commands::giveaway::store::GiveawayStore;
    use crate::error::Error;

    fn giveaway(id: &str, ends_at: i64) -> Giveaway {
        Giveaway::new(id, 10, 42, "A game key", 2, ends_at)
    }

    #[test]
    fn test_create_and_get_giveaway() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 1_900_000_000)).unwrap();

        let loaded = store.get_giveaway("100").unwrap();
        assert_eq!(loaded.message_id, "100");
        assert_eq!(loaded.status, GiveawayStatus::Active);
    }

    #[test]
    fn test_get_error_for_duplicate_giveaway_id() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 1_900_000_000)).unwrap();

        let result = store.create_giveaway(giveaway("100", 1_900_000_000));
        assert_eq!(result.is_err(), true);
        assert_eq!(
            result.unwrap_err(),
            Error::DuplicateKey(format!(
                "A giveaway is already registered for the message 100."
            ))
        );
    }

    #[test]
    fn test_get_missing_giveaway_returns_none() {
        let store = GiveawayStore::new();

        assert_eq!(store.get_giveaway("100"), None);
    }

    #[test]
    fn test_list_expired_active_skips_future_and_terminal() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("overdue", 100)).unwrap();
        store.create_giveaway(giveaway("running", 1_900_000_000)).unwrap();
        store.create_giveaway(giveaway("finished", 100)).unwrap();
        store.resolve_giveaway("finished", &[]).unwrap();

        let expired = store.list_expired_active(200);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].message_id, "overdue");
    }

    #[test]
    fn test_upsert_entrant_is_idempotent() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 1_900_000_000)).unwrap();

        assert_eq!(store.upsert_entrant("100", Entrant::real(501)), true);
        assert_eq!(store.upsert_entrant("100", Entrant::real(501)), false);
        assert_eq!(store.list_entrants("100").len(), 1);
    }

    #[test]
    fn test_remove_entrant_only_touches_real_unforced_rows() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 1_900_000_000)).unwrap();
        store.upsert_entrant("100", Entrant::real(501));
        store.upsert_entrant("100", Entrant::forced(502));
        let fake = Entrant::fake(503);
        let fake_id = fake.entrant_id.clone();
        store.upsert_entrant("100", fake);

        assert_eq!(store.remove_entrant("100", "501"), true);
        assert_eq!(store.remove_entrant("100", "502"), false);
        assert_eq!(store.remove_entrant("100", &fake_id), false);
        assert_eq!(store.list_entrants("100").len(), 2);
    }

    #[test]
    fn test_set_forced_winners_upserts_and_marks_rows() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 1_900_000_000)).unwrap();
        store.upsert_entrant("100", Entrant::real(501));

        store.set_forced_winners("100", &[501, 502]).unwrap();

        let loaded = store.get_giveaway("100").unwrap();
        assert_eq!(loaded.forced_winner_ids, vec!["501", "502"]);

        let entrants = store.list_entrants("100");
        assert_eq!(entrants.len(), 2);
        assert_eq!(entrants.iter().all(|row| row.forced), true);
    }

    #[test]
    fn test_resolve_giveaway_freezes_winners() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 100)).unwrap();

        store
            .resolve_giveaway("100", &["501".to_string()])
            .unwrap();

        let loaded = store.get_giveaway("100").unwrap();
        assert_eq!(loaded.status, GiveawayStatus::Ended);
        assert_eq!(loaded.winner_ids, vec!["501"]);
        assert_eq!(loaded.resolved_at.is_some(), true);
    }

    #[test]
    fn test_resolve_giveaway_twice_is_a_noop() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 100)).unwrap();
        store
            .resolve_giveaway("100", &["501".to_string()])
            .unwrap();

        let result = store.resolve_giveaway("100", &["999".to_string()]);
        assert_eq!(result.is_ok(), true);

        let loaded = store.get_giveaway("100").unwrap();
        assert_eq!(loaded.winner_ids, vec!["501"]);
    }

    #[test]
    fn test_resolve_cancelled_giveaway_is_rejected() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 100)).unwrap();
        store.cancel_giveaway("100").unwrap();

        let result = store.resolve_giveaway("100", &[]);
        assert_eq!(result.is_err(), true);
    }

    #[test]
    fn test_replace_winners_keeps_terminal_status() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 100)).unwrap();
        store
            .resolve_giveaway("100", &["501".to_string()])
            .unwrap();

        store
            .replace_winners("100", &["502".to_string()], 42)
            .unwrap();

        let loaded = store.get_giveaway("100").unwrap();
        assert_eq!(loaded.status, GiveawayStatus::Ended);
        assert_eq!(loaded.winner_ids, vec!["502"]);
        assert_eq!(loaded.rerolled_by, Some(42));
        assert_eq!(loaded.rerolled_at.is_some(), true);
    }

    #[test]
    fn test_replace_winners_requires_ended_state() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 1_900_000_000)).unwrap();

        let result = store.replace_winners("100", &[], 42);
        assert_eq!(result.is_err(), true);
    }

    #[test]
    fn test_mark_giveaway_error_is_terminal_and_sticky() {
        let store = GiveawayStore::new();
        store.create_giveaway(giveaway("100", 100)).unwrap();

        store.mark_giveaway_error("100", "channel deleted").unwrap();
        let loaded = store.get_giveaway("100").unwrap();
        assert_eq!(loaded.status, GiveawayStatus::Error);
        assert_eq!(loaded.error_detail, Some("channel deleted".to_string()));

        // A later error report doesn't overwrite the recorded detail.
        store.mark_giveaway_error("100", "other").unwrap();
        let loaded = store.get_giveaway("100").unwrap();
        assert_eq!(loaded.error_detail, Some("channel deleted".to_string()));
    }

    #[test]
    fn test_decrement_fill_plan_persists_progress() {
        let store = GiveawayStore::new();
        store.upsert_fill_plan(FillPlan::new("100", 10, vec![501], 5, 1_900_000_000, 42));

        store.decrement_fill_plan("100", 4, "fake-a").unwrap();
        store.decrement_fill_plan("100", 3, "fake-b").unwrap();

        let plan = store.get_fill_plan("100").unwrap();
        assert_eq!(plan.remaining, 3);
        assert_eq!(plan.spawned_ids, vec!["fake-a", "fake-b"]);
    }

    #[test]
    fn test_decrement_fill_plan_rejects_non_decreasing_value() {
        let store = GiveawayStore::new();
        store.upsert_fill_plan(FillPlan::new("100", 10, vec![501], 5, 1_900_000_000, 42));

        let result = store.decrement_fill_plan("100", 5, "fake-a");
        assert_eq!(result.is_err(), true);
    }

    #[test]
    fn test_fill_plan_status_is_terminal_once_set() {
        let store = GiveawayStore::new();
        store.upsert_fill_plan(FillPlan::new("100", 10, vec![501], 5, 1_900_000_000, 42));

        store
            .set_fill_plan_status("100", FillPlanStatus::Cancelled, None)
            .unwrap();
        store
            .set_fill_plan_status("100", FillPlanStatus::Completed, None)
            .unwrap();

        let plan = store.get_fill_plan("100").unwrap();
        assert_eq!(plan.status, FillPlanStatus::Cancelled);
    }

    #[test]
    fn test_list_active_fill_plans_skips_terminal_plans() {
        let store = GiveawayStore::new();
        store.upsert_fill_plan(FillPlan::new("100", 10, vec![501], 5, 1_900_000_000, 42));
        store.upsert_fill_plan(FillPlan::new("200", 10, vec![501], 5, 1_900_000_000, 42));
        store
            .set_fill_plan_status("200", FillPlanStatus::Completed, None)
            .unwrap();

        let active = store.list_active_fill_plans();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].giveaway_id, "100");
    }
}
