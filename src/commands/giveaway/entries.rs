use std::collections::HashSet;
use std::sync::Arc;

use crate::commands::giveaway::store::GiveawayStore;
use crate::error::{Error, Result};

// One page of the de-duplicated entries view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntriesPage {
    // Originating user ids, one per shown entry.
    pub items: Vec<u64>,
    pub page: usize,
    pub total_pages: usize,
    pub total_entries: usize,
}

// Read-only view over the entrant rows of a giveaway: real and fake
// records are merged and collapsed by originating identity, so a user
// never shows up twice even when a fill plan also used them as a
// synthetic source.
pub struct EntriesQueryService {
    store: Arc<GiveawayStore>,
    // The bot's own reaction seeds the giveaway message and must not
    // be listed as an entry.
    bot_id: u64,
    page_size: usize,
}

impl EntriesQueryService {
    pub fn new(store: Arc<GiveawayStore>, bot_id: u64, page_size: usize) -> Self {
        EntriesQueryService {
            store,
            bot_id,
            page_size: page_size.max(1),
        }
    }

    pub fn get_page(&self, giveaway_id: &str, page_index: usize) -> Result<EntriesPage> {
        if self.store.get_giveaway(giveaway_id).is_none() {
            let message = format!("The giveaway {} was not found.", giveaway_id);
            return Err(Error::NotFound(message));
        }

        let mut rows = self.store.list_entrants(giveaway_id);
        // Join order keeps the pages stable between calls.
        rows.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.entrant_id.cmp(&b.entrant_id))
        });

        let mut seen: HashSet<u64> = HashSet::new();
        let mut origins: Vec<u64> = Vec::new();
        for row in rows {
            let origin = row.origin_id();
            if origin == self.bot_id {
                continue;
            }
            if seen.insert(origin) {
                origins.push(origin);
            }
        }

        let total_entries = origins.len();
        let total_pages = total_entries.div_ceil(self.page_size).max(1);
        let page = page_index.min(total_pages - 1);

        let items = origins
            .into_iter()
            .skip(page * self.page_size)
            .take(self.page_size)
            .collect();

        Ok(EntriesPage {
            items,
            page,
            total_pages,
            total_entries,
        })
    }
}
