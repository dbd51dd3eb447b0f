use crate::commands::giveaway::entries::EntriesPage;
use crate::commands::giveaway::models::Giveaway;

pub trait GiveawayFormatter: Send + Sync {
    // The announcement message body, kept up to date while the
    // giveaway is running.
    fn announcement(&self, giveaway: &Giveaway, entry_count: usize) -> String;
    // The final state of the announcement message.
    fn closed_announcement(&self, giveaway: &Giveaway) -> String;
    // The winners message posted in the channel on resolution.
    fn winners(&self, giveaway: &Giveaway, mentions: &[String]) -> String;
    // One page of the entries listing.
    fn entries_page(&self, giveaway: &Giveaway, page: &EntriesPage) -> String;
}
