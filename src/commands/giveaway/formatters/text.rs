// Plain-text formatter used for all outward giveaway messages.
use crate::commands::giveaway::entries::EntriesPage;
use crate::commands::giveaway::formatters::base::GiveawayFormatter;
use crate::commands::giveaway::models::Giveaway;

pub const GIVEAWAY_EMOJI: &str = "🎉";

pub struct DefaultGiveawayFormatter;

impl DefaultGiveawayFormatter {
    pub fn new() -> Self {
        DefaultGiveawayFormatter {}
    }
}

impl GiveawayFormatter for DefaultGiveawayFormatter {
    fn announcement(&self, giveaway: &Giveaway, entry_count: usize) -> String {
        format!(
            "{emoji} **GIVEAWAY** {emoji}\n\
             Prize: **{prize}**\n\
             Winners: **{winners}**\n\
             Entries: **{entries}**\n\
             React with {emoji} to enter! Ends <t:{ends_at}:R>.",
            emoji = GIVEAWAY_EMOJI,
            prize = giveaway.prize,
            winners = giveaway.winner_count,
            entries = entry_count,
            ends_at = giveaway.ends_at,
        )
    }

    fn closed_announcement(&self, giveaway: &Giveaway) -> String {
        format!(
            "{emoji} **GIVEAWAY ENDED** {emoji}\n\
             Prize: **{prize}**\n\
             Hosted by <@{host}>.",
            emoji = GIVEAWAY_EMOJI,
            prize = giveaway.prize,
            host = giveaway.host_id,
        )
    }

    fn winners(&self, giveaway: &Giveaway, mentions: &[String]) -> String {
        match mentions.len() {
            0 => format!(
                "Nobody entered the giveaway for **{}**, so there is no winner.",
                giveaway.prize
            ),
            _ => format!(
                "Congratulations {}! You won **{}**!",
                mentions.join(", "),
                giveaway.prize
            ),
        }
    }

    fn entries_page(&self, giveaway: &Giveaway, page: &EntriesPage) -> String {
        let listing = match page.items.len() {
            0 => "No entries yet.".to_string(),
            _ => page
                .items
                .iter()
                .map(|user_id| format!("<@{}>", user_id))
                .collect::<Vec<String>>()
                .join("\n"),
        };

        format!(
            "Entries for **{}** (page {} of {}, {} total):\n{}",
            giveaway.prize,
            page.page + 1,
            page.total_pages,
            page.total_entries,
            listing,
        )
    }
}
