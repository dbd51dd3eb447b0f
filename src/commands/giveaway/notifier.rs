use std::collections::HashSet;
use std::sync::Arc;

use serenity::async_trait;
use serenity::builder::EditMessage;
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};

use crate::commands::giveaway::entries::EntriesPage;
use crate::commands::giveaway::formatters::GiveawayFormatter;
use crate::commands::giveaway::models::Giveaway;
use crate::commands::giveaway::store::GiveawayStore;
use crate::error::{Error, Result};

// The boundary between the giveaway core and the presentation layer.
// The core never builds Discord messages itself; it reports lifecycle
// events here and moves on.
#[async_trait]
pub trait GiveawayNotifier: Send + Sync {
    async fn giveaway_started(&self, giveaway: &Giveaway) -> Result<()>;
    // A failure here is the reachability signal that sends the
    // giveaway into the error state.
    async fn giveaway_ended(&self, giveaway: &Giveaway, winner_ids: &[String]) -> Result<()>;
    async fn fill_progress(&self, giveaway: &Giveaway, remaining: u32) -> Result<()>;
    async fn entries_page(&self, giveaway: &Giveaway, page: &EntriesPage) -> Result<()>;
}

pub struct DiscordNotifier {
    http: Arc<Http>,
    store: Arc<GiveawayStore>,
    formatter: Box<dyn GiveawayFormatter>,
    bot_id: u64,
}

impl DiscordNotifier {
    pub fn new(
        http: Arc<Http>,
        store: Arc<GiveawayStore>,
        formatter: Box<dyn GiveawayFormatter>,
        bot_id: u64,
    ) -> Self {
        DiscordNotifier {
            http,
            store,
            formatter,
            bot_id,
        }
    }

    // Distinct originating identities currently entered, for the
    // counter in the announcement message.
    fn entry_count(&self, giveaway_id: &str) -> usize {
        self.store
            .list_entrants(giveaway_id)
            .iter()
            .map(|row| row.origin_id())
            .filter(|origin| *origin != self.bot_id)
            .collect::<HashSet<u64>>()
            .len()
    }

    // Maps the winner entrant ids back to mentionable identities.
    fn winner_mentions(&self, giveaway: &Giveaway, winner_ids: &[String]) -> Vec<String> {
        let entrants = self.store.list_entrants(&giveaway.message_id);
        winner_ids
            .iter()
            .map(|winner_id| {
                let origin = entrants
                    .iter()
                    .find(|row| &row.entrant_id == winner_id)
                    .map(|row| row.origin_id());
                match origin {
                    Some(user_id) => format!("<@{}>", user_id),
                    None => winner_id.clone(),
                }
            })
            .collect()
    }

    async fn edit_announcement(&self, giveaway: &Giveaway, content: String) -> Result<()> {
        let message_id = giveaway.message_id.parse::<u64>().map_err(|_| {
            Error::Unreachable(format!(
                "The giveaway id {} is not a message reference.",
                giveaway.message_id
            ))
        })?;

        ChannelId::new(giveaway.channel_id)
            .edit_message(
                &self.http,
                MessageId::new(message_id),
                EditMessage::new().content(content),
            )
            .await
            .map_err(|err| Error::Unreachable(err.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl GiveawayNotifier for DiscordNotifier {
    async fn giveaway_started(&self, giveaway: &Giveaway) -> Result<()> {
        let content = self.formatter.announcement(giveaway, 0);
        self.edit_announcement(giveaway, content).await
    }

    async fn giveaway_ended(&self, giveaway: &Giveaway, winner_ids: &[String]) -> Result<()> {
        let content = self.formatter.closed_announcement(giveaway);
        self.edit_announcement(giveaway, content).await?;

        let mentions = self.winner_mentions(giveaway, winner_ids);
        ChannelId::new(giveaway.channel_id)
            .say(&self.http, self.formatter.winners(giveaway, &mentions))
            .await
            .map_err(|err| Error::Unreachable(err.to_string()))?;
        Ok(())
    }

    async fn fill_progress(&self, giveaway: &Giveaway, _remaining: u32) -> Result<()> {
        let count = self.entry_count(&giveaway.message_id);
        let content = self.formatter.announcement(giveaway, count);
        self.edit_announcement(giveaway, content).await
    }

    async fn entries_page(&self, giveaway: &Giveaway, page: &EntriesPage) -> Result<()> {
        ChannelId::new(giveaway.channel_id)
            .say(&self.http, self.formatter.entries_page(giveaway, page))
            .await?;
        Ok(())
    }
}
