pub mod commands;
pub mod config;
pub mod error;
pub mod storage;

use std::env;
use std::sync::Arc;

use poise::serenity_prelude::GatewayIntents;
use serenity::async_trait;
use serenity::client::{Client, Context, EventHandler};
use serenity::model::channel::Reaction;
use serenity::model::gateway::Ready;
use tracing::{error, info};

use crate::commands::giveaway::formatters::{DefaultGiveawayFormatter, GIVEAWAY_EMOJI};
use crate::commands::giveaway::handlers;
use crate::commands::giveaway::manager::GiveawayManager;
use crate::commands::giveaway::notifier::DiscordNotifier;
use crate::commands::giveaway::recovery::RecoveryMonitor;
use crate::commands::giveaway::scheduler::ExpiryScheduler;
use crate::commands::giveaway::store::GiveawayStore;
use crate::commands::{help, UserData};
use crate::config::BotConfig;
use crate::error::Error;
use crate::storage::{BotIdStorage, GiveawayStorage};

pub struct Handler;

#[async_trait]
impl EventHandler for Handler {
    // Reacting with the giveaway emoji on an announcement message
    // enters the user into that giveaway.
    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        if !reaction.emoji.unicode_eq(GIVEAWAY_EMOJI) {
            return;
        }
        let Some(user_id) = reaction.user_id else {
            return;
        };

        let data = ctx.data.read().await;
        let giveaway_manager = data
            .get::<GiveawayStorage>()
            .cloned()
            .expect("Expected GiveawayManager in ShareMap.");
        let bot_id = data
            .get::<BotIdStorage>()
            .cloned()
            .expect("Expected BotId in ShareMap.");
        drop(data);

        if user_id.get() == bot_id.get() {
            return;
        }

        // Reactions on ordinary messages are none of our business.
        let giveaway_id = reaction.message_id.to_string();
        if giveaway_manager.store().get_giveaway(&giveaway_id).is_none() {
            return;
        }

        if let Err(err) = giveaway_manager
            .join_giveaway(&giveaway_id, user_id.get())
            .await
        {
            error!(
                "Can't register the entry for the giveaway {}: {}",
                giveaway_id, err
            );
        }
    }

    // Removing the reaction leaves the giveaway again.
    async fn reaction_remove(&self, ctx: Context, reaction: Reaction) {
        if !reaction.emoji.unicode_eq(GIVEAWAY_EMOJI) {
            return;
        }
        let Some(user_id) = reaction.user_id else {
            return;
        };

        let data = ctx.data.read().await;
        let giveaway_manager = data
            .get::<GiveawayStorage>()
            .cloned()
            .expect("Expected GiveawayManager in ShareMap.");
        drop(data);

        let giveaway_id = reaction.message_id.to_string();
        if giveaway_manager.store().get_giveaway(&giveaway_id).is_none() {
            return;
        }

        if let Err(err) = giveaway_manager
            .leave_giveaway(&giveaway_id, user_id.get())
            .await
        {
            error!(
                "Can't remove the entry from the giveaway {}: {}",
                giveaway_id, err
            );
        }
    }

    async fn ready(&self, _: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let framework = poise::Framework::<UserData, Error>::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                handlers::start_giveaway(),
                handlers::end_giveaway(),
                handlers::reroll_giveaway(),
                handlers::force_winners(),
                handlers::fill_giveaway(),
                handlers::cancel_giveaway(),
                handlers::list_entries(),
                help::help(),
            ],
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let bot_id = ready.user.id;
                let bot_config = BotConfig::from_env();
                let store = Arc::new(GiveawayStore::new());
                let notifier = Arc::new(DiscordNotifier::new(
                    ctx.http.clone(),
                    store.clone(),
                    Box::new(DefaultGiveawayFormatter::new()),
                    bot_id.get(),
                ));
                let giveaway_manager = Arc::new(GiveawayManager::new(
                    store,
                    notifier,
                    &bot_config,
                    bot_id.get(),
                ));

                {
                    let mut data = ctx.data.write().await;
                    data.insert::<GiveawayStorage>(giveaway_manager.clone());
                    data.insert::<BotIdStorage>(Arc::new(bot_id));
                }

                let scheduler = ExpiryScheduler::new(
                    giveaway_manager.clone(),
                    bot_config.poll_interval_secs,
                );
                tokio::spawn(async move { scheduler.run().await });

                let recovery = RecoveryMonitor::new(
                    giveaway_manager.clone(),
                    bot_config.recovery_interval_secs,
                );
                tokio::spawn(async move { recovery.run().await });

                Ok(UserData {
                    manager: giveaway_manager,
                })
            })
        })
        .build();

    let token = env::var("DISCORD_TOKEN").expect("Expected a DISCORD_TOKEN in the environment");
    let intents = GatewayIntents::non_privileged();
    let mut client = Client::builder(&token, intents)
        .event_handler(Handler)
        .framework(framework)
        .await
        .expect("Cannot create a Discord client");

    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }
}
