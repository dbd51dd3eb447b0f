use serenity::model::channel::ReactionType;

use crate::commands::giveaway::formatters::GIVEAWAY_EMOJI;
use crate::commands::Context;
use crate::error::{Error, Result};

// Mentions come in as "<@123>" or "<@!123>", bare ids as "123".
fn parse_user_ids(input: &str) -> Result<Vec<u64>> {
    let mut user_ids = Vec::new();
    for token in input.split_whitespace() {
        let cleaned = token
            .trim_start_matches("<@!")
            .trim_start_matches("<@")
            .trim_end_matches('>');
        match cleaned.parse::<u64>() {
            Ok(user_id) => user_ids.push(user_id),
            Err(_) => {
                let message = format!("`{}` is not a user mention or id.", token);
                return Err(Error::Validation(message));
            }
        }
    }
    if user_ids.is_empty() {
        let message = "Pass at least one user mention or id.".to_string();
        return Err(Error::Validation(message));
    }
    Ok(user_ids)
}

/// Start a giveaway in the current channel
#[poise::command(slash_command, rename = "gstart", guild_only)]
pub async fn start_giveaway(
    ctx: Context<'_>,
    #[description = "How long the giveaway runs, e.g. 1h30m"] duration: String,
    #[description = "How many winners to draw"] winners: u32,
    #[description = "What the winners get"] prize: String,
) -> Result<()> {
    let manager = ctx.data().manager.clone();
    let channel_id = ctx.channel_id();

    // The announcement message is posted first so that its id can
    // become the giveaway id.
    let announcement = channel_id
        .say(ctx.http(), "Setting up the giveaway...")
        .await?;

    let created = manager
        .start_giveaway(
            &announcement.id.to_string(),
            channel_id.get(),
            ctx.author().id.get(),
            &duration,
            winners,
            &prize,
        )
        .await;

    match created {
        Ok(_) => {
            announcement
                .react(ctx.http(), ReactionType::Unicode(GIVEAWAY_EMOJI.to_string()))
                .await?;
            let reply = format!("The giveaway `{}` has been started!", announcement.id);
            ctx.say(reply).await?;
        }
        Err(err) => {
            let _ = announcement.delete(ctx.http()).await;
            ctx.say(err.to_string()).await?;
        }
    }
    Ok(())
}

/// End a giveaway right now and announce the winners
#[poise::command(slash_command, rename = "gend", guild_only)]
pub async fn end_giveaway(
    ctx: Context<'_>,
    #[description = "The giveaway message id"] giveaway: String,
) -> Result<()> {
    let manager = ctx.data().manager.clone();
    match manager.end_giveaway_now(&giveaway).await {
        Ok(winners) => {
            let reply = format!(
                "The giveaway has ended with {} winner(s).",
                winners.len()
            );
            ctx.say(reply).await?;
        }
        Err(err) => {
            ctx.say(err.to_string()).await?;
        }
    }
    Ok(())
}

/// Draw new winners for an ended giveaway
#[poise::command(slash_command, rename = "greroll", guild_only)]
pub async fn reroll_giveaway(
    ctx: Context<'_>,
    #[description = "The giveaway message id"] giveaway: String,
) -> Result<()> {
    let manager = ctx.data().manager.clone();
    match manager
        .reroll_giveaway(&giveaway, ctx.author().id.get())
        .await
    {
        Ok(winners) => {
            let reply = format!("Rerolled: {} new winner(s) drawn.", winners.len());
            ctx.say(reply).await?;
        }
        Err(err) => {
            ctx.say(err.to_string()).await?;
        }
    }
    Ok(())
}

/// Guarantee that the given users are among the winners
#[poise::command(slash_command, rename = "gforce", guild_only)]
pub async fn force_winners(
    ctx: Context<'_>,
    #[description = "The giveaway message id"] giveaway: String,
    #[description = "User mentions or ids, separated by spaces"] users: String,
) -> Result<()> {
    let manager = ctx.data().manager.clone();
    let outcome = match parse_user_ids(&users) {
        Ok(user_ids) => manager.force_winners(&giveaway, &user_ids).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(()) => {
            ctx.say("The forced winner list has been updated.").await?;
        }
        Err(err) => {
            ctx.say(err.to_string()).await?;
        }
    }
    Ok(())
}

/// Gradually add synthetic entries to a running giveaway
#[poise::command(slash_command, rename = "gfill", guild_only)]
pub async fn fill_giveaway(
    ctx: Context<'_>,
    #[description = "The giveaway message id"] giveaway: String,
    #[description = "How many entries to add"] entries: u32,
    #[description = "Over how many minutes"] minutes: u64,
) -> Result<()> {
    let manager = ctx.data().manager.clone();
    let guild_id = match ctx.guild_id() {
        Some(guild_id) => guild_id,
        None => {
            ctx.say("This command only works inside a server.").await?;
            return Ok(());
        }
    };

    // The synthetic entries are attributed to real, non-bot members
    // of the server.
    let member_pool: Vec<u64> = guild_id
        .members(ctx.http(), Some(1000), None)
        .await?
        .iter()
        .filter(|member| !member.user.bot)
        .map(|member| member.user.id.get())
        .collect();

    match manager
        .fill_giveaway(
            &giveaway,
            member_pool,
            entries,
            minutes,
            ctx.author().id.get(),
        )
        .await
    {
        Ok(()) => {
            let reply = format!(
                "Filling {} entries over the next {} minute(s).",
                entries, minutes
            );
            ctx.say(reply).await?;
        }
        Err(err) => {
            ctx.say(err.to_string()).await?;
        }
    }
    Ok(())
}

/// Cancel a running giveaway without picking winners
#[poise::command(slash_command, rename = "gcancel", guild_only)]
pub async fn cancel_giveaway(
    ctx: Context<'_>,
    #[description = "The giveaway message id"] giveaway: String,
) -> Result<()> {
    let manager = ctx.data().manager.clone();
    match manager.cancel_giveaway(&giveaway).await {
        Ok(()) => {
            ctx.say("The giveaway has been cancelled.").await?;
        }
        Err(err) => {
            ctx.say(err.to_string()).await?;
        }
    }
    Ok(())
}

/// Show one page of the entries for a giveaway
#[poise::command(slash_command, rename = "gentries", guild_only)]
pub async fn list_entries(
    ctx: Context<'_>,
    #[description = "The giveaway message id"] giveaway: String,
    #[description = "Page number, starting at 1"] page: Option<usize>,
) -> Result<()> {
    let manager = ctx.data().manager.clone();
    let page_index = page.unwrap_or(1).saturating_sub(1);

    match manager.entries_page(&giveaway, page_index).await {
        Ok(page) => {
            let reply = format!(
                "Posted page {} of {} ({} entries in total).",
                page.page + 1,
                page.total_pages,
                page.total_entries
            );
            ctx.say(reply).await?;
        }
        Err(err) => {
            ctx.say(err.to_string()).await?;
        }
    }
    Ok(())
}
