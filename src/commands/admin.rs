//! Moderator commands

use super::guild;
use crate::inactivity::{InactivityService, ProgressMessage};
use crate::leaderboard::report_absent_members;
use crate::platform::{Destination, Embed, GuildDirectory, Outbound, Outbox, parse_channel_token};
use crate::relay::{Invocation, edit_message, relay_message};
use crate::template::paginate;
use crate::{CommandStatus, Context, Error, logging};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use tracing::info;

/// List members with no recent messages or reactions
#[poise::command(prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn inactivelist(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, platform) = guild(ctx)?;
    let data = ctx.data();
    let service = InactivityService::new(&platform, &data.inactivity, &data.config, guild_id);
    let mut progress = ProgressMessage::new(&platform, ctx.channel_id());

    let status = service
        .inactive_list(ctx.author().id, ctx.channel_id(), Utc::now(), &mut progress)
        .await?;
    logging::log_command_status(ctx, status);
    Ok(())
}

/// Message every inactive member who is not exempt
#[poise::command(prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn inactivenotify(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, platform) = guild(ctx)?;
    let data = ctx.data();
    let service = InactivityService::new(&platform, &data.inactivity, &data.config, guild_id);
    let mut progress = ProgressMessage::new(&platform, ctx.channel_id());

    let (status, outcome) = service
        .notify_inactive_members(None, ctx.channel_id(), Utc::now(), &mut progress)
        .await?;
    info!(
        guild_id = %guild_id,
        notified = outcome.notified.len(),
        failed = outcome.failed.len(),
        "Inactivity notification finished"
    );
    logging::log_command_status(ctx, status);
    Ok(())
}

/// Manage members excluded from inactivity notifications
#[poise::command(
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("exempt_add", "exempt_remove", "exempt_list"),
    subcommand_required
)]
pub async fn exempt(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Exempt a member from inactivity notifications
#[poise::command(
    prefix_command,
    rename = "add",
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn exempt_add(ctx: Context<'_>, member: serenity::Member) -> Result<(), Error> {
    set_exemption(ctx, &member, true).await
}

/// Make a member eligible for inactivity notifications again
#[poise::command(
    prefix_command,
    rename = "remove",
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn exempt_remove(ctx: Context<'_>, member: serenity::Member) -> Result<(), Error> {
    set_exemption(ctx, &member, false).await
}

async fn set_exemption(ctx: Context<'_>, member: &serenity::Member, exempt: bool) -> Result<(), Error> {
    let (guild_id, platform) = guild(ctx)?;
    let data = ctx.data();
    let service = InactivityService::new(&platform, &data.inactivity, &data.config, guild_id);

    let changed = service.set_exemption(member.user.id, exempt).await?;
    let name = member.display_name();
    let reply = match (exempt, changed) {
        (true, true) => format!("{name} is now exempt from inactivity notifications."),
        (true, false) => format!("{name} is already exempt."),
        (false, true) => format!("{name} is no longer exempt from inactivity notifications."),
        (false, false) => format!("{name} is not exempt."),
    };
    ctx.say(reply).await?;
    logging::log_command_status(ctx, CommandStatus::Completed);
    Ok(())
}

/// List exempt members
#[poise::command(
    prefix_command,
    rename = "list",
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn exempt_list(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, platform) = guild(ctx)?;
    let data = ctx.data();
    let service = InactivityService::new(&platform, &data.inactivity, &data.config, guild_id);

    let records = service.exempt_list().await?;
    if records.is_empty() {
        ctx.say("No members are exempt.").await?;
        logging::log_command_status(ctx, CommandStatus::Completed);
        return Ok(());
    }

    let lines: Vec<String> = records
        .iter()
        .map(|record| format!("<@{}>", record.member_id))
        .collect();
    let limit = data.config.app.standards.embed.description_limit;
    for page in paginate(&lines.join("\n"), limit, "\n") {
        platform
            .send(
                Destination::Channel(ctx.channel_id()),
                Outbound::embed(Embed::titled("Exempt Members").description(page)),
            )
            .await?;
    }
    logging::log_command_status(ctx, CommandStatus::Completed);
    Ok(())
}

/// Send a message to a channel as the bot
#[poise::command(prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn message(
    ctx: Context<'_>,
    #[description = "Channel to send to"] destination: Option<String>,
    #[rest]
    #[description = "Message content"]
    content: Option<String>,
) -> Result<(), Error> {
    let (_, platform) = guild(ctx)?;
    let invocation = Invocation {
        channel: ctx.channel_id(),
        author: ctx.author().id,
    };
    let status = relay_message(&platform, invocation, destination, content).await?;
    logging::log_command_status(ctx, status);
    Ok(())
}

/// Edit a message the bot sent
#[poise::command(prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Channel the message is in"] channel: Option<String>,
) -> Result<(), Error> {
    let (_, platform) = guild(ctx)?;
    let data = ctx.data();
    let invocation = Invocation {
        channel: ctx.channel_id(),
        author: ctx.author().id,
    };
    let target = channel.as_deref().and_then(parse_channel_token);
    let status = edit_message(
        &platform,
        invocation,
        target,
        data.prefix(),
        data.config.app.standards.embed.description_limit,
    )
    .await?;
    logging::log_command_status(ctx, status);
    Ok(())
}

/// Show MEE6 leaderboard members who left the server
#[poise::command(prefix_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn purgeleaderboard(ctx: Context<'_>) -> Result<(), Error> {
    let (guild_id, platform) = guild(ctx)?;
    let data = ctx.data();
    let members: HashSet<u64> = platform
        .members()
        .await?
        .into_iter()
        .map(|member| member.id.get())
        .collect();

    let status = report_absent_members(
        &data.leaderboard,
        &platform,
        ctx.channel_id(),
        guild_id,
        &members,
        data.leaderboard.max_pages(),
    )
    .await;
    logging::log_command_status(ctx, status);
    Ok(())
}

/// Shut the bot down
#[poise::command(prefix_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Shutting down.").await?;
    logging::log_command_status(ctx, CommandStatus::Completed);
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}
