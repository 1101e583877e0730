use crate::commands;
use crate::config::Configuration;
use crate::features::gate::DISPOSITION_WAIT;
use crate::features::{self, EditSnapshot, IncomingMessage, MessageDisposition, MessageGate};
use crate::platform::DiscordGuild;
use crate::{CommandStatus, Context as CommandContext, Data, EVENT_TARGET, Error, logging};
use poise::FrameworkError;
use poise::serenity_prelude::{
    self as serenity, ActivityData, ChannelId, Context, EventHandler, GuildId,
    GuildMemberUpdateEvent, Member, Message, MessageUpdateEvent, Permissions, Reaction, Ready,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Gateway event handler
pub struct Handler {
    config: Arc<Configuration>,
    gate: Arc<MessageGate>,
}

impl Handler {
    #[must_use]
    pub fn new(config: Arc<Configuration>, gate: Arc<MessageGate>) -> Self {
        Self { config, gate }
    }
}

/// Guild and channel names from the cache, when known
fn location_names(
    ctx: &Context,
    guild_id: Option<GuildId>,
    channel_id: ChannelId,
) -> (Option<String>, Option<String>) {
    let Some(guild) = guild_id.and_then(|id| ctx.cache.guild(id)) else {
        return (None, None);
    };
    let channel = guild.channels.get(&channel_id).map(|c| c.name.clone());
    (Some(guild.name.clone()), channel)
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(
            target: EVENT_TARGET,
            user_id = %ready.user.id,
            "Connected as {user_name}, shard {shard_id}"
        );
        ctx.set_activity(Some(ActivityData::playing(self.config.app.default.status_text())));
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let (guild, channel) = location_names(&ctx, msg.guild_id, msg.channel_id);
        let prefix = features::log_prefix(guild.as_deref(), channel.as_deref(), &msg.author.name);
        info!(
            target: EVENT_TARGET,
            guild_id = ?msg.guild_id,
            channel_id = %msg.channel_id,
            author_id = %msg.author.id,
            "{prefix}{}: {}",
            msg.author.name,
            msg.content
        );

        let Some(guild_id) = msg.guild_id else {
            debug!(target: EVENT_TARGET, author_id = %msg.author.id, "Direct message dropped");
            return;
        };
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        let platform = DiscordGuild::new(&ctx, guild_id);
        let incoming = IncomingMessage {
            id: msg.id,
            channel_id: msg.channel_id,
            author: msg.author.id,
            content: msg.content.clone(),
            has_attachments: !msg.attachments.is_empty(),
        };
        let gated = features::pics_only_rejects(
            &self.config,
            guild_id,
            incoming.channel_id,
            incoming.has_attachments,
        );
        let disposition =
            features::on_guild_message(&self.config, &platform, guild_id, &incoming).await;
        if gated {
            self.gate.record(incoming.id, disposition);
        }
        if disposition == MessageDisposition::Rejected {
            debug!(
                target: EVENT_TARGET,
                message_id = %msg.id,
                "Message rejected before command dispatch"
            );
        }
    }

    async fn message_update(
        &self,
        ctx: Context,
        old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let Some(before) = old_if_available else {
            debug!(target: EVENT_TARGET, message_id = %event.id, "Edited message not cached");
            return;
        };

        let author = before.author.display_name().to_string();
        let after_content = new
            .as_ref()
            .map(|m| m.content.clone())
            .or_else(|| event.content.clone())
            .unwrap_or_else(|| before.content.clone());
        let after_pinned = new
            .as_ref()
            .map(|m| m.pinned)
            .or(event.pinned)
            .unwrap_or(before.pinned);

        let (guild, channel) = location_names(&ctx, event.guild_id, event.channel_id);
        let prefix = features::log_prefix(guild.as_deref(), channel.as_deref(), &author);
        let lines = features::edit_audit_lines(
            &prefix,
            &EditSnapshot {
                author: &author,
                content: &before.content,
                pinned: before.pinned,
            },
            &EditSnapshot {
                author: &author,
                content: &after_content,
                pinned: after_pinned,
            },
        );
        for line in lines {
            info!(target: EVENT_TARGET, message_id = %event.id, "{line}");
        }
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        let Some(old) = old_if_available else {
            debug!(
                target: EVENT_TARGET,
                guild_id = %event.guild_id,
                user_id = %event.user.id,
                "Member update without cached member"
            );
            return;
        };

        let platform = DiscordGuild::new(&ctx, event.guild_id);
        let sent = features::on_member_roles_changed(
            &self.config,
            &platform,
            event.guild_id,
            event.user.id,
            &old.roles,
            &event.roles,
        )
        .await;
        if sent > 0 {
            info!(
                target: EVENT_TARGET,
                guild_id = %event.guild_id,
                user_id = %event.user.id,
                announcements = sent,
                "Role milestones announced"
            );
        }
    }

    async fn guild_member_addition(&self, _ctx: Context, new_member: Member) {
        info!(
            target: EVENT_TARGET,
            guild_id = %new_member.guild_id,
            user_id = %new_member.user.id,
            "Member joined: {}",
            new_member.user.name
        );
    }

    async fn reaction_add(&self, _ctx: Context, add_reaction: Reaction) {
        debug!(
            target: EVENT_TARGET,
            channel_id = %add_reaction.channel_id,
            message_id = %add_reaction.message_id,
            user_id = ?add_reaction.user_id,
            emoji = %add_reaction.emoji,
            "Reaction added"
        );
    }
}

/// Gate every command: guild only, enabled for the guild, and not on a
/// message the pics-only handler removed
///
/// # Errors
/// Never fails; a `false` result silently skips the command
pub async fn command_check(ctx: CommandContext<'_>) -> Result<bool, Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(false);
    };
    let config = &ctx.data().config;
    let command = commands::settings_key(ctx);
    if !config.command_settings(&command, Some(guild_id)).enabled {
        debug!(command = %command, guild_id = %guild_id, "Command disabled");
        return Ok(false);
    }

    if let poise::Context::Prefix(prefix) = ctx {
        let message = IncomingMessage {
            id: prefix.msg.id,
            channel_id: prefix.msg.channel_id,
            author: prefix.msg.author.id,
            content: prefix.msg.content.clone(),
            has_attachments: !prefix.msg.attachments.is_empty(),
        };
        let gate = &ctx.data().message_gate;
        if !features::command_may_run(config, gate, guild_id, &message, DISPOSITION_WAIT).await {
            debug!(command = %command, message_id = %message.id, "Command message was removed");
            return Ok(false);
        }
    }
    Ok(true)
}

/// `You are missing A, B and C permission(s) to run this command.`
#[must_use]
pub fn format_missing_permissions(names: &[&str]) -> String {
    let list = match names {
        [] => "some".to_string(),
        [one] => (*one).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    };
    format!("You are missing {list} permission(s) to run this command.")
}

/// Reply to an argument that could not be parsed, or was not given
#[must_use]
pub fn argument_error_reply(input: Option<&str>, prefix: &str, command: &str) -> String {
    match input {
        Some(input) => format!("Couldn't find `{input}`."),
        None => format!("Missing an argument. Type `{prefix}help {command}` for usage."),
    }
}

/// Command error policy
pub async fn on_command_error(error: FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            let settings = ctx
                .data()
                .config
                .command_settings(&commands::settings_key(ctx), ctx.guild_id());
            info!(
                command = %ctx.command().name,
                user_id = %ctx.author().id,
                "Missing permissions for command"
            );
            if settings.visible {
                let names = missing_permissions
                    .unwrap_or(Permissions::ADMINISTRATOR)
                    .get_permission_names();
                if let Err(e) = ctx.say(format_missing_permissions(&names)).await {
                    warn!(error = %e, "Could not report missing permissions");
                }
            }
        }
        FrameworkError::ArgumentParse { error, input, ctx, .. } => {
            let settings = ctx
                .data()
                .config
                .command_settings(&commands::settings_key(ctx), ctx.guild_id());
            info!(
                command = %ctx.command().qualified_name,
                input = ?input,
                error = %error,
                "Command argument not understood"
            );
            if settings.visible {
                let reply = argument_error_reply(
                    input.as_deref(),
                    ctx.data().prefix(),
                    &ctx.command().qualified_name,
                );
                if let Err(e) = ctx.say(reply).await {
                    warn!(error = %e, "Could not report argument error");
                }
            }
            logging::log_command_status(ctx, CommandStatus::Invalid);
        }
        FrameworkError::NotAnOwner { ctx, .. } => {
            debug!(command = %ctx.command().name, user_id = %ctx.author().id, "Owner-only command ignored");
        }
        FrameworkError::CommandCheckFailed { error: None, ctx, .. } => {
            debug!(command = %ctx.command().name, "Command skipped by check");
        }
        FrameworkError::UnknownCommand { msg_content, .. } => {
            debug!(content = %msg_content, "Unknown command");
        }
        other => logging::log_command_error(&other),
    }
}
