//! Moderator messaging through the bot: `message` and `edit`

use crate::error::BotResult;
use crate::platform::{
    ChannelRef, Destination, Embed, GuildPlatform, Outbound, PlatformError, parse_channel_token,
    unicode_reaction,
};
use crate::prompt::{InteractivePrompt, PromptOutcome};
use crate::status::CommandStatus;
use crate::template::{escape_markdown, paginate};
use serenity::all::{ChannelId, MessageId, UserId};
use std::time::Duration;
use tracing::{info, warn};

const DESTINATION_TIMEOUT: Duration = Duration::from_secs(60);
const CONTENT_TIMEOUT: Duration = Duration::from_secs(120);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
const MESSAGE_ID_TIMEOUT: Duration = Duration::from_secs(300);
const EDIT_CONTENT_TIMEOUT: Duration = Duration::from_secs(900);

pub const CONFIRM_EMOJI: &str = "✅";

/// Who invoked a relay command and where
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub channel: ChannelId,
    pub author: UserId,
}

/// Send a message to a channel on the invoker's behalf
///
/// Missing arguments are asked for; the send waits for a ✅ from the invoker.
///
/// # Errors
/// Returns unclassified platform errors
pub async fn relay_message<P: GuildPlatform + ?Sized>(
    platform: &P,
    invocation: Invocation,
    destination: Option<String>,
    content: Option<String>,
) -> BotResult<CommandStatus> {
    let prompt = InteractivePrompt::new(platform, invocation.channel, invocation.author);

    let destination = match destination {
        Some(destination) => destination,
        None => match prompt
            .ask(
                "Which channel should the message be sent to?",
                DESTINATION_TIMEOUT,
                |reply| !reply.channel_mentions.is_empty(),
            )
            .await
        {
            PromptOutcome::Answered(reply) => reply.content,
            PromptOutcome::TimedOut => {
                prompt.times_up().await;
                return Ok(CommandStatus::Cancelled);
            }
        },
    };

    let Some(target) = find_channel(platform, &destination).await? else {
        prompt.say("I couldn't find that channel on this server.").await;
        return Ok(CommandStatus::Invalid);
    };

    let content = match content.filter(|c| !c.trim().is_empty()) {
        Some(content) => content,
        None => match prompt
            .ask("What's your message?", CONTENT_TIMEOUT, |reply| {
                !reply.content.trim().is_empty()
            })
            .await
        {
            PromptOutcome::Answered(reply) => reply.content,
            PromptOutcome::TimedOut => {
                prompt.times_up().await;
                return Ok(CommandStatus::Cancelled);
            }
        },
    };

    let confirm = unicode_reaction(CONFIRM_EMOJI);
    let preview = platform
        .send(
            Destination::Channel(invocation.channel),
            Outbound::text(format!("React {CONFIRM_EMOJI} to send this to <#{}>:", target.id))
                .with_embed(Embed::default().description(escape_markdown(&content))),
        )
        .await?;
    if let Err(e) = platform.react(invocation.channel, preview.id, confirm.clone()).await {
        warn!(error = %e, "Could not add confirmation reaction");
    }
    if prompt
        .await_reaction_confirm(preview.id, &confirm, CONFIRM_TIMEOUT)
        .await
        .is_timed_out()
    {
        prompt.times_up().await;
        return Ok(CommandStatus::Cancelled);
    }

    match platform
        .send(Destination::Channel(target.id), Outbound::text(content))
        .await
    {
        Ok(sent) => {
            info!(channel = %target.name, message_id = %sent.id, "Relayed message");
            prompt.say(&format!("Message sent: {}", sent.link)).await;
            Ok(CommandStatus::Completed)
        }
        Err(PlatformError::Forbidden(_)) => {
            prompt
                .say(&format!("I don't have permission to send messages to {}", target.name))
                .await;
            Ok(CommandStatus::Forbidden)
        }
        Err(e) => Err(e.into()),
    }
}

/// Replace the content of a message the bot sent earlier
///
/// # Errors
/// Returns unclassified platform errors
pub async fn edit_message<P: GuildPlatform + ?Sized>(
    platform: &P,
    invocation: Invocation,
    target: Option<ChannelId>,
    prefix: &str,
    description_limit: usize,
) -> BotResult<CommandStatus> {
    let prompt = InteractivePrompt::new(platform, invocation.channel, invocation.author);

    let Some(target) = target else {
        prompt
            .say(&format!(
                "To use, put: ```{prefix}edit #[channel name]```, where [channel name] is where the message is."
            ))
            .await;
        return Ok(CommandStatus::Invalid);
    };

    let raw_id = match prompt
        .ask("Enter the message ID to be edited:", MESSAGE_ID_TIMEOUT, |_| true)
        .await
    {
        PromptOutcome::Answered(reply) => reply.content.trim().to_string(),
        PromptOutcome::TimedOut => {
            prompt.times_up().await;
            return Ok(CommandStatus::Cancelled);
        }
    };
    let Some(message_id) = raw_id.parse::<u64>().ok().filter(|id| *id != 0) else {
        prompt.say(&format!("{raw_id} is not a valid message ID.")).await;
        return Ok(CommandStatus::Invalid);
    };

    let original = match platform.fetch_message(target, MessageId::new(message_id)).await {
        Ok(message) => message,
        Err(PlatformError::NotFound(_)) => {
            prompt
                .say(&format!("Couldn't find message with ID #{message_id}."))
                .await;
            return Ok(CommandStatus::Invalid);
        }
        Err(e) => return Err(e.into()),
    };
    if original.author != platform.bot_user_id() {
        prompt.say("I can only edit messages I sent.").await;
        return Ok(CommandStatus::Invalid);
    }

    for page in paginate(&escape_markdown(&original.content), description_limit, "\n") {
        platform
            .send(
                Destination::Channel(invocation.channel),
                Outbound::embed(
                    Embed::titled("Message Preview")
                        .description(page)
                        .url(original.link.clone()),
                ),
            )
            .await?;
    }

    let new_content = match prompt
        .ask("Enter the newly edited message below.", EDIT_CONTENT_TIMEOUT, |_| true)
        .await
    {
        PromptOutcome::Answered(reply) => reply.content,
        PromptOutcome::TimedOut => {
            prompt.times_up().await;
            return Ok(CommandStatus::Cancelled);
        }
    };

    match platform
        .edit(original.channel_id, original.id, Outbound::text(new_content))
        .await
    {
        Ok(()) => {
            info!(message_id = %original.id, "Edited bot message");
            prompt.say(&format!("Message edited: {}", original.link)).await;
            Ok(CommandStatus::Completed)
        }
        Err(PlatformError::Forbidden(_)) => {
            prompt.say("I'm not allowed to edit this message.").await;
            Ok(CommandStatus::Forbidden)
        }
        Err(e) => Err(e.into()),
    }
}

async fn find_channel<P: GuildPlatform + ?Sized>(
    platform: &P,
    token: &str,
) -> BotResult<Option<ChannelRef>> {
    let first = token.split_whitespace().next().unwrap_or_default();
    let Some(id) = parse_channel_token(first) else {
        return Ok(None);
    };
    Ok(platform
        .text_channels()
        .await?
        .into_iter()
        .find(|channel| channel.id == id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BOT_ID, FakeGuild, channel, user};

    const HERE: u64 = 1;
    const MOD: u64 = 7;

    fn invocation() -> Invocation {
        Invocation {
            channel: channel(HERE),
            author: user(MOD),
        }
    }

    fn replies_here(guild: &FakeGuild) -> Vec<String> {
        guild
            .sent_to(Destination::Channel(channel(HERE)))
            .into_iter()
            .filter_map(|body| body.content)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_with_prompts() {
        let mut guild = FakeGuild::new()
            .with_channel(5, "announcements")
            .with_reply(HERE, MOD, "<#5>")
            .with_reply(HERE, MOD, "Hello everyone");
        guild.confirm_reaction = true;

        let status = relay_message(&guild, invocation(), None, None).await.unwrap();
        assert_eq!(status, CommandStatus::Completed);

        let relayed = guild.sent_to(Destination::Channel(channel(5)));
        assert_eq!(relayed[0].content.as_deref(), Some("Hello everyone"));
        let replies = replies_here(&guild);
        assert_eq!(replies[0], "Which channel should the message be sent to?");
        assert_eq!(replies[1], "What's your message?");
        assert!(replies.last().unwrap().starts_with("Message sent: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_unknown_channel() {
        let guild = FakeGuild::new().with_channel(5, "announcements");
        let status = relay_message(&guild, invocation(), Some("<#6>".into()), Some("hi".into()))
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Invalid);
        assert_eq!(
            replies_here(&guild),
            vec!["I couldn't find that channel on this server."]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_times_out_waiting_for_destination() {
        let guild = FakeGuild::new().with_channel(5, "announcements");
        let status = relay_message(&guild, invocation(), None, None).await.unwrap();
        assert_eq!(status, CommandStatus::Cancelled);
        assert_eq!(replies_here(&guild).last().map(String::as_str), Some("Time's up."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_unconfirmed_is_cancelled() {
        let guild = FakeGuild::new().with_channel(5, "announcements");
        let status = relay_message(&guild, invocation(), Some("<#5>".into()), Some("hi".into()))
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Cancelled);
        assert!(guild.sent_to(Destination::Channel(channel(5))).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_forbidden() {
        let mut guild = FakeGuild::new().with_channel(5, "announcements");
        guild.forbidden_sends.insert(channel(5));
        guild.confirm_reaction = true;

        let status = relay_message(&guild, invocation(), Some("5".into()), Some("hi".into()))
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Forbidden);
        assert_eq!(
            replies_here(&guild).last().map(String::as_str),
            Some("I don't have permission to send messages to announcements")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_requires_channel() {
        let guild = FakeGuild::new();
        let status = edit_message(&guild, invocation(), None, ";", 2048).await.unwrap();
        assert_eq!(status, CommandStatus::Invalid);
        assert_eq!(
            replies_here(&guild),
            vec!["To use, put: ```;edit #[channel name]```, where [channel name] is where the message is."]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_flow() {
        let guild = FakeGuild::new()
            .with_posted(5, 300, BOT_ID, "old *text*")
            .with_reply(HERE, MOD, "300")
            .with_reply(HERE, MOD, "new text");

        let status = edit_message(&guild, invocation(), Some(channel(5)), ";", 2048)
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Completed);

        let preview = guild
            .sent_to(Destination::Channel(channel(HERE)))
            .into_iter()
            .find_map(|body| body.embed)
            .unwrap();
        assert_eq!(preview.title.as_deref(), Some("Message Preview"));
        assert_eq!(preview.description.as_deref(), Some(r"old \*text\*"));

        let edits = guild.edit_log();
        assert_eq!(edits[0].1, MessageId::new(300));
        assert_eq!(edits[0].2.content.as_deref(), Some("new text"));
        assert!(replies_here(&guild).last().unwrap().starts_with("Message edited: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_rejects_bad_ids_and_foreign_messages() {
        let guild = FakeGuild::new().with_reply(HERE, MOD, "abc");
        let status = edit_message(&guild, invocation(), Some(channel(5)), ";", 2048)
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Invalid);
        assert_eq!(
            replies_here(&guild).last().map(String::as_str),
            Some("abc is not a valid message ID.")
        );

        let guild = FakeGuild::new().with_reply(HERE, MOD, "301");
        edit_message(&guild, invocation(), Some(channel(5)), ";", 2048)
            .await
            .unwrap();
        assert_eq!(
            replies_here(&guild).last().map(String::as_str),
            Some("Couldn't find message with ID #301.")
        );

        let guild = FakeGuild::new()
            .with_posted(5, 302, 42, "someone else")
            .with_reply(HERE, MOD, "302");
        edit_message(&guild, invocation(), Some(channel(5)), ";", 2048)
            .await
            .unwrap();
        assert_eq!(
            replies_here(&guild).last().map(String::as_str),
            Some("I can only edit messages I sent.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_forbidden() {
        let mut guild = FakeGuild::new()
            .with_posted(5, 300, BOT_ID, "old")
            .with_reply(HERE, MOD, "300")
            .with_reply(HERE, MOD, "new");
        guild.edit_forbidden = true;

        let status = edit_message(&guild, invocation(), Some(channel(5)), ";", 2048)
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Forbidden);
        assert_eq!(
            replies_here(&guild).last().map(String::as_str),
            Some("I'm not allowed to edit this message.")
        );
    }
}
