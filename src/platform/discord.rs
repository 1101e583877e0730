//! Live guild adapter backed by serenity

use super::{
    ChannelRef, Collector, Destination, Embed, GuildDirectory, GuildProfile, HistoryMessage,
    HistorySource, InviteFactory, InviteSpec, MemberRef, Outbound, Outbox,
    PlatformResult, PostedMessage, ReplyMessage, SentMessage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, ChannelType, Context, CreateEmbed, CreateEmbedFooter, CreateInvite, CreateMessage,
    EditMessage, GetMessages, GuildId, Message, MessageCollector, MessageId, ReactionCollector,
    ReactionType, RoleId, Timestamp, UserId,
};
use std::time::Duration;
use tracing::debug;

const MEMBER_PAGE_SIZE: u64 = 1000;
const REACTION_PAGE_SIZE: u8 = 100;

/// One guild seen through a serenity [`Context`]
#[derive(Clone)]
pub struct DiscordGuild {
    ctx: Context,
    guild_id: GuildId,
}

impl DiscordGuild {
    #[must_use]
    pub fn new(ctx: &Context, guild_id: GuildId) -> Self {
        Self {
            ctx: ctx.clone(),
            guild_id,
        }
    }
}

fn to_utc(timestamp: Timestamp) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0)
}

fn build_embed(embed: Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new();
    if let Some(title) = embed.title {
        builder = builder.title(title);
    }
    if let Some(description) = embed.description {
        builder = builder.description(description);
    }
    if let Some(url) = embed.url {
        builder = builder.url(url);
    }
    if let Some(footer) = embed.footer {
        builder = builder.footer(CreateEmbedFooter::new(footer));
    }
    builder
}

fn build_message(body: Outbound) -> CreateMessage {
    let mut builder = CreateMessage::new();
    if let Some(content) = body.content {
        builder = builder.content(content);
    }
    if let Some(embed) = body.embed {
        builder = builder.embed(build_embed(embed));
    }
    builder
}

fn sent(message: &Message) -> SentMessage {
    SentMessage {
        id: message.id,
        channel_id: message.channel_id,
        link: message.link(),
    }
}

#[async_trait]
impl GuildDirectory for DiscordGuild {
    fn bot_user_id(&self) -> UserId {
        self.ctx.cache.current_user().id
    }

    async fn guild_profile(&self) -> PlatformResult<GuildProfile> {
        let cached = self
            .ctx
            .cache
            .guild(self.guild_id)
            .map(|guild| (guild.name.clone(), guild.owner_id));
        let (name, owner_id) = match cached {
            Some(cached) => cached,
            None => {
                let guild = self.guild_id.to_partial_guild(&self.ctx).await?;
                (guild.name, guild.owner_id)
            }
        };

        let (owner_name, owner_discriminator) = match owner_id.to_user(&self.ctx).await {
            Ok(owner) => (
                Some(owner.name.clone()),
                owner.discriminator.map(|d| format!("{:04}", d.get())),
            ),
            Err(e) => {
                debug!(guild_id = %self.guild_id, error = %e, "Could not fetch guild owner");
                (None, None)
            }
        };

        Ok(GuildProfile {
            name,
            owner_name,
            owner_discriminator,
        })
    }

    async fn members(&self) -> PlatformResult<Vec<MemberRef>> {
        let mut members = Vec::new();
        let mut after = None;
        loop {
            let page = self
                .guild_id
                .members(&self.ctx.http, Some(MEMBER_PAGE_SIZE), after)
                .await?;
            let Some(last) = page.last() else { break };
            after = Some(last.user.id);
            let full_page = page.len() as u64 == MEMBER_PAGE_SIZE;

            members.extend(page.into_iter().map(|member| MemberRef {
                id: member.user.id,
                display_name: member.display_name().to_string(),
                joined_at: member.joined_at.and_then(to_utc),
                bot: member.user.bot,
            }));

            if !full_page {
                break;
            }
        }
        Ok(members)
    }

    async fn text_channels(&self) -> PlatformResult<Vec<ChannelRef>> {
        let channels = self.guild_id.channels(&self.ctx.http).await?;
        let mut text: Vec<_> = channels
            .into_values()
            .filter(|channel| channel.kind == ChannelType::Text)
            .collect();
        text.sort_by_key(|channel| (channel.position, channel.id));
        Ok(text
            .into_iter()
            .map(|channel| ChannelRef {
                id: channel.id,
                name: channel.name,
            })
            .collect())
    }

    async fn grant_role(&self, user: UserId, role: RoleId, reason: &str) -> PlatformResult<()> {
        self.ctx
            .http
            .add_member_role(self.guild_id, user, role, Some(reason))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HistorySource for DiscordGuild {
    async fn messages_after(
        &self,
        channel: ChannelId,
        after: MessageId,
        limit: u8,
    ) -> PlatformResult<Vec<HistoryMessage>> {
        let mut page = channel
            .messages(&self.ctx.http, GetMessages::new().after(after).limit(limit))
            .await?;
        page.sort_by_key(|message| message.id);
        Ok(page
            .into_iter()
            .map(|message| HistoryMessage {
                id: message.id,
                author: message.author.id,
                created_at: to_utc(message.timestamp).unwrap_or_else(Utc::now),
                reactions: message
                    .reactions
                    .into_iter()
                    .map(|reaction| reaction.reaction_type)
                    .collect(),
            })
            .collect())
    }

    async fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        reaction: &ReactionType,
    ) -> PlatformResult<Vec<UserId>> {
        let mut users = Vec::new();
        let mut after = None;
        loop {
            let page = channel
                .reaction_users(
                    &self.ctx.http,
                    message,
                    reaction.clone(),
                    Some(REACTION_PAGE_SIZE),
                    after,
                )
                .await?;
            let Some(last) = page.last() else { break };
            after = Some(last.id);
            let full_page = page.len() == usize::from(REACTION_PAGE_SIZE);
            users.extend(page.into_iter().map(|user| user.id));
            if !full_page {
                break;
            }
        }
        Ok(users)
    }
}

#[async_trait]
impl Outbox for DiscordGuild {
    async fn send(&self, destination: Destination, body: Outbound) -> PlatformResult<SentMessage> {
        let builder = build_message(body);
        let message = match destination {
            Destination::Channel(channel) => channel.send_message(&self.ctx.http, builder).await?,
            Destination::User(user) => user.direct_message(&self.ctx, builder).await?,
        };
        Ok(sent(&message))
    }

    async fn edit(&self, channel: ChannelId, message: MessageId, body: Outbound) -> PlatformResult<()> {
        let mut builder = EditMessage::new();
        if let Some(content) = body.content {
            builder = builder.content(content);
        }
        if let Some(embed) = body.embed {
            builder = builder.embed(build_embed(embed));
        }
        channel.edit_message(&self.ctx.http, message, builder).await?;
        Ok(())
    }

    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<PostedMessage> {
        let message = channel.message(&self.ctx, message).await?;
        Ok(PostedMessage {
            id: message.id,
            channel_id: message.channel_id,
            author: message.author.id,
            link: message.link(),
            content: message.content,
        })
    }

    async fn delete(&self, channel: ChannelId, message: MessageId) -> PlatformResult<()> {
        channel.delete_message(&self.ctx.http, message).await?;
        Ok(())
    }

    async fn react(&self, channel: ChannelId, message: MessageId, reaction: ReactionType) -> PlatformResult<()> {
        channel.create_reaction(&self.ctx.http, message, reaction).await?;
        Ok(())
    }

    async fn clear_reactions(&self, channel: ChannelId, message: MessageId) -> PlatformResult<()> {
        channel.delete_reactions(&self.ctx.http, message).await?;
        Ok(())
    }
}

#[async_trait]
impl InviteFactory for DiscordGuild {
    async fn create_invite(&self, channel: ChannelId, spec: &InviteSpec) -> PlatformResult<String> {
        let mut builder = CreateInvite::new()
            .max_age(spec.max_age)
            .max_uses(spec.max_uses);
        if let Some(reason) = &spec.reason {
            builder = builder.audit_log_reason(reason);
        }
        let invite = channel.create_invite(&self.ctx, builder).await?;
        Ok(invite.url())
    }
}

#[async_trait]
impl Collector for DiscordGuild {
    async fn next_reply(&self, channel: ChannelId, author: UserId, timeout: Duration) -> Option<ReplyMessage> {
        let message = MessageCollector::new(&self.ctx.shard)
            .channel_id(channel)
            .author_id(author)
            .timeout(timeout)
            .next()
            .await?;

        Some(ReplyMessage {
            id: message.id,
            channel_id: message.channel_id,
            author: message.author.id,
            channel_mentions: mentioned_channels(&message.content),
            content: message.content,
        })
    }

    async fn next_reaction(
        &self,
        message: MessageId,
        author: UserId,
        emoji: &ReactionType,
        timeout: Duration,
    ) -> bool {
        let emoji = emoji.clone();
        ReactionCollector::new(&self.ctx.shard)
            .message_id(message)
            .author_id(author)
            .filter(move |reaction| reaction.emoji == emoji)
            .timeout(timeout)
            .next()
            .await
            .is_some()
    }
}

/// Channel ids referenced as `<#id>` in message text
fn mentioned_channels(content: &str) -> Vec<ChannelId> {
    content
        .split("<#")
        .skip(1)
        .filter_map(|rest| rest.split_once('>'))
        .filter_map(|(id, _)| id.parse::<u64>().ok())
        .filter(|id| *id != 0)
        .map(ChannelId::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentioned_channels() {
        assert_eq!(
            mentioned_channels("send to <#12> and <#34>, not <#x>"),
            vec![ChannelId::new(12), ChannelId::new(34)]
        );
        assert!(mentioned_channels("no mentions here").is_empty());
    }
}
