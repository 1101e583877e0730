//! Narrow capability seams over the chat platform
//!
//! Features and workflows talk to the platform only through these traits so
//! they can run against a live guild ([`DiscordGuild`]) or an in-memory fake in
//! tests. Every fallible call returns a [`PlatformError`] that is already
//! classified into forbidden, not-found or other.

mod discord;

pub use discord::DiscordGuild;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, MessageId, ReactionType, RoleId, UserId};
use serenity::http::HttpError;
use serenity::model::ModelError;
use std::time::Duration;
use thiserror::Error;

/// Milliseconds between the Unix epoch and the platform's snowflake epoch
const SNOWFLAKE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Maximum number of messages returned by one history page
pub const HISTORY_PAGE_SIZE: u8 = 100;

/// Classified platform failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform denied the action
    #[error("Missing access: {0}")]
    Forbidden(String),

    /// The target does not exist (or is not visible)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Anything else
    #[error("Platform error: {0}")]
    Api(String),
}

impl PlatformError {
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

impl From<serenity::Error> for PlatformError {
    fn from(error: serenity::Error) -> Self {
        match &error {
            serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
                match response.status_code.as_u16() {
                    403 => Self::Forbidden(response.error.message.clone()),
                    404 => Self::NotFound(response.error.message.clone()),
                    _ => Self::Api(error.to_string()),
                }
            }
            serenity::Error::Model(ModelError::InvalidPermissions { required, .. }) => {
                Self::Forbidden(format!("requires {required}"))
            }
            _ => Self::Api(error.to_string()),
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// A guild member as the workflows see it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub id: UserId,
    pub display_name: String,
    pub joined_at: Option<DateTime<Utc>>,
    pub bot: bool,
}

impl MemberRef {
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A text channel in a guild
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub name: String,
}

/// Display facts about a guild used for placeholder substitution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildProfile {
    pub name: String,
    pub owner_name: Option<String>,
    pub owner_discriminator: Option<String>,
}

/// One message from channel history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub author: UserId,
    pub created_at: DateTime<Utc>,
    /// Distinct reactions present on the message
    pub reactions: Vec<ReactionType>,
}

/// A message posted by someone that the bot can inspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: UserId,
    pub content: String,
    pub link: String,
}

/// A reply collected from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: UserId,
    pub content: String,
    /// Channels mentioned in the reply, in order
    pub channel_mentions: Vec<ChannelId>,
}

/// Where to deliver a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Channel(ChannelId),
    /// Private message to a user
    User(UserId),
}

/// Embed contents the bot sends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub footer: Option<String>,
}

impl Embed {
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

/// Message body: text, embed or both
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outbound {
    pub content: Option<String>,
    pub embed: Option<Embed>,
}

impl Outbound {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
        }
    }

    #[must_use]
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embed: Some(embed),
        }
    }

    #[must_use]
    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }
}

/// A message the bot has sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub link: String,
}

/// Invite parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteSpec {
    /// Lifetime in seconds, zero for never
    pub max_age: u32,
    /// Zero for unlimited
    pub max_uses: u8,
    pub reason: Option<String>,
}

/// Guild membership, channels and roles
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    fn bot_user_id(&self) -> UserId;
    async fn guild_profile(&self) -> PlatformResult<GuildProfile>;
    async fn members(&self) -> PlatformResult<Vec<MemberRef>>;
    /// Text channels in display order
    async fn text_channels(&self) -> PlatformResult<Vec<ChannelRef>>;
    async fn grant_role(&self, user: UserId, role: RoleId, reason: &str) -> PlatformResult<()>;
}

/// Paginated message history
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` messages strictly newer than `after`, oldest first
    async fn messages_after(
        &self,
        channel: ChannelId,
        after: MessageId,
        limit: u8,
    ) -> PlatformResult<Vec<HistoryMessage>>;

    async fn reaction_users(
        &self,
        channel: ChannelId,
        message: MessageId,
        reaction: &ReactionType,
    ) -> PlatformResult<Vec<UserId>>;
}

/// Sending and managing messages
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn send(&self, destination: Destination, message: Outbound) -> PlatformResult<SentMessage>;
    async fn edit(&self, channel: ChannelId, message: MessageId, body: Outbound) -> PlatformResult<()>;
    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> PlatformResult<PostedMessage>;
    async fn delete(&self, channel: ChannelId, message: MessageId) -> PlatformResult<()>;
    async fn react(&self, channel: ChannelId, message: MessageId, reaction: ReactionType) -> PlatformResult<()>;
    async fn clear_reactions(&self, channel: ChannelId, message: MessageId) -> PlatformResult<()>;
}

/// Invite creation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InviteFactory: Send + Sync {
    /// Create an invite and return its URL
    async fn create_invite(&self, channel: ChannelId, spec: &InviteSpec) -> PlatformResult<String>;
}

/// Waiting for user input
///
/// Implementations may return early with `None`; callers bound the wait
/// themselves.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn next_reply(&self, channel: ChannelId, author: UserId, timeout: Duration) -> Option<ReplyMessage>;
    async fn next_reaction(
        &self,
        message: MessageId,
        author: UserId,
        emoji: &ReactionType,
        timeout: Duration,
    ) -> bool;
}

/// Everything a guild-scoped workflow may need
pub trait GuildPlatform: GuildDirectory + HistorySource + Outbox + InviteFactory + Collector {}

impl<T> GuildPlatform for T where T: GuildDirectory + HistorySource + Outbox + InviteFactory + Collector {}

/// The smallest message id created at or after `time`
#[must_use]
pub fn message_id_at(time: DateTime<Utc>) -> MessageId {
    let offset = (time.timestamp_millis() - SNOWFLAKE_EPOCH_MS).max(0);
    #[allow(clippy::cast_sign_loss)]
    let raw = (offset as u64) << 22;
    MessageId::new(raw.max(1))
}

/// Unicode reaction helper
#[must_use]
pub fn unicode_reaction(emoji: &str) -> ReactionType {
    ReactionType::Unicode(emoji.to_string())
}

/// Parse `<#123>`, `#123` or `123` into a channel id
#[must_use]
pub fn parse_channel_token(token: &str) -> Option<ChannelId> {
    let trimmed = token.trim_matches(|c: char| c == '<' || c == '>' || c == '#' || c.is_whitespace());
    trimmed.parse::<u64>().ok().filter(|id| *id != 0).map(ChannelId::new)
}
