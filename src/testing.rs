//! In-memory guild used by unit tests

use crate::platform::{
    ChannelRef, Collector, Destination, GuildDirectory, GuildProfile, HistoryMessage, HistorySource,
    InviteFactory, InviteSpec, MemberRef, Outbound, Outbox, PlatformError, PlatformResult,
    PostedMessage, ReplyMessage, SentMessage, message_id_at,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serenity::all::{ChannelId, MessageId, ReactionType, RoleId, UserId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub const BOT_ID: u64 = 999;

/// Midnight of "day `n`" in test scenarios
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::days(n)
}

pub fn user(id: u64) -> UserId {
    UserId::new(id)
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id)
}

pub struct FakeGuild {
    pub profile: GuildProfile,
    pub members: Vec<MemberRef>,
    pub channels: Vec<ChannelRef>,
    pub history: HashMap<ChannelId, Vec<HistoryMessage>>,
    pub reactors: HashMap<MessageId, Vec<UserId>>,
    pub posted: HashMap<MessageId, PostedMessage>,
    pub forbidden_channels: HashSet<ChannelId>,
    pub forbidden_sends: HashSet<ChannelId>,
    pub undeliverable: HashSet<UserId>,
    pub delete_forbidden: bool,
    pub edit_forbidden: bool,
    pub invite: PlatformResult<String>,
    pub confirm_reaction: bool,
    pub replies: Mutex<VecDeque<ReplyMessage>>,

    pub sent: Mutex<Vec<(Destination, Outbound)>>,
    pub edits: Mutex<Vec<(ChannelId, MessageId, Outbound)>>,
    pub deleted: Mutex<Vec<MessageId>>,
    pub reacted: Mutex<Vec<(MessageId, ReactionType)>>,
    pub cleared: Mutex<Vec<MessageId>>,
    pub granted: Mutex<Vec<(UserId, RoleId)>>,
    pub invites_created: AtomicUsize,
    next_id: AtomicU64,
}

impl FakeGuild {
    pub fn new() -> Self {
        Self {
            profile: GuildProfile {
                name: "Test Guild".to_string(),
                owner_name: Some("owner".to_string()),
                owner_discriminator: Some("0001".to_string()),
            },
            members: Vec::new(),
            channels: Vec::new(),
            history: HashMap::new(),
            reactors: HashMap::new(),
            posted: HashMap::new(),
            forbidden_channels: HashSet::new(),
            forbidden_sends: HashSet::new(),
            undeliverable: HashSet::new(),
            delete_forbidden: false,
            edit_forbidden: false,
            invite: Ok("https://discord.gg/test".to_string()),
            confirm_reaction: false,
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            reacted: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
            granted: Mutex::new(Vec::new()),
            invites_created: AtomicUsize::new(0),
            next_id: AtomicU64::new(1_000_000),
        }
    }

    pub fn with_member(mut self, id: u64, name: &str, joined: DateTime<Utc>) -> Self {
        self.members.push(MemberRef {
            id: user(id),
            display_name: name.to_string(),
            joined_at: Some(joined),
            bot: false,
        });
        self
    }

    pub fn with_bot_member(mut self, id: u64, name: &str, joined: DateTime<Utc>) -> Self {
        self.members.push(MemberRef {
            id: user(id),
            display_name: name.to_string(),
            joined_at: Some(joined),
            bot: true,
        });
        self
    }

    pub fn with_channel(mut self, id: u64, name: &str) -> Self {
        self.channels.push(ChannelRef {
            id: channel(id),
            name: name.to_string(),
        });
        self
    }

    /// Add a history message authored by `author`
    pub fn with_message(self, channel_id: u64, author: u64, at: DateTime<Utc>) -> Self {
        self.with_reacted_message(channel_id, author, at, &[])
    }

    pub fn with_reacted_message(
        mut self,
        channel_id: u64,
        author: u64,
        at: DateTime<Utc>,
        reactors: &[u64],
    ) -> Self {
        let messages = self.history.entry(channel(channel_id)).or_default();
        let id = MessageId::new(message_id_at(at).get() + messages.len() as u64 + 1);
        let reactions = if reactors.is_empty() {
            Vec::new()
        } else {
            vec![ReactionType::Unicode("👍".to_string())]
        };
        messages.push(HistoryMessage {
            id,
            author: user(author),
            created_at: at,
            reactions,
        });
        if !reactors.is_empty() {
            self.reactors
                .insert(id, reactors.iter().copied().map(user).collect());
        }
        self
    }

    pub fn with_posted(mut self, channel_id: u64, id: u64, author: u64, content: &str) -> Self {
        let message_id = MessageId::new(id);
        self.posted.insert(
            message_id,
            PostedMessage {
                id: message_id,
                channel_id: channel(channel_id),
                author: user(author),
                content: content.to_string(),
                link: format!("https://discord.com/channels/1/{channel_id}/{id}"),
            },
        );
        self
    }

    pub fn with_reply(self, channel_id: u64, author: u64, content: &str) -> Self {
        let channel_mentions = content
            .split("<#")
            .skip(1)
            .filter_map(|rest| rest.split_once('>'))
            .filter_map(|(id, _)| id.parse().ok())
            .map(ChannelId::new)
            .collect();
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.replies.lock().unwrap().push_back(ReplyMessage {
            id,
            channel_id: channel(channel_id),
            author: user(author),
            content: content.to_string(),
            channel_mentions,
        });
        self
    }

    pub fn sent_messages(&self) -> Vec<(Destination, Outbound)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, destination: Destination) -> Vec<Outbound> {
        self.sent_messages()
            .into_iter()
            .filter(|(to, _)| *to == destination)
            .map(|(_, body)| body)
            .collect()
    }

    pub fn edit_log(&self) -> Vec<(ChannelId, MessageId, Outbound)> {
        self.edits.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuildDirectory for FakeGuild {
    fn bot_user_id(&self) -> UserId {
        user(BOT_ID)
    }

    async fn guild_profile(&self) -> PlatformResult<GuildProfile> {
        Ok(self.profile.clone())
    }

    async fn members(&self) -> PlatformResult<Vec<MemberRef>> {
        Ok(self.members.clone())
    }

    async fn text_channels(&self) -> PlatformResult<Vec<ChannelRef>> {
        Ok(self.channels.clone())
    }

    async fn grant_role(&self, user: UserId, role: RoleId, _reason: &str) -> PlatformResult<()> {
        self.granted.lock().unwrap().push((user, role));
        Ok(())
    }
}

#[async_trait]
impl HistorySource for FakeGuild {
    async fn messages_after(
        &self,
        channel: ChannelId,
        after: MessageId,
        limit: u8,
    ) -> PlatformResult<Vec<HistoryMessage>> {
        if self.forbidden_channels.contains(&channel) {
            return Err(PlatformError::Forbidden(format!("read history of {channel}")));
        }
        let mut page: Vec<_> = self
            .history
            .get(&channel)
            .map(|messages| messages.iter().filter(|m| m.id > after).cloned().collect())
            .unwrap_or_default();
        page.sort_by_key(|m| m.id);
        page.truncate(usize::from(limit));
        Ok(page)
    }

    async fn reaction_users(
        &self,
        _channel: ChannelId,
        message: MessageId,
        _reaction: &ReactionType,
    ) -> PlatformResult<Vec<UserId>> {
        Ok(self.reactors.get(&message).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Outbox for FakeGuild {
    async fn send(&self, destination: Destination, message: Outbound) -> PlatformResult<SentMessage> {
        match destination {
            Destination::User(user) if self.undeliverable.contains(&user) => {
                return Err(PlatformError::Forbidden(format!("message {user}")));
            }
            Destination::Channel(channel) if self.forbidden_sends.contains(&channel) => {
                return Err(PlatformError::Forbidden(format!("send to {channel}")));
            }
            _ => {}
        }
        let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let channel_id = match destination {
            Destination::Channel(channel) => channel,
            Destination::User(user) => ChannelId::new(user.get()),
        };
        self.sent.lock().unwrap().push((destination, message));
        Ok(SentMessage {
            id,
            channel_id,
            link: format!("https://discord.com/channels/1/{channel_id}/{id}"),
        })
    }

    async fn edit(&self, channel: ChannelId, message: MessageId, body: Outbound) -> PlatformResult<()> {
        if self.edit_forbidden {
            return Err(PlatformError::Forbidden("edit message".to_string()));
        }
        self.edits.lock().unwrap().push((channel, message, body));
        Ok(())
    }

    async fn fetch_message(&self, _channel: ChannelId, message: MessageId) -> PlatformResult<PostedMessage> {
        self.posted
            .get(&message)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("message {message}")))
    }

    async fn delete(&self, _channel: ChannelId, message: MessageId) -> PlatformResult<()> {
        if self.delete_forbidden {
            return Err(PlatformError::Forbidden("delete message".to_string()));
        }
        self.deleted.lock().unwrap().push(message);
        Ok(())
    }

    async fn react(&self, _channel: ChannelId, message: MessageId, reaction: ReactionType) -> PlatformResult<()> {
        self.reacted.lock().unwrap().push((message, reaction));
        Ok(())
    }

    async fn clear_reactions(&self, _channel: ChannelId, message: MessageId) -> PlatformResult<()> {
        self.cleared.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl InviteFactory for FakeGuild {
    async fn create_invite(&self, _channel: ChannelId, _spec: &InviteSpec) -> PlatformResult<String> {
        self.invites_created.fetch_add(1, Ordering::SeqCst);
        self.invite.clone()
    }
}

#[async_trait]
impl Collector for FakeGuild {
    async fn next_reply(&self, _channel: ChannelId, _author: UserId, _timeout: Duration) -> Option<ReplyMessage> {
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(reply) => Some(reply),
            None => std::future::pending().await,
        }
    }

    async fn next_reaction(
        &self,
        _message: MessageId,
        _author: UserId,
        _emoji: &ReactionType,
        _timeout: Duration,
    ) -> bool {
        if self.confirm_reaction {
            true
        } else {
            std::future::pending().await
        }
    }
}
