//! Follow-up questions and reaction confirmations
//!
//! Every wait is single-shot and bounded by [`tokio::time::timeout`] here,
//! whatever the collector underneath does. Only input from the invoking user in
//! the invoking channel is accepted.

use crate::platform::{Collector, Destination, Outbound, Outbox, ReplyMessage};
use serenity::all::{ChannelId, MessageId, ReactionType, UserId};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const TIMES_UP: &str = "Time's up.";

/// How a prompt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome<T> {
    Answered(T),
    TimedOut,
}

impl<T> PromptOutcome<T> {
    pub fn answered(self) -> Option<T> {
        match self {
            Self::Answered(value) => Some(value),
            Self::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Prompts scoped to one invoker in one channel
pub struct InteractivePrompt<'a, P: Outbox + Collector + ?Sized> {
    platform: &'a P,
    channel: ChannelId,
    author: UserId,
}

impl<'a, P: Outbox + Collector + ?Sized> InteractivePrompt<'a, P> {
    pub fn new(platform: &'a P, channel: ChannelId, author: UserId) -> Self {
        Self {
            platform,
            channel,
            author,
        }
    }

    /// Wait for the invoker's next reply that satisfies `accept`
    pub async fn ask_followup<F>(&self, timeout: Duration, accept: F) -> PromptOutcome<ReplyMessage>
    where
        F: Fn(&ReplyMessage) -> bool + Send + Sync,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return PromptOutcome::TimedOut;
            }

            let reply = tokio::time::timeout(
                remaining,
                self.platform.next_reply(self.channel, self.author, remaining),
            )
            .await;

            match reply {
                Ok(Some(reply)) if self.is_from_invoker(&reply) && accept(&reply) => {
                    return PromptOutcome::Answered(reply);
                }
                Ok(Some(reply)) => {
                    debug!(message_id = %reply.id, "Ignoring reply that does not answer the prompt");
                }
                Ok(None) | Err(_) => return PromptOutcome::TimedOut,
            }
        }
    }

    /// Post `question`, then wait as in [`Self::ask_followup`]
    pub async fn ask<F>(&self, question: &str, timeout: Duration, accept: F) -> PromptOutcome<ReplyMessage>
    where
        F: Fn(&ReplyMessage) -> bool + Send + Sync,
    {
        self.say(question).await;
        self.ask_followup(timeout, accept).await
    }

    /// Wait for the invoker to react to `message` with `emoji`
    pub async fn await_reaction_confirm(
        &self,
        message: MessageId,
        emoji: &ReactionType,
        timeout: Duration,
    ) -> PromptOutcome<()> {
        let reacted = tokio::time::timeout(
            timeout,
            self.platform.next_reaction(message, self.author, emoji, timeout),
        )
        .await;
        match reacted {
            Ok(true) => PromptOutcome::Answered(()),
            Ok(false) | Err(_) => PromptOutcome::TimedOut,
        }
    }

    /// Tell the invoker the prompt expired
    pub async fn times_up(&self) {
        self.say(TIMES_UP).await;
    }

    /// Reply in the invoking channel; failures are logged
    pub async fn say(&self, content: &str) {
        if let Err(e) = self
            .platform
            .send(Destination::Channel(self.channel), Outbound::text(content))
            .await
        {
            warn!(channel_id = %self.channel, error = %e, "Could not reply to invoker");
        }
    }

    fn is_from_invoker(&self, reply: &ReplyMessage) -> bool {
        reply.author == self.author && reply.channel_id == self.channel
    }
}
