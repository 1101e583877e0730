//! Attachment-only channels

use super::IncomingMessage;
use crate::platform::{Destination, Outbound, Outbox};
use serde::Deserialize;
use serenity::all::ChannelId;
use std::collections::HashMap;
use tracing::{info, warn};

pub const FEATURE: &str = "pics_only";

/// `pics_only` settings: restricted channel id to the explanation sent on removal
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PicsOnlySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub channels: HashMap<u64, String>,
}

impl PicsOnlySettings {
    /// The explanation for a message without attachments in a restricted channel
    #[must_use]
    pub fn rejection(&self, channel: ChannelId, has_attachments: bool) -> Option<&str> {
        if !self.enabled || has_attachments {
            return None;
        }
        self.channels.get(&channel.get()).map(String::as_str)
    }
}

/// Remove a non-conforming message and tell its author why
///
/// Returns `true` only if the message was removed. A failed delete is a
/// warning and the message is treated as accepted.
pub async fn enforce<O: Outbox + ?Sized>(
    outbox: &O,
    settings: &PicsOnlySettings,
    message: &IncomingMessage,
) -> bool {
    let Some(explanation) = settings.rejection(message.channel_id, message.has_attachments) else {
        return false;
    };

    if let Err(e) = outbox.delete(message.channel_id, message.id).await {
        warn!(
            channel_id = %message.channel_id,
            message_id = %message.id,
            error = %e,
            "Unable to delete message in pics-only channel"
        );
        return false;
    }
    info!(channel_id = %message.channel_id, author_id = %message.author, "Removed message without attachments");

    let notice = format!("{explanation}\nYour message: ```{}```", message.content);
    if let Err(e) = outbox
        .send(Destination::User(message.author), Outbound::text(notice))
        .await
    {
        warn!(author_id = %message.author, error = %e, "Could not explain removed message");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGuild, channel, user};
    use serenity::all::MessageId;

    fn settings() -> PicsOnlySettings {
        PicsOnlySettings {
            enabled: true,
            channels: HashMap::from([(5, "Pictures only in #art.".to_string())]),
        }
    }

    fn message(channel_id: u64, has_attachments: bool) -> IncomingMessage {
        IncomingMessage {
            id: MessageId::new(100),
            channel_id: channel(channel_id),
            author: user(7),
            content: "just text".to_string(),
            has_attachments,
        }
    }

    #[test]
    fn test_rejection_rules() {
        let settings = settings();
        assert!(settings.rejection(channel(5), false).is_some());
        assert!(settings.rejection(channel(5), true).is_none());
        assert!(settings.rejection(channel(6), false).is_none());

        let disabled = PicsOnlySettings {
            enabled: false,
            ..settings
        };
        assert!(disabled.rejection(channel(5), false).is_none());
    }

    #[tokio::test]
    async fn test_removes_and_explains() {
        let guild = FakeGuild::new();
        assert!(enforce(&guild, &settings(), &message(5, false)).await);
        assert_eq!(*guild.deleted.lock().unwrap(), vec![MessageId::new(100)]);

        let dm = guild.sent_to(Destination::User(user(7)));
        assert_eq!(
            dm[0].content.as_deref(),
            Some("Pictures only in #art.\nYour message: ```just text```")
        );
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_message() {
        let mut guild = FakeGuild::new();
        guild.delete_forbidden = true;
        assert!(!enforce(&guild, &settings(), &message(5, false)).await);
        assert!(guild.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_attachments_pass() {
        let guild = FakeGuild::new();
        assert!(!enforce(&guild, &settings(), &message(5, true)).await);
        assert!(guild.deleted.lock().unwrap().is_empty());
    }
}
