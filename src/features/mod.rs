//! Configuration-driven reactions to guild messages and member updates

pub mod gate;
pub mod level_up;
pub mod pics_only;
pub mod role_message;

pub use gate::MessageGate;
pub use level_up::LevelUpSettings;
pub use pics_only::PicsOnlySettings;
pub use role_message::{RoleMessageSettings, RoleMilestone};

use crate::config::{Configuration, Scope};
use crate::platform::GuildPlatform;
use serenity::all::{ChannelId, GuildId, MessageId, RoleId, UserId};
use std::time::Duration;
use tracing::{debug, warn};

/// The parts of a guild message the feature handlers look at
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: UserId,
    pub content: String,
    pub has_attachments: bool,
}

/// What happens to a message after the feature handlers ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Goes on to command dispatch
    Dispatch,
    /// Removed; no further checks and no command dispatch
    Rejected,
}

/// Whether the pics-only rule removes this message; shared with the command check
#[must_use]
pub fn pics_only_rejects(
    config: &Configuration,
    guild_id: GuildId,
    channel_id: ChannelId,
    has_attachments: bool,
) -> bool {
    config
        .feature::<PicsOnlySettings>(Scope::OnMessage, guild_id, pics_only::FEATURE)
        .is_some_and(|settings| settings.rejection(channel_id, has_attachments).is_some())
}

/// Whether a command in `message` may run
///
/// Messages the pics-only rule does not touch always may. Otherwise the
/// outcome recorded by the event handler decides: a message whose delete
/// failed still dispatches, and no recorded outcome within `wait` counts as
/// removed.
pub async fn command_may_run(
    config: &Configuration,
    gate: &MessageGate,
    guild_id: GuildId,
    message: &IncomingMessage,
    wait: Duration,
) -> bool {
    if !pics_only_rejects(config, guild_id, message.channel_id, message.has_attachments) {
        return true;
    }
    gate.claim(message.id, wait).await == Some(MessageDisposition::Dispatch)
}

/// Run the message features for a guild message
///
/// Feature failures are logged and never stop the message from being processed.
pub async fn on_guild_message<P: GuildPlatform + ?Sized>(
    config: &Configuration,
    platform: &P,
    guild_id: GuildId,
    message: &IncomingMessage,
) -> MessageDisposition {
    if let Some(settings) =
        config.feature::<LevelUpSettings>(Scope::OnMessage, guild_id, level_up::FEATURE)
    {
        if settings.is_announcer(message.author) {
            if let Err(e) = level_up::grant_level_roles(platform, &settings, &message.content).await {
                warn!(guild_id = %guild_id, error = %e, "Level-up handling failed");
            }
        }
    }

    if let Some(settings) =
        config.feature::<PicsOnlySettings>(Scope::OnMessage, guild_id, pics_only::FEATURE)
    {
        if pics_only::enforce(platform, &settings, message).await {
            return MessageDisposition::Rejected;
        }
    }

    MessageDisposition::Dispatch
}

/// Announce milestone roles gained in a member update; returns how many were sent
pub async fn on_member_roles_changed<P: GuildPlatform + ?Sized>(
    config: &Configuration,
    platform: &P,
    guild_id: GuildId,
    member: UserId,
    before: &[RoleId],
    after: &[RoleId],
) -> usize {
    let Some(settings) =
        config.feature::<RoleMessageSettings>(Scope::OnMemberUpdate, guild_id, role_message::FEATURE)
    else {
        return 0;
    };
    let reached = settings.reached(before, after);
    debug!(guild_id = %guild_id, member_id = %member, milestones = reached.len(), "Role update checked");
    role_message::announce(platform, &reached, member).await
}

/// A message as seen before or after an edit
#[derive(Debug, Clone)]
pub struct EditSnapshot<'a> {
    pub author: &'a str,
    pub content: &'a str,
    pub pinned: bool,
}

/// Where a logged message was posted: `(guild - channel) `, `(channel) ` or `(author) `
#[must_use]
pub fn log_prefix(guild: Option<&str>, channel: Option<&str>, author: &str) -> String {
    match (guild, channel) {
        (Some(guild), Some(channel)) => format!("({guild} - {channel}) "),
        (None, Some(channel)) => format!("({channel}) "),
        (Some(guild), None) => format!("({guild}) "),
        (None, None) => format!("({author}) "),
    }
}

/// Audit lines for a message edit: pin transitions, then old and new content
#[must_use]
pub fn edit_audit_lines(prefix: &str, before: &EditSnapshot<'_>, after: &EditSnapshot<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    match (before.pinned, after.pinned) {
        (true, false) => lines.push(format!("{prefix}<Unpinned> {}: {}", after.author, after.content)),
        (false, true) => lines.push(format!("{prefix}<Pinned> {}: {}", after.author, after.content)),
        _ => {}
    }
    if before.content != after.content {
        lines.push(format!("{prefix}<Old message> {}: {}", before.author, before.content));
        lines.push(format!("{prefix}<Edited> {}: {}", after.author, after.content));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::gate::DISPOSITION_WAIT;
    use crate::platform::Destination;
    use crate::testing::{FakeGuild, channel, user};

    const APP: &str = "default: {}";
    const FEATURES: &str = r"
default:
  on_message:
    mee6_level_up:
      enabled: false
      bot_id: 159985870458322944
    pics_only:
      enabled: false
  on_member_update:
    role_message:
      enabled: false
servers:
  1:
    on_message:
      mee6_level_up:
        enabled: true
        roles:
          5: 105
      pics_only:
        enabled: true
        channels:
          5: Pictures only.
    on_member_update:
      role_message:
        enabled: true
        milestones:
          - role: 10
            channel: general
            message: Welcome, {mention}!
";

    fn config() -> Configuration {
        Configuration::from_yaml(APP, FEATURES).unwrap()
    }

    fn message(channel_id: u64, author: UserId, content: &str) -> IncomingMessage {
        IncomingMessage {
            id: MessageId::new(50),
            channel_id: channel(channel_id),
            author,
            content: content.to_string(),
            has_attachments: false,
        }
    }

    #[tokio::test]
    async fn test_rejected_message_skips_dispatch() {
        let guild = FakeGuild::new();
        let disposition =
            on_guild_message(&config(), &guild, GuildId::new(1), &message(5, user(7), "hi")).await;
        assert_eq!(disposition, MessageDisposition::Rejected);
        assert!(pics_only_rejects(&config(), GuildId::new(1), channel(5), false));
    }

    #[tokio::test]
    async fn test_command_runs_when_delete_fails() {
        let config = config();
        let gate = std::sync::Arc::new(MessageGate::new());
        let mut guild = FakeGuild::new();
        guild.delete_forbidden = true;
        let incoming = message(5, user(7), ";define cat");

        let disposition = on_guild_message(&config, &guild, GuildId::new(1), &incoming).await;
        assert_eq!(disposition, MessageDisposition::Dispatch);
        gate.record(incoming.id, disposition);

        assert!(command_may_run(&config, &gate, GuildId::new(1), &incoming, DISPOSITION_WAIT).await);
        assert!(guild.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_command_blocked_when_message_removed() {
        let config = config();
        let gate = std::sync::Arc::new(MessageGate::new());
        let guild = FakeGuild::new();
        let incoming = message(5, user(7), ";define cat");

        let disposition = on_guild_message(&config, &guild, GuildId::new(1), &incoming).await;
        gate.record(incoming.id, disposition);

        assert!(!command_may_run(&config, &gate, GuildId::new(1), &incoming, DISPOSITION_WAIT).await);
        assert_eq!(*guild.deleted.lock().unwrap(), vec![incoming.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_check_without_recorded_outcome() {
        let config = config();
        let gate = MessageGate::new();
        let gated = message(5, user(7), ";define cat");
        assert!(!command_may_run(&config, &gate, GuildId::new(1), &gated, DISPOSITION_WAIT).await);

        let elsewhere = message(6, user(7), ";define cat");
        assert!(command_may_run(&config, &gate, GuildId::new(1), &elsewhere, DISPOSITION_WAIT).await);
    }

    #[tokio::test]
    async fn test_unconfigured_guild_dispatches() {
        let guild = FakeGuild::new();
        let disposition =
            on_guild_message(&config(), &guild, GuildId::new(2), &message(5, user(7), "hi")).await;
        assert_eq!(disposition, MessageDisposition::Dispatch);
        assert!(guild.deleted.lock().unwrap().is_empty());
        assert!(!pics_only_rejects(&config(), GuildId::new(2), channel(5), false));
    }

    #[tokio::test]
    async fn test_level_up_uses_default_bot_id() {
        let guild = FakeGuild::new();
        let announcement = message(
            6,
            UserId::new(159_985_870_458_322_944),
            "GG <@42>, you just advanced to level 7!",
        );
        let disposition = on_guild_message(&config(), &guild, GuildId::new(1), &announcement).await;
        assert_eq!(disposition, MessageDisposition::Dispatch);
        assert_eq!(
            *guild.granted.lock().unwrap(),
            vec![(user(42), RoleId::new(105))]
        );
    }

    #[tokio::test]
    async fn test_member_update_announces_milestone() {
        let guild = FakeGuild::new().with_channel(3, "general");
        let sent = on_member_roles_changed(
            &config(),
            &guild,
            GuildId::new(1),
            user(7),
            &[],
            &[RoleId::new(10)],
        )
        .await;
        assert_eq!(sent, 1);
        let posted = guild.sent_to(Destination::Channel(channel(3)));
        assert_eq!(posted[0].content.as_deref(), Some("Welcome, <@7>!"));
    }

    #[test]
    fn test_edit_audit_lines() {
        let before = EditSnapshot {
            author: "ashe",
            content: "helo",
            pinned: false,
        };
        let after = EditSnapshot {
            author: "ashe",
            content: "hello",
            pinned: true,
        };
        let prefix = log_prefix(Some("Lounge"), Some("general"), "ashe");
        assert_eq!(
            edit_audit_lines(&prefix, &before, &after),
            vec![
                "(Lounge - general) <Pinned> ashe: hello",
                "(Lounge - general) <Old message> ashe: helo",
                "(Lounge - general) <Edited> ashe: hello",
            ]
        );
        assert!(edit_audit_lines(&prefix, &after, &after).is_empty());
    }

    #[test]
    fn test_log_prefix_degrades_for_direct_messages() {
        assert_eq!(log_prefix(None, None, "ashe"), "(ashe) ");
        assert_eq!(log_prefix(None, Some("dm"), "ashe"), "(dm) ");
    }
}
