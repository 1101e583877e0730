//! MEE6 leaderboard report of members who left the guild

use crate::error::BotResult;
use crate::platform::{Destination, Embed, Outbound, Outbox};
use crate::status::CommandStatus;
use async_trait::async_trait;
use serde::Deserialize;
use serenity::all::{ChannelId, GuildId};
use std::collections::HashSet;
use tracing::{info, warn};

pub const LEADERBOARD_MISSING: &str = "I couldn't find this server's MEE6 leaderboard.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub api_url: String,
    pub page_size: u32,
    /// Stop after this many pages even if the leaderboard goes on
    pub max_pages: u32,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            api_url: "https://mee6.xyz/api/plugins/levels/leaderboard/".to_string(),
            page_size: 1000,
            max_pages: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Player {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub level: u32,
}

#[derive(Debug, Deserialize)]
struct LeaderboardPage {
    #[serde(default)]
    players: Vec<Player>,
}

/// Paged access to a guild's leaderboard
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeaderboardSource: Send + Sync {
    /// Players on page `page` (zero based); empty past the end
    async fn players(&self, guild_id: GuildId, page: u32) -> BotResult<Vec<Player>>;
}

#[derive(Debug, Clone)]
pub struct Mee6Client {
    http: reqwest::Client,
    config: LeaderboardConfig,
}

impl Mee6Client {
    #[must_use]
    pub fn new(config: LeaderboardConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn max_pages(&self) -> u32 {
        self.config.max_pages
    }
}

#[async_trait]
impl LeaderboardSource for Mee6Client {
    async fn players(&self, guild_id: GuildId, page: u32) -> BotResult<Vec<Player>> {
        let url = format!("{}{}", self.config.api_url, guild_id);
        let page: LeaderboardPage = self
            .http
            .get(&url)
            .query(&[("page", page), ("limit", self.config.page_size)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page.players)
    }
}

/// Report lines for players who are not members anymore
#[must_use]
pub fn absent_lines(players: &[Player], members: &HashSet<u64>) -> Vec<String> {
    players
        .iter()
        .filter(|player| {
            player
                .id
                .parse::<u64>()
                .map_or(true, |id| !members.contains(&id))
        })
        .map(|player| {
            format!(
                "**{}**#{} — lv{}",
                player.username, player.discriminator, player.level
            )
        })
        .collect()
}

/// Post one embed per leaderboard page that has absent members
///
/// Pages without absentees are skipped and do not advance the page number
/// shown in the titles.
pub async fn report_absent_members<S, O>(
    source: &S,
    outbox: &O,
    channel: ChannelId,
    guild_id: GuildId,
    members: &HashSet<u64>,
    max_pages: u32,
) -> CommandStatus
where
    S: LeaderboardSource + ?Sized,
    O: Outbox + ?Sized,
{
    let mut reported = 0;
    for page in 0..max_pages {
        let players = match source.players(guild_id, page).await {
            Ok(players) => players,
            Err(e) => {
                warn!(guild_id = %guild_id, page = page, error = %e, "Leaderboard request failed");
                if let Err(e) = outbox
                    .send(Destination::Channel(channel), Outbound::text(LEADERBOARD_MISSING))
                    .await
                {
                    warn!(error = %e, "Could not report leaderboard failure");
                }
                return CommandStatus::Failed;
            }
        };
        if players.is_empty() {
            break;
        }

        let absent = absent_lines(&players, members);
        if absent.is_empty() {
            continue;
        }
        reported += 1;
        let report = Embed::titled(format!(
            "MEE6 leaderboard members who left the server (p. {reported})"
        ))
        .description(absent.join("\n"));
        if let Err(e) = outbox
            .send(Destination::Channel(channel), Outbound::embed(report))
            .await
        {
            warn!(error = %e, "Could not post leaderboard report");
            return if e.is_forbidden() {
                CommandStatus::Forbidden
            } else {
                CommandStatus::Failed
            };
        }
    }

    info!(guild_id = %guild_id, pages = reported, "Leaderboard purge report posted");
    CommandStatus::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::testing::{FakeGuild, channel};
    use mockall::predicate::eq;

    fn player(id: &str, name: &str, level: u32) -> Player {
        Player {
            id: id.to_string(),
            username: name.to_string(),
            discriminator: "0001".to_string(),
            level,
        }
    }

    #[test]
    fn test_absent_lines_skip_members() {
        let members = HashSet::from([1, 2]);
        let players = [player("1", "ashe", 30), player("3", "gone", 12)];
        assert_eq!(absent_lines(&players, &members), vec!["**gone**#0001 — lv12"]);
    }

    #[tokio::test]
    async fn test_report_numbers_only_pages_with_absentees() {
        let mut source = MockLeaderboardSource::new();
        source
            .expect_players()
            .with(eq(GuildId::new(1)), eq(0))
            .returning(|_, _| Ok(vec![player("1", "ashe", 30)]));
        source
            .expect_players()
            .with(eq(GuildId::new(1)), eq(1))
            .returning(|_, _| Ok(vec![player("3", "gone", 12)]));
        source
            .expect_players()
            .with(eq(GuildId::new(1)), eq(2))
            .returning(|_, _| Ok(Vec::new()));

        let guild = FakeGuild::new();
        let status = report_absent_members(
            &source,
            &guild,
            channel(9),
            GuildId::new(1),
            &HashSet::from([1]),
            10,
        )
        .await;

        assert_eq!(status, CommandStatus::Completed);
        let posted = guild.sent_to(Destination::Channel(channel(9)));
        assert_eq!(posted.len(), 1);
        let embed = posted[0].embed.clone().unwrap();
        assert_eq!(
            embed.title.as_deref(),
            Some("MEE6 leaderboard members who left the server (p. 1)")
        );
    }

    #[tokio::test]
    async fn test_missing_leaderboard() {
        let mut source = MockLeaderboardSource::new();
        source
            .expect_players()
            .returning(|_, _| Err(BotError::Lookup("404".into())));

        let guild = FakeGuild::new();
        let status =
            report_absent_members(&source, &guild, channel(9), GuildId::new(1), &HashSet::new(), 10)
                .await;

        assert_eq!(status, CommandStatus::Failed);
        let posted = guild.sent_to(Destination::Channel(channel(9)));
        assert_eq!(posted[0].content.as_deref(), Some(LEADERBOARD_MISSING));
    }
}
