//! Role grants on leveling-bot announcements

use crate::error::{BotError, BotResult};
use crate::platform::GuildDirectory;
use regex::Regex;
use serde::Deserialize;
use serenity::all::{RoleId, UserId};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const FEATURE: &str = "mee6_level_up";

const DEFAULT_BOT_ID: u64 = 159_985_870_458_322_944;
const DEFAULT_PATTERN: &str = r"GG <@!?(\d+)>, you just advanced to level (\d+)!";

fn default_bot_id() -> u64 {
    DEFAULT_BOT_ID
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

/// `mee6_level_up` settings
///
/// `pattern` must capture the member id first and the level second.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelUpSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bot_id")]
    pub bot_id: u64,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Level threshold to role id
    #[serde(default)]
    pub roles: BTreeMap<u32, u64>,
}

/// A parsed level-up announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    pub member: UserId,
    pub level: u32,
}

impl LevelUpSettings {
    /// Whether `author` is the configured leveling bot
    #[must_use]
    pub fn is_announcer(&self, author: UserId) -> bool {
        self.enabled && author.get() == self.bot_id
    }

    /// Parse an announcement
    ///
    /// # Errors
    /// Returns [`BotError::InvalidSetting`] if the configured pattern does not compile
    pub fn parse(&self, content: &str) -> BotResult<Option<LevelUp>> {
        let pattern = Regex::new(&self.pattern)
            .map_err(|e| BotError::InvalidSetting(format!("{FEATURE}.pattern: {e}")))?;
        let Some(caps) = pattern.captures(content) else {
            return Ok(None);
        };
        let member = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .filter(|id| *id != 0);
        let level = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        Ok(member.zip(level).map(|(member, level)| LevelUp {
            member: UserId::new(member),
            level,
        }))
    }

    /// Roles whose threshold is at or below `level`, lowest first
    #[must_use]
    pub fn roles_for(&self, level: u32) -> Vec<(u32, RoleId)> {
        self.roles
            .range(..=level)
            .filter(|(_, role)| **role != 0)
            .map(|(threshold, role)| (*threshold, RoleId::new(*role)))
            .collect()
    }
}

/// Grant every earned role for an announcement; returns the roles granted
///
/// # Errors
/// Returns an error for an unusable pattern; failed grants are only logged
pub async fn grant_level_roles<D: GuildDirectory + ?Sized>(
    directory: &D,
    settings: &LevelUpSettings,
    content: &str,
) -> BotResult<Vec<RoleId>> {
    let Some(level_up) = settings.parse(content)? else {
        return Ok(Vec::new());
    };
    info!(member_id = %level_up.member, level = level_up.level, "Member reached level");

    let mut granted = Vec::new();
    for (threshold, role) in settings.roles_for(level_up.level) {
        let reason = format!("User reached level {threshold}");
        match directory.grant_role(level_up.member, role, &reason).await {
            Ok(()) => granted.push(role),
            Err(e) => warn!(
                member_id = %level_up.member,
                role_id = %role,
                error = %e,
                "Could not grant level role"
            ),
        }
    }
    Ok(granted)
}
