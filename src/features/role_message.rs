//! Announcements when a member gains a milestone role

use crate::platform::{Destination, GuildDirectory, GuildProfile, Outbound, Outbox};
use crate::template::{SubstitutionContext, say};
use serde::Deserialize;
use serenity::all::{RoleId, UserId};
use tracing::{info, warn};

pub const FEATURE: &str = "role_message";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleMessageSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub milestones: Vec<RoleMilestone>,
}

/// Message posted in `channel` (by name) when `role` is newly granted
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleMilestone {
    pub role: u64,
    pub channel: String,
    pub message: String,
}

impl RoleMessageSettings {
    /// Milestones whose role is in `after` but not in `before`
    #[must_use]
    pub fn reached(&self, before: &[RoleId], after: &[RoleId]) -> Vec<&RoleMilestone> {
        if !self.enabled {
            return Vec::new();
        }
        self.milestones
            .iter()
            .filter(|milestone| {
                let role = RoleId::new(milestone.role.max(1));
                after.contains(&role) && !before.contains(&role)
            })
            .collect()
    }
}

/// Post the message for each reached milestone; returns how many were sent
pub async fn announce<P: GuildDirectory + Outbox + ?Sized>(
    platform: &P,
    milestones: &[&RoleMilestone],
    member: UserId,
) -> usize {
    if milestones.is_empty() {
        return 0;
    }

    let channels = match platform.text_channels().await {
        Ok(channels) => channels,
        Err(e) => {
            warn!(error = %e, "Could not list channels for role milestones");
            return 0;
        }
    };
    let profile = platform.guild_profile().await.unwrap_or_else(|e| {
        warn!(error = %e, "Could not load guild profile");
        GuildProfile::default()
    });
    let base = SubstitutionContext::for_guild(profile, channels.clone()).with_mention(format!("<@{member}>"));

    let mut sent = 0;
    for milestone in milestones {
        let Some(output) = channels.iter().find(|c| c.name == milestone.channel) else {
            warn!(channel = %milestone.channel, role_id = milestone.role, "Milestone channel not found");
            continue;
        };
        let context = base.clone().with_channel(output.name.clone());
        match say(
            platform,
            Destination::Channel(output.id),
            Outbound::text(milestone.message.as_str()),
            Some(&context),
        )
        .await
        {
            Ok(_) => {
                info!(member_id = %member, role_id = milestone.role, "Announced role milestone");
                sent += 1;
            }
            Err(e) => warn!(channel = %milestone.channel, error = %e, "Could not announce role milestone"),
        }
    }
    sent
}
