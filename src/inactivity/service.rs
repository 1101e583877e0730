//! Inactivity workflow
//!
//! Drives a scan, turns the active set into inactive member records, and runs
//! the report / notify / exempt interactions for one guild.

use super::progress::{ProgressSink, ProgressTracker, scan_finished, scan_progress, scan_started};
use super::scanner::{ActivityScanner, ScanError};
use super::{InactiveMemberRecord, InactivityDao};
use crate::config::{Configuration, FALLBACK_DAYS_THRESHOLD, InactivitySettings};
use crate::error::BotResult;
use crate::platform::{
    ChannelRef, Destination, Embed, GuildPlatform, GuildProfile, InviteFactory, InviteSpec, MemberRef, Outbound,
    PlatformResult, unicode_reaction,
};
use crate::prompt::{InteractivePrompt, PromptOutcome};
use crate::status::CommandStatus;
use crate::template::{SubstitutionContext, paginate, say};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serenity::all::{ChannelId, GuildId, UserId};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};

pub const NOTIFY_EMOJI: &str = "📧";
pub const NOTIFY_HINT: &str = "React 📧 below to notify them";
/// How long the notify affordance on a report stays live
pub const NOTIFY_CONFIRM_TIMEOUT: Duration = Duration::from_secs(600);
pub const NO_INACTIVITY_MESSAGE: &str = "There is no inactivity message for this server.";
/// Longest lookback a configuration may ask for
pub const MAX_DAYS_THRESHOLD: i64 = 36_500;

/// An inactive member with their stored record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactiveMember {
    pub member: MemberRef,
    pub record: InactiveMemberRecord,
}

impl InactiveMember {
    /// `**EXEMPT** <@id> [name] (Jan 02, 2024 UTC)` with optional parts
    #[must_use]
    pub fn report_line(&self) -> String {
        let exempt = if self.record.exempt { "**EXEMPT** " } else { "" };
        let notified = self
            .record
            .last_notified
            .map(|at| at.format(" (%b %d, %Y UTC)").to_string())
            .unwrap_or_default();
        format!(
            "{exempt}{} [{}]{notified}",
            self.member.mention(),
            self.member.display_name
        )
    }
}

/// Result of one inactivity computation
#[derive(Debug, Clone)]
pub struct InactivityReport {
    pub boundary: DateTime<Utc>,
    pub members: Vec<InactiveMember>,
    pub skipped: Vec<ScanError>,
}

/// Per-member result of a notification batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyOutcome {
    pub notified: Vec<MemberRef>,
    pub failed: Vec<MemberRef>,
    /// The batch stopped early
    pub aborted: bool,
}

/// Create the batch invite if the settings ask for one
///
/// The configured channel is used when it exists, otherwise the first text
/// channel.
///
/// # Errors
/// Returns the platform error from invite creation
pub async fn notification_invite<I: InviteFactory + ?Sized>(
    invites: &I,
    channels: &[ChannelRef],
    settings: &InactivitySettings,
) -> PlatformResult<Option<String>> {
    if !settings.message_invite_enabled {
        return Ok(None);
    }
    let configured = settings
        .message_invite_channel
        .and_then(|id| channels.iter().find(|channel| channel.id.get() == id));
    let Some(channel) = configured.or_else(|| channels.first()) else {
        warn!("No text channel to create an inactivity invite in");
        return Ok(None);
    };

    let spec = InviteSpec {
        max_age: settings.message_invite_hours.saturating_mul(3600),
        max_uses: settings.message_invite_max_uses,
        reason: settings.message_invite_reason.clone(),
    };
    invites.create_invite(channel.id, &spec).await.map(Some)
}

/// `now` minus `days`, if that is representable
fn lookback(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    ChronoDuration::try_days(days).and_then(|delta| now.checked_sub_signed(delta))
}

pub struct InactivityService<'a, P: GuildPlatform + ?Sized> {
    platform: &'a P,
    dao: &'a dyn InactivityDao,
    guild_id: GuildId,
    settings: InactivitySettings,
    description_limit: usize,
}

impl<'a, P: GuildPlatform + ?Sized> InactivityService<'a, P> {
    /// Settings come from the DAO when the guild configures inactivity,
    /// otherwise from the configuration defaults
    pub fn new(
        platform: &'a P,
        dao: &'a dyn InactivityDao,
        config: &Configuration,
        guild_id: GuildId,
    ) -> Self {
        let mut settings = dao
            .guild_inactivity_settings(guild_id)
            .unwrap_or_else(|| config.inactivity_settings(guild_id));
        if !(0..=MAX_DAYS_THRESHOLD).contains(&settings.days_threshold) {
            warn!(
                guild_id = %guild_id,
                days_threshold = settings.days_threshold,
                "Inactivity threshold out of range; using fallback value"
            );
            settings.days_threshold = FALLBACK_DAYS_THRESHOLD;
        }
        Self {
            platform,
            dao,
            guild_id,
            settings,
            description_limit: config.app.standards.embed.description_limit,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &InactivitySettings {
        &self.settings
    }

    /// Activity must be newer than this to count
    #[must_use]
    pub fn boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        lookback(now, self.settings.days_threshold)
            .or_else(|| lookback(now, FALLBACK_DAYS_THRESHOLD))
            .unwrap_or(now)
    }

    async fn scan_channels(&self) -> PlatformResult<Vec<ChannelRef>> {
        let excluded: HashSet<u64> = self.settings.excluded_channels.iter().copied().collect();
        Ok(self
            .platform
            .text_channels()
            .await?
            .into_iter()
            .filter(|channel| !excluded.contains(&channel.id.get()))
            .collect())
    }

    /// Scan the guild and store the current inactive set
    ///
    /// # Errors
    /// Returns an error if members or channels cannot be listed, or if the
    /// DAO fails
    pub async fn compute_inactive_members(
        &self,
        now: DateTime<Utc>,
        progress: &mut dyn ProgressSink,
    ) -> BotResult<InactivityReport> {
        let boundary = self.boundary(now);
        let channels = self.scan_channels().await?;
        let channel_count = channels.len();
        progress.report(scan_started(channel_count)).await;

        let mut tracker = ProgressTracker::new(self.settings.progress_interval);
        let mut scanner = ActivityScanner::new(
            self.platform,
            channels,
            boundary,
            self.settings.include_reactions,
        );
        let mut skipped = Vec::new();
        while let Some(state) = scanner.next().await {
            if let Some(error) = &state.error {
                skipped.push(error.clone());
            }
            if tracker.should_report(state) {
                progress.report(scan_progress(state)).await;
            }
        }
        progress.report(scan_finished(channel_count)).await;
        let active = scanner.into_active();

        let guild = self.guild_id.get();
        let bot_id = self.platform.bot_user_id();
        let existing: HashMap<u64, InactiveMemberRecord> = self
            .dao
            .load_inactive_records(guild)
            .await?
            .into_iter()
            .map(|record| (record.member_id, record))
            .collect();

        let mut members: Vec<InactiveMember> = self
            .platform
            .members()
            .await?
            .into_iter()
            .filter(|member| !member.bot && member.id != bot_id && !active.contains(&member.id))
            .filter(|member| member.joined_at.is_some_and(|joined| joined < boundary))
            .map(|member| {
                let record = existing
                    .get(&member.id.get())
                    .cloned()
                    .unwrap_or_else(|| InactiveMemberRecord::new(guild, member.id.get()));
                InactiveMember { member, record }
            })
            .collect();
        members.sort_by_key(|inactive| inactive.member.display_name.to_lowercase());

        let inactive_ids: HashSet<u64> = members.iter().map(|m| m.record.member_id).collect();
        let mut added = 0;
        for inactive in &members {
            if !existing.contains_key(&inactive.record.member_id) {
                self.dao.upsert_inactive_record(inactive.record.clone()).await?;
                added += 1;
            }
        }
        let mut removed = 0;
        for member_id in existing.keys().filter(|id| !inactive_ids.contains(*id)) {
            self.dao.remove_inactive_record(guild, *member_id).await?;
            removed += 1;
        }

        info!(
            guild_id = %self.guild_id,
            active = active.len(),
            inactive = members.len(),
            added,
            removed,
            skipped = skipped.len(),
            "Computed inactive members"
        );

        Ok(InactivityReport {
            boundary,
            members,
            skipped,
        })
    }

    /// Send the inactivity message to inactive members and report the result
    /// in `report_channel`
    ///
    /// Without an explicit member list the guild is scanned first.
    ///
    /// # Errors
    /// Returns an error if a scan is needed and fails
    pub async fn notify_inactive_members(
        &self,
        members: Option<Vec<InactiveMember>>,
        report_channel: ChannelId,
        now: DateTime<Utc>,
        progress: &mut dyn ProgressSink,
    ) -> BotResult<(CommandStatus, NotifyOutcome)> {
        let Some(message) = self.settings.notification_message().map(str::to_string) else {
            self.reply(report_channel, Outbound::text(NO_INACTIVITY_MESSAGE)).await;
            return Ok((CommandStatus::Failed, NotifyOutcome::default()));
        };

        let members = match members {
            Some(members) => members,
            None => self.compute_inactive_members(now, progress).await?.members,
        };

        let channels = self.platform.text_channels().await?;
        let profile = self.platform.guild_profile().await.unwrap_or_else(|e| {
            warn!(guild_id = %self.guild_id, error = %e, "Could not load guild profile");
            GuildProfile::default()
        });
        let substitutions = SubstitutionContext::for_guild(profile, channels.clone());

        let mut outcome = NotifyOutcome::default();
        let mut invite: Option<Option<String>> = None;

        for inactive in members.into_iter().filter(|m| !m.record.exempt) {
            if invite.is_none() {
                match notification_invite(self.platform, &channels, &self.settings).await {
                    Ok(url) => invite = Some(url),
                    Err(e) => {
                        warn!(guild_id = %self.guild_id, error = %e, "Could not create inactivity invite");
                        outcome.failed.push(inactive.member);
                        outcome.aborted = true;
                        self.reply(
                            report_channel,
                            Outbound::text(format!("An error happened while creating invite: {e}")),
                        )
                        .await;
                        break;
                    }
                }
            }

            let notification = match invite.as_ref().and_then(Option::as_ref) {
                Some(url) => format!("{message}\n{url}"),
                None => message.clone(),
            };
            let context = substitutions.clone().with_mention(inactive.member.mention());
            let sent = say(
                self.platform,
                Destination::User(inactive.member.id),
                Outbound::text(notification),
                Some(&context),
            )
            .await;

            match sent {
                Ok(_) => {
                    let mut record = inactive.record;
                    record.mark_notified(now);
                    if let Err(e) = self.dao.upsert_inactive_record(record).await {
                        warn!(member_id = %inactive.member.id, error = %e, "Could not store notification time");
                    }
                    outcome.notified.push(inactive.member);
                }
                Err(e) => {
                    warn!(member_id = %inactive.member.id, error = %e, "Could not notify inactive member");
                    outcome.failed.push(inactive.member);
                }
            }
        }

        self.report_notified(report_channel, &outcome).await;
        info!(
            guild_id = %self.guild_id,
            notified = outcome.notified.len(),
            failed = outcome.failed.len(),
            aborted = outcome.aborted,
            "Notified inactive members"
        );

        let status = if outcome.aborted {
            CommandStatus::Failed
        } else {
            CommandStatus::Completed
        };
        Ok((status, outcome))
    }

    /// Post the paginated inactive member report with the notify affordance
    ///
    /// # Errors
    /// Returns an error if the scan fails or the report cannot be posted
    pub async fn inactive_list(
        &self,
        invoker: UserId,
        channel: ChannelId,
        now: DateTime<Utc>,
        progress: &mut dyn ProgressSink,
    ) -> BotResult<CommandStatus> {
        let report = self.compute_inactive_members(now, progress).await?;
        let title = format!(
            "Inactive Members ({}+ days since last message)",
            self.settings.days_threshold
        );
        let lines: Vec<String> = report.members.iter().map(InactiveMember::report_line).collect();
        let description = if lines.is_empty() {
            "No inactive members.".to_string()
        } else {
            lines.join("\n")
        };
        let mut pages = paginate(&description, self.description_limit, "\n");
        let last_page = pages.pop().unwrap_or_default();

        for page in pages {
            self.platform
                .send(
                    Destination::Channel(channel),
                    Outbound::embed(Embed::titled(&title).description(page)),
                )
                .await?;
        }

        let embed = Embed::titled(&title).description(last_page);
        let can_notify = self.settings.notification_message().is_some();
        let shown = if can_notify {
            embed.clone().footer(NOTIFY_HINT)
        } else {
            embed.clone()
        };
        let posted = self
            .platform
            .send(
                Destination::Channel(channel),
                Outbound::text(format!("<@{invoker}>")).with_embed(shown),
            )
            .await?;
        if !can_notify {
            return Ok(CommandStatus::Completed);
        }

        let emoji = unicode_reaction(NOTIFY_EMOJI);
        if let Err(e) = self.platform.react(channel, posted.id, emoji.clone()).await {
            warn!(error = %e, "Could not add notify reaction to report");
        }

        let prompt = InteractivePrompt::new(self.platform, channel, invoker);
        match prompt
            .await_reaction_confirm(posted.id, &emoji, NOTIFY_CONFIRM_TIMEOUT)
            .await
        {
            PromptOutcome::Answered(()) => {
                let (status, _) = self
                    .notify_inactive_members(Some(report.members), channel, now, progress)
                    .await?;
                Ok(status)
            }
            PromptOutcome::TimedOut => {
                if let Err(e) = self.platform.edit(channel, posted.id, Outbound::embed(embed)).await {
                    warn!(error = %e, "Could not clear notify hint from report");
                }
                if let Err(e) = self.platform.clear_reactions(channel, posted.id).await {
                    warn!(error = %e, "Could not clear reactions from report");
                }
                Ok(CommandStatus::Completed)
            }
        }
    }

    /// Set or clear a member's exemption; returns whether anything changed
    ///
    /// # Errors
    /// Returns the DAO error
    pub async fn set_exemption(&self, member: UserId, exempt: bool) -> BotResult<bool> {
        let guild = self.guild_id.get();
        let existing = self
            .dao
            .load_inactive_records(guild)
            .await?
            .into_iter()
            .find(|record| record.member_id == member.get());

        let mut record = match existing {
            Some(record) if record.exempt == exempt => return Ok(false),
            Some(record) => record,
            None if !exempt => return Ok(false),
            None => InactiveMemberRecord::new(guild, member.get()),
        };
        record.exempt = exempt;
        self.dao.upsert_inactive_record(record).await?;
        info!(guild_id = %self.guild_id, member_id = %member, exempt, "Updated inactivity exemption");
        Ok(true)
    }

    /// Records currently flagged exempt
    ///
    /// # Errors
    /// Returns the DAO error
    pub async fn exempt_list(&self) -> BotResult<Vec<InactiveMemberRecord>> {
        Ok(self
            .dao
            .load_inactive_records(self.guild_id.get())
            .await?
            .into_iter()
            .filter(|record| record.exempt)
            .collect())
    }

    async fn report_notified(&self, channel: ChannelId, outcome: &NotifyOutcome) {
        let entries = |members: &[MemberRef]| {
            members
                .iter()
                .map(|m| format!("{} [{}]", m.mention(), m.display_name))
                .collect::<Vec<_>>()
                .join("\n")
        };

        if !outcome.notified.is_empty() {
            for page in paginate(&entries(&outcome.notified), self.description_limit, "\n") {
                self.reply(
                    channel,
                    Outbound::embed(Embed::titled("Notified Members").description(page)),
                )
                .await;
            }
        }
        if !outcome.failed.is_empty() {
            for page in paginate(&entries(&outcome.failed), self.description_limit, "\n") {
                self.reply(
                    channel,
                    Outbound::text("Couldn't message the following inactive members:")
                        .with_embed(Embed::titled("Failed to Notify").description(page)),
                )
                .await;
            }
        }
    }

    async fn reply(&self, channel: ChannelId, body: Outbound) {
        if let Err(e) = self.platform.send(Destination::Channel(channel), body).await {
            warn!(channel_id = %channel, error = %e, "Could not post inactivity report");
        }
    }
}
