//! Channel history walk that collects active members
//!
//! [`ActivityScanner`] is a lending sequence: every call to
//! [`ActivityScanner::next`] processes one message (or records one skipped
//! channel) and hands back the cumulative [`ActivityScanState`]. The sequence
//! ends when the last channel is exhausted. A new scanner is a new scan.

use crate::platform::{
    ChannelRef, HISTORY_PAGE_SIZE, HistoryMessage, HistorySource, PlatformError, message_id_at,
};
use chrono::{DateTime, Utc};
use serenity::all::{MessageId, UserId};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Why a channel was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The bot may not read the channel's history
    Forbidden(ChannelRef),
    /// History could not be fetched for another reason
    Unavailable(ChannelRef, String),
}

impl ScanError {
    #[must_use]
    pub fn channel(&self) -> &ChannelRef {
        match self {
            Self::Forbidden(channel) | Self::Unavailable(channel, _) => channel,
        }
    }
}

/// Cumulative state of one scan
#[derive(Debug, Clone, Default)]
pub struct ActivityScanState {
    pub channel: Option<ChannelRef>,
    /// One-based position of `channel` in the scan
    pub channel_index: usize,
    pub channel_count: usize,
    /// Messages processed in the current channel
    pub messages_scanned: u64,
    /// Timestamp of the last processed message
    pub current_timestamp: Option<DateTime<Utc>>,
    pub active: HashSet<UserId>,
    /// Set only on the snapshot that reports a skipped channel
    pub error: Option<ScanError>,
}

pub struct ActivityScanner<'a, H: HistorySource + ?Sized> {
    history: &'a H,
    channels: Vec<ChannelRef>,
    after: MessageId,
    include_reactions: bool,
    next_channel: usize,
    in_channel: bool,
    channel_exhausted: bool,
    cursor: MessageId,
    page: VecDeque<HistoryMessage>,
    state: ActivityScanState,
}

impl<'a, H: HistorySource + ?Sized> ActivityScanner<'a, H> {
    /// Scan `channels` in order for activity strictly after `boundary`
    pub fn new(
        history: &'a H,
        channels: Vec<ChannelRef>,
        boundary: DateTime<Utc>,
        include_reactions: bool,
    ) -> Self {
        let after = message_id_at(boundary);
        let state = ActivityScanState {
            channel_count: channels.len(),
            ..ActivityScanState::default()
        };
        Self {
            history,
            channels,
            after,
            include_reactions,
            next_channel: 0,
            in_channel: false,
            channel_exhausted: false,
            cursor: after,
            page: VecDeque::new(),
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ActivityScanState {
        &self.state
    }

    /// Advance by one message or one skipped channel
    pub async fn next(&mut self) -> Option<&ActivityScanState> {
        loop {
            if let Some(message) = self.page.pop_front() {
                self.record(message).await;
                tokio::task::yield_now().await;
                return Some(&self.state);
            }

            if self.in_channel && !self.channel_exhausted {
                match self.fetch_page().await {
                    Ok(()) => continue,
                    Err(error) => {
                        self.in_channel = false;
                        self.state.error = Some(error);
                        return Some(&self.state);
                    }
                }
            }

            let channel = self.channels.get(self.next_channel)?.clone();
            self.next_channel += 1;
            debug!(channel = %channel.name, "Scanning channel history");
            self.state.channel = Some(channel);
            self.state.channel_index = self.next_channel;
            self.state.messages_scanned = 0;
            self.state.error = None;
            self.cursor = self.after;
            self.in_channel = true;
            self.channel_exhausted = false;
        }
    }

    /// Run to the end and return the active member set
    pub async fn run_to_end(mut self) -> HashSet<UserId> {
        while self.next().await.is_some() {}
        self.into_active()
    }

    /// The active member set collected so far
    #[must_use]
    pub fn into_active(self) -> HashSet<UserId> {
        self.state.active
    }

    async fn fetch_page(&mut self) -> Result<(), ScanError> {
        let Some(channel) = self.state.channel.clone() else {
            self.channel_exhausted = true;
            return Ok(());
        };

        let page = match self
            .history
            .messages_after(channel.id, self.cursor, HISTORY_PAGE_SIZE)
            .await
        {
            Ok(page) => page,
            Err(PlatformError::Forbidden(reason)) => {
                warn!(channel = %channel.name, reason = %reason, "Skipping channel: missing access");
                return Err(ScanError::Forbidden(channel));
            }
            Err(e) => {
                warn!(channel = %channel.name, error = %e, "Skipping channel: history unavailable");
                return Err(ScanError::Unavailable(channel, e.to_string()));
            }
        };

        if page.len() < usize::from(HISTORY_PAGE_SIZE) {
            self.channel_exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = last.id;
        }
        self.page.extend(page);
        Ok(())
    }

    async fn record(&mut self, message: HistoryMessage) {
        self.state.messages_scanned += 1;
        self.state.current_timestamp = Some(message.created_at);
        self.state.active.insert(message.author);

        if !self.include_reactions {
            return;
        }
        let Some(channel) = self.state.channel.as_ref().map(|c| c.id) else {
            return;
        };
        for reaction in &message.reactions {
            match self.history.reaction_users(channel, message.id, reaction).await {
                Ok(users) => self.state.active.extend(users),
                Err(e) => warn!(
                    message_id = %message.id,
                    error = %e,
                    "Could not list reaction users"
                ),
            }
        }
    }
}
