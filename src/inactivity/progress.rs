//! Scan progress reporting

use super::scanner::{ActivityScanState, ScanError};
use crate::platform::{Destination, Outbound, Outbox, SentMessage};
use async_trait::async_trait;
use serenity::all::ChannelId;
use tracing::warn;

/// Receives human-readable progress lines during a scan
#[async_trait]
pub trait ProgressSink: Send {
    async fn report(&mut self, text: String);
}

/// Decides which scan snapshots are worth showing
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    interval: u64,
    last_channel: Option<usize>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            last_channel: None,
        }
    }

    /// Report on channel change, on a skipped channel and every `interval` messages
    pub fn should_report(&mut self, state: &ActivityScanState) -> bool {
        let changed = self.last_channel != Some(state.channel_index);
        self.last_channel = Some(state.channel_index);
        changed || state.error.is_some() || state.messages_scanned % self.interval == 0
    }
}

#[must_use]
pub fn scan_started(channel_count: usize) -> String {
    format!("Scanning {channel_count} channels for inactive members...")
}

#[must_use]
pub fn scan_finished(channel_count: usize) -> String {
    format!("Scanned {channel_count} channels for inactive members.")
}

#[must_use]
pub fn scan_progress(state: &ActivityScanState) -> String {
    let name = state.channel.as_ref().map_or("", |channel| channel.name.as_str());
    let details = match &state.error {
        Some(ScanError::Forbidden(_)) => "\nSkipped: missing access".to_string(),
        Some(ScanError::Unavailable(_, reason)) => format!("\nSkipped: {reason}"),
        None => {
            let date = state
                .current_timestamp
                .map(|at| at.format("%b %d, %H:%M UTC").to_string())
                .unwrap_or_default();
            format!(
                "\nMessages scanned: {}\n\nDate: {date}",
                state.messages_scanned
            )
        }
    };
    format!(
        "Scanning {}/{} channels for inactive members...```Current channel: #{name}{details}```",
        state.channel_index, state.channel_count
    )
}

/// A single status message that is posted once and then edited in place
pub struct ProgressMessage<'a, O: Outbox + ?Sized> {
    outbox: &'a O,
    channel: ChannelId,
    message: Option<SentMessage>,
}

impl<'a, O: Outbox + ?Sized> ProgressMessage<'a, O> {
    pub fn new(outbox: &'a O, channel: ChannelId) -> Self {
        Self {
            outbox,
            channel,
            message: None,
        }
    }
}

#[async_trait]
impl<O: Outbox + ?Sized> ProgressSink for ProgressMessage<'_, O> {
    async fn report(&mut self, text: String) {
        let result = if let Some(message) = &self.message {
            self.outbox
                .edit(message.channel_id, message.id, Outbound::text(text))
                .await
        } else {
            match self
                .outbox
                .send(Destination::Channel(self.channel), Outbound::text(text))
                .await
            {
                Ok(sent) => {
                    self.message = Some(sent);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        if let Err(e) = result {
            warn!(channel_id = %self.channel, error = %e, "Could not update scan progress");
        }
    }
}

/// Discards progress
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&mut self, _text: String) {}
}
