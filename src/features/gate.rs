//! Hand-off of message dispositions from the event handler to the command check
//!
//! The gateway delivers a message to the event handler and to command dispatch
//! concurrently. A command that the pics-only rule may remove waits here for
//! what the handler actually did with its message.

use super::MessageDisposition;
use dashmap::DashMap;
use serenity::all::MessageId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// How long the command check waits for the event handler
pub const DISPOSITION_WAIT: Duration = Duration::from_secs(5);
/// How long an unclaimed disposition is kept
pub const DISPOSITION_EXPIRY: Duration = Duration::from_secs(60);

type Slot = Arc<watch::Sender<Option<MessageDisposition>>>;

#[derive(Debug, Default)]
pub struct MessageGate {
    slots: DashMap<MessageId, Slot>,
}

impl MessageGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, message: MessageId) -> Slot {
        self.slots
            .entry(message)
            .or_insert_with(|| Arc::new(watch::channel(None).0))
            .clone()
    }

    /// Publish what happened to `message`; forgotten after [`DISPOSITION_EXPIRY`]
    /// unless a command check claims it first
    pub fn record(self: &Arc<Self>, message: MessageId, disposition: MessageDisposition) {
        self.slot(message).send_replace(Some(disposition));
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(DISPOSITION_EXPIRY).await;
            gate.slots.remove(&message);
        });
    }

    /// The disposition recorded for `message`, waiting up to `timeout` for it
    pub async fn claim(&self, message: MessageId, timeout: Duration) -> Option<MessageDisposition> {
        let mut receiver = self.slot(message).subscribe();
        let outcome = match tokio::time::timeout(timeout, receiver.wait_for(Option::is_some)).await {
            Ok(Ok(disposition)) => *disposition,
            _ => None,
        };
        self.slots.remove(&message);
        if outcome.is_none() {
            debug!(message_id = %message, "No disposition recorded for message");
        }
        outcome
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_after_record() {
        let gate = Arc::new(MessageGate::new());
        gate.record(MessageId::new(1), MessageDisposition::Dispatch);
        assert_eq!(
            gate.claim(MessageId::new(1), DISPOSITION_WAIT).await,
            Some(MessageDisposition::Dispatch)
        );
        assert!(gate.is_empty());
    }

    #[tokio::test]
    async fn test_claim_waits_for_record() {
        let gate = Arc::new(MessageGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.claim(MessageId::new(2), DISPOSITION_WAIT).await })
        };
        tokio::task::yield_now().await;
        gate.record(MessageId::new(2), MessageDisposition::Rejected);
        assert_eq!(waiter.await.unwrap(), Some(MessageDisposition::Rejected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_times_out_and_unclaimed_records_expire() {
        let gate = Arc::new(MessageGate::new());
        assert_eq!(gate.claim(MessageId::new(3), DISPOSITION_WAIT).await, None);
        assert!(gate.is_empty());

        gate.record(MessageId::new(4), MessageDisposition::Dispatch);
        assert_eq!(gate.len(), 1);
        tokio::time::sleep(DISPOSITION_EXPIRY + Duration::from_secs(1)).await;
        assert!(gate.is_empty());
    }
}
