//! Inactivity audits
//!
//! A scan walks recent channel history to find who has been active; everyone
//! else who joined before the lookback boundary is inactive. Inactive members
//! are kept as records behind [`InactivityDao`] so exemptions and notification
//! times survive between runs.

pub mod progress;
mod record;
pub mod scanner;
mod service;
mod store;

pub use progress::{NoProgress, ProgressMessage, ProgressSink, ProgressTracker};
pub use record::InactiveMemberRecord;
pub use scanner::{ActivityScanState, ActivityScanner, ScanError};
pub use service::{
    InactiveMember, InactivityReport, InactivityService, NotifyOutcome, notification_invite,
};
pub use store::{InactivityDao, InactivityStore};

#[cfg(test)]
pub use store::MockInactivityDao;
