//! Inactive member records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A member currently classified as inactive in a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveMemberRecord {
    pub guild_id: u64,
    pub member_id: u64,
    /// Excluded from inactivity notifications
    #[serde(default)]
    pub exempt: bool,
    /// When the member was last sent the inactivity message
    #[serde(default)]
    pub last_notified: Option<DateTime<Utc>>,
}

impl InactiveMemberRecord {
    #[must_use]
    pub fn new(guild_id: u64, member_id: u64) -> Self {
        Self {
            guild_id,
            member_id,
            exempt: false,
            last_notified: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> (u64, u64) {
        (self.guild_id, self.member_id)
    }

    pub fn mark_notified(&mut self, at: DateTime<Utc>) {
        self.last_notified = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_record() {
        let record = InactiveMemberRecord::new(1, 2);
        assert_eq!(record.key(), (1, 2));
        assert!(!record.exempt);
        assert!(record.last_notified.is_none());
    }

    #[test]
    fn test_missing_fields_default() {
        let record: InactiveMemberRecord =
            serde_yaml::from_str("guild_id: 1\nmember_id: 2\n").expect("valid record");
        assert_eq!(record, InactiveMemberRecord::new(1, 2));
    }
}
