//! Inactive member record store
//!
//! Records live in a [`DashMap`] keyed by `(guild, member)` and, when a path is
//! configured, are mirrored to a YAML file after every change. Concurrent
//! commands on the same guild race per record with last writer wins.

use super::InactiveMemberRecord;
use crate::config::{Configuration, InactivitySettings};
use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use dashmap::DashMap;
use poise::serenity_prelude::GuildId;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Persistence seam for inactive member records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InactivityDao: Send + Sync {
    async fn load_inactive_records(&self, guild_id: u64) -> BotResult<Vec<InactiveMemberRecord>>;
    async fn upsert_inactive_record(&self, record: InactiveMemberRecord) -> BotResult<()>;
    async fn remove_inactive_record(&self, guild_id: u64, member_id: u64) -> BotResult<()>;
    /// The guild's own inactivity settings, absent if it configures none
    fn guild_inactivity_settings(&self, guild_id: GuildId) -> Option<InactivitySettings>;
}

/// Store for inactive member records
#[derive(Clone)]
pub struct InactivityStore {
    records: Arc<DashMap<(u64, u64), InactiveMemberRecord>>,
    path: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
    config: Arc<Configuration>,
}

impl InactivityStore {
    /// A store that never touches the filesystem
    #[must_use]
    pub fn in_memory(config: Arc<Configuration>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            path: None,
            write_lock: Arc::new(Mutex::new(())),
            config,
        }
    }

    /// Open the store, reading existing records from `path` when given
    ///
    /// # Errors
    /// Returns a storage error if the file exists but cannot be read or parsed
    pub async fn open(path: Option<PathBuf>, config: Arc<Configuration>) -> BotResult<Self> {
        let mut store = Self::in_memory(config);
        let Some(path) = path else {
            info!("Inactive member persistence disabled; records are kept in memory");
            return Ok(store);
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let records: Vec<InactiveMemberRecord> = if content.trim().is_empty() {
                    Vec::new()
                } else {
                    serde_yaml::from_str(&content)
                        .map_err(|e| BotError::Storage(format!("{}: {e}", path.display())))?
                };
                info!(count = records.len(), path = %path.display(), "Loaded inactive member records");
                for record in records {
                    store.records.insert(record.key(), record);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No inactive member records yet");
            }
            Err(e) => return Err(BotError::Storage(format!("{}: {e}", path.display()))),
        }

        store.path = Some(path);
        Ok(store)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    async fn persist(&self) -> BotResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;

        let mut records: Vec<_> = self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(InactiveMemberRecord::key);
        let yaml = serde_yaml::to_string(&records).map_err(|e| BotError::Storage(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BotError::Storage(e.to_string()))?;
        }
        tokio::fs::write(path, yaml)
            .await
            .map_err(|e| BotError::Storage(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl InactivityDao for InactivityStore {
    async fn load_inactive_records(&self, guild_id: u64) -> BotResult<Vec<InactiveMemberRecord>> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.member_id);
        Ok(records)
    }

    async fn upsert_inactive_record(&self, record: InactiveMemberRecord) -> BotResult<()> {
        self.records.insert(record.key(), record);
        self.persist().await
    }

    async fn remove_inactive_record(&self, guild_id: u64, member_id: u64) -> BotResult<()> {
        if self.records.remove(&(guild_id, member_id)).is_some() {
            self.persist().await?;
        }
        Ok(())
    }

    fn guild_inactivity_settings(&self, guild_id: GuildId) -> Option<InactivitySettings> {
        self.config.guild_inactivity_settings(guild_id)
    }
}
