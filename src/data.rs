use std::{fmt::Formatter, ops::Deref, sync::Arc};

use crate::config::Configuration;
use crate::dictionary::DictionaryClient;
use crate::error::BotResult;
use crate::features::MessageGate;
use crate::inactivity::InactivityStore;
use crate::leaderboard::Mee6Client;

/// Shared state handed to every command
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

pub struct DataInner {
    pub config: Arc<Configuration>,
    pub inactivity: InactivityStore,
    pub dictionary: DictionaryClient,
    pub leaderboard: Mee6Client,
    /// Pics-only outcomes shared between the event handler and the command check
    pub message_gate: Arc<MessageGate>,
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("servers", &self.config.features.servers.len())
            .field("inactive_records", &self.inactivity.len())
            .field("dictionary", &self.dictionary)
            .finish_non_exhaustive()
    }
}

impl Data {
    /// Build the shared state, opening the record store named in the configuration
    ///
    /// # Errors
    /// Returns a storage error if existing records cannot be read
    pub async fn load(config: Arc<Configuration>) -> BotResult<Self> {
        let path = config.app.persistence.inactive_records.clone();
        let inactivity = InactivityStore::open(path, Arc::clone(&config)).await?;
        Ok(Self::with_store(config, inactivity))
    }

    /// Shared state that keeps every record in memory
    #[must_use]
    pub fn in_memory(config: Arc<Configuration>) -> Self {
        let inactivity = InactivityStore::in_memory(Arc::clone(&config));
        Self::with_store(config, inactivity)
    }

    fn with_store(config: Arc<Configuration>, inactivity: InactivityStore) -> Self {
        let dictionary = DictionaryClient::from_env(config.app.dictionary.clone());
        let leaderboard = Mee6Client::new(config.app.leaderboard.clone());
        Self(Arc::new(DataInner {
            config,
            inactivity,
            dictionary,
            leaderboard,
            message_gate: Arc::new(MessageGate::new()),
        }))
    }

    /// The command prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.config.app.default.cmd_prefix
    }
}
