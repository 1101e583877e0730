//! Configuration loading and per-guild feature resolution
//!
//! Two YAML files are read once at start. `app.yaml` holds process-wide
//! settings; `features.yaml` holds a `default` feature tree plus a `servers`
//! map of per-guild overrides with the same shape. A guild's settings for a
//! feature are the guild's own object completed key by key from the default
//! object, so an explicit guild key always wins and a missing one is borrowed.

use crate::dictionary::DictionaryConfig;
use crate::leaderboard::LeaderboardConfig;
use poise::serenity_prelude::GuildId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Days without activity before a member counts as inactive, used when the
/// configuration has no usable value
pub const FALLBACK_DAYS_THRESHOLD: i64 = 14;
/// Messages between two progress updates during a scan
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

const INACTIVITY: &str = "inactivity";
const DEFAULT_CONFIG_DIR: &str = "config";

/// Errors raised while loading configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Which pair of configuration files to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// Read `ENVIRONMENT`; anything but `DEV` is production
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT").as_deref() {
            Ok("DEV") => Self::Development,
            _ => Self::Production,
        }
    }

    fn app_file(self) -> &'static str {
        match self {
            Self::Production => "app.yaml",
            Self::Development => "app_dev.yaml",
        }
    }

    fn features_file(self) -> &'static str {
        match self {
            Self::Production => "features.yaml",
            Self::Development => "features_dev.yaml",
        }
    }
}

/// Feature block a setting lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Top level of the tree (`inactivity` lives here)
    Root,
    OnMessage,
    OnMemberUpdate,
    Commands,
}

impl Scope {
    fn key(self) -> Option<&'static str> {
        match self {
            Self::Root => None,
            Self::OnMessage => Some("on_message"),
            Self::OnMemberUpdate => Some("on_member_update"),
            Self::Commands => Some("commands"),
        }
    }
}

/// Process-wide settings from `app.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub default: AppDefaults,
    pub standards: Standards,
    pub persistence: PersistenceConfig,
    pub dictionary: DictionaryConfig,
    pub leaderboard: LeaderboardConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppDefaults {
    pub cmd_prefix: String,
    pub description: String,
    /// Presence text, `{prefix}` is replaced by the command prefix
    pub status: String,
}

impl Default for AppDefaults {
    fn default() -> Self {
        Self {
            cmd_prefix: ";".to_string(),
            description: "Moderation and community helper".to_string(),
            status: "DDR | {prefix}help for help".to_string(),
        }
    }
}

impl AppDefaults {
    #[must_use]
    pub fn status_text(&self) -> String {
        self.status.replace("{prefix}", &self.cmd_prefix)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Standards {
    pub embed: EmbedStandards,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbedStandards {
    pub description_limit: usize,
}

impl Default for EmbedStandards {
    fn default() -> Self {
        Self {
            description_limit: 2048,
        }
    }
}

/// Where inactive member records are kept. No path means memory only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub inactive_records: Option<PathBuf>,
}

/// Raw feature trees from `features.yaml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub default: Mapping,
    #[serde(default)]
    pub servers: HashMap<u64, Mapping>,
}

/// Resolved settings for one command in one guild
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub enabled: bool,
    pub aliases: Vec<String>,
    /// Whether the command's failures may be shown to users
    pub visible: bool,
    pub description: String,
    pub help: String,
    pub usage: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            aliases: Vec::new(),
            visible: true,
            description: String::new(),
            help: String::new(),
            usage: String::new(),
        }
    }
}

/// Resolved `inactivity` settings for one guild
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InactivitySettings {
    pub days_threshold: i64,
    pub include_reactions: bool,
    pub message_enabled: bool,
    pub message: Option<String>,
    pub message_invite_enabled: bool,
    pub message_invite_channel: Option<u64>,
    pub message_invite_hours: u32,
    /// Zero means unlimited
    pub message_invite_max_uses: u8,
    pub message_invite_reason: Option<String>,
    /// Channels left out of activity scans
    pub excluded_channels: Vec<u64>,
    pub progress_interval: u64,
}

impl Default for InactivitySettings {
    fn default() -> Self {
        Self {
            days_threshold: FALLBACK_DAYS_THRESHOLD,
            include_reactions: true,
            message_enabled: false,
            message: None,
            message_invite_enabled: false,
            message_invite_channel: None,
            message_invite_hours: 24,
            message_invite_max_uses: 0,
            message_invite_reason: None,
            excluded_channels: Vec::new(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl InactivitySettings {
    /// The notification text, if notifications are switched on and written
    #[must_use]
    pub fn notification_message(&self) -> Option<&str> {
        if !self.message_enabled {
            return None;
        }
        self.message.as_deref().filter(|message| !message.trim().is_empty())
    }
}

/// Complete configuration, immutable after load
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub app: AppConfig,
    pub features: FeatureConfig,
}

impl Configuration {
    #[must_use]
    pub fn new(app: AppConfig, features: FeatureConfig) -> Self {
        Self { app, features }
    }

    /// Build a configuration from YAML text
    ///
    /// # Errors
    /// Returns the parser error if either document is malformed
    pub fn from_yaml(app: &str, features: &str) -> Result<Self, serde_yaml::Error> {
        let app = if app.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(app)?
        };
        let features = if features.trim().is_empty() {
            FeatureConfig::default()
        } else {
            serde_yaml::from_str(features)?
        };
        Ok(Self::new(app, features))
    }

    /// Load both files for `environment` from `dir`
    ///
    /// # Errors
    /// Returns an error if a file cannot be read or parsed
    pub async fn load(dir: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let app = read_yaml::<AppConfig>(&dir.join(environment.app_file())).await?;
        let features = read_yaml::<FeatureConfig>(&dir.join(environment.features_file())).await?;
        debug!(
            servers = features.servers.len(),
            "Loaded feature configuration"
        );
        Ok(Self::new(app, features))
    }

    /// Load using `ASHE_CONFIG_DIR` (default `config`) and `ENVIRONMENT`
    ///
    /// # Errors
    /// Returns an error if a file cannot be read or parsed
    pub async fn load_from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var("ASHE_CONFIG_DIR").unwrap_or_else(|_| DEFAULT_CONFIG_DIR.to_string());
        Self::load(Path::new(&dir), Environment::from_env()).await
    }

    /// Default settings for `key` in `scope`
    #[must_use]
    pub fn default_features(&self, scope: Scope, key: &str) -> Option<&Mapping> {
        scope_block(&self.features.default, scope)?
            .get(key)
            .and_then(Value::as_mapping)
    }

    /// A guild's raw top-level block for `feature`, absent if not configured
    #[must_use]
    pub fn server_features(&self, guild_id: GuildId, feature: &str) -> Option<&Value> {
        self.features.servers.get(&guild_id.get())?.get(feature)
    }

    /// A guild's own (unmerged) settings for `key` in `scope`
    #[must_use]
    pub fn guild_features(&self, guild_id: GuildId, scope: Scope, key: &str) -> Option<&Mapping> {
        let tree = self.features.servers.get(&guild_id.get())?;
        let value = scope_block(tree, scope)?.get(key)?;
        match value.as_mapping() {
            Some(mapping) => Some(mapping),
            None => {
                warn!(
                    guild_id = %guild_id,
                    feature = key,
                    "Feature settings are not a map; treating as not configured"
                );
                None
            }
        }
    }

    /// Resolve `key` in `scope` for a guild
    ///
    /// Absent when the guild does not configure the feature at all. Otherwise
    /// the guild's settings with every missing key taken from the defaults.
    #[must_use]
    pub fn resolve(&self, scope: Scope, guild_id: GuildId, key: &str) -> Option<Mapping> {
        let guild = self.guild_features(guild_id, scope, key)?;
        let defaults = self.default_features(scope, key);
        if defaults.is_none() {
            warn!(
                guild_id = %guild_id,
                feature = key,
                "Missing default configuration for feature"
            );
        }
        Some(merge_missing(guild, defaults))
    }

    /// Resolve and deserialize a feature's settings
    #[must_use]
    pub fn feature<T: DeserializeOwned>(&self, scope: Scope, guild_id: GuildId, key: &str) -> Option<T> {
        let merged = self.resolve(scope, guild_id, key)?;
        deserialize_settings(merged, key)
    }

    /// The guild's own inactivity settings merged with defaults, absent if
    /// the guild has no `inactivity` block
    #[must_use]
    pub fn guild_inactivity_settings(&self, guild_id: GuildId) -> Option<InactivitySettings> {
        self.feature(Scope::Root, guild_id, INACTIVITY)
    }

    /// Inactivity settings for a guild, always complete
    ///
    /// Falls back to the default block when the guild has none, and to
    /// hardcoded values when the defaults are missing keys.
    #[must_use]
    pub fn inactivity_settings(&self, guild_id: GuildId) -> InactivitySettings {
        let merged = self
            .resolve(Scope::Root, guild_id, INACTIVITY)
            .or_else(|| self.default_features(Scope::Root, INACTIVITY).cloned());

        let Some(merged) = merged else {
            warn!(
                guild_id = %guild_id,
                "Missing default configuration for 'inactivity'; using fallback settings"
            );
            return InactivitySettings::default();
        };

        for key in ["days_threshold", "include_reactions"] {
            if !merged.contains_key(key) {
                warn!(
                    guild_id = %guild_id,
                    setting = key,
                    "Missing a default setting for 'inactivity'; using fallback value"
                );
            }
        }

        deserialize_settings(merged, INACTIVITY).unwrap_or_default()
    }

    /// Minimum days without activity before a member counts as inactive
    #[must_use]
    pub fn inactive_threshold(&self, guild_id: GuildId) -> i64 {
        self.inactivity_settings(guild_id).days_threshold
    }

    /// The inactivity notification text for a guild, if enabled
    #[must_use]
    pub fn inactivity_message(&self, guild_id: GuildId) -> Option<String> {
        self.inactivity_settings(guild_id)
            .notification_message()
            .map(ToString::to_string)
    }

    /// Settings for `command`, guild overrides laid over the defaults
    #[must_use]
    pub fn command_settings(&self, command: &str, guild_id: Option<GuildId>) -> CommandSettings {
        let merged = guild_id
            .and_then(|guild_id| self.resolve(Scope::Commands, guild_id, command))
            .or_else(|| self.default_features(Scope::Commands, command).cloned());

        match merged {
            Some(merged) => deserialize_settings(merged, command).unwrap_or_default(),
            None => {
                warn!(
                    command = command,
                    "Missing default configuration for command; using fallback settings"
                );
                CommandSettings::default()
            }
        }
    }
}

/// Copy every key of `defaults` into a clone of `guild` unless already present
#[must_use]
pub fn merge_missing(guild: &Mapping, defaults: Option<&Mapping>) -> Mapping {
    let mut merged = guild.clone();
    if let Some(defaults) = defaults {
        for (key, value) in defaults {
            if !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

fn scope_block(tree: &Mapping, scope: Scope) -> Option<&Mapping> {
    match scope.key() {
        None => Some(tree),
        Some(key) => tree.get(key).and_then(Value::as_mapping),
    }
}

fn deserialize_settings<T: DeserializeOwned>(settings: Mapping, label: &str) -> Option<T> {
    match serde_yaml::from_value(Value::Mapping(settings)) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(feature = label, error = %e, "Feature settings could not be parsed");
            None
        }
    }
}

async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
