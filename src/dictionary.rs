//! Merriam-Webster collegiate dictionary lookups for `;define`

use crate::error::{BotError, BotResult};
use crate::platform::Embed;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Environment variable holding the collegiate API key
pub const API_KEY_VAR: &str = "DICT_REGULAR_API_KEY";

/// Entries shown per reply
const MAX_ENTRIES_SHOWN: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    pub api_url: String,
    /// Public page for a term, linked from the reply
    pub base_url: String,
    pub cache_limit: usize,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.dictionaryapi.com/api/v3/references/collegiate/json/".to_string(),
            base_url: "https://www.merriam-webster.com/dictionary/".to_string(),
            cache_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub id: String,
    /// Functional label, e.g. `noun`
    pub term_type: String,
    pub offensive: bool,
    pub short_definitions: Vec<String>,
}

/// A lookup that found something
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Entries(Vec<DictionaryEntry>),
    /// The term is unknown; these are spellings the API suggests instead
    Suggestions(Vec<String>),
}

#[derive(Deserialize)]
struct RawEntry {
    meta: RawMeta,
    #[serde(default)]
    fl: Option<String>,
    #[serde(default)]
    shortdef: Vec<String>,
}

#[derive(Deserialize)]
struct RawMeta {
    id: String,
    #[serde(default)]
    offensive: bool,
}

/// Trim and collapse runs of whitespace
#[must_use]
pub fn clean_term(term: &str) -> String {
    term.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Interpret an API response for `term`
///
/// Entries are kept when their id is the term itself or a numbered homograph
/// of it (`term:2`) and they carry short definitions.
///
/// # Errors
/// Returns a lookup error if the term cannot be turned into an id pattern
pub fn parse_response(term: &str, response: Vec<Value>) -> BotResult<Option<Lookup>> {
    if response.is_empty() {
        return Ok(None);
    }

    if response.iter().all(Value::is_string) {
        let suggestions = response
            .into_iter()
            .filter_map(|value| value.as_str().map(ToString::to_string))
            .collect();
        return Ok(Some(Lookup::Suggestions(suggestions)));
    }

    let id_pattern = Regex::new(&format!(
        r"(?i)^{}(?::[\w\d]+)?$",
        regex::escape(&clean_term(term).to_lowercase())
    ))
    .map_err(|e| BotError::Lookup(e.to_string()))?;

    let entries: Vec<DictionaryEntry> = response
        .into_iter()
        .filter_map(|value| serde_json::from_value::<RawEntry>(value).ok())
        .filter(|raw| id_pattern.is_match(&raw.meta.id) && !raw.shortdef.is_empty())
        .map(|raw| DictionaryEntry {
            id: raw.meta.id,
            term_type: raw.fl.unwrap_or_default(),
            offensive: raw.meta.offensive,
            short_definitions: raw.shortdef,
        })
        .collect();

    Ok((!entries.is_empty()).then_some(Lookup::Entries(entries)))
}

struct CachedLookup {
    requests: u64,
    lookup: Lookup,
}

/// Lookup cache that evicts the least requested term when full
pub struct DictionaryCache {
    entries: HashMap<String, CachedLookup>,
    limit: usize,
}

impl DictionaryCache {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            limit: limit.max(1),
        }
    }

    pub fn get(&mut self, term: &str) -> Option<Lookup> {
        let cached = self.entries.get_mut(term)?;
        cached.requests += 1;
        Some(cached.lookup.clone())
    }

    pub fn insert(&mut self, term: String, lookup: Lookup) {
        if self.entries.len() >= self.limit && !self.entries.contains_key(&term) {
            let least_requested = self
                .entries
                .iter()
                .min_by_key(|(_, cached)| cached.requests)
                .map(|(term, _)| term.clone());
            if let Some(evicted) = least_requested {
                debug!(term = %evicted, "Evicting dictionary cache entry");
                self.entries.remove(&evicted);
            }
        }
        self.entries.insert(term, CachedLookup { requests: 1, lookup });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct DictionaryClient {
    http: reqwest::Client,
    config: DictionaryConfig,
    api_key: Option<String>,
    cache: Mutex<DictionaryCache>,
}

impl std::fmt::Debug for DictionaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictionaryClient")
            .field("api_url", &self.config.api_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl DictionaryClient {
    #[must_use]
    pub fn new(config: DictionaryConfig, api_key: Option<String>) -> Self {
        let cache = Mutex::new(DictionaryCache::new(config.cache_limit));
        Self {
            http: reqwest::Client::new(),
            config,
            api_key,
            cache,
        }
    }

    /// Build a client with the key from the environment
    #[must_use]
    pub fn from_env(config: DictionaryConfig) -> Self {
        let api_key = std::env::var(API_KEY_VAR).ok().filter(|key| !key.is_empty());
        if api_key.is_none() {
            warn!("{API_KEY_VAR} is not set; dictionary lookups will fail");
        }
        Self::new(config, api_key)
    }

    #[must_use]
    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }

    /// Look up a term, answering from the cache when possible
    ///
    /// # Errors
    /// Returns a lookup error if the key is missing or the request fails
    pub async fn lookup(&self, term: &str) -> BotResult<Option<Lookup>> {
        let term = clean_term(term);
        let cached = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&term);
        if let Some(cached) = cached {
            debug!(term = %term, "Dictionary cache hit");
            return Ok(Some(cached));
        }

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BotError::Lookup(format!("{API_KEY_VAR} is not set")))?;
        let url = term_endpoint(&self.config.api_url, &term)?;
        let response: Vec<Value> = self
            .http
            .get(url)
            .query(&[("key", api_key)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let lookup = parse_response(&term, response)?;
        if let Some(found) = &lookup {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(term, found.clone());
        }
        Ok(lookup)
    }
}

/// `base` with `term` appended as a single percent-encoded path segment
fn term_endpoint(base: &str, term: &str) -> BotResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| BotError::InvalidSetting(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| BotError::InvalidSetting(format!("{base} cannot take a path")))?
        .pop_if_empty()
        .push(term);
    Ok(url)
}

/// Public page for a term; the bare base url if it cannot be extended
#[must_use]
pub fn term_url(base_url: &str, term: &str) -> String {
    term_endpoint(base_url, term).map_or_else(
        |e| {
            warn!(error = %e, "Could not build dictionary page link");
            base_url.to_string()
        },
        String::from,
    )
}

/// The reply embed for a successful lookup
#[must_use]
pub fn definition_embed(term: &str, lookup: &Lookup, base_url: &str) -> Embed {
    let url = term_url(base_url, term);
    let embed = Embed::titled(format!("Define \"{term}\"")).footer(format!("Source: {url}"));

    match lookup {
        Lookup::Entries(entries) => {
            let count = entries.len();
            let mut lines = Vec::new();
            for (i, entry) in entries.iter().take(MAX_ENTRIES_SHOWN).enumerate() {
                let offensive = if entry.offensive { " *(offensive)*" } else { "" };
                lines.push(format!(
                    "**{term}** {}/{count} *({})*{offensive}",
                    i + 1,
                    entry.term_type
                ));
                lines.push(format!("*{}*", entry.short_definitions.join("\n\n")));
                lines.push("\n".to_string());
            }
            embed.url(url).description(lines.join("\n"))
        }
        Lookup::Suggestions(suggestions) => {
            embed.description(format!("**Did you mean...**\n*{}*", suggestions.join("\n")))
        }
    }
}

#[must_use]
pub fn not_found_reply(term: &str) -> String {
    format!("Couldn't find a definition for `{term}`.")
}

#[must_use]
pub fn usage_hint(prefix: &str, usage: &str) -> String {
    format!("Type `{prefix}define {usage}` to look up a term in the dictionary.")
}
