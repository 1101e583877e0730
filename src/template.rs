//! Placeholder substitution, pagination and the outbound `say` helper

use crate::platform::{ChannelRef, Destination, GuildProfile, Outbound, Outbox, PlatformResult, SentMessage};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static CHANNEL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[#(.+?)\]").expect("channel token pattern is valid"));

/// Values available to `{...}` placeholders and `[#channel]` tokens
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    pub server: Option<String>,
    /// Name of the channel the message relates to
    pub channel: Option<String>,
    /// Mention of the member the message is about
    pub mention: Option<String>,
    pub owner_name: Option<String>,
    pub owner_discriminator: Option<String>,
    /// Channels `[#name]` tokens are resolved against
    pub channels: Vec<ChannelRef>,
}

impl SubstitutionContext {
    #[must_use]
    pub fn for_guild(profile: GuildProfile, channels: Vec<ChannelRef>) -> Self {
        Self {
            server: Some(profile.name),
            channel: None,
            mention: None,
            owner_name: profile.owner_name,
            owner_discriminator: profile.owner_discriminator,
            channels,
        }
    }

    #[must_use]
    pub fn with_mention(mut self, mention: impl Into<String>) -> Self {
        self.mention = Some(mention.into());
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Replace known placeholders; unknown tokens stay as written
    #[must_use]
    pub fn substitute(&self, template: &str) -> String {
        let text = template
            .replace("{server}", self.server.as_deref().unwrap_or("the server"))
            .replace("{channel}", self.channel.as_deref().unwrap_or_default())
            .replace("{mention}", self.mention.as_deref().unwrap_or_default())
            .replace(
                "{owner_name}",
                self.owner_name.as_deref().unwrap_or("the server owner"),
            )
            .replace(
                "{owner_discriminator}",
                self.owner_discriminator.as_deref().unwrap_or_default(),
            );

        CHANNEL_TOKEN
            .replace_all(&text, |caps: &Captures| {
                let name = &caps[1];
                self.channels
                    .iter()
                    .find(|channel| channel.name == name)
                    .map_or_else(|| caps[0].to_string(), |channel| format!("<#{}>", channel.id))
            })
            .into_owned()
    }

    /// Substitute every text part of an outbound message
    #[must_use]
    pub fn apply(&self, mut body: Outbound) -> Outbound {
        body.content = body.content.map(|content| self.substitute(&content));
        if let Some(embed) = body.embed.as_mut() {
            embed.title = embed.title.as_deref().map(|t| self.substitute(t));
            embed.description = embed.description.as_deref().map(|d| self.substitute(d));
            embed.footer = embed.footer.as_deref().map(|f| self.substitute(f));
        }
        body
    }
}

/// Send a message, substituting placeholders when a context is given
///
/// # Errors
/// Returns the classified platform error from the send
pub async fn say<O: Outbox + ?Sized>(
    outbox: &O,
    destination: Destination,
    body: Outbound,
    substitutions: Option<&SubstitutionContext>,
) -> PlatformResult<SentMessage> {
    let body = match substitutions {
        Some(context) => context.apply(body),
        None => body,
    };
    outbox.send(destination, body).await
}

/// Backslash-escape markdown control characters
#[must_use]
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '~' | '`' | '|' | '>' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Split `text` into pages of at most `limit` characters
///
/// A page ends at the last `delimiter` in range when that leaves at least a
/// quarter of the limit on the page, otherwise at the last whitespace,
/// otherwise exactly at the limit. The separator itself is dropped.
#[must_use]
pub fn paginate(text: &str, limit: usize, delimiter: &str) -> Vec<String> {
    let limit = limit.max(1);
    let min_page = limit / 4;
    let mut pages = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let window_end = rest.char_indices().nth(limit).map_or(rest.len(), |(i, _)| i);
        let window = &rest[..window_end];

        let at_delimiter = (!delimiter.is_empty())
            .then(|| window.rfind(delimiter))
            .flatten()
            .filter(|&i| window[..i].chars().count() >= min_page)
            .map(|i| (i, i + delimiter.len()));
        let at_whitespace = || {
            window
                .char_indices()
                .filter(|(i, c)| *i > 0 && c.is_whitespace())
                .last()
                .map(|(i, c)| (i, i + c.len_utf8()))
        };
        let (end, resume) = at_delimiter
            .or_else(at_whitespace)
            .unwrap_or((window_end, window_end));

        pages.push(rest[..end].to_string());
        rest = &rest[resume..];
    }

    if !rest.is_empty() || pages.is_empty() {
        pages.push(rest.to_string());
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::ChannelId;

    fn context() -> SubstitutionContext {
        SubstitutionContext::for_guild(
            GuildProfile {
                name: "Ashe's Lounge".to_string(),
                owner_name: Some("ashe".to_string()),
                owner_discriminator: Some("0420".to_string()),
            },
            vec![ChannelRef {
                id: ChannelId::new(42),
                name: "general".to_string(),
            }],
        )
    }

    #[test]
    fn test_welcome_substitution() {
        let context = context().with_mention("<@7>");
        assert_eq!(
            context.substitute("Welcome, {mention}! See [#general]."),
            "Welcome, <@7>! See <#42>."
        );
        assert_eq!(context.substitute("Try [#missing]."), "Try [#missing].");
    }

    #[test]
    fn test_defaults_and_unknown_tokens() {
        let empty = SubstitutionContext::default();
        assert_eq!(
            empty.substitute("{server} by {owner_name}#{owner_discriminator} {unknown}"),
            "the server by the server owner# {unknown}"
        );

        let in_channel = empty.with_channel("general");
        assert_eq!(in_channel.substitute("in #{channel}"), "in #general");
        assert_eq!(
            context().substitute("{server} ({owner_name}#{owner_discriminator})"),
            "Ashe's Lounge (ashe#0420)"
        );
    }

    #[test]
    fn test_apply_covers_embed_parts() {
        let body = Outbound::text("{server}").with_embed(
            crate::platform::Embed::titled("{server}")
                .description("[#general]")
                .footer("{owner_name}"),
        );
        let body = context().apply(body);
        assert_eq!(body.content.as_deref(), Some("Ashe's Lounge"));
        let embed = body.embed.unwrap();
        assert_eq!(embed.title.as_deref(), Some("Ashe's Lounge"));
        assert_eq!(embed.description.as_deref(), Some("<#42>"));
        assert_eq!(embed.footer.as_deref(), Some("ashe"));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("**bold** _it_ `code`"), r"\*\*bold\*\* \_it\_ \`code\`");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn test_paginate_short_text_is_one_page() {
        assert_eq!(paginate("hello", 10, "\n"), vec!["hello".to_string()]);
        assert_eq!(paginate("", 10, "\n"), vec![String::new()]);
    }

    #[test]
    fn test_paginate_prefers_delimiter() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(paginate(text, 10, "\n"), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn test_paginate_falls_back_to_whitespace() {
        // The only newline would leave a page shorter than a quarter of the limit
        let text = "a\nbbbbbbbbbbbb cccc";
        assert_eq!(paginate(text, 16, "\n"), vec!["a\nbbbbbbbbbbbb", "cccc"]);
    }

    #[test]
    fn test_paginate_hard_cut() {
        let pages = paginate("abcdefghij", 4, "\n");
        assert_eq!(pages, vec!["abcd", "efgh", "ij"]);
        assert!(pages.iter().all(|page| page.chars().count() <= 4));
    }
}
