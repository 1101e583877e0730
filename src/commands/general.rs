//! Commands anyone can use

use super::guild;
use crate::dictionary::{definition_embed, not_found_reply, usage_hint};
use crate::platform::{Destination, Outbound, Outbox};
use crate::{CommandStatus, Context, Error, logging};
use tracing::warn;

const DEFAULT_DEFINE_USAGE: &str = "<term>";

/// Get the dictionary entry of a term
#[poise::command(prefix_command, guild_only)]
pub async fn define(ctx: Context<'_>, #[rest] term: Option<String>) -> Result<(), Error> {
    let (guild_id, platform) = guild(ctx)?;
    let data = ctx.data();
    let channel = Destination::Channel(ctx.channel_id());

    let term = term
        .as_deref()
        .map(crate::dictionary::clean_term)
        .filter(|term| !term.is_empty());
    let Some(term) = term else {
        let settings = data.config.command_settings("define", Some(guild_id));
        let usage = if settings.usage.is_empty() {
            DEFAULT_DEFINE_USAGE
        } else {
            settings.usage.as_str()
        };
        platform
            .send(channel, Outbound::text(usage_hint(data.prefix(), usage)))
            .await?;
        logging::log_command_status(ctx, CommandStatus::Invalid);
        return Ok(());
    };

    let status = match data.dictionary.lookup(&term).await {
        Ok(Some(lookup)) => {
            let embed = definition_embed(&term, &lookup, &data.dictionary.config().base_url);
            platform.send(channel, Outbound::embed(embed)).await?;
            CommandStatus::Completed
        }
        Ok(None) => {
            platform.send(channel, Outbound::text(not_found_reply(&term))).await?;
            CommandStatus::Invalid
        }
        Err(e) => {
            warn!(term = %term, error = %e, "Dictionary lookup failed");
            CommandStatus::Failed
        }
    };
    logging::log_command_status(ctx, status);
    Ok(())
}

/// Show the command list, or help for one command
#[poise::command(prefix_command, track_edits)]
pub async fn help(
    ctx: Context<'_>,
    #[rest]
    #[description = "Command to explain"]
    command: Option<String>,
) -> Result<(), Error> {
    let extra_text_at_bottom = format!(
        "Type {}help <command> for more info on a command.",
        ctx.data().prefix()
    );
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            extra_text_at_bottom: &extra_text_at_bottom,
            ..Default::default()
        },
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_command_definition() {
        let cmd = define();
        assert_eq!(cmd.name, "define");
        assert!(cmd.guild_only);
        assert!(
            cmd.description
                .unwrap_or_default()
                .contains("dictionary entry")
        );
    }

    #[test]
    fn test_help_is_a_prefix_command() {
        let cmd = help();
        assert!(cmd.prefix_action.is_some());
        assert!(cmd.slash_action.is_none());
    }
}
