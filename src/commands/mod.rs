//! Prefix commands

pub mod admin;
pub mod general;

use crate::config::{CommandSettings, Configuration};
use crate::platform::DiscordGuild;
use crate::{Context, Data, Error};
use poise::serenity_prelude::GuildId;

/// Every command, with aliases, descriptions and visibility from the default
/// command settings applied
#[must_use]
pub fn all(config: &Configuration) -> Vec<poise::Command<Data, Error>> {
    let mut commands = vec![
        admin::inactivelist(),
        admin::inactivenotify(),
        admin::exempt(),
        admin::message(),
        admin::edit(),
        admin::purgeleaderboard(),
        admin::shutdown(),
        general::define(),
        general::help(),
    ];
    for command in &mut commands {
        let settings = config.command_settings(&command.name, None);
        apply_settings(command, &settings);
    }
    commands
}

/// Lay configured settings over a command's built-in metadata
pub fn apply_settings(command: &mut poise::Command<Data, Error>, settings: &CommandSettings) {
    for alias in &settings.aliases {
        if !command.aliases.contains(alias) {
            command.aliases.push(alias.clone());
        }
    }
    if !settings.description.is_empty() {
        command.description = Some(settings.description.clone());
    }
    if !settings.help.is_empty() {
        command.help_text = Some(settings.help.clone());
    }
    command.hide_in_help = command.hide_in_help || !settings.visible;
}

/// The configuration key of the invoked command: the top-level command name
#[must_use]
pub fn settings_key(ctx: Context<'_>) -> String {
    ctx.parent_commands()
        .first()
        .map_or_else(|| ctx.command().name.clone(), |root| root.name.clone())
}

/// The guild a guild-only command runs in
fn guild(ctx: Context<'_>) -> Result<(GuildId, DiscordGuild), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command can only be used in a server")?;
    Ok((guild_id, DiscordGuild::new(ctx.serenity_context(), guild_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURES: &str = r#"
default:
  commands:
    inactivelist:
      enabled: true
      aliases: [inactive]
      description: List members who have gone quiet
      visible: true
    shutdown:
      visible: false
"#;

    #[test]
    fn test_all_applies_default_settings() {
        let config = Configuration::from_yaml("", FEATURES).unwrap();
        let commands = all(&config);

        let inactivelist = commands.iter().find(|c| c.name == "inactivelist").unwrap();
        assert_eq!(inactivelist.aliases, vec!["inactive".to_string()]);
        assert_eq!(
            inactivelist.description.as_deref(),
            Some("List members who have gone quiet")
        );
        assert!(!inactivelist.hide_in_help);

        let shutdown = commands.iter().find(|c| c.name == "shutdown").unwrap();
        assert!(shutdown.hide_in_help);
        assert!(shutdown.owners_only);
    }

    #[test]
    fn test_apply_settings_keeps_builtin_metadata() {
        let mut command = general::define();
        let builtin = command.description.clone();
        apply_settings(&mut command, &CommandSettings::default());
        assert_eq!(command.description, builtin);
        assert!(command.aliases.is_empty());
        assert!(!command.hide_in_help);
    }

    #[test]
    fn test_admin_commands_require_administrator() {
        for command in [admin::inactivelist(), admin::exempt(), admin::message(), admin::edit()] {
            assert!(
                command
                    .required_permissions
                    .contains(poise::serenity_prelude::Permissions::ADMINISTRATOR),
                "{} should require administrator",
                command.name
            );
            assert!(command.guild_only);
        }
    }
}
