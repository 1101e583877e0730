use std::env;
use std::sync::Arc;

use poise::serenity_prelude::{self as serenity};
use project_ashe::config::Configuration;
use project_ashe::{Data, Error, commands, handlers, logging};
use serenity::GatewayIntents;
use tracing::{error, info};

/// Messages kept per channel so edits can be compared with the original
const CACHED_MESSAGES_PER_CHANNEL: usize = 200;

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;

    let config = Arc::new(Configuration::load_from_env().await?);
    let data = Data::load(Arc::clone(&config)).await?;
    let prefix = config.app.default.cmd_prefix.clone();
    let message_gate = Arc::clone(&data.message_gate);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(&config),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            command_check: Some(|ctx| Box::pin(handlers::command_check(ctx))),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| Box::pin(handlers::on_command_error(error)),
            ..Default::default()
        })
        .setup(|_ctx, ready, _framework| {
            Box::pin(async move {
                logging::log_console(&format!("{} is now online", ready.user.name));
                Ok(data)
            })
        })
        .build();

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut cache_settings = serenity::cache::Settings::default();
    cache_settings.max_messages = CACHED_MESSAGES_PER_CHANNEL;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .cache_settings(cache_settings)
        .event_handler(handlers::Handler::new(Arc::clone(&config), message_gate))
        .framework(framework)
        .await?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    if let Err(err) = client.start().await {
        error!("Error running the bot: {err}");
    }

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: could not start the runtime: {err}");
            return;
        }
    };

    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
    }
}
