pub mod commands;
pub mod config;
pub mod data;
pub mod dictionary;
pub mod error;
pub mod features;
pub mod handlers;
pub mod inactivity;
pub mod leaderboard;
pub mod logging;
pub mod platform;
pub mod prompt;
pub mod relay;
pub mod status;
pub mod template;

#[cfg(test)]
mod testing;

pub const BOT_NAME: &str = "project_ashe";
pub const COMMAND_TARGET: &str = "project_ashe::command";
pub const ERROR_TARGET: &str = "project_ashe::error";
pub const EVENT_TARGET: &str = "project_ashe::handlers";
pub const CONSOLE_TARGET: &str = BOT_NAME;

pub use data::{Data, DataInner};
pub use error::{BotError, BotResult};
pub use status::CommandStatus;
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
