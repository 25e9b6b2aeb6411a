//! Configuration module for the session manager bot.
//!
//! Handles loading of Telegram API credentials and bot behavior settings
//! from the environment.

mod settings;

pub use settings::{BotSettings, ConfigError, TelegramConfig};
