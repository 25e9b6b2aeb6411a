//! Telegram boundary.
//!
//! Implements the conversation engine's account and presentation ports on
//! top of grammers: per-flow login connections with portable session
//! tokens, and the bot's own connection with inline-keyboard messaging.

mod account;
mod bot;

pub use account::{LoginConnection, TelegramAccounts};
pub use bot::{BotError, BotPresenter, StatusMessage, run_bot};
