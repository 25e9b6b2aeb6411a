//! Session Manager Bot Library
//!
//! A Telegram bot that generates, validates, labels and deletes portable
//! account session strings through a button-driven conversation.
//!
//! This crate provides the core functionality for:
//! - Driving the per-user conversation state machine
//! - Signing in to accounts and exporting session tokens
//! - Keeping per-user session records for the process lifetime
//! - Rendering menus and handling button callbacks

pub mod config;
pub mod flow;
pub mod format;
pub mod store;
pub mod telegram;
pub mod ui;
