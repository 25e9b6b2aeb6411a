//! The bot's own Telegram connection and the update dispatcher.
//!
//! Connects with a persistent sqlite session, signs in with the bot token,
//! then feeds every incoming message and button click to the conversation
//! engine, one update at a time.

use std::sync::Arc;
use std::time::Duration;

use grammers_client::update::Update;
use grammers_client::{Client, InputMessage, SenderPool, button, reply_markup};
use grammers_session::PackedChat;
use grammers_session::storages::SqliteSession;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BotSettings, TelegramConfig};
use crate::flow::{Action, Command, Engine, FlowEvent, Keyboard, Presenter, PresenterError};

use super::TelegramAccounts;

/// Errors while bringing up or running the bot connection.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Failed to open bot session: {0}")]
    Session(String),

    #[error("Telegram connection error: {0}")]
    Connection(String),

    #[error("Bot sign-in failed: {0}")]
    SignIn(String),
}

/// Handle to a message the engine may later edit or delete.
#[derive(Debug, Clone, Copy)]
pub struct StatusMessage {
    chat: PackedChat,
    id: i32,
}

/// Presenter backed by the bot's grammers client.
#[derive(Clone)]
pub struct BotPresenter {
    client: Client,
}

impl BotPresenter {
    fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Builds an outgoing message with an inline keyboard when one is given.
fn build_message(text: &str, keyboard: &Keyboard) -> InputMessage {
    let input = InputMessage::text(text);
    if keyboard.is_empty() {
        return input;
    }

    let rows: Vec<Vec<_>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| button::inline(b.label.clone(), b.action.encode()))
                .collect()
        })
        .collect();

    input.reply_markup(&reply_markup::inline(rows))
}

impl Presenter for BotPresenter {
    type MessageRef = StatusMessage;

    async fn send(
        &self,
        origin: &StatusMessage,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<StatusMessage, PresenterError> {
        let sent = self
            .client
            .send_message(origin.chat, build_message(text, keyboard))
            .await
            .map_err(|e| PresenterError::Send(e.to_string()))?;

        Ok(StatusMessage {
            chat: origin.chat,
            id: sent.id(),
        })
    }

    async fn edit(
        &self,
        message: &StatusMessage,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), PresenterError> {
        self.client
            .edit_message(message.chat, message.id, build_message(text, keyboard))
            .await
            .map_err(|e| PresenterError::Edit(e.to_string()))
    }

    async fn delete(&self, message: &StatusMessage) -> Result<(), PresenterError> {
        self.client
            .delete_messages(message.chat, &[message.id])
            .await
            .map(|_| ())
            .map_err(|e| PresenterError::Delete(e.to_string()))
    }

    fn schedule_delete(&self, message: StatusMessage, delay: Duration) {
        let client = self.client.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match client.delete_messages(message.chat, &[message.id]).await {
                Ok(_) => debug!("Auto-deleted message {}", message.id),
                Err(e) => warn!("Failed to auto-delete message {}: {}", message.id, e),
            }
        });
    }
}

/// Connects the bot and processes updates until the stream closes.
///
/// # Errors
///
/// Returns an error if the session file cannot be opened or the bot token
/// is rejected. Dispatch failures after startup are logged, not returned.
pub async fn run_bot(config: &TelegramConfig, settings: &BotSettings) -> Result<(), BotError> {
    let session = Arc::new(
        SqliteSession::open(&config.session_path)
            .await
            .map_err(|e| BotError::Session(e.to_string()))?,
    );

    let SenderPool {
        runner,
        mut updates,
        handle,
    } = SenderPool::new(Arc::clone(&session), config.api_id);

    let client = Client::new(handle.clone());

    let pool_task = tokio::spawn(async move {
        runner.run().await;
    });

    let authorized = client
        .is_authorized()
        .await
        .map_err(|e| BotError::Connection(e.to_string()))?;

    if authorized {
        info!("Reusing existing bot authorization");
    } else {
        info!("Signing in with bot token...");
        client
            .bot_sign_in(&config.bot_token, &config.api_hash)
            .await
            .map_err(|e| BotError::SignIn(e.to_string()))?;
    }

    info!("Bot connected, processing updates");

    let accounts = TelegramAccounts::new(config);
    let presenter = BotPresenter::new(client.clone());
    let mut engine = Engine::new(
        accounts,
        presenter,
        settings.device_model.clone(),
        Duration::from_secs(settings.auto_delete_delay_secs),
    );

    // Updates are applied one at a time; the engine owns all per-user state.
    while let Some(update) = updates.recv().await {
        dispatch(&mut engine, update).await;
    }

    info!("Update stream closed, disconnecting");
    handle.thin.quit();
    let _ = pool_task.await;
    Ok(())
}

/// Reduces one raw update to a flow event and hands it to the engine.
async fn dispatch(engine: &mut Engine<TelegramAccounts, BotPresenter>, update: Update) {
    match update {
        Update::NewMessage(message) => {
            if message.outgoing() {
                return;
            }

            let user = message.chat().id();
            let origin = StatusMessage {
                chat: message.chat().pack(),
                id: message.id(),
            };
            let text = message.text().to_owned();

            let event = match Command::parse(&text) {
                Some(command) => FlowEvent::Command { origin, command },
                None => FlowEvent::Text {
                    message: origin,
                    text,
                },
            };

            engine.handle(user, event).await;
        }
        Update::CallbackQuery(query) => {
            let Some(action) = std::str::from_utf8(query.data())
                .ok()
                .and_then(Action::parse)
            else {
                debug!("Ignoring callback query with unknown data");
                return;
            };

            let user = query.sender().id();

            let message = match query.load_message().await {
                Ok(message) => message,
                Err(e) => {
                    warn!("Could not load callback message for user {}: {}", user, e);
                    return;
                }
            };

            if let Err(e) = query.answer().send().await {
                debug!("Could not answer callback query: {}", e);
            }

            let origin = StatusMessage {
                chat: message.chat().pack(),
                id: message.id(),
            };

            engine.handle(user, FlowEvent::Action { origin, action }).await;
        }
        _ => {}
    }
}
