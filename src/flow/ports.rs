//! Boundaries the conversation engine talks through.
//!
//! The engine never touches the network directly: account operations go
//! through [`Accounts`] and chat output goes through [`Presenter`]. Tests
//! drive the engine with in-memory implementations of both.

use std::time::Duration;

use thiserror::Error;

use crate::store::Profile;

use super::Action;

/// Errors from the account-automation boundary.
///
/// The variants mirror the failure taxonomy of the login flow: validation
/// and authentication errors are retryable in place, lifecycle errors end
/// the current flow, everything else is reported verbatim and retried.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Verification code expired")]
    ExpiredCode,

    #[error("Two-factor password required")]
    PasswordRequired,

    #[error("Invalid two-factor password")]
    InvalidPassword,

    #[error("Session revoked or account deactivated")]
    Revoked,

    #[error("Telegram error: {0}")]
    Other(String),
}

/// Errors from the presentation boundary.
#[derive(Debug, Error)]
pub enum PresenterError {
    #[error("Failed to send message: {0}")]
    Send(String),

    #[error("Failed to edit message: {0}")]
    Edit(String),

    #[error("Failed to delete message: {0}")]
    Delete(String),
}

/// One inline button: a visible label plus the action it triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    /// Creates a button.
    #[must_use]
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Rows of inline buttons attached to a message.
pub type Keyboard = Vec<Vec<Button>>;

/// Boundary to the account-automation library.
///
/// A [`Accounts::Login`] value is one in-flight connection; it is opened per
/// flow and must be passed back to [`Accounts::disconnect`] when the flow
/// ends (close errors are the implementation's problem, not the caller's).
pub trait Accounts {
    /// Handle to one open account connection.
    type Login;

    /// Opens a connection, resuming from a session token when given one.
    async fn open(&self, token: Option<&str>) -> Result<Self::Login, AccountError>;

    /// Requests a verification code for the phone number.
    async fn request_code(&self, login: &mut Self::Login, phone: &str)
    -> Result<(), AccountError>;

    /// Attempts sign-in with the verification code.
    async fn sign_in_code(
        &self,
        login: &mut Self::Login,
        phone: &str,
        code: &str,
    ) -> Result<Profile, AccountError>;

    /// Attempts sign-in with the two-factor password.
    async fn sign_in_password(
        &self,
        login: &mut Self::Login,
        password: &str,
    ) -> Result<Profile, AccountError>;

    /// Whether the connection currently holds an authorized session.
    async fn is_authorized(&self, login: &Self::Login) -> Result<bool, AccountError>;

    /// Fetches the profile of the authorized account.
    async fn profile(&self, login: &Self::Login) -> Result<Profile, AccountError>;

    /// Serializes the authorized session into a portable token.
    async fn export_token(&self, login: &Self::Login) -> Result<String, AccountError>;

    /// Closes the connection, swallowing close errors.
    async fn disconnect(&self, login: Self::Login);
}

/// Boundary to the chat presentation layer.
pub trait Presenter {
    /// Handle to a message, good for later edits and deletion.
    type MessageRef: Clone;

    /// Sends a new message in the same chat as `origin`.
    async fn send(
        &self,
        origin: &Self::MessageRef,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<Self::MessageRef, PresenterError>;

    /// Replaces the text and keyboard of an existing message.
    async fn edit(
        &self,
        message: &Self::MessageRef,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), PresenterError>;

    /// Deletes a message from the chat.
    async fn delete(&self, message: &Self::MessageRef) -> Result<(), PresenterError>;

    /// Schedules a detached deletion of a message after `delay`.
    ///
    /// Fire-and-forget: the timer outlives the current flow and its failure
    /// is logged, never surfaced.
    fn schedule_delete(&self, message: Self::MessageRef, delay: Duration);
}
