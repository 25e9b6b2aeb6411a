//! Conversation flow: the per-user state machine that turns chat events
//! into session creation, validation, labeling and deletion.

mod actions;
mod engine;
mod ports;
mod state;

pub use actions::{Action, Command};
pub use engine::{Engine, FlowEvent};
pub use ports::{AccountError, Accounts, Button, Keyboard, Presenter, PresenterError};
pub use state::{Stage, UserFlow};
