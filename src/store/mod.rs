//! In-memory storage for generated session records.

mod sessions;

pub use sessions::{Profile, SavedSession, SessionId, SessionStore};
