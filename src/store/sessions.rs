//! Saved-session records and the per-user store.
//!
//! Everything here is process-local: records do not survive a restart.
//! Session records are addressed by a stable per-user [`SessionId`] that is
//! never reused, so a stale button from an old keyboard resolves to
//! "not found" instead of a different record.

use std::collections::HashMap;

use chrono::{DateTime, Local};

/// Stable identifier for a saved session, unique per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u32);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the account profile behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Numeric account id.
    pub id: i64,

    /// Display name (first + last, trimmed).
    pub name: String,

    /// Optional public username, without the leading `@`.
    pub username: Option<String>,
}

/// A generated session token with its metadata.
#[derive(Debug, Clone)]
pub struct SavedSession {
    /// Stable identifier used in button callback data.
    pub id: SessionId,

    /// The portable session token.
    pub token: String,

    /// Phone number the session was created from.
    pub phone: String,

    /// Profile snapshot, refreshed on successful re-verification.
    pub profile: Profile,

    /// When the session was generated.
    pub created_at: DateTime<Local>,

    /// Device label recorded at creation time.
    pub device: String,

    /// Free-text label, defaults to "Session N".
    pub label: String,
}

impl SavedSession {
    /// Formats the creation time for display.
    #[must_use]
    pub fn created_display(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Per-user bookkeeping inside the store.
#[derive(Debug, Default)]
struct UserEntry {
    sessions: Vec<SavedSession>,
    next_id: u32,
}

/// Process-local store of saved sessions and auto-delete flags, keyed by
/// the end-user's Telegram id.
#[derive(Debug, Default)]
pub struct SessionStore {
    users: HashMap<i64, UserEntry>,
    auto_delete: HashMap<i64, bool>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new session for the user and returns a reference to it.
    ///
    /// Assigns the next stable id and a default `Session N` label, where N
    /// counts all sessions the user has created so far (ids are never
    /// reused, so N keeps growing across deletions).
    pub fn append(
        &mut self,
        user_id: i64,
        token: String,
        phone: String,
        profile: Profile,
        device: String,
        two_factor: bool,
    ) -> &SavedSession {
        let entry = self.users.entry(user_id).or_default();
        entry.next_id += 1;
        let id = SessionId(entry.next_id);

        let label = if two_factor {
            format!("Session {} (2FA)", entry.next_id)
        } else {
            format!("Session {}", entry.next_id)
        };

        entry.sessions.push(SavedSession {
            id,
            token,
            phone,
            profile,
            created_at: Local::now(),
            device,
            label,
        });

        // Just pushed, so the vec is non-empty.
        &entry.sessions[entry.sessions.len() - 1]
    }

    /// Returns the user's sessions in creation order, empty if none.
    #[must_use]
    pub fn list(&self, user_id: i64) -> &[SavedSession] {
        self.users
            .get(&user_id)
            .map_or(&[], |entry| entry.sessions.as_slice())
    }

    /// Looks up a session by its stable id.
    #[must_use]
    pub fn get(&self, user_id: i64, id: SessionId) -> Option<&SavedSession> {
        self.users
            .get(&user_id)?
            .sessions
            .iter()
            .find(|s| s.id == id)
    }

    /// Returns the most recently created session for the user.
    #[must_use]
    pub fn latest(&self, user_id: i64) -> Option<&SavedSession> {
        self.users.get(&user_id)?.sessions.last()
    }

    /// Overwrites the label of a session. Returns `false` when the session
    /// no longer exists.
    pub fn set_label(&mut self, user_id: i64, id: SessionId, label: String) -> bool {
        let Some(session) = self.get_mut(user_id, id) else {
            return false;
        };
        session.label = label;
        true
    }

    /// Replaces the cached profile of a session. Returns `false` when the
    /// session no longer exists.
    pub fn update_profile(&mut self, user_id: i64, id: SessionId, profile: Profile) -> bool {
        let Some(session) = self.get_mut(user_id, id) else {
            return false;
        };
        session.profile = profile;
        true
    }

    /// Removes a session, preserving the relative order of the rest.
    ///
    /// Returns the removed record, or `None` if it did not exist. The
    /// user's entry is dropped entirely once the last session is removed.
    pub fn remove(&mut self, user_id: i64, id: SessionId) -> Option<SavedSession> {
        let entry = self.users.get_mut(&user_id)?;
        let pos = entry.sessions.iter().position(|s| s.id == id)?;
        let removed = entry.sessions.remove(pos);

        if entry.sessions.is_empty() {
            self.users.remove(&user_id);
        }

        Some(removed)
    }

    /// Whether the user has any saved sessions.
    #[must_use]
    pub fn is_empty(&self, user_id: i64) -> bool {
        self.list(user_id).is_empty()
    }

    /// Flips the user's auto-delete flag and returns the new value.
    pub fn toggle_auto_delete(&mut self, user_id: i64) -> bool {
        let flag = self.auto_delete.entry(user_id).or_insert(false);
        *flag = !*flag;
        *flag
    }

    /// Whether sensitive outgoing messages should self-destruct for this user.
    #[must_use]
    pub fn auto_delete(&self, user_id: i64) -> bool {
        self.auto_delete.get(&user_id).copied().unwrap_or(false)
    }

    fn get_mut(&mut self, user_id: i64, id: SessionId) -> Option<&mut SavedSession> {
        self.users
            .get_mut(&user_id)?
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64) -> Profile {
        Profile {
            id,
            name: "Test User".to_owned(),
            username: Some("testuser".to_owned()),
        }
    }

    fn push(store: &mut SessionStore, user: i64, token: &str) -> SessionId {
        store
            .append(
                user,
                token.to_owned(),
                "+12345678900".to_owned(),
                profile(1),
                "Test Device".to_owned(),
                false,
            )
            .id
    }

    #[test]
    fn test_append_assigns_default_labels() {
        let mut store = SessionStore::new();
        push(&mut store, 1, "aaa");
        push(&mut store, 1, "bbb");

        let sessions = store.list(1);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].label, "Session 1");
        assert_eq!(sessions[1].label, "Session 2");
    }

    #[test]
    fn test_two_factor_label() {
        let mut store = SessionStore::new();
        let session = store.append(
            1,
            "tok".to_owned(),
            "+12345678900".to_owned(),
            profile(1),
            "Test Device".to_owned(),
            true,
        );
        assert_eq!(session.label, "Session 1 (2FA)");
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut store = SessionStore::new();
        let a = push(&mut store, 1, "aaa");
        let b = push(&mut store, 1, "bbb");
        let c = push(&mut store, 1, "ccc");

        let removed = store.remove(1, b);
        assert_eq!(removed.map(|s| s.token), Some("bbb".to_owned()));

        let tokens: Vec<_> = store.list(1).iter().map(|s| s.token.clone()).collect();
        assert_eq!(tokens, vec!["aaa".to_owned(), "ccc".to_owned()]);
        assert!(store.get(1, a).is_some());
        assert!(store.get(1, c).is_some());
    }

    #[test]
    fn test_remove_last_drops_user() {
        let mut store = SessionStore::new();
        let id = push(&mut store, 1, "aaa");

        assert!(store.remove(1, id).is_some());
        assert!(store.is_empty(1));
        assert!(!store.users.contains_key(&1));
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut store = SessionStore::new();
        let first = push(&mut store, 1, "aaa");
        store.remove(1, first);

        let second = push(&mut store, 1, "bbb");
        assert_ne!(first, second);
        assert!(store.get(1, first).is_none());
        assert!(store.get(1, second).is_some());
    }

    #[test]
    fn test_set_label_missing_session() {
        let mut store = SessionStore::new();
        assert!(!store.set_label(1, SessionId(7), "x".to_owned()));
    }

    #[test]
    fn test_update_profile() {
        let mut store = SessionStore::new();
        let id = push(&mut store, 1, "aaa");

        let updated = Profile {
            id: 2,
            name: "Renamed".to_owned(),
            username: None,
        };
        assert!(store.update_profile(1, id, updated.clone()));
        assert_eq!(store.get(1, id).map(|s| s.profile.clone()), Some(updated));
    }

    #[test]
    fn test_users_are_isolated() {
        let mut store = SessionStore::new();
        let id = push(&mut store, 1, "aaa");

        assert!(store.get(2, id).is_none());
        assert!(store.list(2).is_empty());
    }

    #[test]
    fn test_auto_delete_toggle() {
        let mut store = SessionStore::new();
        assert!(!store.auto_delete(1));
        assert!(store.toggle_auto_delete(1));
        assert!(store.auto_delete(1));
        assert!(!store.toggle_auto_delete(1));
        assert!(!store.auto_delete(1));
    }
}
