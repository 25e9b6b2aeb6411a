//! User-facing message texts and inline keyboards.
//!
//! Every screen the bot can show is a pure function returning the text and
//! the keyboard to attach, so the engine stays free of formatting noise.

use crate::flow::{Action, Button, Keyboard};
use crate::format::safe_str;
use crate::store::{Profile, SavedSession};

/// A message with no buttons.
#[must_use]
pub fn no_buttons() -> Keyboard {
    Vec::new()
}

fn back_row() -> Vec<Button> {
    vec![Button::new("🔙 Back to Main Menu", Action::Menu)]
}

/// Keyboard with only a back-to-menu button.
#[must_use]
pub fn back_only() -> Keyboard {
    vec![back_row()]
}

/// The main menu screen.
#[must_use]
pub fn main_menu() -> (String, Keyboard) {
    let text = "🔐 Session Manager 🔐\n\n\
        This bot helps you generate, validate, and manage account session \
        strings with enhanced security features.\n\n\
        Select an option from the menu below:"
        .to_owned();

    let keyboard = vec![
        vec![Button::new("📱 Generate New Session", Action::NewSession)],
        vec![Button::new("🔍 Check Session Validity", Action::CheckSession)],
        vec![Button::new("📋 View My Sessions", Action::ViewSessions)],
        vec![Button::new("🔒 Auto-Delete Messages", Action::ToggleAutoDelete)],
        vec![Button::new("❓ Help", Action::Help)],
    ];

    (text, keyboard)
}

/// Shown after /cancel, with the main menu attached.
#[must_use]
pub fn cancelled() -> (String, Keyboard) {
    let (_, keyboard) = main_menu();
    (
        "❌ Process cancelled.\n\n\
         What would you like to do next? Choose an option from the menu below:"
            .to_owned(),
        keyboard,
    )
}

/// The help screen.
#[must_use]
pub fn help() -> (String, Keyboard) {
    let text = "❓ Session Manager Help ❓\n\n\
        This bot generates, validates, and manages session strings through a \
        button-based interface.\n\n\
        Key features:\n\
        • Generate multiple session strings for different accounts\n\
        • Custom labels for easy identification\n\
        • Validity checks with account details\n\
        • Automatic removal of sensitive messages\n\n\
        Security notes:\n\
        • Phone numbers, codes and 2FA passwords are deleted from the chat\n\
        • Session strings can self-destruct after viewing (configurable)\n\
        • Never share a session string with anyone\n\n\
        Use /cancel at any point to abort the current operation."
        .to_owned();

    (text, back_only())
}

/// Reports the new auto-delete setting.
#[must_use]
pub fn auto_delete_toggled(enabled: bool) -> (String, Keyboard) {
    let status = if enabled { "✅ Enabled" } else { "❌ Disabled" };
    let text = format!(
        "🔒 Auto-Delete Security 🔒\n\n\
         Auto-deletion of messages containing sensitive data is now:\n\
         {status}\n\n\
         Phone numbers, verification codes and 2FA passwords are always \
         removed from the chat. When enabled, messages revealing a session \
         string are also deleted a few minutes after they are shown."
    );

    (text, back_only())
}

/// Prompt for the phone number.
#[must_use]
pub fn ask_phone() -> String {
    "📱 Please send your phone number in international format.\n\
     Example: +12345678900"
        .to_owned()
}

/// Progress text while the verification code is requested.
#[must_use]
pub fn requesting_code() -> String {
    "📲 Requesting verification code... \
     (Your phone number has been deleted from chat for security)"
        .to_owned()
}

/// Prompt for the verification code once it has been sent.
#[must_use]
pub fn code_sent() -> String {
    "✅ Verification code sent!\n\n\
     Please enter the verification code you received.\n\
     You can add spaces between digits if needed (e.g. 1 2 3 4 5)"
        .to_owned()
}

/// Reported when the code request fails; the flow is abandoned.
#[must_use]
pub fn code_request_failed(err: &str) -> String {
    format!("❌ Error requesting verification code: {err}")
}

/// Progress text while the code is checked.
#[must_use]
pub fn verifying_code() -> String {
    "🔄 Verifying code and generating session... \
     (Your verification code has been deleted from chat for security)"
        .to_owned()
}

/// Invalid code, retry allowed.
#[must_use]
pub fn invalid_code() -> String {
    "❌ Invalid verification code.\n\nPlease try again with the correct code.".to_owned()
}

/// Expired code, flow abandoned.
#[must_use]
pub fn code_expired() -> String {
    "❌ Verification code expired.\n\nPlease restart with /start".to_owned()
}

/// The account has two-factor auth enabled.
#[must_use]
pub fn two_factor_needed() -> String {
    "🔐 Two-factor authentication is enabled.\n\nPlease enter your 2FA password:".to_owned()
}

/// Unexpected error while checking the code, retry allowed.
#[must_use]
pub fn code_error(err: &str) -> String {
    format!("❌ Error verifying code: {err}\n\nPlease try again or restart with /start")
}

/// Progress text while the 2FA password is checked.
#[must_use]
pub fn checking_password() -> String {
    "🔐 Verifying 2FA password... \
     (Your password has been deleted from chat for security)"
        .to_owned()
}

/// Wrong 2FA password, retry allowed.
#[must_use]
pub fn invalid_password() -> String {
    "❌ Invalid 2FA password.\n\nPlease try again with the correct password.".to_owned()
}

/// Unexpected error while checking the password, retry allowed.
#[must_use]
pub fn password_error(err: &str) -> String {
    format!("❌ Error with 2FA password: {err}\n\nPlease try again or restart with /start")
}

/// The flow lost its connection handle (e.g. after a restart).
#[must_use]
pub fn flow_expired() -> String {
    "Session expired. Please start again with /start".to_owned()
}

/// Success screen revealing a freshly generated session string.
#[must_use]
pub fn session_created(session: &SavedSession) -> (String, Keyboard) {
    let username = session
        .profile
        .username
        .as_deref()
        .map(|u| format!("@{u}\n"))
        .unwrap_or_default();

    let text = format!(
        "✅ Session generated successfully!\n\n\
         📱 User: {}\n\
         {username}\
         🆔 ID: {}\n\
         ☎️ Phone: {}\n\n\
         🔐 Session String:\n{}\n\n\
         ⚠️ IMPORTANT: This session string gives full access to your account. \
         Never share it with anyone!\n\n\
         Your session was automatically saved. You can access it later from \
         the main menu.",
        session.profile.name, session.profile.id, session.phone, session.token
    );

    let keyboard = vec![
        vec![Button::new("📋 Save with Custom Label", Action::LabelLatest)],
        back_row(),
        vec![Button::new("🔄 Generate Another Session", Action::NewSession)],
    ];

    (text, keyboard)
}

/// Prompt for a session token to validate.
#[must_use]
pub fn ask_session_token() -> (String, Keyboard) {
    let text = "🔍 Check Session Validity 🔍\n\n\
        Please send the session string you want to check.\n\n\
        This will verify if the session is still valid and show information \
        about it."
        .to_owned();

    (text, back_only())
}

/// Progress text while a pasted token is checked.
#[must_use]
pub fn validating_token() -> String {
    "🔍 Validating session string...".to_owned()
}

/// The pasted token is authorized.
#[must_use]
pub fn token_valid(profile: &Profile) -> (String, Keyboard) {
    let username = profile
        .username
        .as_deref()
        .map_or_else(|| "No username".to_owned(), |u| format!("@{u}"));

    let text = format!(
        "✅ Session is valid!\n\n\
         Account information:\n\
         👤 User: {}\n\
         🔖 Username: {username}\n\
         🆔 User ID: {}\n\n\
         This session is currently active and can be used.",
        profile.name, profile.id
    );

    (text, back_only())
}

/// The pasted token is not authorized.
#[must_use]
pub fn token_invalid() -> (String, Keyboard) {
    let text = "❌ Session is not valid\n\n\
        The session string you provided is not authorized.\n\
        This could happen if the session was revoked or expired."
        .to_owned();

    (text, back_only())
}

/// The pasted token has been revoked or the account deactivated.
#[must_use]
pub fn token_revoked() -> (String, Keyboard) {
    let text = "❌ Session is invalid\n\n\
        This session string has been revoked or the account has been \
        deactivated."
        .to_owned();

    (text, back_only())
}

/// The pasted token could not be checked.
#[must_use]
pub fn token_error(err: &str) -> (String, Keyboard) {
    (
        format!("❌ Error validating session\n\nAn error occurred: {err}"),
        back_only(),
    )
}

/// Shown when the user has no saved sessions.
#[must_use]
pub fn sessions_empty() -> (String, Keyboard) {
    let text = "📋 Your Saved Sessions 📋\n\n\
        You don't have any saved sessions yet.\n\n\
        Generate a new session to get started."
        .to_owned();

    (text, back_only())
}

/// Lists all saved sessions with one manage button each.
#[must_use]
pub fn sessions_list(sessions: &[SavedSession]) -> (String, Keyboard) {
    let mut lines = Vec::with_capacity(sessions.len());
    let mut keyboard = Vec::with_capacity(sessions.len() + 1);

    for (i, session) in sessions.iter().enumerate() {
        lines.push(format!(
            "{}. {}\n   📱 Phone: {}\n   🕒 Created: {}",
            i + 1,
            session.label,
            session.phone,
            session.created_display()
        ));
        keyboard.push(vec![Button::new(
            format!("🔍 Manage: {}", session.label),
            Action::Manage(session.id),
        )]);
    }

    keyboard.push(back_row());

    let text = format!(
        "📋 Your Saved Sessions 📋\n\n{}\n\nClick on a session to manage it:",
        lines.join("\n\n")
    );

    (text, keyboard)
}

/// Shown when a button references a session that no longer exists.
#[must_use]
pub fn session_not_found() -> (String, Keyboard) {
    (
        "❌ Session not found. It may have been deleted.".to_owned(),
        back_only(),
    )
}

/// Management screen for one saved session.
#[must_use]
pub fn session_details(session: &SavedSession) -> (String, Keyboard) {
    let text = format!(
        "🔐 Session: {} 🔐\n\n\
         📱 Phone: {}\n\
         👤 User: {}\n\
         🔖 Username: {}\n\
         🕒 Created: {}\n\
         💻 Device: {}\n\n\
         Select an action to perform with this session:",
        session.label,
        session.phone,
        session.profile.name,
        safe_str(session.profile.username.as_deref()),
        session.created_display(),
        session.device
    );

    let id = session.id;
    let keyboard = vec![
        vec![Button::new("✅ Verify Session", Action::Verify(id))],
        vec![Button::new("📋 Show Session String", Action::Show(id))],
        vec![Button::new("✏️ Edit Label", Action::EditLabel(id))],
        vec![Button::new("❌ Delete Session", Action::Delete(id))],
        vec![Button::new("🔙 Back to Sessions", Action::ViewSessions)],
        vec![Button::new("🔙 Main Menu", Action::Menu)],
    ];

    (text, keyboard)
}

/// Progress text while a saved session is re-verified.
#[must_use]
pub fn verifying_session(label: &str) -> String {
    format!("🔄 Verifying session {label}...")
}

fn back_to_session_rows(session: &SavedSession) -> Vec<Vec<Button>> {
    vec![
        vec![Button::new(
            "🔙 Back to Session",
            Action::Manage(session.id),
        )],
        back_row(),
    ]
}

/// The saved session is still authorized.
#[must_use]
pub fn session_valid(session: &SavedSession, profile: &Profile) -> (String, Keyboard) {
    let username = profile
        .username
        .as_deref()
        .map_or_else(|| "No username".to_owned(), |u| format!("@{u}"));

    let text = format!(
        "✅ Session is valid!\n\n\
         {} is active and can be used.\n\n\
         👤 User: {}\n\
         🔖 Username: {username}",
        session.label, profile.name
    );

    (text, back_to_session_rows(session))
}

/// The saved session is no longer authorized.
#[must_use]
pub fn session_invalid(session: &SavedSession) -> (String, Keyboard) {
    let text = format!(
        "❌ Session is not valid\n\n\
         {} is no longer authorized.\n\
         This could happen if the session was revoked or expired.",
        session.label
    );

    let mut keyboard = vec![vec![Button::new(
        "❌ Delete Session",
        Action::Delete(session.id),
    )]];
    keyboard.extend(back_to_session_rows(session));

    (text, keyboard)
}

/// The saved session has been revoked or the account deactivated.
#[must_use]
pub fn session_revoked(session: &SavedSession) -> (String, Keyboard) {
    let text = format!(
        "❌ Session is invalid\n\n\
         {} has been revoked or the account has been deactivated.",
        session.label
    );

    let mut keyboard = vec![vec![Button::new(
        "❌ Delete Session",
        Action::Delete(session.id),
    )]];
    keyboard.extend(back_to_session_rows(session));

    (text, keyboard)
}

/// A saved session could not be re-verified.
#[must_use]
pub fn session_verify_error(session: &SavedSession, err: &str) -> (String, Keyboard) {
    (
        format!("❌ Error verifying session\n\nAn error occurred: {err}"),
        back_to_session_rows(session),
    )
}

/// Reveals the raw token of a saved session.
#[must_use]
pub fn session_token(session: &SavedSession) -> (String, Keyboard) {
    let text = format!(
        "🔐 Session String for: {}\n\n\
         {}\n\n\
         ⚠️ IMPORTANT: This session string gives full access to your account. \
         Never share it with anyone!",
        session.label, session.token
    );

    (text, back_to_session_rows(session))
}

/// Shown when there is no session to label yet.
#[must_use]
pub fn no_session_to_label() -> (String, Keyboard) {
    ("❌ No session found to label.".to_owned(), back_only())
}

/// Prompt for a label for the most recent session.
#[must_use]
pub fn label_prompt_latest() -> (String, Keyboard) {
    let text = "📝 Custom Session Label 📝\n\n\
        Please send a name for this session. This will help you identify it \
        later.\n\n\
        Examples: 'Main Account', 'Business Account', 'Bot Development'"
        .to_owned();

    (text, vec![vec![Button::new("🔙 Cancel", Action::Menu)]])
}

/// Prompt for a new label for one session.
#[must_use]
pub fn label_prompt(session: &SavedSession) -> (String, Keyboard) {
    let text = format!(
        "✏️ Edit Session Label ✏️\n\n\
         Current label: {}\n\n\
         Please send a new name for this session:",
        session.label
    );

    (
        text,
        vec![vec![Button::new("🔙 Cancel", Action::Manage(session.id))]],
    )
}

/// Confirms the new label.
#[must_use]
pub fn label_saved(label: &str) -> (String, Keyboard) {
    (format!("✅ Session renamed to: {label}"), back_only())
}

/// Rejection for an empty label; the prompt stays active.
#[must_use]
pub fn label_rejected() -> String {
    "Please provide a valid label for your session.".to_owned()
}

/// Two-step delete confirmation.
#[must_use]
pub fn confirm_delete(session: &SavedSession) -> (String, Keyboard) {
    let text = format!(
        "⚠️ Delete Session ⚠️\n\n\
         Are you sure you want to delete {}?\n\n\
         This action cannot be undone.",
        session.label
    );

    let keyboard = vec![
        vec![Button::new(
            "✅ Yes, Delete Session",
            Action::ConfirmDelete(session.id),
        )],
        vec![Button::new(
            "❌ No, Keep Session",
            Action::Manage(session.id),
        )],
    ];

    (text, keyboard)
}

/// Reports a completed deletion.
#[must_use]
pub fn deleted(label: &str) -> (String, Keyboard) {
    let text = format!("✅ Session Deleted\n\n{label} has been deleted successfully.");

    let keyboard = vec![
        vec![Button::new("🔙 Back to Sessions", Action::ViewSessions)],
        back_row(),
    ];

    (text, keyboard)
}

/// Rejection for an invalid phone number; the prompt stays active.
#[must_use]
pub fn invalid_phone(reason: &str) -> String {
    format!("❌ {reason}\n\nPlease send your phone number in international format.")
}

/// Rejection for a code with no digits; the prompt stays active.
#[must_use]
pub fn empty_code() -> String {
    "Please provide a valid verification code containing digits.".to_owned()
}

/// Rejection for an empty 2FA password; the prompt stays active.
#[must_use]
pub fn empty_password() -> String {
    "Please provide your 2FA password.".to_owned()
}

/// Rejection for an empty session token; the prompt stays active.
#[must_use]
pub fn empty_token() -> String {
    "Please provide a valid session string.".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SessionId;
    use chrono::Local;

    fn sample_session() -> SavedSession {
        SavedSession {
            id: SessionId(3),
            token: "abc123".to_owned(),
            phone: "+12345678900".to_owned(),
            profile: Profile {
                id: 42,
                name: "Test User".to_owned(),
                username: Some("testuser".to_owned()),
            },
            created_at: Local::now(),
            device: "Test Device".to_owned(),
            label: "Session 3".to_owned(),
        }
    }

    #[test]
    fn test_main_menu_has_five_entries() {
        let (_, keyboard) = main_menu();
        assert_eq!(keyboard.len(), 5);
    }

    #[test]
    fn test_sessions_list_one_manage_button_per_session() {
        let sessions = vec![sample_session(), sample_session()];
        let (text, keyboard) = sessions_list(&sessions);

        // one row per session plus the back row
        assert_eq!(keyboard.len(), 3);
        assert_eq!(keyboard[0][0].action, Action::Manage(SessionId(3)));
        assert!(text.contains("+12345678900"));
    }

    #[test]
    fn test_session_created_mentions_token() {
        let session = sample_session();
        let (text, keyboard) = session_created(&session);
        assert!(text.contains("abc123"));
        assert_eq!(keyboard[0][0].action, Action::LabelLatest);
    }

    #[test]
    fn test_session_invalid_offers_delete() {
        let session = sample_session();
        let (_, keyboard) = session_invalid(&session);
        assert_eq!(keyboard[0][0].action, Action::Delete(SessionId(3)));
    }

    #[test]
    fn test_confirm_delete_buttons() {
        let session = sample_session();
        let (_, keyboard) = confirm_delete(&session);
        assert_eq!(keyboard[0][0].action, Action::ConfirmDelete(SessionId(3)));
        assert_eq!(keyboard[1][0].action, Action::Manage(SessionId(3)));
    }

    #[test]
    fn test_token_valid_without_username() {
        let profile = Profile {
            id: 1,
            name: "Anon".to_owned(),
            username: None,
        };
        let (text, _) = token_valid(&profile);
        assert!(text.contains("No username"));
    }
}
