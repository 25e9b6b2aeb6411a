//! Button actions and chat commands.
//!
//! Every inline button carries an opaque callback-data string; parametrized
//! actions embed the stable session id (e.g. `manage_session_3`).

use crate::store::SessionId;

/// Chat commands understood outside of any button context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/start`: reset any in-progress flow and show the main menu.
    Start,

    /// `/cancel`: abort the in-progress flow.
    Cancel,
}

impl Command {
    /// Parses a chat message as a command.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "/start" => Some(Self::Start),
            "/cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Actions reachable through inline buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Return to (or show) the main menu, discarding any in-progress flow.
    Menu,

    /// Begin the session-generation flow (ask for a phone number).
    NewSession,

    /// Ask for a session token to validate.
    CheckSession,

    /// List the user's saved sessions.
    ViewSessions,

    /// Flip the auto-delete flag.
    ToggleAutoDelete,

    /// Show the help screen.
    Help,

    /// Ask for a label for the most recently created session.
    LabelLatest,

    /// Show the management screen for one session.
    Manage(SessionId),

    /// Re-verify that a saved session is still authorized.
    Verify(SessionId),

    /// Reveal the raw session token.
    Show(SessionId),

    /// Ask for a new label for one session.
    EditLabel(SessionId),

    /// Ask for delete confirmation.
    Delete(SessionId),

    /// Delete after confirmation.
    ConfirmDelete(SessionId),
}

impl Action {
    /// Encodes the action as callback data for an inline button.
    #[must_use]
    pub fn encode(self) -> String {
        match self {
            Self::Menu => "back_to_menu".to_owned(),
            Self::NewSession => "start_session".to_owned(),
            Self::CheckSession => "check_session".to_owned(),
            Self::ViewSessions => "view_sessions".to_owned(),
            Self::ToggleAutoDelete => "toggle_autodelete".to_owned(),
            Self::Help => "show_help".to_owned(),
            Self::LabelLatest => "label_session".to_owned(),
            Self::Manage(id) => format!("manage_session_{id}"),
            Self::Verify(id) => format!("verify_session_{id}"),
            Self::Show(id) => format!("show_session_{id}"),
            Self::EditLabel(id) => format!("edit_label_{id}"),
            Self::Delete(id) => format!("delete_session_{id}"),
            Self::ConfirmDelete(id) => format!("confirm_delete_{id}"),
        }
    }

    /// Parses callback data back into an action.
    ///
    /// Returns `None` for unknown or malformed data (e.g. a non-numeric
    /// session id), which the dispatcher simply ignores.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "back_to_menu" => return Some(Self::Menu),
            "start_session" => return Some(Self::NewSession),
            "check_session" => return Some(Self::CheckSession),
            "view_sessions" => return Some(Self::ViewSessions),
            "toggle_autodelete" => return Some(Self::ToggleAutoDelete),
            "show_help" => return Some(Self::Help),
            "label_session" => return Some(Self::LabelLatest),
            _ => {}
        }

        let parametrized: [(&str, fn(SessionId) -> Self); 6] = [
            ("manage_session_", Self::Manage),
            ("verify_session_", Self::Verify),
            ("show_session_", Self::Show),
            ("edit_label_", Self::EditLabel),
            ("delete_session_", Self::Delete),
            ("confirm_delete_", Self::ConfirmDelete),
        ];

        for (prefix, build) in parametrized {
            if let Some(rest) = data.strip_prefix(prefix) {
                return rest.parse().ok().map(SessionId).map(build);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("  /cancel "), Some(Command::Cancel));
        assert_eq!(Command::parse("/other"), None);
        assert_eq!(Command::parse("hello"), None);
    }

    #[test]
    fn test_parse_simple_actions() {
        assert_eq!(Action::parse("back_to_menu"), Some(Action::Menu));
        assert_eq!(Action::parse("start_session"), Some(Action::NewSession));
        assert_eq!(Action::parse("show_help"), Some(Action::Help));
    }

    #[test]
    fn test_parse_parametrized_actions() {
        assert_eq!(
            Action::parse("manage_session_3"),
            Some(Action::Manage(SessionId(3)))
        );
        assert_eq!(
            Action::parse("confirm_delete_12"),
            Some(Action::ConfirmDelete(SessionId(12)))
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(Action::parse("manage_session_abc"), None);
        assert_eq!(Action::parse("manage_session_"), None);
        assert_eq!(Action::parse("unknown"), None);
    }

    #[test]
    fn test_encode_round_trip() {
        let actions = [
            Action::Menu,
            Action::NewSession,
            Action::CheckSession,
            Action::ViewSessions,
            Action::ToggleAutoDelete,
            Action::Help,
            Action::LabelLatest,
            Action::Manage(SessionId(1)),
            Action::Verify(SessionId(2)),
            Action::Show(SessionId(3)),
            Action::EditLabel(SessionId(4)),
            Action::Delete(SessionId(5)),
            Action::ConfirmDelete(SessionId(6)),
        ];

        for action in actions {
            assert_eq!(Action::parse(&action.encode()), Some(action));
        }
    }
}
