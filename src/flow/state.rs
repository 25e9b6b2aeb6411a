//! Per-user conversation state.

use crate::store::SessionId;

/// What the engine expects next from a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for a phone number in international format.
    AwaitingPhone,

    /// Waiting for the verification code.
    AwaitingCode,

    /// Waiting for the two-factor password.
    AwaitingPassword,

    /// Waiting for a session token to validate.
    AwaitingSessionToCheck,

    /// Waiting for a new label for the given session.
    AwaitingLabel(SessionId),
}

/// In-progress conversation for one user.
///
/// At most one of these exists per user; starting a new flow replaces it
/// after closing any open login connection. Absence of a `UserFlow` is the
/// idle state.
#[derive(Debug)]
pub struct UserFlow<L, M> {
    /// Expected next input.
    pub stage: Stage,

    /// Phone number collected in `AwaitingPhone`, kept for sign-in.
    pub phone: Option<String>,

    /// In-flight account connection, open from code request to completion.
    pub login: Option<L>,

    /// Last status message shown to the user, edited in place when possible.
    pub status: Option<M>,
}

impl<L, M> UserFlow<L, M> {
    /// Creates a flow at the given stage with no attached handles.
    #[must_use]
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            phone: None,
            login: None,
            status: None,
        }
    }

    /// Creates a flow with a status message already on screen.
    #[must_use]
    pub fn with_status(stage: Stage, status: M) -> Self {
        Self {
            stage,
            phone: None,
            login: None,
            status: Some(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_flow_has_no_handles() {
        let flow: UserFlow<(), u32> = UserFlow::new(Stage::AwaitingPhone);
        assert_eq!(flow.stage, Stage::AwaitingPhone);
        assert!(flow.phone.is_none());
        assert!(flow.login.is_none());
        assert!(flow.status.is_none());
    }

    #[test]
    fn test_with_status() {
        let flow: UserFlow<(), u32> = UserFlow::with_status(Stage::AwaitingSessionToCheck, 7);
        assert_eq!(flow.status, Some(7));
    }
}
