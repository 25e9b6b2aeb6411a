//! The conversation state machine.
//!
//! One engine instance serves every user. Incoming chat events are reduced
//! to [`FlowEvent`]s by the dispatcher; the engine applies them against the
//! per-user [`UserFlow`] and the shared [`SessionStore`], talking to the
//! outside world only through the [`Accounts`] and [`Presenter`] traits.
//!
//! Failure semantics: no error here is fatal to the process. Validation and
//! authentication errors keep the flow in place for a retry; lifecycle
//! errors (expired code, revoked session) end the current flow; presenter
//! failures are logged and the conversation carries on.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::format::{strip_non_digits, validate_phone_number};
use crate::store::{SessionId, SessionStore};
use crate::ui;

use super::ports::{AccountError, Accounts, Keyboard, Presenter};
use super::{Action, Command, Stage, UserFlow};

/// A chat event addressed to the engine.
#[derive(Debug)]
pub enum FlowEvent<M> {
    /// A slash command typed by the user.
    Command {
        /// The message carrying the command.
        origin: M,
        command: Command,
    },

    /// Free text typed by the user.
    Text {
        /// The incoming message itself, needed for deletion.
        message: M,
        text: String,
    },

    /// An inline-button click.
    Action {
        /// The message the clicked button was attached to.
        origin: M,
        action: Action,
    },
}

/// The conversation engine.
pub struct Engine<A: Accounts, P: Presenter> {
    accounts: A,
    presenter: P,
    store: SessionStore,
    flows: HashMap<i64, UserFlow<A::Login, P::MessageRef>>,
    device: String,
    auto_delete_delay: Duration,
}

impl<A: Accounts, P: Presenter> Engine<A, P> {
    /// Creates an engine with an empty store and no active flows.
    pub fn new(accounts: A, presenter: P, device: String, auto_delete_delay: Duration) -> Self {
        Self {
            accounts,
            presenter,
            store: SessionStore::new(),
            flows: HashMap::new(),
            device,
            auto_delete_delay,
        }
    }

    /// Applies one event for one user.
    pub async fn handle(&mut self, user: i64, event: FlowEvent<P::MessageRef>) {
        match event {
            FlowEvent::Command { origin, command } => self.handle_command(user, origin, command).await,
            FlowEvent::Action { origin, action } => self.handle_action(user, origin, action).await,
            FlowEvent::Text { message, text } => self.handle_text(user, message, &text).await,
        }
    }

    async fn handle_command(&mut self, user: i64, origin: P::MessageRef, command: Command) {
        debug!("user {}: command {:?}", user, command);
        self.abort_flow(user).await;

        let (text, keyboard) = match command {
            Command::Start => ui::main_menu(),
            Command::Cancel => ui::cancelled(),
        };

        if let Err(e) = self.presenter.send(&origin, &text, &keyboard).await {
            warn!("Could not send menu to user {}: {}", user, e);
        }
    }

    async fn handle_action(&mut self, user: i64, origin: P::MessageRef, action: Action) {
        debug!("user {}: action {:?}", user, action);

        match action {
            Action::Menu => {
                self.abort_flow(user).await;
                let (text, keyboard) = ui::main_menu();
                self.edit_or_log(&origin, &text, &keyboard).await;
            }
            Action::NewSession => {
                // Starting over always discards the previous flow first.
                self.abort_flow(user).await;
                self.edit_or_log(&origin, &ui::ask_phone(), &ui::no_buttons()).await;
                self.flows
                    .insert(user, UserFlow::with_status(Stage::AwaitingPhone, origin));
            }
            Action::CheckSession => {
                self.abort_flow(user).await;
                let (text, keyboard) = ui::ask_session_token();
                self.edit_or_log(&origin, &text, &keyboard).await;
                self.flows.insert(
                    user,
                    UserFlow::with_status(Stage::AwaitingSessionToCheck, origin),
                );
            }
            Action::ViewSessions => {
                let (text, keyboard) = if self.store.is_empty(user) {
                    ui::sessions_empty()
                } else {
                    ui::sessions_list(self.store.list(user))
                };
                self.edit_or_log(&origin, &text, &keyboard).await;
            }
            Action::ToggleAutoDelete => {
                let enabled = self.store.toggle_auto_delete(user);
                info!("user {}: auto-delete now {}", user, enabled);
                let (text, keyboard) = ui::auto_delete_toggled(enabled);
                self.edit_or_log(&origin, &text, &keyboard).await;
            }
            Action::Help => {
                let (text, keyboard) = ui::help();
                self.edit_or_log(&origin, &text, &keyboard).await;
            }
            Action::LabelLatest => {
                let Some(latest) = self.store.latest(user) else {
                    let (text, keyboard) = ui::no_session_to_label();
                    self.edit_or_log(&origin, &text, &keyboard).await;
                    return;
                };
                let id = latest.id;

                self.abort_flow(user).await;
                let (text, keyboard) = ui::label_prompt_latest();
                self.edit_or_log(&origin, &text, &keyboard).await;
                self.flows
                    .insert(user, UserFlow::with_status(Stage::AwaitingLabel(id), origin));
            }
            Action::Manage(id) => {
                let (text, keyboard) = match self.store.get(user, id) {
                    Some(session) => ui::session_details(session),
                    None => ui::session_not_found(),
                };
                self.edit_or_log(&origin, &text, &keyboard).await;
            }
            Action::Verify(id) => self.verify_session(user, origin, id).await,
            Action::Show(id) => {
                let Some(session) = self.store.get(user, id) else {
                    let (text, keyboard) = ui::session_not_found();
                    self.edit_or_log(&origin, &text, &keyboard).await;
                    return;
                };

                let (text, keyboard) = ui::session_token(session);
                self.edit_or_log(&origin, &text, &keyboard).await;

                if self.store.auto_delete(user) {
                    self.presenter
                        .schedule_delete(origin, self.auto_delete_delay);
                }
            }
            Action::EditLabel(id) => {
                let Some(session) = self.store.get(user, id) else {
                    let (text, keyboard) = ui::session_not_found();
                    self.edit_or_log(&origin, &text, &keyboard).await;
                    return;
                };
                let (text, keyboard) = ui::label_prompt(session);

                self.abort_flow(user).await;
                self.edit_or_log(&origin, &text, &keyboard).await;
                self.flows
                    .insert(user, UserFlow::with_status(Stage::AwaitingLabel(id), origin));
            }
            Action::Delete(id) => {
                let (text, keyboard) = match self.store.get(user, id) {
                    Some(session) => ui::confirm_delete(session),
                    None => ui::session_not_found(),
                };
                self.edit_or_log(&origin, &text, &keyboard).await;
            }
            Action::ConfirmDelete(id) => {
                let (text, keyboard) = match self.store.remove(user, id) {
                    Some(removed) => {
                        info!("user {}: deleted session {}", user, removed.id);
                        ui::deleted(&removed.label)
                    }
                    None => ui::session_not_found(),
                };
                self.edit_or_log(&origin, &text, &keyboard).await;
            }
        }
    }

    async fn handle_text(&mut self, user: i64, message: P::MessageRef, text: &str) {
        // Users with no active flow are ignored entirely.
        let Some(flow) = self.flows.remove(&user) else {
            return;
        };

        match flow.stage {
            Stage::AwaitingPhone => self.handle_phone(user, flow, message, text).await,
            Stage::AwaitingCode => self.handle_code(user, flow, message, text).await,
            Stage::AwaitingPassword => self.handle_password(user, flow, message, text).await,
            Stage::AwaitingSessionToCheck => self.handle_check(user, flow, message, text).await,
            Stage::AwaitingLabel(id) => self.handle_label(user, flow, message, text, id).await,
        }
    }

    /// `awaiting_phone`: validate, request a code, move to `awaiting_code`.
    async fn handle_phone(
        &mut self,
        user: i64,
        mut flow: UserFlow<A::Login, P::MessageRef>,
        message: P::MessageRef,
        text: &str,
    ) {
        // The phone message leaves the chat no matter what happens next.
        if let Err(e) = self.presenter.delete(&message).await {
            warn!("Could not delete phone message: {}", e);
        }

        let phone = match validate_phone_number(text) {
            Ok(phone) => phone,
            Err(reason) => {
                self.show_status(&mut flow, &message, &ui::invalid_phone(&reason), &ui::no_buttons())
                    .await;
                self.flows.insert(user, flow);
                return;
            }
        };

        info!("user {}: requesting code for {}", user, crate::format::mask_phone(&phone));
        self.show_status(&mut flow, &message, &ui::requesting_code(), &ui::no_buttons())
            .await;

        let mut login = match self.accounts.open(None).await {
            Ok(login) => login,
            Err(e) => {
                warn!("user {}: could not open connection: {}", user, e);
                self.show_status(
                    &mut flow,
                    &message,
                    &ui::code_request_failed(&e.to_string()),
                    &ui::no_buttons(),
                )
                .await;
                return; // back to idle
            }
        };

        match self.accounts.request_code(&mut login, &phone).await {
            Ok(()) => {
                flow.phone = Some(phone);
                flow.login = Some(login);
                flow.stage = Stage::AwaitingCode;
                self.show_status(&mut flow, &message, &ui::code_sent(), &ui::no_buttons())
                    .await;
                self.flows.insert(user, flow);
            }
            Err(e) => {
                warn!("user {}: code request failed: {}", user, e);
                self.accounts.disconnect(login).await;
                self.show_status(
                    &mut flow,
                    &message,
                    &ui::code_request_failed(&e.to_string()),
                    &ui::no_buttons(),
                )
                .await;
                // back to idle
            }
        }
    }

    /// `awaiting_code`: try the code; branches to success, password, retry
    /// or idle depending on the failure class.
    async fn handle_code(
        &mut self,
        user: i64,
        mut flow: UserFlow<A::Login, P::MessageRef>,
        message: P::MessageRef,
        text: &str,
    ) {
        // Always removed from the chat before the result is known.
        if let Err(e) = self.presenter.delete(&message).await {
            warn!("Could not delete verification code message: {}", e);
        }

        let code = strip_non_digits(text);
        if code.is_empty() {
            self.show_status(&mut flow, &message, &ui::empty_code(), &ui::no_buttons())
                .await;
            self.flows.insert(user, flow);
            return;
        }

        let (Some(phone), Some(mut login)) = (flow.phone.clone(), flow.login.take()) else {
            self.show_status(&mut flow, &message, &ui::flow_expired(), &ui::no_buttons())
                .await;
            return; // back to idle
        };

        self.show_status(&mut flow, &message, &ui::verifying_code(), &ui::no_buttons())
            .await;

        match self.accounts.sign_in_code(&mut login, &phone, &code).await {
            Ok(profile) => {
                self.complete_sign_in(user, flow, message, login, phone, profile, false)
                    .await;
            }
            Err(AccountError::InvalidCode) => {
                self.show_status(&mut flow, &message, &ui::invalid_code(), &ui::no_buttons())
                    .await;
                flow.login = Some(login);
                self.flows.insert(user, flow);
            }
            Err(AccountError::ExpiredCode) => {
                info!("user {}: verification code expired", user);
                self.accounts.disconnect(login).await;
                self.show_status(&mut flow, &message, &ui::code_expired(), &ui::no_buttons())
                    .await;
                // back to idle
            }
            Err(AccountError::PasswordRequired) => {
                info!("user {}: two-factor password required", user);
                self.show_status(&mut flow, &message, &ui::two_factor_needed(), &ui::no_buttons())
                    .await;
                flow.login = Some(login);
                flow.stage = Stage::AwaitingPassword;
                self.flows.insert(user, flow);
            }
            Err(e) => {
                warn!("user {}: sign-in with code failed: {}", user, e);
                self.show_status(
                    &mut flow,
                    &message,
                    &ui::code_error(&e.to_string()),
                    &ui::no_buttons(),
                )
                .await;
                flow.login = Some(login);
                self.flows.insert(user, flow); // retry allowed
            }
        }
    }

    /// `awaiting_password`: try the 2FA password; wrong password and unknown
    /// errors both keep the prompt active.
    async fn handle_password(
        &mut self,
        user: i64,
        mut flow: UserFlow<A::Login, P::MessageRef>,
        message: P::MessageRef,
        text: &str,
    ) {
        if let Err(e) = self.presenter.delete(&message).await {
            warn!("Could not delete 2FA password message: {}", e);
        }

        let password = text.trim();
        if password.is_empty() {
            self.show_status(&mut flow, &message, &ui::empty_password(), &ui::no_buttons())
                .await;
            self.flows.insert(user, flow);
            return;
        }

        let (Some(phone), Some(mut login)) = (flow.phone.clone(), flow.login.take()) else {
            self.show_status(&mut flow, &message, &ui::flow_expired(), &ui::no_buttons())
                .await;
            return;
        };

        self.show_status(&mut flow, &message, &ui::checking_password(), &ui::no_buttons())
            .await;

        match self.accounts.sign_in_password(&mut login, password).await {
            Ok(profile) => {
                self.complete_sign_in(user, flow, message, login, phone, profile, true)
                    .await;
            }
            Err(AccountError::InvalidPassword) => {
                self.show_status(&mut flow, &message, &ui::invalid_password(), &ui::no_buttons())
                    .await;
                flow.login = Some(login);
                self.flows.insert(user, flow);
            }
            Err(e) => {
                warn!("user {}: 2FA sign-in failed: {}", user, e);
                self.show_status(
                    &mut flow,
                    &message,
                    &ui::password_error(&e.to_string()),
                    &ui::no_buttons(),
                )
                .await;
                flow.login = Some(login);
                self.flows.insert(user, flow); // retry allowed
            }
        }
    }

    /// Shared tail of the code and password success paths: export the token,
    /// persist the record, reveal it, return to idle.
    #[allow(clippy::too_many_arguments)]
    async fn complete_sign_in(
        &mut self,
        user: i64,
        mut flow: UserFlow<A::Login, P::MessageRef>,
        message: P::MessageRef,
        login: A::Login,
        phone: String,
        profile: crate::store::Profile,
        two_factor: bool,
    ) {
        let token = match self.accounts.export_token(&login).await {
            Ok(token) => token,
            Err(e) => {
                warn!("user {}: could not export session token: {}", user, e);
                self.show_status(
                    &mut flow,
                    &message,
                    &ui::code_error(&e.to_string()),
                    &ui::no_buttons(),
                )
                .await;
                flow.login = Some(login);
                flow.stage = if two_factor {
                    Stage::AwaitingPassword
                } else {
                    Stage::AwaitingCode
                };
                self.flows.insert(user, flow);
                return;
            }
        };

        let session = self
            .store
            .append(user, token, phone, profile, self.device.clone(), two_factor)
            .clone();
        info!(
            "user {}: session {} created ({})",
            user,
            session.id,
            session.label
        );

        let (text, keyboard) = ui::session_created(&session);
        let shown = self.show_status(&mut flow, &message, &text, &keyboard).await;

        // The message reveals the token; honor the auto-delete preference.
        if self.store.auto_delete(user)
            && let Some(shown) = shown
        {
            self.presenter.schedule_delete(shown, self.auto_delete_delay);
        }

        self.accounts.disconnect(login).await;
        // back to idle
    }

    /// `awaiting_session_to_check`: validate a pasted token on a throwaway
    /// connection and report, then return to idle.
    async fn handle_check(
        &mut self,
        user: i64,
        mut flow: UserFlow<A::Login, P::MessageRef>,
        message: P::MessageRef,
        text: &str,
    ) {
        let token = text.trim();
        if token.is_empty() {
            self.show_status(&mut flow, &message, &ui::empty_token(), &ui::no_buttons())
                .await;
            self.flows.insert(user, flow);
            return;
        }

        self.show_status(&mut flow, &message, &ui::validating_token(), &ui::no_buttons())
            .await;

        let (text, keyboard) = match self.accounts.open(Some(token)).await {
            Ok(login) => {
                let outcome = self.check_authorized(&login).await;
                self.accounts.disconnect(login).await;
                outcome
            }
            Err(AccountError::Revoked) => ui::token_revoked(),
            Err(e) => ui::token_error(&e.to_string()),
        };

        self.show_status(&mut flow, &message, &text, &keyboard).await;
        // back to idle
    }

    async fn check_authorized(&self, login: &A::Login) -> (String, Keyboard) {
        match self.accounts.is_authorized(login).await {
            Ok(true) => match self.accounts.profile(login).await {
                Ok(profile) => ui::token_valid(&profile),
                Err(e) => ui::token_error(&e.to_string()),
            },
            Ok(false) => ui::token_invalid(),
            Err(AccountError::Revoked) => ui::token_revoked(),
            Err(e) => ui::token_error(&e.to_string()),
        }
    }

    /// `awaiting_label`: overwrite the label if the session still exists.
    async fn handle_label(
        &mut self,
        user: i64,
        mut flow: UserFlow<A::Login, P::MessageRef>,
        message: P::MessageRef,
        text: &str,
        id: SessionId,
    ) {
        let label = text.trim();
        if label.is_empty() {
            self.show_status(&mut flow, &message, &ui::label_rejected(), &ui::no_buttons())
                .await;
            self.flows.insert(user, flow);
            return;
        }

        let (text, keyboard) = if self.store.set_label(user, id, label.to_owned()) {
            info!("user {}: session {} relabeled", user, id);
            ui::label_saved(label)
        } else {
            ui::session_not_found()
        };

        self.show_status(&mut flow, &message, &text, &keyboard).await;
        // back to idle
    }

    /// Re-verifies a saved session on a throwaway connection, refreshing the
    /// cached profile when it is still authorized.
    async fn verify_session(&mut self, user: i64, origin: P::MessageRef, id: SessionId) {
        let Some(session) = self.store.get(user, id).cloned() else {
            let (text, keyboard) = ui::session_not_found();
            self.edit_or_log(&origin, &text, &keyboard).await;
            return;
        };

        self.edit_or_log(&origin, &ui::verifying_session(&session.label), &ui::no_buttons())
            .await;

        let (text, keyboard) = match self.accounts.open(Some(&session.token)).await {
            Ok(login) => {
                let outcome = match self.accounts.is_authorized(&login).await {
                    Ok(true) => match self.accounts.profile(&login).await {
                        Ok(profile) => {
                            self.store.update_profile(user, id, profile.clone());
                            ui::session_valid(&session, &profile)
                        }
                        Err(e) => ui::session_verify_error(&session, &e.to_string()),
                    },
                    Ok(false) => ui::session_invalid(&session),
                    Err(AccountError::Revoked) => ui::session_revoked(&session),
                    Err(e) => ui::session_verify_error(&session, &e.to_string()),
                };
                self.accounts.disconnect(login).await;
                outcome
            }
            Err(AccountError::Revoked) => ui::session_revoked(&session),
            Err(e) => ui::session_verify_error(&session, &e.to_string()),
        };

        self.edit_or_log(&origin, &text, &keyboard).await;
    }

    /// Discards the user's flow, closing any open connection. Close errors
    /// are swallowed by the `Accounts` implementation.
    async fn abort_flow(&mut self, user: i64) {
        if let Some(flow) = self.flows.remove(&user) {
            debug!("user {}: discarding flow at {:?}", user, flow.stage);
            if let Some(login) = flow.login {
                self.accounts.disconnect(login).await;
            }
        }
    }

    /// Updates the user's status message, preferring an edit of the existing
    /// one and falling back to a fresh message. Returns the handle of
    /// whichever message now shows the text.
    async fn show_status(
        &self,
        flow: &mut UserFlow<A::Login, P::MessageRef>,
        near: &P::MessageRef,
        text: &str,
        keyboard: &Keyboard,
    ) -> Option<P::MessageRef> {
        if let Some(status) = &flow.status {
            match self.presenter.edit(status, text, keyboard).await {
                Ok(()) => return Some(status.clone()),
                Err(e) => warn!("Could not edit status message: {}", e),
            }
        }

        match self.presenter.send(near, text, keyboard).await {
            Ok(sent) => {
                flow.status = Some(sent.clone());
                Some(sent)
            }
            Err(e) => {
                warn!("Could not send status message: {}", e);
                None
            }
        }
    }

    async fn edit_or_log(&self, message: &P::MessageRef, text: &str, keyboard: &Keyboard) {
        if let Err(e) = self.presenter.edit(message, text, keyboard).await {
            warn!("Could not edit message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::flow::ports::PresenterError;
    use crate::store::Profile;

    fn mock_profile() -> Profile {
        Profile {
            id: 777,
            name: "Mock User".to_owned(),
            username: Some("mockuser".to_owned()),
        }
    }

    #[derive(Debug)]
    struct MockLogin {
        id: u32,
    }

    #[derive(Default)]
    struct MockState {
        opened: u32,
        opened_with: Vec<Option<String>>,
        disconnected: Vec<u32>,
        open_errors: VecDeque<AccountError>,
        request_code_errors: VecDeque<AccountError>,
        code_results: VecDeque<Result<Profile, AccountError>>,
        password_results: VecDeque<Result<Profile, AccountError>>,
        authorized: VecDeque<Result<bool, AccountError>>,
        profiles: VecDeque<Result<Profile, AccountError>>,
    }

    #[derive(Default)]
    struct MockAccounts {
        state: Mutex<MockState>,
    }

    impl MockAccounts {
        fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.state.lock().unwrap()
        }
    }

    impl Accounts for MockAccounts {
        type Login = MockLogin;

        async fn open(&self, token: Option<&str>) -> Result<MockLogin, AccountError> {
            let mut state = self.lock();
            if let Some(err) = state.open_errors.pop_front() {
                return Err(err);
            }
            state.opened += 1;
            state.opened_with.push(token.map(str::to_owned));
            Ok(MockLogin { id: state.opened })
        }

        async fn request_code(
            &self,
            _login: &mut MockLogin,
            _phone: &str,
        ) -> Result<(), AccountError> {
            match self.lock().request_code_errors.pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn sign_in_code(
            &self,
            _login: &mut MockLogin,
            _phone: &str,
            _code: &str,
        ) -> Result<Profile, AccountError> {
            self.lock()
                .code_results
                .pop_front()
                .unwrap_or_else(|| Ok(mock_profile()))
        }

        async fn sign_in_password(
            &self,
            _login: &mut MockLogin,
            _password: &str,
        ) -> Result<Profile, AccountError> {
            self.lock()
                .password_results
                .pop_front()
                .unwrap_or_else(|| Ok(mock_profile()))
        }

        async fn is_authorized(&self, _login: &MockLogin) -> Result<bool, AccountError> {
            self.lock().authorized.pop_front().unwrap_or(Ok(true))
        }

        async fn profile(&self, _login: &MockLogin) -> Result<Profile, AccountError> {
            self.lock()
                .profiles
                .pop_front()
                .unwrap_or_else(|| Ok(mock_profile()))
        }

        async fn export_token(&self, login: &MockLogin) -> Result<String, AccountError> {
            Ok(format!("TOKEN-{}", login.id))
        }

        async fn disconnect(&self, login: MockLogin) {
            self.lock().disconnected.push(login.id);
        }
    }

    #[derive(Default)]
    struct PresenterState {
        sent: Vec<(u32, String)>,
        edited: Vec<(u32, String)>,
        deleted: Vec<u32>,
        scheduled: Vec<(u32, Duration)>,
    }

    #[derive(Default)]
    struct MockPresenter {
        state: Mutex<PresenterState>,
    }

    impl MockPresenter {
        fn lock(&self) -> std::sync::MutexGuard<'_, PresenterState> {
            self.state.lock().unwrap()
        }

        fn last_text(&self) -> String {
            let state = self.lock();
            state
                .edited
                .last()
                .map(|(_, t)| t.clone())
                .into_iter()
                .chain(state.sent.last().map(|(_, t)| t.clone()))
                .next_back()
                .unwrap_or_default()
        }
    }

    impl Presenter for MockPresenter {
        type MessageRef = u32;

        async fn send(
            &self,
            _origin: &u32,
            text: &str,
            _keyboard: &Keyboard,
        ) -> Result<u32, PresenterError> {
            let mut state = self.lock();
            let id = 100 + u32::try_from(state.sent.len()).unwrap();
            state.sent.push((id, text.to_owned()));
            Ok(id)
        }

        async fn edit(
            &self,
            message: &u32,
            text: &str,
            _keyboard: &Keyboard,
        ) -> Result<(), PresenterError> {
            self.lock().edited.push((*message, text.to_owned()));
            Ok(())
        }

        async fn delete(&self, message: &u32) -> Result<(), PresenterError> {
            self.lock().deleted.push(*message);
            Ok(())
        }

        fn schedule_delete(&self, message: u32, delay: Duration) {
            self.lock().scheduled.push((message, delay));
        }
    }

    const USER: i64 = 1;
    const MENU_MSG: u32 = 1;

    fn engine() -> Engine<MockAccounts, MockPresenter> {
        Engine::new(
            MockAccounts::default(),
            MockPresenter::default(),
            "Test Device".to_owned(),
            Duration::from_secs(300),
        )
    }

    async fn click(engine: &mut Engine<MockAccounts, MockPresenter>, action: Action) {
        engine
            .handle(USER, FlowEvent::Action { origin: MENU_MSG, action })
            .await;
    }

    async fn say(engine: &mut Engine<MockAccounts, MockPresenter>, message: u32, text: &str) {
        engine
            .handle(
                USER,
                FlowEvent::Text {
                    message,
                    text: text.to_owned(),
                },
            )
            .await;
    }

    fn stage(engine: &Engine<MockAccounts, MockPresenter>) -> Option<Stage> {
        engine.flows.get(&USER).map(|f| f.stage)
    }

    #[tokio::test]
    async fn test_full_generation_flow() {
        let mut engine = engine();

        click(&mut engine, Action::NewSession).await;
        assert_eq!(stage(&engine), Some(Stage::AwaitingPhone));

        say(&mut engine, 10, "+12345678900").await;
        assert_eq!(stage(&engine), Some(Stage::AwaitingCode));
        assert_eq!(engine.accounts.lock().opened, 1);

        say(&mut engine, 11, "12345").await;
        assert_eq!(stage(&engine), None);

        let sessions = engine.store.list(USER);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].label, "Session 1");
        assert_eq!(sessions[0].token, "TOKEN-1");
        assert_eq!(sessions[0].phone, "+12345678900");
        assert_eq!(sessions[0].device, "Test Device");

        // the connection was closed, and both sensitive messages removed
        assert_eq!(engine.accounts.lock().disconnected, vec![1]);
        assert_eq!(engine.presenter.lock().deleted, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_invalid_phone_keeps_state() {
        let mut engine = engine();

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+1234").await;

        assert_eq!(stage(&engine), Some(Stage::AwaitingPhone));
        assert_eq!(engine.accounts.lock().opened, 0);
        assert!(engine.store.is_empty(USER));
        // deleted regardless of the validation outcome
        assert_eq!(engine.presenter.lock().deleted, vec![10]);
    }

    #[tokio::test]
    async fn test_restart_closes_previous_connection() {
        let mut engine = engine();

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;
        assert_eq!(engine.accounts.lock().opened, 1);

        click(&mut engine, Action::NewSession).await;
        assert_eq!(engine.accounts.lock().disconnected, vec![1]);
        assert_eq!(stage(&engine), Some(Stage::AwaitingPhone));
    }

    #[tokio::test]
    async fn test_code_request_failure_drops_to_idle() {
        let mut engine = engine();
        engine
            .accounts
            .lock()
            .request_code_errors
            .push_back(AccountError::Other("PHONE_NUMBER_BANNED".to_owned()));

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;

        assert_eq!(stage(&engine), None);
        assert_eq!(engine.accounts.lock().disconnected, vec![1]);
        assert!(engine.presenter.last_text().contains("Error requesting"));
    }

    #[tokio::test]
    async fn test_two_factor_path() {
        let mut engine = engine();
        engine
            .accounts
            .lock()
            .code_results
            .push_back(Err(AccountError::PasswordRequired));

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;
        say(&mut engine, 11, "12345").await;

        // no record yet, same connection still open
        assert_eq!(stage(&engine), Some(Stage::AwaitingPassword));
        assert!(engine.store.is_empty(USER));
        assert!(engine.accounts.lock().disconnected.is_empty());

        say(&mut engine, 12, "hunter2").await;
        assert_eq!(stage(&engine), None);

        let sessions = engine.store.list(USER);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].label, "Session 1 (2FA)");
        assert_eq!(engine.presenter.lock().deleted, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_invalid_code_allows_retry() {
        let mut engine = engine();
        engine
            .accounts
            .lock()
            .code_results
            .push_back(Err(AccountError::InvalidCode));

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;
        say(&mut engine, 11, "11111").await;

        assert_eq!(stage(&engine), Some(Stage::AwaitingCode));
        assert!(engine.accounts.lock().disconnected.is_empty());

        say(&mut engine, 12, "12345").await;
        assert_eq!(engine.store.list(USER).len(), 1);
    }

    #[tokio::test]
    async fn test_expired_code_drops_to_idle() {
        let mut engine = engine();
        engine
            .accounts
            .lock()
            .code_results
            .push_back(Err(AccountError::ExpiredCode));

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;
        say(&mut engine, 11, "12345").await;

        assert_eq!(stage(&engine), None);
        assert_eq!(engine.accounts.lock().disconnected, vec![1]);
        assert!(engine.store.is_empty(USER));
    }

    #[tokio::test]
    async fn test_unknown_code_error_allows_retry() {
        let mut engine = engine();
        engine
            .accounts
            .lock()
            .code_results
            .push_back(Err(AccountError::Other("FLOOD_WAIT_30".to_owned())));

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;
        say(&mut engine, 11, "12345").await;

        assert_eq!(stage(&engine), Some(Stage::AwaitingCode));
        let flow = engine.flows.get(&USER).unwrap();
        assert!(flow.login.is_some());
    }

    #[tokio::test]
    async fn test_code_without_digits_rejected_in_place() {
        let mut engine = engine();

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;
        say(&mut engine, 11, "abc").await;

        assert_eq!(stage(&engine), Some(Stage::AwaitingCode));
        assert!(engine.flows.get(&USER).unwrap().login.is_some());
        // still removed from the chat
        assert_eq!(engine.presenter.lock().deleted, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_wrong_password_allows_retry() {
        let mut engine = engine();
        {
            let mut state = engine.accounts.lock();
            state.code_results.push_back(Err(AccountError::PasswordRequired));
            state
                .password_results
                .push_back(Err(AccountError::InvalidPassword));
        }

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;
        say(&mut engine, 11, "12345").await;
        say(&mut engine, 12, "wrong").await;

        assert_eq!(stage(&engine), Some(Stage::AwaitingPassword));

        say(&mut engine, 13, "right").await;
        assert_eq!(engine.store.list(USER).len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_flow_disconnects() {
        let mut engine = engine();

        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;

        engine
            .handle(
                USER,
                FlowEvent::Command {
                    origin: 20,
                    command: Command::Cancel,
                },
            )
            .await;

        assert_eq!(stage(&engine), None);
        assert_eq!(engine.accounts.lock().disconnected, vec![1]);
    }

    #[tokio::test]
    async fn test_check_token_valid() {
        let mut engine = engine();

        click(&mut engine, Action::CheckSession).await;
        assert_eq!(stage(&engine), Some(Stage::AwaitingSessionToCheck));

        say(&mut engine, 10, "some-token").await;

        assert_eq!(stage(&engine), None);
        let state = engine.accounts.lock();
        assert_eq!(state.opened_with, vec![Some("some-token".to_owned())]);
        assert_eq!(state.disconnected, vec![1]);
        drop(state);
        assert!(engine.presenter.last_text().contains("Session is valid"));
    }

    #[tokio::test]
    async fn test_check_token_unauthorized() {
        let mut engine = engine();
        engine.accounts.lock().authorized.push_back(Ok(false));

        click(&mut engine, Action::CheckSession).await;
        say(&mut engine, 10, "stale-token").await;

        assert_eq!(stage(&engine), None);
        assert!(engine.presenter.last_text().contains("not valid"));
        // disconnected even though the session was dead
        assert_eq!(engine.accounts.lock().disconnected, vec![1]);
    }

    #[tokio::test]
    async fn test_check_token_revoked_on_open() {
        let mut engine = engine();
        engine.accounts.lock().open_errors.push_back(AccountError::Revoked);

        click(&mut engine, Action::CheckSession).await;
        say(&mut engine, 10, "revoked-token").await;

        assert_eq!(stage(&engine), None);
        assert!(engine.presenter.last_text().contains("revoked"));
    }

    fn seed_session(engine: &mut Engine<MockAccounts, MockPresenter>, token: &str) -> SessionId {
        engine
            .store
            .append(
                USER,
                token.to_owned(),
                "+12345678900".to_owned(),
                mock_profile(),
                "Test Device".to_owned(),
                false,
            )
            .id
    }

    #[tokio::test]
    async fn test_verify_refreshes_profile() {
        let mut engine = engine();
        let id = seed_session(&mut engine, "tok");

        let fresh = Profile {
            id: 777,
            name: "Renamed User".to_owned(),
            username: None,
        };
        engine.accounts.lock().profiles.push_back(Ok(fresh.clone()));

        click(&mut engine, Action::Verify(id)).await;

        assert_eq!(
            engine.store.get(USER, id).map(|s| s.profile.clone()),
            Some(fresh)
        );
        assert_eq!(engine.accounts.lock().disconnected, vec![1]);
    }

    #[tokio::test]
    async fn test_verify_revoked_keeps_cached_profile() {
        let mut engine = engine();
        let id = seed_session(&mut engine, "tok");
        engine
            .accounts
            .lock()
            .authorized
            .push_back(Err(AccountError::Revoked));

        click(&mut engine, Action::Verify(id)).await;

        assert_eq!(
            engine.store.get(USER, id).map(|s| s.profile.clone()),
            Some(mock_profile())
        );
        assert!(engine.presenter.last_text().contains("revoked"));
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let mut engine = engine();
        let a = seed_session(&mut engine, "aaa");
        let b = seed_session(&mut engine, "bbb");
        let c = seed_session(&mut engine, "ccc");

        click(&mut engine, Action::Delete(b)).await;
        assert!(engine.presenter.last_text().contains("Are you sure"));
        assert_eq!(engine.store.list(USER).len(), 3);

        click(&mut engine, Action::ConfirmDelete(b)).await;
        let tokens: Vec<_> = engine
            .store
            .list(USER)
            .iter()
            .map(|s| s.token.clone())
            .collect();
        assert_eq!(tokens, vec!["aaa".to_owned(), "ccc".to_owned()]);
        assert!(engine.store.get(USER, a).is_some());
        assert!(engine.store.get(USER, c).is_some());

        // a second click on the same stale button reports not-found
        click(&mut engine, Action::ConfirmDelete(b)).await;
        assert!(engine.presenter.last_text().contains("not found"));
    }

    #[tokio::test]
    async fn test_label_flow() {
        let mut engine = engine();
        let id = seed_session(&mut engine, "tok");

        click(&mut engine, Action::EditLabel(id)).await;
        assert_eq!(stage(&engine), Some(Stage::AwaitingLabel(id)));

        say(&mut engine, 10, "   ").await;
        assert_eq!(stage(&engine), Some(Stage::AwaitingLabel(id)));

        say(&mut engine, 11, "Main Account").await;
        assert_eq!(stage(&engine), None);
        assert_eq!(
            engine.store.get(USER, id).map(|s| s.label.clone()),
            Some("Main Account".to_owned())
        );
    }

    #[tokio::test]
    async fn test_label_latest_without_sessions() {
        let mut engine = engine();

        click(&mut engine, Action::LabelLatest).await;

        assert_eq!(stage(&engine), None);
        assert!(engine.presenter.last_text().contains("No session"));
    }

    #[tokio::test]
    async fn test_ignores_text_without_flow() {
        let mut engine = engine();

        say(&mut engine, 10, "hello there").await;

        let state = engine.presenter.lock();
        assert!(state.sent.is_empty());
        assert!(state.edited.is_empty());
        assert!(state.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_show_schedules_deletion_when_auto_delete_enabled() {
        let mut engine = engine();
        let id = seed_session(&mut engine, "tok");

        click(&mut engine, Action::Show(id)).await;
        assert!(engine.presenter.lock().scheduled.is_empty());

        click(&mut engine, Action::ToggleAutoDelete).await;
        click(&mut engine, Action::Show(id)).await;

        let state = engine.presenter.lock();
        assert_eq!(state.scheduled, vec![(MENU_MSG, Duration::from_secs(300))]);
    }

    #[tokio::test]
    async fn test_creation_schedules_deletion_when_auto_delete_enabled() {
        let mut engine = engine();

        click(&mut engine, Action::ToggleAutoDelete).await;
        click(&mut engine, Action::NewSession).await;
        say(&mut engine, 10, "+12345678900").await;
        say(&mut engine, 11, "12345").await;

        assert_eq!(engine.store.list(USER).len(), 1);
        assert_eq!(engine.presenter.lock().scheduled.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_manage_button_reports_not_found() {
        let mut engine = engine();
        let id = seed_session(&mut engine, "tok");
        engine.store.remove(USER, id);

        click(&mut engine, Action::Manage(id)).await;
        assert!(engine.presenter.last_text().contains("not found"));
    }
}
