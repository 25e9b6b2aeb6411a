//! Grammers-backed implementation of the account boundary.
//!
//! Each login flow gets its own client over a throwaway in-memory session;
//! the portable "session string" handed to users is the base64 encoding of
//! that session's serialized state.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use grammers_client::client::{LoginToken, PasswordToken};
use grammers_client::{Client, SenderPool, SignInError, sender};
use grammers_session::storages::MemorySession;
use grammers_tl_types as tl;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::TelegramConfig;
use crate::flow::{AccountError, Accounts};
use crate::format::mask_phone;
use crate::store::Profile;

/// One in-flight login connection.
pub struct LoginConnection {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// In-memory session backing this connection.
    session: Arc<MemorySession>,

    /// Token returned by the code request, consumed by code sign-in.
    login_token: Option<LoginToken>,

    /// Token returned when 2FA is required, consumed by password sign-in.
    password_token: Option<PasswordToken>,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl std::fmt::Debug for LoginConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginConnection")
            .field("awaiting_code", &self.login_token.is_some())
            .field("awaiting_password", &self.password_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Factory for login connections, holding the API credentials.
#[derive(Debug, Clone)]
pub struct TelegramAccounts {
    api_id: i32,
    api_hash: String,
}

impl TelegramAccounts {
    /// Creates the factory from the loaded configuration.
    #[must_use]
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
        }
    }

    /// Fetches the signed-in account's profile via a raw `GetUsers` call.
    async fn fetch_profile(&self, client: &Client) -> Result<Profile, AccountError> {
        let request = tl::functions::users::GetUsers {
            id: vec![tl::enums::InputUser::UserSelf],
        };

        match client.invoke(&request).await {
            Ok(users) => {
                if let Some(tl::enums::User::User(user)) = users.first() {
                    Ok(Profile {
                        id: user.id,
                        name: display_name(user.first_name.as_deref(), user.last_name.as_deref()),
                        username: user.username.clone(),
                    })
                } else {
                    Err(AccountError::Other(
                        "Could not fetch account profile".to_owned(),
                    ))
                }
            }
            Err(e) => Err(classify_error(&e.to_string())),
        }
    }
}

impl Accounts for TelegramAccounts {
    type Login = LoginConnection;

    async fn open(&self, token: Option<&str>) -> Result<LoginConnection, AccountError> {
        let session = Arc::new(match token {
            Some(token) => {
                let bytes = BASE64
                    .decode(token.trim())
                    .map_err(|e| AccountError::Other(format!("Invalid session string: {e}")))?;
                MemorySession::load(&bytes)
                    .map_err(|e| AccountError::Other(format!("Invalid session string: {e}")))?
            }
            None => MemorySession::new(),
        });

        let SenderPool {
            runner,
            updates: _updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), self.api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner for this connection
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        debug!("Opened login connection (resumed: {})", token.is_some());

        Ok(LoginConnection {
            client,
            handle: handle.thin,
            session,
            login_token: None,
            password_token: None,
            _pool_task: pool_task,
        })
    }

    async fn request_code(
        &self,
        login: &mut LoginConnection,
        phone: &str,
    ) -> Result<(), AccountError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        let token = login
            .client
            .request_login_code(phone, &self.api_hash)
            .await
            .map_err(|e| classify_error(&e.to_string()))?;

        login.login_token = Some(token);
        Ok(())
    }

    async fn sign_in_code(
        &self,
        login: &mut LoginConnection,
        _phone: &str,
        code: &str,
    ) -> Result<Profile, AccountError> {
        let Some(token) = login.login_token.take() else {
            return Err(AccountError::Other("No code was requested".to_owned()));
        };

        match login.client.sign_in(&token, code).await {
            Ok(_user) => {
                info!("Successfully signed in");
                self.fetch_profile(&login.client).await
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                login.password_token = Some(password_token);
                Err(AccountError::PasswordRequired)
            }
            Err(SignInError::InvalidCode) => {
                // The token survives an invalid code; allow a retry.
                login.login_token = Some(token);
                Err(AccountError::InvalidCode)
            }
            Err(e) => Err(classify_error(&e.to_string())),
        }
    }

    async fn sign_in_password(
        &self,
        login: &mut LoginConnection,
        password: &str,
    ) -> Result<Profile, AccountError> {
        let Some(password_token) = login.password_token.take() else {
            return Err(AccountError::Other("No password was requested".to_owned()));
        };

        match login.client.check_password(password_token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA");
                self.fetch_profile(&login.client).await
            }
            Err(SignInError::InvalidPassword(token)) => {
                login.password_token = Some(token);
                Err(AccountError::InvalidPassword)
            }
            Err(e) => Err(classify_error(&e.to_string())),
        }
    }

    async fn is_authorized(&self, login: &LoginConnection) -> Result<bool, AccountError> {
        login
            .client
            .is_authorized()
            .await
            .map_err(|e| classify_error(&e.to_string()))
    }

    async fn profile(&self, login: &LoginConnection) -> Result<Profile, AccountError> {
        self.fetch_profile(&login.client).await
    }

    async fn export_token(&self, login: &LoginConnection) -> Result<String, AccountError> {
        Ok(BASE64.encode(login.session.save()))
    }

    async fn disconnect(&self, login: LoginConnection) {
        debug!("Disconnecting login connection");
        login.handle.quit();
    }
}

/// Joins the optional first and last name the way chat clients display them.
fn display_name(first: Option<&str>, last: Option<&str>) -> String {
    let name = format!(
        "{} {}",
        first.unwrap_or_default(),
        last.unwrap_or_default()
    );
    let name = name.trim();
    if name.is_empty() {
        "Unknown".to_owned()
    } else {
        name.to_owned()
    }
}

/// Maps a raw Telegram error message onto the account failure taxonomy.
fn classify_error(msg: &str) -> AccountError {
    if msg.contains("AUTH_KEY_UNREGISTERED")
        || msg.contains("USER_DEACTIVATED")
        || msg.contains("SESSION_REVOKED")
        || msg.contains("SESSION_EXPIRED")
    {
        AccountError::Revoked
    } else if msg.contains("PHONE_CODE_EXPIRED") {
        AccountError::ExpiredCode
    } else if msg.contains("PHONE_CODE_INVALID") {
        AccountError::InvalidCode
    } else if msg.contains("SESSION_PASSWORD_NEEDED") {
        AccountError::PasswordRequired
    } else if msg.contains("PASSWORD_HASH_INVALID") {
        AccountError::InvalidPassword
    } else {
        AccountError::Other(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Some("Ada"), Some("Lovelace")), "Ada Lovelace");
        assert_eq!(display_name(Some("Ada"), None), "Ada");
        assert_eq!(display_name(None, None), "Unknown");
    }

    #[test]
    fn test_classify_revoked() {
        assert!(matches!(
            classify_error("RPC error: AUTH_KEY_UNREGISTERED"),
            AccountError::Revoked
        ));
        assert!(matches!(
            classify_error("USER_DEACTIVATED"),
            AccountError::Revoked
        ));
    }

    #[test]
    fn test_classify_code_errors() {
        assert!(matches!(
            classify_error("PHONE_CODE_EXPIRED"),
            AccountError::ExpiredCode
        ));
        assert!(matches!(
            classify_error("PHONE_CODE_INVALID"),
            AccountError::InvalidCode
        ));
    }

    #[test]
    fn test_classify_unknown() {
        assert!(matches!(
            classify_error("FLOOD_WAIT_30"),
            AccountError::Other(_)
        ));
    }
}
