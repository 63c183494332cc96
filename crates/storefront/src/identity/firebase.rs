//! Firebase Authentication adapter (Identity Toolkit REST API).
//!
//! Sessions are persisted to `{data_dir}/session.json` so a restarted
//! storefront picks up where it left off. Id tokens live for an hour; they are
//! refreshed through the secure token endpoint shortly before they expire, and
//! a refresh the provider refuses ends the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use valfinds_core::{Email, UserId};

use super::{
    IdentityError, IdentityProvider, ProviderCode, Session, SessionBroadcaster,
    SessionSubscription, TokenSource,
};
use crate::config::FirebaseConfig;

/// Identity Toolkit API base URL.
const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Secure token endpoint used for refreshing id tokens.
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// File name of the persisted session inside the data directory.
const SESSION_FILE: &str = "session.json";

/// Refresh tokens this many seconds before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Firebase-backed [`IdentityProvider`].
#[derive(Clone)]
pub struct FirebaseIdentity {
    inner: Arc<FirebaseIdentityInner>,
}

struct FirebaseIdentityInner {
    client: reqwest::Client,
    api_key: SecretString,
    session_path: PathBuf,
    /// Tokens for the signed-in account
    tokens: RwLock<Option<SessionTokens>>,
    sessions: SessionBroadcaster,
}

/// A signed-in session together with its credentials.
#[derive(Clone)]
struct SessionTokens {
    session: Session,
    id_token: SecretString,
    refresh_token: SecretString,
    /// Unix timestamp when the id token expires.
    expires_at: i64,
}

impl SessionTokens {
    fn expires_within(&self, seconds: i64) -> bool {
        chrono::Utc::now().timestamp() >= self.expires_at - seconds
    }
}

/// On-disk form of [`SessionTokens`].
#[derive(Serialize, Deserialize)]
struct PersistedSession {
    uid: String,
    email: String,
    id_token: String,
    refresh_token: String,
    expires_at: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'a str,
    email: &'a str,
}

/// Response from `accounts:signInWithPassword` and `accounts:signUp`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    email: String,
    id_token: String,
    refresh_token: String,
    /// Token lifetime in seconds, as a string.
    expires_in: String,
}

/// Response from the secure token endpoint.
#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseIdentity {
    /// Create the provider and restore any persisted session.
    ///
    /// An expired persisted session is refreshed; if the provider refuses the
    /// refresh the session file is removed and the provider starts signed out.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Http` if the HTTP client cannot be built.
    pub async fn restore(config: &FirebaseConfig, data_dir: &Path) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let identity = Self {
            inner: Arc::new(FirebaseIdentityInner {
                client,
                api_key: config.api_key.clone(),
                session_path: data_dir.join(SESSION_FILE),
                tokens: RwLock::new(None),
                sessions: SessionBroadcaster::default(),
            }),
        };

        let Some(stored) = identity.load_persisted().await else {
            return Ok(identity);
        };

        if stored.expires_within(REFRESH_MARGIN_SECS) {
            match identity.refresh(&stored).await {
                Ok(fresh) => identity.establish(fresh).await,
                Err(IdentityError::Rejected(code)) => {
                    info!(%code, "Persisted session is no longer valid");
                    identity.end_session().await?;
                }
                Err(e) => {
                    // Keep the session; the next token request retries.
                    warn!(error = %e, "Could not refresh persisted session");
                    identity.establish(stored).await;
                }
            }
        } else {
            identity.establish(stored).await;
        }

        Ok(identity)
    }

    /// Read the session file, if any.
    async fn load_persisted(&self) -> Option<SessionTokens> {
        let raw = match tokio::fs::read_to_string(&self.inner.session_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };

        match decode_persisted(&raw) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed persisted session");
                None
            }
        }
    }

    /// Write the session file via a temp file and rename.
    async fn persist(&self, tokens: &SessionTokens) -> Result<(), IdentityError> {
        let persisted = PersistedSession {
            uid: tokens.session.uid.to_string(),
            email: tokens.session.email.to_string(),
            id_token: tokens.id_token.expose_secret().to_owned(),
            refresh_token: tokens.refresh_token.expose_secret().to_owned(),
            expires_at: tokens.expires_at,
        };
        let json = serde_json::to_vec(&persisted)
            .map_err(|e| IdentityError::Parse(format!("session encode: {e}")))?;

        if let Some(dir) = self.inner.session_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.inner.session_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.inner.session_path).await?;
        Ok(())
    }

    /// Make `tokens` the current session and notify subscribers.
    async fn establish(&self, tokens: SessionTokens) {
        if let Err(e) = self.persist(&tokens).await {
            warn!(error = %e, "Failed to persist session; it will not survive a restart");
        }
        let session = tokens.session.clone();
        *self.inner.tokens.write().await = Some(tokens);
        self.inner.sessions.publish(Some(session));
    }

    /// Forget the current session and notify subscribers.
    async fn end_session(&self) -> Result<(), IdentityError> {
        *self.inner.tokens.write().await = None;
        self.inner.sessions.publish(None);

        match tokio::fs::remove_file(&self.inner.session_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IdentityError::Storage(e)),
        }
    }

    fn accounts_url(&self, method: &str) -> String {
        format!(
            "{IDENTITY_TOOLKIT_URL}/accounts:{method}?key={}",
            urlencoding::encode(self.inner.api_key.expose_secret())
        )
    }

    /// Shared body of sign-in and sign-up.
    async fn password_request(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        let response = self
            .inner
            .client
            .post(self.accounts_url(method))
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let auth: AuthResponse = response.json().await?;
        let tokens = tokens_from_auth(auth, chrono::Utc::now().timestamp())?;
        let session = tokens.session.clone();
        self.establish(tokens).await;

        info!(uid = %session.uid, "Signed in");
        Ok(session)
    }

    /// Exchange the refresh token for a new id token.
    #[instrument(skip(self, stored), fields(uid = %stored.session.uid))]
    async fn refresh(&self, stored: &SessionTokens) -> Result<SessionTokens, IdentityError> {
        let url = format!(
            "{SECURE_TOKEN_URL}?key={}",
            urlencoding::encode(self.inner.api_key.expose_secret())
        );

        let response = self
            .inner
            .client
            .post(url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", stored.refresh_token.expose_secret()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let refreshed: RefreshResponse = response.json().await?;
        let expires_in = parse_expires_in(&refreshed.expires_in)?;
        debug!("Refreshed id token");

        Ok(SessionTokens {
            session: stored.session.clone(),
            id_token: SecretString::from(refreshed.id_token),
            refresh_token: SecretString::from(refreshed.refresh_token),
            expires_at: chrono::Utc::now().timestamp() + expires_in,
        })
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        self.password_request("signInWithPassword", email, password)
            .await
    }

    #[instrument(skip(self, password))]
    async fn create_account(&self, email: &str, password: &str) -> Result<Session, IdentityError> {
        self.password_request("signUp", email, password).await
    }

    #[instrument(skip(self))]
    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let response = self
            .inner
            .client
            .post(self.accounts_url("sendOobCode"))
            .json(&OobCodeRequest {
                request_type: "PASSWORD_RESET",
                email,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.end_session().await?;
        info!("Signed out");
        Ok(())
    }

    fn on_session_changed(&self) -> SessionSubscription {
        self.inner.sessions.subscribe()
    }
}

#[async_trait]
impl TokenSource for FirebaseIdentity {
    async fn bearer_token(&self) -> Option<SecretString> {
        let stored = self.inner.tokens.read().await.clone()?;
        if !stored.expires_within(REFRESH_MARGIN_SECS) {
            return Some(stored.id_token);
        }

        match self.refresh(&stored).await {
            Ok(fresh) => {
                let token = fresh.id_token.clone();
                self.establish(fresh).await;
                Some(token)
            }
            Err(IdentityError::Rejected(code)) => {
                info!(%code, "Session ended by the identity provider");
                if let Err(e) = self.end_session().await {
                    warn!(error = %e, "Failed to remove persisted session");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed; using current token");
                Some(stored.id_token)
            }
        }
    }
}

/// Map a Firebase error message to a [`ProviderCode`].
///
/// Messages look like `EMAIL_NOT_FOUND` or
/// `WEAK_PASSWORD : Password should be at least 6 characters`.
pub(crate) fn provider_code(message: &str) -> ProviderCode {
    let code = message
        .split_once(':')
        .map_or(message, |(code, _)| code)
        .trim();

    match code {
        "INVALID_LOGIN_CREDENTIALS" | "INVALID_CREDENTIAL" => ProviderCode::InvalidCredential,
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => ProviderCode::UserNotFound,
        "INVALID_PASSWORD" => ProviderCode::WrongPassword,
        "EMAIL_EXISTS" => ProviderCode::EmailAlreadyInUse,
        "WEAK_PASSWORD" => ProviderCode::WeakPassword,
        "INVALID_EMAIL" | "MISSING_EMAIL" => ProviderCode::InvalidEmail,
        other => ProviderCode::Other(other.to_owned()),
    }
}

/// Turn a non-success response into an [`IdentityError`].
async fn rejection(response: reqwest::Response) -> IdentityError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => IdentityError::Rejected(provider_code(&envelope.error.message)),
        Err(_) => IdentityError::Parse(format!(
            "HTTP {status}: {}",
            body.chars().take(200).collect::<String>()
        )),
    }
}

fn parse_expires_in(raw: &str) -> Result<i64, IdentityError> {
    raw.parse::<i64>()
        .map_err(|e| IdentityError::Parse(format!("expiresIn {raw:?}: {e}")))
}

fn tokens_from_auth(auth: AuthResponse, now: i64) -> Result<SessionTokens, IdentityError> {
    let email = Email::parse(&auth.email)
        .map_err(|e| IdentityError::Parse(format!("account email: {e}")))?;

    Ok(SessionTokens {
        session: Session {
            uid: UserId::new(auth.local_id),
            email,
        },
        id_token: SecretString::from(auth.id_token),
        refresh_token: SecretString::from(auth.refresh_token),
        expires_at: now + parse_expires_in(&auth.expires_in)?,
    })
}

fn decode_persisted(raw: &str) -> Result<SessionTokens, IdentityError> {
    let persisted: PersistedSession =
        serde_json::from_str(raw).map_err(|e| IdentityError::Parse(e.to_string()))?;
    let email = Email::parse(&persisted.email)
        .map_err(|e| IdentityError::Parse(format!("persisted email: {e}")))?;

    Ok(SessionTokens {
        session: Session {
            uid: UserId::new(persisted.uid),
            email,
        },
        id_token: SecretString::from(persisted.id_token),
        refresh_token: SecretString::from(persisted.refresh_token),
        expires_at: persisted.expires_at,
    })
}
