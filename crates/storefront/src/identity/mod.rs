//! Identity session store port.
//!
//! # Architecture
//!
//! - [`IdentityProvider`] is the seam to the external identity platform
//! - The provider is the single authority for the current session: it
//!   publishes every change through a [`SessionBroadcaster`], and consumers
//!   observe it through a [`SessionSubscription`]
//! - Provider-specific error strings are mapped once, inside the adapter, into
//!   the closed [`ProviderCode`] enum
//!
//! # Delivery contract
//!
//! Subscriptions are latest-value: a subscriber always sees the most recent
//! session, and rapid transitions may coalesce into a single notification.
//! Consumers must therefore react to "the session is now X", never to
//! "a transition from A to B happened".

mod firebase;

pub use firebase::FirebaseIdentity;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use valfinds_core::{Email, UserId};

/// The live authenticated identity for this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable account identifier assigned by the identity provider.
    pub uid: UserId,
    /// Email the account signed in with.
    pub email: Email,
}

/// Closed set of provider failure codes the storefront cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCode {
    /// Email/password combination rejected without saying which part.
    InvalidCredential,
    /// No account with that email.
    UserNotFound,
    /// Account exists, password is wrong.
    WrongPassword,
    /// Sign-up with an email that already has an account.
    EmailAlreadyInUse,
    /// Sign-up password rejected by the provider's policy.
    WeakPassword,
    /// Malformed email address.
    InvalidEmail,
    /// Any other provider code, kept for logging.
    Other(String),
}

impl std::fmt::Display for ProviderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredential => f.write_str("invalid credential"),
            Self::UserNotFound => f.write_str("user not found"),
            Self::WrongPassword => f.write_str("wrong password"),
            Self::EmailAlreadyInUse => f.write_str("email already in use"),
            Self::WeakPassword => f.write_str("weak password"),
            Self::InvalidEmail => f.write_str("invalid email"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

/// Errors returned by an [`IdentityProvider`].
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider understood the request and refused it.
    #[error("identity provider rejected the request: {0}")]
    Rejected(ProviderCode),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with something we could not interpret.
    #[error("unexpected identity response: {0}")]
    Parse(String),

    /// Reading or writing the persisted session failed.
    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl IdentityError {
    /// The provider code, if the provider rejected the request.
    #[must_use]
    pub const fn code(&self) -> Option<&ProviderCode> {
        match self {
            Self::Rejected(code) => Some(code),
            _ => None,
        }
    }
}

/// Returned by [`SessionSubscription::changed`] once the provider is gone.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("session subscription closed")]
pub struct SubscriptionClosed;

/// Publishing half of the session notification channel.
///
/// Owned by identity provider implementations.
#[derive(Debug)]
pub struct SessionBroadcaster {
    tx: watch::Sender<Option<Session>>,
}

impl SessionBroadcaster {
    /// Create a broadcaster holding an initial session.
    #[must_use]
    pub fn new(initial: Option<Session>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish the current session to every subscriber.
    pub fn publish(&self, session: Option<Session>) {
        self.tx.send_replace(session);
    }

    /// Latest published session.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    /// Hand out a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SessionBroadcaster {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Receiving half of the session notification channel.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug, Clone)]
pub struct SessionSubscription {
    rx: watch::Receiver<Option<Session>>,
}

impl SessionSubscription {
    /// The session as of now.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.rx.borrow().clone()
    }

    /// Wait for the next published session and return it.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionClosed` when the provider has been dropped.
    pub async fn changed(&mut self) -> Result<Option<Session>, SubscriptionClosed> {
        self.rx.changed().await.map_err(|_| SubscriptionClosed)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

/// External identity platform.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign in with an email/password pair.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError>;

    /// Create an account and sign it in.
    async fn create_account(&self, email: &str, password: &str) -> Result<Session, IdentityError>;

    /// Ask the provider to email a password reset link.
    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Subscribe to session changes.
    fn on_session_changed(&self) -> SessionSubscription;
}

/// Source of bearer tokens for authenticated store requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid id token, or `None` when signed out.
    async fn bearer_token(&self) -> Option<SecretString>;
}
