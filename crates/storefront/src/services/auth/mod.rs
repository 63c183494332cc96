//! Authentication context.
//!
//! Wraps the identity provider for the rest of the storefront: it follows the
//! provider's session notification, derives the admin flag, and maps provider
//! failures into per-operation error types.
//!
//! The context never changes the session itself. `sign_in` and friends ask the
//! provider, and the provider publishes the resulting session to every
//! subscriber (including this context).

mod error;

pub use error::{AuthError, PasswordResetError, SignInError, SignUpError};

use std::sync::Arc;

use tracing::{info, instrument, warn};

use valfinds_core::Email;

use crate::identity::{IdentityError, IdentityProvider, Session, SessionSubscription};

/// Customer/admin authentication state for this device.
pub struct AuthContext {
    provider: Arc<dyn IdentityProvider>,
    /// Held for the lifetime of the context; dropping it unsubscribes.
    sessions: SessionSubscription,
    admin_email: Email,
}

impl AuthContext {
    /// Subscribe to `provider` and treat `admin_email` as the administrator.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, admin_email: Email) -> Self {
        let sessions = provider.on_session_changed();
        Self {
            provider,
            sessions,
            admin_email,
        }
    }

    /// The active session, if signed in.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.sessions.current()
    }

    /// Whether the active session belongs to the administrator.
    ///
    /// Exact, case-sensitive comparison against the configured address.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin_session().is_some()
    }

    /// The active session, only if it belongs to the administrator.
    #[must_use]
    pub fn admin_session(&self) -> Option<Session> {
        self.current_session()
            .filter(|session| session.email == self.admin_email)
    }

    /// A new subscription to session changes, for other consumers.
    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        self.provider.on_session_changed()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns a `SignInError` whose message is suitable for display.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, SignInError> {
        match self.provider.sign_in_with_password(email, password).await {
            Ok(session) => {
                info!(uid = %session.uid, "Signed in");
                Ok(session)
            }
            Err(e) => {
                let err = SignInError::from(e);
                if let SignInError::Unknown(source) = &err {
                    warn!(error = %source, "Sign-in failed");
                }
                Err(err)
            }
        }
    }

    /// Create an account; the new account is signed in.
    ///
    /// # Errors
    ///
    /// Returns a `SignUpError` whose message is suitable for display.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session, SignUpError> {
        match self.provider.create_account(email, password).await {
            Ok(session) => {
                info!(uid = %session.uid, "Account created");
                Ok(session)
            }
            Err(e) => {
                let err = SignUpError::from(e);
                if let SignUpError::Unknown(source) = &err {
                    warn!(error = %source, "Sign-up failed");
                }
                Err(err)
            }
        }
    }

    /// Ask the provider to email a password reset link.
    ///
    /// # Errors
    ///
    /// Returns a `PasswordResetError` whose message is suitable for display.
    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str) -> Result<(), PasswordResetError> {
        self.provider
            .send_password_reset(email)
            .await
            .map_err(|e| {
                let err = PasswordResetError::from(e);
                if let PasswordResetError::Unknown(source) = &err {
                    warn!(error = %source, "Password reset failed");
                }
                err
            })
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns the provider's error unchanged.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        self.provider.sign_out().await?;
        info!("Signed out");
        Ok(())
    }
}
