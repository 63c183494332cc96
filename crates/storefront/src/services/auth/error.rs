//! Authentication error types.
//!
//! Each operation has its own closed error set. `Display` is the message shown
//! to the user; the provider failure behind an `Unknown` is kept as the source
//! for logging.

use thiserror::Error;

use crate::identity::{IdentityError, ProviderCode};

/// Errors from [`super::AuthContext::sign_in`].
#[derive(Debug, Error)]
pub enum SignInError {
    #[error("Invalid email or password. Please check your credentials and try again.")]
    InvalidCredential,

    #[error("No user found with this email. Please check if you have registered.")]
    UserNotFound,

    #[error("Incorrect password. Please try again.")]
    WrongPassword,

    #[error("Failed to sign in. Please try again later.")]
    Unknown(#[source] IdentityError),
}

impl From<IdentityError> for SignInError {
    fn from(err: IdentityError) -> Self {
        match err.code() {
            Some(ProviderCode::InvalidCredential) => Self::InvalidCredential,
            Some(ProviderCode::UserNotFound) => Self::UserNotFound,
            Some(ProviderCode::WrongPassword) => Self::WrongPassword,
            _ => Self::Unknown(err),
        }
    }
}

/// Errors from [`super::AuthContext::sign_up`].
#[derive(Debug, Error)]
pub enum SignUpError {
    #[error("This email is already registered. Please use a different email or try logging in.")]
    EmailAlreadyInUse,

    #[error("Password is too weak. Please use a stronger password.")]
    WeakPassword,

    #[error("Failed to create account. Please try again later.")]
    Unknown(#[source] IdentityError),
}

impl From<IdentityError> for SignUpError {
    fn from(err: IdentityError) -> Self {
        match err.code() {
            Some(ProviderCode::EmailAlreadyInUse) => Self::EmailAlreadyInUse,
            Some(ProviderCode::WeakPassword) => Self::WeakPassword,
            _ => Self::Unknown(err),
        }
    }
}

/// Errors from [`super::AuthContext::reset_password`].
#[derive(Debug, Error)]
pub enum PasswordResetError {
    #[error("No account found with this email address.")]
    UserNotFound,

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Failed to send password reset email. Please try again later.")]
    Unknown(#[source] IdentityError),
}

impl From<IdentityError> for PasswordResetError {
    fn from(err: IdentityError) -> Self {
        match err.code() {
            Some(ProviderCode::UserNotFound) => Self::UserNotFound,
            Some(ProviderCode::InvalidEmail) => Self::InvalidEmail,
            _ => Self::Unknown(err),
        }
    }
}

/// Any authentication failure.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    SignIn(#[from] SignInError),

    #[error(transparent)]
    SignUp(#[from] SignUpError),

    #[error(transparent)]
    PasswordReset(#[from] PasswordResetError),

    /// Sign-out failed; the provider error is passed through unchanged.
    #[error(transparent)]
    SignOut(#[from] IdentityError),
}

impl AuthError {
    /// Whether the failure was the user's input rather than the provider or
    /// the network.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Self::SignIn(SignInError::Unknown(_))
                | Self::SignUp(SignUpError::Unknown(_))
                | Self::PasswordReset(PasswordResetError::Unknown(_))
                | Self::SignOut(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: ProviderCode) -> IdentityError {
        IdentityError::Rejected(code)
    }

    #[test]
    fn test_sign_in_messages() {
        let cases = [
            (
                ProviderCode::InvalidCredential,
                "Invalid email or password. Please check your credentials and try again.",
            ),
            (
                ProviderCode::UserNotFound,
                "No user found with this email. Please check if you have registered.",
            ),
            (ProviderCode::WrongPassword, "Incorrect password. Please try again."),
            (
                ProviderCode::WeakPassword,
                "Failed to sign in. Please try again later.",
            ),
            (
                ProviderCode::Other("TOO_MANY_ATTEMPTS_TRY_LATER".to_string()),
                "Failed to sign in. Please try again later.",
            ),
        ];

        for (code, message) in cases {
            assert_eq!(SignInError::from(rejected(code)).to_string(), message);
        }
    }

    #[test]
    fn test_sign_in_transport_failure_is_unknown() {
        let err = SignInError::from(IdentityError::Parse("bad body".to_string()));
        assert!(matches!(err, SignInError::Unknown(IdentityError::Parse(_))));
    }

    #[test]
    fn test_sign_up_messages() {
        assert_eq!(
            SignUpError::from(rejected(ProviderCode::EmailAlreadyInUse)).to_string(),
            "This email is already registered. Please use a different email or try logging in."
        );
        assert_eq!(
            SignUpError::from(rejected(ProviderCode::WeakPassword)).to_string(),
            "Password is too weak. Please use a stronger password."
        );
        assert_eq!(
            SignUpError::from(rejected(ProviderCode::InvalidEmail)).to_string(),
            "Failed to create account. Please try again later."
        );
    }

    #[test]
    fn test_password_reset_messages() {
        assert_eq!(
            PasswordResetError::from(rejected(ProviderCode::UserNotFound)).to_string(),
            "No account found with this email address."
        );
        assert_eq!(
            PasswordResetError::from(rejected(ProviderCode::InvalidEmail)).to_string(),
            "Please enter a valid email address."
        );
        assert_eq!(
            PasswordResetError::from(rejected(ProviderCode::WrongPassword)).to_string(),
            "Failed to send password reset email. Please try again later."
        );
    }

    #[test]
    fn test_is_user_error() {
        assert!(AuthError::from(SignInError::WrongPassword).is_user_error());
        assert!(
            !AuthError::from(SignUpError::Unknown(IdentityError::Parse(String::new())))
                .is_user_error()
        );
        assert!(!AuthError::from(IdentityError::Parse(String::new())).is_user_error());
    }
}
