//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Responses carry a JSON body `{"error": "...", "redirect": "/auth"}`; the
//! `redirect` field is present only when the client should navigate away.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::services::auth::{AuthError, PasswordResetError, SignInError, SignUpError};
use crate::services::checkout::CheckoutError;

/// Where unauthenticated and non-admin clients are sent.
pub const SIGN_IN_PATH: &str = "/auth";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Catalog or blob store operation failed; `message` is shown to the user.
    #[error("{message}: {source}")]
    Catalog {
        message: &'static str,
        #[source]
        source: CatalogError,
    },

    /// Checkout could not start.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Action requires a signed-in user.
    #[error("Sign-in required")]
    SignInRequired,

    /// Action requires the administrator.
    #[error("Administrator required")]
    AdminOnly,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'static str>,
}

impl AppError {
    /// Wrap a catalog failure with the message shown to the user.
    #[must_use]
    pub const fn catalog(message: &'static str, source: CatalogError) -> Self {
        Self::Catalog { message, source }
    }

    const fn is_server_error(&self) -> bool {
        match self {
            Self::Auth(err) => !err.is_user_error(),
            Self::Catalog { source, .. } => {
                !matches!(source, CatalogError::InvalidProduct(_) | CatalogError::NotFound(_))
            }
            Self::Internal(_) => true,
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Auth(err) => match err {
                AuthError::SignIn(
                    SignInError::InvalidCredential
                    | SignInError::UserNotFound
                    | SignInError::WrongPassword,
                ) => StatusCode::UNAUTHORIZED,
                AuthError::SignUp(SignUpError::EmailAlreadyInUse) => StatusCode::CONFLICT,
                AuthError::SignUp(SignUpError::WeakPassword)
                | AuthError::PasswordReset(PasswordResetError::InvalidEmail) => {
                    StatusCode::BAD_REQUEST
                }
                AuthError::PasswordReset(PasswordResetError::UserNotFound) => {
                    StatusCode::NOT_FOUND
                }
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Catalog { source, .. } => match source {
                CatalogError::InvalidProduct(_) => StatusCode::BAD_REQUEST,
                CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Checkout(CheckoutError::SignInRequired) | Self::SignInRequired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Checkout(CheckoutError::EmptyCart) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::AdminOnly => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the user.
    fn public_message(&self) -> String {
        match self {
            Self::Auth(AuthError::SignOut(_)) => {
                "Failed to sign out. Please try again later.".to_string()
            }
            Self::Auth(err) => err.to_string(),
            Self::Catalog { source, message } => match source {
                CatalogError::InvalidProduct(_) => "Please fill all fields".to_string(),
                CatalogError::NotFound(_) => "Product not found".to_string(),
                _ => (*message).to_string(),
            },
            Self::Checkout(err) => err.to_string(),
            Self::SignInRequired => "Please sign in to continue.".to_string(),
            Self::AdminOnly => "This page is for administrators only.".to_string(),
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::BadRequest(msg) => msg.clone(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    const fn redirect(&self) -> Option<&'static str> {
        match self {
            Self::Checkout(CheckoutError::SignInRequired)
            | Self::SignInRequired
            | Self::AdminOnly => Some(SIGN_IN_PATH),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = ErrorBody {
            error: self.public_message(),
            redirect: self.redirect(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
