//! Authentication extractors.
//!
//! Gate handlers on the device's session. Authorization here is
//! presentation-level: the backing stores are not told who is asking.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::identity::Session;
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// Rejects with 401 and a redirect to the sign-in page.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireSession(session): RequireSession) -> String {
///     format!("Hello, {}!", session.email)
/// }
/// ```
pub struct RequireSession(pub Session);

impl FromRequestParts<AppState> for RequireSession {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .auth()
            .current_session()
            .map(Self)
            .ok_or(AppError::SignInRequired)
    }
}

/// Extractor that requires the administrator.
///
/// Rejects with 403 and a redirect to the sign-in page, whether the caller is
/// signed out or signed in as someone else.
pub struct RequireAdmin(pub Session);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .auth()
            .admin_session()
            .map(Self)
            .ok_or(AppError::AdminOnly)
    }
}
