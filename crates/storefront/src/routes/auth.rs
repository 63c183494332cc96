//! Authentication route handlers.
//!
//! Customer sign-in/sign-up/reset under `/auth`, and the administrator
//! sign-in under `/admin/auth`.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use valfinds_core::Email;

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::identity::Session;
use crate::services::auth::AuthError;
use crate::state::AppState;

/// Session status for the client.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub signed_in: bool,
    pub email: Option<Email>,
    pub is_admin: bool,
    /// Where the client should go next, if anywhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<&'static str>,
}

impl SessionView {
    fn of(state: &AppState) -> Self {
        let auth = state.auth();
        let session = auth.current_session();
        Self {
            signed_in: session.is_some(),
            is_admin: auth.is_admin(),
            email: session.map(|s| s.email),
            redirect: None,
        }
    }

    fn redirect_to(mut self, path: &'static str) -> Self {
        self.redirect = Some(path);
        self
    }
}

/// Email and password form.
#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Password reset form.
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

/// Confirmation message.
#[derive(Debug, Serialize)]
pub struct Notice {
    pub message: &'static str,
}

fn signed_in(session: &Session) {
    set_sentry_user(&session.uid, Some(session.email.as_str()));
}

/// Current session status.
pub async fn session(State(state): State<AppState>) -> Json<SessionView> {
    Json(SessionView::of(&state))
}

/// Sign in with email and password.
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(form): Json<Credentials>,
) -> Result<Json<SessionView>> {
    let session = state
        .auth()
        .sign_in(&form.email, &form.password)
        .await
        .map_err(AuthError::from)?;
    signed_in(&session);

    Ok(Json(SessionView::of(&state).redirect_to("/")))
}

/// Create an account and sign it in.
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(form): Json<Credentials>,
) -> Result<(StatusCode, Json<SessionView>)> {
    let session = state
        .auth()
        .sign_up(&form.email, &form.password)
        .await
        .map_err(AuthError::from)?;
    signed_in(&session);

    Ok((
        StatusCode::CREATED,
        Json(SessionView::of(&state).redirect_to("/")),
    ))
}

/// Send a password reset email.
#[instrument(skip(state))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(form): Json<ResetRequest>,
) -> Result<Json<Notice>> {
    state
        .auth()
        .reset_password(&form.email)
        .await
        .map_err(AuthError::from)?;

    Ok(Json(Notice {
        message: "Password reset email sent. Please check your inbox.",
    }))
}

/// End the session.
#[instrument(skip(state))]
pub async fn sign_out(State(state): State<AppState>) -> Result<StatusCode> {
    state.auth().sign_out().await.map_err(AuthError::from)?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// Administrator sign-in page state.
///
/// Signed out: the form is shown. Administrator: go to the storefront.
/// Anyone else: refused with a notice and sent to the customer sign-in.
pub async fn admin_page(State(state): State<AppState>) -> Result<Json<SessionView>> {
    let view = SessionView::of(&state);
    match (view.signed_in, view.is_admin) {
        (false, _) => Ok(Json(view)),
        (true, true) => Ok(Json(view.redirect_to("/"))),
        (true, false) => Err(AppError::AdminOnly),
    }
}

/// Sign-in reserved for the administrator.
///
/// A non-admin account that signs in here stays signed in but is refused.
#[instrument(skip(state, form), fields(email = %form.email))]
pub async fn admin_sign_in(
    State(state): State<AppState>,
    Json(form): Json<Credentials>,
) -> Result<Json<SessionView>> {
    let session = state
        .auth()
        .sign_in(&form.email, &form.password)
        .await
        .map_err(AuthError::from)?;
    signed_in(&session);

    let view = SessionView::of(&state);
    if !view.is_admin {
        return Err(AppError::AdminOnly);
    }
    Ok(Json(view.redirect_to("/")))
}
