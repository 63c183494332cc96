//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                - Health check
//!
//! # Products
//! GET    /products              - Product listing
//! POST   /products              - Add product (admin, multipart: name, price, image)
//! DELETE /products/{id}         - Delete product and its image (admin)
//!
//! # Cart
//! GET    /cart                  - Items, count, total
//! POST   /cart/items            - Add one unit ({"product_id"}, requires session)
//! DELETE /cart/items/{id}       - Remove item (requires session)
//! DELETE /cart                  - Clear cart (requires session)
//! POST   /cart/checkout         - WhatsApp deep link, clears cart (requires session)
//!
//! # Auth
//! GET    /auth/session          - Session status and admin flag
//! POST   /auth/sign-in          - Sign in
//! POST   /auth/sign-up          - Create account
//! POST   /auth/reset-password   - Send password reset email
//! POST   /auth/sign-out         - Sign out
//!
//! # Admin auth
//! GET    /admin/auth            - Admin sign-in page state
//! POST   /admin/auth/sign-in    - Sign-in reserved for the administrator
//! ```

pub mod auth;
pub mod cart;
pub mod products;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Largest accepted product upload (image plus form fields).
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route("/{id}", delete(products::delete))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route("/items/{id}", delete(cart::remove))
        .route("/checkout", post(cart::checkout))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(auth::session))
        .route("/sign-in", post(auth::sign_in))
        .route("/sign-up", post(auth::sign_up))
        .route("/reset-password", post(auth::reset_password))
        .route("/sign-out", post(auth::sign_out))
}

/// Create the admin auth routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/auth", get(auth::admin_page))
        .route("/auth/sign-in", post(auth::admin_sign_in))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/auth", auth_routes())
        .nest("/admin", admin_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
