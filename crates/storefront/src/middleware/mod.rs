//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, transaction per route)
//! 2. `TraceLayer` (request tracing)
//! 3. Body limit (product image uploads)
//!
//! Session gating is done by the extractors in [`auth`], not by a layer: the
//! device has exactly one session, owned by the auth context.

pub mod auth;

pub use auth::{RequireAdmin, RequireSession};
