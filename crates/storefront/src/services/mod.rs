//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Session tracking, admin flag, sign-in/sign-up/reset/sign-out
//! - `cart` - Device-local cart with persistence and catalog reconciliation
//! - `checkout` - Order message and WhatsApp deep link

pub mod auth;
pub mod cart;
pub mod checkout;
