//! Val's Finds Core - Shared types library.
//!
//! This crate provides the domain types used by the storefront and its tests:
//! identifiers handed out by the identity provider and the catalog store,
//! email addresses, and decimal prices.
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps it
//! lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, and emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
