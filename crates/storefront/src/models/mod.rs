//! Domain models for the storefront.
//!
//! Products live in [`crate::catalog`]; this module holds the device-local
//! cart types.

mod cart;

pub use cart::CartItem;
