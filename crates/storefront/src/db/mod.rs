//! Device-local persistence for per-user carts.
//!
//! # Layout
//!
//! One slot per user, keyed `cart_{uid}`:
//!
//! - [`FileCartStorage`] - `{data_dir}/carts/cart_{uid}.json`
//! - [`MemoryCartStorage`] - process-local map, for ephemeral devices and tests
//!
//! A slot holds the JSON array of [`CartItem`]s in insertion order. The cart
//! context is the single writer for the signed-in user's slot.

mod carts;

pub use carts::{FileCartStorage, MemoryCartStorage};

use thiserror::Error;

use valfinds_core::UserId;

use crate::models::CartItem;

/// Errors reading or writing a cart slot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem failure.
    #[error("cart storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Slot exists but does not hold a cart.
    #[error("malformed cart data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Per-user cart slot storage.
///
/// Synchronous: slots are small local files, and the cart context must
/// finish a `remove` before `clear_cart` returns.
pub trait CartStorage: Send + Sync {
    /// Load a user's cart; `Ok(None)` when the slot is absent.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` on I/O failure or malformed data.
    fn load(&self, owner: &UserId) -> Result<Option<Vec<CartItem>>, PersistenceError>;

    /// Overwrite a user's slot with the full cart.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the slot cannot be written.
    fn save(&self, owner: &UserId, items: &[CartItem]) -> Result<(), PersistenceError>;

    /// Delete a user's slot. Removing an absent slot succeeds.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Io` if the slot exists and cannot be removed.
    fn remove(&self, owner: &UserId) -> Result<(), PersistenceError>;
}

/// Slot key for a user: `cart_{uid}`, restricted to filename-safe characters.
#[must_use]
pub fn slot_key(owner: &UserId) -> String {
    let uid: String = owner
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("cart_{uid}")
}
