//! Cart line items.

use serde::{Deserialize, Serialize};

use valfinds_core::{Price, ProductId};

use crate::catalog::Product;

/// One line of the cart: a product snapshot plus a quantity.
///
/// The product fields are copied at add time so the cart can be shown and
/// checked out without reaching the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product id; unique within a cart.
    pub id: ProductId,
    pub name: String,
    /// Unit price.
    pub price: Price,
    pub image: String,
    /// Always at least 1.
    pub quantity: u32,
}

impl CartItem {
    /// A new line for `product` at quantity 1.
    #[must_use]
    pub fn from_product(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            image: product.image.clone(),
            quantity: 1,
        }
    }

    /// `price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }
}
