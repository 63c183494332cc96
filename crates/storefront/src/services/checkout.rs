//! WhatsApp checkout handoff.
//!
//! Checkout is not a payment: it turns the cart into a plain-text order
//! message, wraps it in a `wa.me` deep link addressed to the store, and
//! empties the cart.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use valfinds_core::Price;

use crate::config::whatsapp_digits;
use crate::models::CartItem;
use crate::services::auth::AuthContext;
use crate::services::cart::CartContext;

/// Store identity used in the order message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutConfig {
    pub store_name: String,
    /// Currency code printed before every amount.
    pub currency: String,
    /// Recipient in international format; non-digits are dropped in links.
    pub whatsapp_number: String,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLink {
    /// Deep link that opens WhatsApp with the message prefilled.
    pub url: String,
    pub message: String,
    pub total: Price,
}

/// Reasons checkout cannot start.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Please sign in to check out.")]
    SignInRequired,

    #[error("Your shopping bag is empty.")]
    EmptyCart,
}

/// The order message for `items`.
#[must_use]
pub fn compose_order(items: &[CartItem], config: &CheckoutConfig) -> String {
    let currency = &config.currency;
    let lines = items
        .iter()
        .map(|item| format!("{} - {currency} {} ({}x)", item.name, item.price, item.quantity))
        .collect::<Vec<_>>()
        .join("\n");
    let total: Price = items.iter().map(CartItem::line_total).sum();

    format!(
        "Hello! I'm interested in purchasing the following items from {}:\n\n{lines}\n\nTotal: {currency} {total}",
        config.store_name
    )
}

/// `https://wa.me/{digits}?text={message}`.
#[must_use]
pub fn whatsapp_link(number: &str, message: &str) -> String {
    format!(
        "https://wa.me/{}?text={}",
        whatsapp_digits(number),
        urlencoding::encode(message)
    )
}

/// Empty the signed-in user's cart and build the deep link for what it held.
///
/// # Errors
///
/// Returns `CheckoutError::SignInRequired` with no session and
/// `CheckoutError::EmptyCart` when there is nothing to order.
pub fn checkout(
    auth: &AuthContext,
    cart: &CartContext,
    config: &CheckoutConfig,
) -> Result<CheckoutLink, CheckoutError> {
    let session = auth.current_session().ok_or(CheckoutError::SignInRequired)?;

    // Taken under one lock so nothing added meanwhile is cleared unseen
    let items = cart.take_items();
    if items.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let message = compose_order(&items, config);
    let link = CheckoutLink {
        url: whatsapp_link(&config.whatsapp_number, &message),
        total: items.iter().map(CartItem::line_total).sum(),
        message,
    };

    info!(uid = %session.uid, items = items.len(), total = %link.total, "Checkout handed off");
    Ok(link)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::catalog::Product;
    use crate::db::MemoryCartStorage;
    use crate::testing::{InMemoryCatalog, InMemoryIdentity};
    use valfinds_core::{Email, ProductId};

    fn config() -> CheckoutConfig {
        CheckoutConfig {
            store_name: "Val's Finds and Thrifts".to_string(),
            currency: "KES".to_string(),
            whatsapp_number: "+254717514698".to_string(),
        }
    }

    fn item(id: &str, name: &str, price: &str, quantity: u32) -> CartItem {
        CartItem {
            id: ProductId::new(id),
            name: name.to_string(),
            price: price.parse().unwrap(),
            image: String::new(),
            quantity,
        }
    }

    #[test]
    fn test_compose_order() {
        let items = [item("p1", "Jacket", "1500", 2), item("p2", "Scarf", "250", 1)];

        assert_eq!(
            compose_order(&items, &config()),
            "Hello! I'm interested in purchasing the following items from Val's Finds and Thrifts:\n\n\
             Jacket - KES 1500 (2x)\n\
             Scarf - KES 250 (1x)\n\n\
             Total: KES 3250"
        );
    }

    #[test]
    fn test_compose_order_decimal_prices() {
        let items = [item("p1", "Socks", "99.50", 3)];
        let message = compose_order(&items, &config());
        assert!(message.contains("Socks - KES 99.5 (3x)"));
        assert!(message.ends_with("Total: KES 298.5"));
    }

    #[test]
    fn test_whatsapp_link() {
        let link = whatsapp_link("+254717514698", "Hi there!\nTotal: KES 10");
        assert_eq!(
            link,
            "https://wa.me/254717514698?text=Hi%20there%21%0ATotal%3A%20KES%2010"
        );
    }

    #[tokio::test]
    async fn test_checkout_flow() {
        let identity =
            Arc::new(InMemoryIdentity::default().with_account("jane@shop.test", "pw-jane"));
        let catalog = Arc::new(InMemoryCatalog::default());
        let jacket = Product {
            id: ProductId::new("p1"),
            name: "Jacket".to_string(),
            price: Price::from_units(1500),
            image: "https://img/p1.jpg".to_string(),
        };
        catalog.seed([jacket.clone()]);

        let auth = AuthContext::new(identity.clone(), Email::parse("admin@valfinds.com").unwrap());
        let storage = Arc::new(MemoryCartStorage::default());
        let cart = CartContext::start(
            auth.subscribe(),
            catalog,
            storage.clone(),
            Duration::from_secs(300),
        );

        assert_eq!(
            checkout(&auth, &cart, &config()),
            Err(CheckoutError::SignInRequired)
        );

        let session = auth.sign_in("jane@shop.test", "pw-jane").await.unwrap();
        assert_eq!(checkout(&auth, &cart, &config()), Err(CheckoutError::EmptyCart));

        cart.add_to_cart(&jacket);
        cart.add_to_cart(&jacket);
        let link = checkout(&auth, &cart, &config()).unwrap();

        assert_eq!(link.total, Price::from_units(3000));
        assert!(link.url.starts_with("https://wa.me/254717514698?text=Hello%21"));
        assert!(link.message.contains("Jacket - KES 1500 (2x)"));
        assert!(cart.items().is_empty());
        assert!(!storage.contains(&session.uid));

        // The next checkout sees only what was added after the handoff
        cart.add_to_cart(&jacket);
        let next = checkout(&auth, &cart, &config()).unwrap();
        assert!(next.message.contains("Jacket - KES 1500 (1x)"));
    }
}
