//! Cart route handlers.
//!
//! The cart lives on this device and belongs to whoever is signed in. Every
//! mutation and checkout requires a session; reading an empty cart does not.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use valfinds_core::{Price, ProductId};

use crate::catalog::CatalogError;
use crate::error::{AppError, Result};
use crate::middleware::RequireSession;
use crate::models::CartItem;
use crate::services::checkout::{self, CheckoutLink};
use crate::state::AppState;

/// Cart display data.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub total: Price,
    pub currency: String,
}

impl CartView {
    fn of(state: &AppState) -> Self {
        let cart = state.cart();
        Self {
            items: cart.items(),
            item_count: cart.item_count(),
            total: cart.total(),
            currency: state.checkout().currency.clone(),
        }
    }
}

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product_id: ProductId,
}

/// Show the cart.
pub async fn show(State(state): State<AppState>) -> Json<CartView> {
    Json(CartView::of(&state))
}

/// Add one unit of a catalog product.
#[instrument(skip(state, _session))]
pub async fn add(
    State(state): State<AppState>,
    _session: RequireSession,
    Json(body): Json<AddItem>,
) -> Result<Json<CartView>> {
    let product = state
        .catalog()
        .find_product(&body.product_id)
        .await
        .map_err(|e| match e {
            CatalogError::NotFound(_) => AppError::NotFound(format!("product {}", body.product_id)),
            other => AppError::catalog("Failed to load products", other),
        })?;

    if !state.cart().add_to_cart(&product) {
        // Signed out between the extractor and the add.
        return Err(AppError::SignInRequired);
    }

    Ok(Json(CartView::of(&state)))
}

/// Remove an item regardless of quantity.
#[instrument(skip(state, _session))]
pub async fn remove(
    State(state): State<AppState>,
    _session: RequireSession,
    Path(id): Path<String>,
) -> Json<CartView> {
    state.cart().remove_from_cart(&ProductId::new(id));
    Json(CartView::of(&state))
}

/// Empty the cart.
#[instrument(skip(state, _session))]
pub async fn clear(State(state): State<AppState>, _session: RequireSession) -> Json<CartView> {
    state.cart().clear_cart();
    Json(CartView::of(&state))
}

/// Hand the cart off to WhatsApp and empty it.
#[instrument(skip(state))]
pub async fn checkout(State(state): State<AppState>) -> Result<Json<CheckoutLink>> {
    let link = checkout::checkout(state.auth(), state.cart(), state.checkout())?;
    Ok(Json(link))
}
