//! Product route handlers.

use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::Field},
    http::StatusCode,
};
use serde::Serialize;
use tracing::instrument;

use valfinds_core::{Price, ProductId};

use crate::catalog::{CatalogError, ImageUpload, Product};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

const LOAD_FAILED: &str = "Failed to load products";
const ADD_FAILED: &str = "Failed to add product";
const DELETE_FAILED: &str = "Failed to delete product";

/// Product listing response.
#[derive(Debug, Serialize)]
pub struct ProductsView {
    pub products: Vec<Product>,
    /// Whether admin controls (add/delete) should be shown.
    pub is_admin: bool,
}

/// List every product.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<ProductsView>> {
    let products = state
        .catalog()
        .list_products()
        .await
        .map_err(|e| AppError::catalog(LOAD_FAILED, e))?;

    Ok(Json(ProductsView {
        products,
        is_admin: state.auth().is_admin(),
    }))
}

/// Fields of the add-product form.
#[derive(Default)]
struct ProductForm {
    name: Option<String>,
    price: Option<String>,
    image: Option<ImageUpload>,
}

impl ProductForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("name") => form.name = Some(text(field).await?),
                Some("price") => form.price = Some(text(field).await?),
                Some("image") => {
                    let file_name = field.file_name().unwrap_or("image").to_owned();
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_owned();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    form.image = Some(ImageUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

async fn text(field: Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

fn incomplete(what: &str) -> AppError {
    AppError::catalog(ADD_FAILED, CatalogError::InvalidProduct(what.to_string()))
}

/// Add a product from a multipart form with `name`, `price` and `image`.
#[instrument(skip(state, _admin, multipart))]
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Product>)> {
    let form = ProductForm::read(multipart).await?;

    let name = form.name.ok_or_else(|| incomplete("name is required"))?;
    let price: Price = form
        .price
        .as_deref()
        .ok_or_else(|| incomplete("price is required"))?
        .parse()
        .map_err(|e| incomplete(&format!("price: {e}")))?;
    let image = form.image.ok_or_else(|| incomplete("image is required"))?;

    let product = state
        .catalog()
        .add_product(&name, price, image)
        .await
        .map_err(|e| AppError::catalog(ADD_FAILED, e))?;

    Ok((StatusCode::CREATED, Json(product)))
}

/// Delete a product and its image.
#[instrument(skip(state, _admin))]
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state
        .catalog()
        .delete_product(&ProductId::new(id))
        .await
        .map_err(|e| AppError::catalog(DELETE_FAILED, e))?;

    Ok(StatusCode::NO_CONTENT)
}
