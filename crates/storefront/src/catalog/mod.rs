//! Product catalog: document store, image blob store, and the admin service
//! that composes them.
//!
//! # Architecture
//!
//! - [`CatalogStore`] holds product documents (`products` collection)
//! - [`BlobStore`] holds product images under `products/`
//! - [`CatalogService`] adds a product (upload image, then insert document)
//!   and deletes one (release image, then delete document)
//!
//! Products are immutable once created; there is no update operation.

mod firestore;
mod storage;

pub use firestore::FirestoreCatalog;
pub use storage::CloudStorageBlobs;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

use valfinds_core::{Price, ProductId};

/// Prefix for product image blobs.
const IMAGE_PREFIX: &str = "products";

/// Largest unit price an administrator may list.
pub const MAX_PRICE_UNITS: u64 = 1_000_000_000;

/// A product as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Store-assigned id.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Download URL of the product image.
    pub image: String,
}

/// Fields for a product that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub price: Price,
    pub image: String,
}

/// An image file submitted with a new product.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Original file name, used in the blob path.
    pub file_name: String,
    /// MIME type reported by the client.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    /// Object path inside the bucket.
    pub path: String,
    /// Access token embedded in download URLs, when known.
    pub download_token: Option<String>,
}

/// Errors from catalog and blob store operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Store returned an error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Product not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Product fields failed validation.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),
}

/// Document store holding product records.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every product currently in the catalog.
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError>;

    /// Ids of every product document, including ones that do not decode
    /// into a [`Product`].
    async fn product_ids(&self) -> Result<HashSet<ProductId>, CatalogError> {
        Ok(self
            .list_products()
            .await?
            .into_iter()
            .map(|product| product.id)
            .collect())
    }

    /// Store a product; the store assigns the id.
    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError>;

    /// Delete a product document.
    async fn delete_product(&self, id: &ProductId) -> Result<(), CatalogError>;
}

/// Object storage for product images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload bytes to `path`.
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobRef, CatalogError>;

    /// Public download URL for a blob.
    async fn resolve_url(&self, blob: &BlobRef) -> Result<Url, CatalogError>;

    /// Delete a blob.
    async fn delete(&self, blob: &BlobRef) -> Result<(), CatalogError>;

    /// Recover the blob reference from a download URL this store produced.
    fn blob_for_url(&self, url: &str) -> Option<BlobRef>;
}

/// Admin-facing catalog operations.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogStore>,
    blobs: Arc<dyn BlobStore>,
}

impl CatalogService {
    /// Create a new catalog service.
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { catalog, blobs }
    }

    /// List every product.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged.
    pub async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        self.catalog.list_products().await
    }

    /// Find a product by id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no product has that id.
    pub async fn find_product(&self, id: &ProductId) -> Result<Product, CatalogError> {
        self.catalog
            .list_products()
            .await?
            .into_iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Upload the image and create the product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidProduct` if the name is blank, the price
    /// is zero or above [`MAX_PRICE_UNITS`], or the image is empty. Store
    /// failures are returned unchanged.
    #[instrument(skip(self, image), fields(name = %name, file = %image.file_name))]
    pub async fn add_product(
        &self,
        name: &str,
        price: Price,
        image: ImageUpload,
    ) -> Result<Product, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::InvalidProduct("name is required".to_string()));
        }
        if price.is_zero() {
            return Err(CatalogError::InvalidProduct("price is required".to_string()));
        }
        if price > Price::from_units(MAX_PRICE_UNITS) {
            return Err(CatalogError::InvalidProduct(format!(
                "price must not exceed {MAX_PRICE_UNITS}"
            )));
        }
        if image.bytes.is_empty() {
            return Err(CatalogError::InvalidProduct("image is required".to_string()));
        }

        let path = image_path(&image.file_name, chrono::Utc::now().timestamp_millis());
        let blob = self
            .blobs
            .upload(&path, image.bytes, &image.content_type)
            .await?;
        let url = self.blobs.resolve_url(&blob).await?;

        let product = self
            .catalog
            .insert_product(NewProduct {
                name: name.to_owned(),
                price,
                image: url.to_string(),
            })
            .await?;

        info!(id = %product.id, "Product added");
        Ok(product)
    }

    /// Delete a product and release its image.
    ///
    /// A failure to delete the image is logged and does not stop the
    /// document from being deleted.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no product has that id, or the
    /// store's error if the document delete fails.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), CatalogError> {
        let product = self.find_product(id).await?;

        match self.blobs.blob_for_url(&product.image) {
            Some(blob) => {
                if let Err(e) = self.blobs.delete(&blob).await {
                    warn!(error = %e, path = %blob.path, "Failed to delete product image");
                }
            }
            None => warn!(image = %product.image, "Product image is not a stored blob"),
        }

        self.catalog.delete_product(id).await?;
        info!(%id, "Product deleted");
        Ok(())
    }
}

/// Blob path for an uploaded image: `products/{millis}_{file name}`.
fn image_path(file_name: &str, millis: i64) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!("{IMAGE_PREFIX}/{millis}_{base}")
}
