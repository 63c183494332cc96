//! Firestore REST adapter for the `products` collection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use valfinds_core::{Price, ProductId};

use super::{CatalogError, CatalogStore, NewProduct, Product};
use crate::config::FirebaseConfig;
use crate::identity::TokenSource;

/// Firestore API base URL.
const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

/// Collection holding product documents.
const COLLECTION: &str = "products";

/// Documents fetched per page when listing.
const PAGE_SIZE: u32 = 300;

/// Firestore-backed [`CatalogStore`].
#[derive(Clone)]
pub struct FirestoreCatalog {
    client: reqwest::Client,
    /// `.../documents/products`
    collection_url: String,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct Document {
    /// Full resource name ending in `/products/{id}`.
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl FirestoreCatalog {
    /// Create a new Firestore catalog client.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Http` if the HTTP client cannot be built.
    pub fn new(
        config: &FirebaseConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            collection_url: format!(
                "{FIRESTORE_URL}/projects/{}/databases/(default)/documents/{COLLECTION}",
                config.project_id
            ),
            tokens,
        })
    }

    /// Attach the bearer token, if signed in.
    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.bearer_token().await {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CatalogError> {
        let response = self.authorize(request).await.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(response.url().path().to_owned()));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        Ok(response)
    }

    /// Every document in the collection, following page tokens.
    async fn fetch_documents(&self) -> Result<Vec<Document>, CatalogError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{}?pageSize={PAGE_SIZE}", self.collection_url);
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&urlencoding::encode(token));
            }

            let page: ListResponse = self
                .send(self.client.get(&url))
                .await?
                .json()
                .await?;
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl CatalogStore for FirestoreCatalog {
    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        let documents = self.fetch_documents().await?;
        let products: Vec<_> = documents
            .iter()
            .filter_map(|document| match decode_product(document) {
                Ok(product) => Some(product),
                Err(e) => {
                    warn!(document = %document.name, error = %e, "Skipping malformed product");
                    None
                }
            })
            .collect();

        debug!(count = products.len(), "Listed products");
        Ok(products)
    }

    #[instrument(skip(self))]
    async fn product_ids(&self) -> Result<HashSet<ProductId>, CatalogError> {
        let documents = self.fetch_documents().await?;
        Ok(document_ids(&documents))
    }

    #[instrument(skip(self, product), fields(name = %product.name))]
    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        let body = encode_product(&product, chrono::Utc::now());
        let document: Document = self
            .send(self.client.post(&self.collection_url).json(&body))
            .await?
            .json()
            .await?;

        Ok(Product {
            id: document_id(&document.name)?,
            name: product.name,
            price: product.price,
            image: product.image,
        })
    }

    #[instrument(skip(self))]
    async fn delete_product(&self, id: &ProductId) -> Result<(), CatalogError> {
        let url = format!(
            "{}/{}",
            self.collection_url,
            urlencoding::encode(id.as_str())
        );
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}

/// The trailing segment of a document resource name.
fn document_id(name: &str) -> Result<ProductId, CatalogError> {
    name.rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(ProductId::from)
        .ok_or_else(|| CatalogError::Parse(format!("document name without id: {name}")))
}

/// Ids of `documents`, whether or not their fields decode.
fn document_ids(documents: &[Document]) -> HashSet<ProductId> {
    documents
        .iter()
        .filter_map(|document| document_id(&document.name).ok())
        .collect()
}

fn string_field<'a>(fields: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key)?.get("stringValue")?.as_str()
}

/// Read a Firestore number, stored either as `integerValue` (a string) or
/// `doubleValue`.
fn decimal_field(fields: &HashMap<String, Value>, key: &str) -> Option<Decimal> {
    let value = fields.get(key)?;
    if let Some(int) = value.get("integerValue") {
        return int.as_str()?.parse::<i64>().ok().map(Decimal::from);
    }
    let double = value.get("doubleValue")?.as_f64()?;
    Decimal::try_from(double).ok()
}

fn decode_product(document: &Document) -> Result<Product, CatalogError> {
    let missing = |field: &str| CatalogError::Parse(format!("missing or invalid field {field}"));

    let name = string_field(&document.fields, "name").ok_or_else(|| missing("name"))?;
    let image = string_field(&document.fields, "image").ok_or_else(|| missing("image"))?;
    let amount = decimal_field(&document.fields, "price").ok_or_else(|| missing("price"))?;
    let price = Price::new(amount).map_err(|e| CatalogError::Parse(format!("price: {e}")))?;

    Ok(Product {
        id: document_id(&document.name)?,
        name: name.to_owned(),
        price,
        image: image.to_owned(),
    })
}

fn encode_price(price: Price) -> Value {
    let amount = price.amount();
    match amount.fract().is_zero().then(|| amount.to_i64()).flatten() {
        Some(units) => json!({ "integerValue": units.to_string() }),
        None => json!({ "doubleValue": amount.to_f64().unwrap_or_default() }),
    }
}

fn encode_product(product: &NewProduct, created_at: chrono::DateTime<chrono::Utc>) -> Value {
    json!({
        "fields": {
            "name": { "stringValue": product.name },
            "price": encode_price(product.price),
            "image": { "stringValue": product.image },
            "createdAt": { "timestampValue": created_at.to_rfc3339() },
        }
    })
}
