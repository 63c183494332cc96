//! Integration tests for the Val's Finds storefront.
//!
//! Tests drive the full router in-process with `tower::ServiceExt::oneshot`,
//! backed by the in-memory identity, catalog, blob and cart fakes that the
//! storefront exposes behind its `test-support` feature.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p valfinds-integration-tests
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;

use valfinds_core::{Email, Price, ProductId};
use valfinds_storefront::catalog::Product;
use valfinds_storefront::db::MemoryCartStorage;
use valfinds_storefront::services::checkout::CheckoutConfig;
use valfinds_storefront::state::{AppState, Ports, Settings};
use valfinds_storefront::testing::{InMemoryBlobs, InMemoryCatalog, InMemoryIdentity};

pub const ADMIN_EMAIL: &str = "val@valfinds.test";
pub const ADMIN_PASSWORD: &str = "admin-pass";
pub const CUSTOMER_EMAIL: &str = "jane@shop.test";
pub const CUSTOMER_PASSWORD: &str = "jane-pass";

const BOUNDARY: &str = "valfinds-test-boundary";

/// One part of a `multipart/form-data` body.
pub struct FormPart<'a> {
    pub name: &'a str,
    /// Set for file parts.
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub bytes: &'a [u8],
}

impl<'a> FormPart<'a> {
    /// A plain text field.
    #[must_use]
    pub const fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: None,
            bytes: value.as_bytes(),
        }
    }

    /// A file field.
    #[must_use]
    pub const fn file(
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    ) -> Self {
        Self {
            name,
            file_name: Some(file_name),
            content_type: Some(content_type),
            bytes,
        }
    }
}

/// Encode `parts` as a `multipart/form-data` body using [`BOUNDARY`].
fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match part.file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\n",
                part.name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// A storefront wired to in-memory services.
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub identity: Arc<InMemoryIdentity>,
    pub catalog: Arc<InMemoryCatalog>,
    pub blobs: Arc<InMemoryBlobs>,
    pub carts: Arc<MemoryCartStorage>,
}

/// A product with a whole-unit price.
#[must_use]
pub fn product(id: &str, name: &str, price: u64) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        price: Price::from_units(price),
        image: format!("https://blobs.test/o/products%2F{id}.jpg"),
    }
}

impl TestContext {
    /// Build a storefront with one customer, one administrator and three
    /// products: Jacket (1500), Scarf (250) and Hat (800).
    ///
    /// # Panics
    ///
    /// Panics if the admin email constant is not a valid address.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn new() -> Self {
        let identity = Arc::new(
            InMemoryIdentity::default()
                .with_account(CUSTOMER_EMAIL, CUSTOMER_PASSWORD)
                .with_account(ADMIN_EMAIL, ADMIN_PASSWORD),
        );
        let catalog = Arc::new(InMemoryCatalog::default());
        catalog.seed([
            product("p1", "Jacket", 1500),
            product("p2", "Scarf", 250),
            product("p3", "Hat", 800),
        ]);
        let blobs = Arc::new(InMemoryBlobs::default());
        let carts = Arc::new(MemoryCartStorage::default());

        let state = AppState::new(
            Ports {
                identity: identity.clone(),
                catalog: catalog.clone(),
                blobs: blobs.clone(),
                carts: carts.clone(),
            },
            Settings {
                admin_email: Email::parse(ADMIN_EMAIL).unwrap(),
                reconcile_interval: Duration::from_secs(300),
                checkout: CheckoutConfig {
                    store_name: "Val's Finds".to_string(),
                    currency: "KES".to_string(),
                    whatsapp_number: "+254700000000".to_string(),
                },
            },
        );

        Self {
            app: valfinds_storefront::app(state.clone()),
            state,
            identity,
            catalog,
            blobs,
            carts,
        }
    }

    /// Send a request and return the status with the body parsed as JSON
    /// (`Value::Null` for an empty or non-JSON body).
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::unwrap_used)]
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        json: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match json {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    /// Send a `multipart/form-data` POST and return the status with the
    /// body parsed as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::unwrap_used)]
    pub async fn send_form(
        &self,
        uri: &str,
        parts: &[FormPart<'_>],
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    /// Send a request and return the raw body as text.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::unwrap_used)]
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Sign in through the customer endpoint.
    ///
    /// # Panics
    ///
    /// Panics if sign-in does not succeed.
    pub async fn sign_in(&self, email: &str, password: &str) {
        let (status, body) = self
            .send(
                "POST",
                "/auth/sign-in",
                Some(serde_json::json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "sign-in failed: {body}");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
