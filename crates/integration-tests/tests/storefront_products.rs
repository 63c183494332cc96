//! Integration tests for product listing and administration over HTTP.

use axum::http::StatusCode;

use valfinds_integration_tests::{
    ADMIN_EMAIL, ADMIN_PASSWORD, CUSTOMER_EMAIL, CUSTOMER_PASSWORD, FormPart, TestContext,
};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

fn coat_form(price: &str) -> Vec<FormPart<'_>> {
    vec![
        FormPart::text("name", "Wool Coat"),
        FormPart::text("price", price),
        FormPart::file("image", "coat.jpg", "image/jpeg", JPEG),
    ]
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_list_products() {
    let ctx = TestContext::new();

    let (status, body) = ctx.send("GET", "/products", None).await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body["products"]
        .as_array()
        .map(|products| {
            products
                .iter()
                .filter_map(|p| p["name"].as_str())
                .collect()
        })
        .unwrap_or_default();
    assert_eq!(names, vec!["Jacket", "Scarf", "Hat"]);
    assert_eq!(body["products"][0]["price"], "1500");
    assert_eq!(body["is_admin"], false);
}

#[tokio::test]
async fn test_list_products_shows_admin_controls() {
    let ctx = TestContext::new();
    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (_, body) = ctx.send("GET", "/products", None).await;

    assert_eq!(body["is_admin"], true);
}

#[tokio::test]
async fn test_list_products_failure() {
    let ctx = TestContext::new();
    ctx.catalog.fail(true);

    let (status, body) = ctx.send("GET", "/products", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Failed to load products");
}

// =============================================================================
// Deleting products
// =============================================================================

#[tokio::test]
async fn test_delete_product_requires_admin() {
    let ctx = TestContext::new();

    let (status, _) = ctx.send("DELETE", "/products/p1", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    ctx.sign_in(CUSTOMER_EMAIL, CUSTOMER_PASSWORD).await;
    let (status, body) = ctx.send("DELETE", "/products/p1", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["redirect"], "/auth");
}

#[tokio::test]
async fn test_admin_deletes_product() {
    let ctx = TestContext::new();
    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, _) = ctx.send("DELETE", "/products/p2", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = ctx.send("GET", "/products", None).await;
    assert_eq!(body["products"].as_array().map(Vec::len), Some(2));

    let (status, body) = ctx.send("DELETE", "/products/p2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Product not found");
}

// =============================================================================
// Adding products
// =============================================================================

#[tokio::test]
async fn test_admin_adds_product() {
    let ctx = TestContext::new();
    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, body) = ctx.send_form("/products", &coat_form("2400")).await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["name"], "Wool Coat");
    assert_eq!(body["price"], "2400");
    let image = body["image"].as_str().unwrap_or_default();
    assert!(image.starts_with("https://blobs.test/o/products%2F"));
    assert!(image.ends_with("_coat.jpg"));

    let paths = ctx.blobs.paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with("products/"));

    let (_, listing) = ctx.send("GET", "/products", None).await;
    let products = listing["products"].as_array().cloned().unwrap_or_default();
    assert_eq!(products.len(), 4);
    assert_eq!(products[3]["name"], "Wool Coat");
    assert_eq!(products[3]["id"], body["id"]);
}

#[tokio::test]
async fn test_add_product_rejects_zero_price() {
    let ctx = TestContext::new();
    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, body) = ctx.send_form("/products", &coat_form("0")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please fill all fields");
    assert!(ctx.blobs.paths().is_empty());
}

#[tokio::test]
async fn test_add_product_rejects_unlistable_price() {
    let ctx = TestContext::new();
    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, body) = ctx
        .send_form("/products", &coat_form("50000000000000000000000000000"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please fill all fields");
}

#[tokio::test]
async fn test_add_product_requires_every_field() {
    let ctx = TestContext::new();
    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let no_image = [
        FormPart::text("name", "Wool Coat"),
        FormPart::text("price", "2400"),
    ];
    let (status, body) = ctx.send_form("/products", &no_image).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please fill all fields");

    let no_name = [
        FormPart::text("price", "2400"),
        FormPart::file("image", "coat.jpg", "image/jpeg", JPEG),
    ];
    let (status, body) = ctx.send_form("/products", &no_name).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please fill all fields");

    let (_, listing) = ctx.send("GET", "/products", None).await;
    assert_eq!(listing["products"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_add_product_requires_admin() {
    let ctx = TestContext::new();
    ctx.sign_in(CUSTOMER_EMAIL, CUSTOMER_PASSWORD).await;

    let (status, body) = ctx.send_form("/products", &coat_form("2400")).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "This page is for administrators only.");
    assert_eq!(body["redirect"], "/auth");
    assert!(ctx.blobs.paths().is_empty());
}

// =============================================================================
// Cart totals
// =============================================================================

#[tokio::test]
async fn test_cart_total_of_capped_products() {
    let ctx = TestContext::new();
    ctx.sign_in(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (_, created) = ctx.send_form("/products", &coat_form("1000000000")).await;

    for _ in 0..3 {
        ctx.send(
            "POST",
            "/cart/items",
            Some(serde_json::json!({ "product_id": created["id"] })),
        )
        .await;
    }
    let (status, cart) = ctx.send("GET", "/cart", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["total"], "3000000000");
}
