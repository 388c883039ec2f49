//! Cart mutations and the events they broadcast.

use guoyan_integration_tests::{PRODUCT_A, PRODUCT_B, TestApp, hx_trigger};
use serde_json::json;

#[tokio::test]
async fn test_add_to_cart_broadcasts_count() {
    let app = TestApp::spawn().await;

    let resp = app.add_to_cart(PRODUCT_A, 2).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(hx_trigger(&resp).unwrap()["cart-updated"], json!({ "count": 2 }));
    assert!(resp.text().await.unwrap().contains("中华（软） × 2"));

    let resp = app.add_to_cart(PRODUCT_B, 1).await;
    assert_eq!(hx_trigger(&resp).unwrap()["cart-updated"], json!({ "count": 3 }));
    assert_eq!(app.cart_count().await, 3);
}

#[tokio::test]
async fn test_update_to_zero_removes_line() {
    let app = TestApp::spawn().await;
    app.add_to_cart(PRODUCT_A, 2).await;
    app.add_to_cart(PRODUCT_B, 1).await;

    let resp = app
        .htmx_post("/cart/update", &[("product_id", PRODUCT_A), ("quantity", "0")])
        .await;

    assert_eq!(hx_trigger(&resp).unwrap()["cart-updated"], json!({ "count": 1 }));
    assert!(resp.text().await.unwrap().is_empty());
    assert_eq!(app.cart_count().await, 1);
}

#[tokio::test]
async fn test_remove_line() {
    let app = TestApp::spawn().await;
    app.add_to_cart(PRODUCT_B, 4).await;

    let resp = app.htmx_post("/cart/remove", &[("product_id", PRODUCT_B)]).await;

    assert_eq!(hx_trigger(&resp).unwrap()["cart-updated"], json!({ "count": 0 }));
    assert_eq!(app.cart_count().await, 0);
}

#[tokio::test]
async fn test_checkout_summary_reflects_cart() {
    let app = TestApp::spawn().await;
    app.add_to_cart(PRODUCT_A, 2).await;

    let body = app.get("/checkout/summary").await.text().await.unwrap();

    assert!(body.contains("$30.00"));
    assert!(body.contains("¥213.00"));
    assert!(body.contains("C$41.40"));
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::spawn().await;

    let resp = app
        .add_to_cart("00000000-0000-4000-8000-000000000000", 1)
        .await;

    assert_eq!(resp.status(), 404);
    assert_eq!(app.cart_count().await, 0);
}
