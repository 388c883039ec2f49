//! Health endpoints and response headers.

use guoyan_integration_tests::{TestApp, header};

#[tokio::test]
async fn test_liveness() {
    let app = TestApp::spawn().await;

    let resp = app.get("/health").await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_readiness_checks_backend() {
    let app = TestApp::spawn().await;

    assert_eq!(app.get("/health/ready").await.status(), 200);
}

#[tokio::test]
async fn test_pages_carry_security_headers() {
    let app = TestApp::spawn().await;

    let resp = app.get("/").await;

    assert_eq!(resp.status(), 200);
    let csp = header(&resp, "content-security-policy").expect("CSP header");
    assert!(csp.contains("script-src"));
    assert!(!csp.contains("'unsafe-inline'"));
    assert_eq!(header(&resp, "x-content-type-options").as_deref(), Some("nosniff"));
    assert!(header(&resp, "x-request-id").is_some());
}

#[tokio::test]
async fn test_catalog_lists_products() {
    let app = TestApp::spawn().await;

    let body = app.get("/").await.text().await.unwrap();

    assert!(body.contains("中华（软）"));
    assert!(body.contains("中华（硬）"));
}

#[tokio::test]
async fn test_unknown_path_renders_not_found_page() {
    let app = TestApp::spawn().await;
    app.add_to_cart(guoyan_integration_tests::PRODUCT_A, 2).await;

    let resp = app.get("/no-such-page").await;

    assert_eq!(resp.status(), 404);
    assert!(header(&resp, "x-request-id").is_some());
    let body = resp.text().await.unwrap();
    assert!(body.contains("404 - 页面未找到"));
    assert!(body.contains("返回首页"));
    // Full page, with the visitor's cart in the navigation
    assert!(body.contains("hx-swap=\"innerHTML\">2</span>"));
}

#[tokio::test]
async fn test_missing_product_renders_not_found_page() {
    let app = TestApp::spawn().await;

    let resp = app.get("/products/not-an-id").await;

    assert_eq!(resp.status(), 404);
    assert!(resp.text().await.unwrap().contains("404 - 页面未找到"));
}
