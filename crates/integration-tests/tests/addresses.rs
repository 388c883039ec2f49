//! Shipping address forms.

use guoyan_integration_tests::{ADDRESS_ID, TestApp, header};

const VALID: [(&str, &str); 8] = [
    ("full_name", "李华"),
    ("phone", "+1 604 555 0199"),
    ("address_line_1", "1055 W Georgia St"),
    ("address_line_2", ""),
    ("city", "Vancouver"),
    ("province", "British Columbia"),
    ("postal_code", "V6E 3P3"),
    ("country", "Canada"),
];

fn with(field: &str, value: &'static str) -> Vec<(&'static str, &'static str)> {
    VALID
        .iter()
        .map(|&(k, v)| if k == field { (k, value) } else { (k, v) })
        .collect()
}

#[tokio::test]
async fn test_address_pages_require_sign_in() {
    let app = TestApp::spawn().await;

    let resp = app.get("/addresses").await;

    assert_eq!(resp.status(), 303);
    assert_eq!(
        header(&resp, "location").as_deref(),
        Some("/auth/login?next=%2Faddresses")
    );
}

#[tokio::test]
async fn test_invalid_address_is_rerendered_with_error() {
    let app = TestApp::spawn().await;
    app.sign_in().await;

    let resp = app.post_form("/addresses", &with("full_name", "  ")).await;

    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("不能为空"));
    assert!(body.contains("class=\"invalid\""));
    // The rest of the input survives
    assert!(body.contains("Vancouver"));
    assert_eq!(app.backend().addresses.len(), 1);
}

#[tokio::test]
async fn test_province_must_match_country() {
    let app = TestApp::spawn().await;
    app.sign_in().await;

    let resp = app.post_form("/addresses", &with("province", "Texas")).await;

    let body = resp.text().await.unwrap();
    assert!(body.contains("Texas 不属于 Canada"));
    assert_eq!(app.backend().addresses.len(), 1);
}

#[tokio::test]
async fn test_create_address_returns_to_next() {
    let app = TestApp::spawn().await;
    app.sign_in().await;

    let resp = app.post_form("/addresses?next=%2Fcheckout", &VALID).await;

    assert_eq!(resp.status(), 303);
    assert_eq!(header(&resp, "location").as_deref(), Some("/checkout"));
    let backend = app.backend();
    assert_eq!(backend.addresses.len(), 2);
    assert_eq!(backend.addresses[1]["city"], "Vancouver");
}

#[tokio::test]
async fn test_delete_address() {
    let app = TestApp::spawn().await;
    app.sign_in().await;

    let resp = app
        .post_form(&format!("/addresses/{ADDRESS_ID}/delete"), &[])
        .await;

    assert_eq!(resp.status(), 303);
    assert_eq!(header(&resp, "location").as_deref(), Some("/addresses"));
    assert!(app.backend().addresses.is_empty());
}

#[tokio::test]
async fn test_province_options_follow_country() {
    let app = TestApp::spawn().await;

    let body = app
        .get("/addresses/provinces?country=Canada")
        .await
        .text()
        .await
        .unwrap();

    assert!(body.contains("Ontario"));
    assert!(!body.contains("Texas"));
}
