//! E-mail code sign-in, sign-out and protected pages.

use guoyan_integration_tests::{TestApp, USER_EMAIL, VALID_CODE, header};

#[tokio::test]
async fn test_protected_page_redirects_to_login() {
    let app = TestApp::spawn().await;

    let resp = app.get("/orders").await;

    assert_eq!(resp.status(), 303);
    assert_eq!(
        header(&resp, "location").as_deref(),
        Some("/auth/login?next=%2Forders")
    );
}

#[tokio::test]
async fn test_protected_fragment_uses_hx_redirect() {
    let app = TestApp::spawn().await;

    let resp = app.htmx_get("/profile", "/orders").await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        header(&resp, "hx-redirect").as_deref(),
        Some("/auth/login?next=%2Forders")
    );
}

#[tokio::test]
async fn test_invalid_email_is_rejected() {
    let app = TestApp::spawn().await;

    let body = app
        .htmx_post("/auth/otp", &[("email", "not-an-email")])
        .await
        .text()
        .await
        .unwrap();

    assert!(body.contains("请输入有效的邮箱地址"));
    assert!(app.backend().otp_requests.is_empty());
}

#[tokio::test]
async fn test_code_is_sent() {
    let app = TestApp::spawn().await;

    let body = app
        .htmx_post("/auth/otp", &[("email", USER_EMAIL), ("next", "/checkout")])
        .await
        .text()
        .await
        .unwrap();

    assert!(body.contains("验证码已发送至"));
    assert!(body.contains("value=\"/checkout\""));
    assert_eq!(app.backend().otp_requests, vec![USER_EMAIL.to_string()]);
}

#[tokio::test]
async fn test_wrong_code_is_rejected() {
    let app = TestApp::spawn().await;

    let resp = app
        .htmx_post("/auth/verify", &[("email", USER_EMAIL), ("code", "000000")])
        .await;

    assert!(header(&resp, "hx-redirect").is_none());
    assert!(resp.text().await.unwrap().contains("验证码无效或已过期"));
    assert_eq!(app.get("/orders").await.status(), 303);
}

#[tokio::test]
async fn test_sign_in_returns_to_next_and_opens_account() {
    let app = TestApp::spawn().await;

    let resp = app
        .htmx_post(
            "/auth/verify",
            &[("email", USER_EMAIL), ("code", VALID_CODE), ("next", "/orders")],
        )
        .await;
    assert_eq!(header(&resp, "hx-redirect").as_deref(), Some("/orders"));

    let resp = app.get("/profile").await;
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains(USER_EMAIL));

    // Signed-in visitors skip the login page
    let resp = app.get("/auth/login?next=%2Faddresses").await;
    assert_eq!(header(&resp, "location").as_deref(), Some("/addresses"));
}

#[tokio::test]
async fn test_offsite_next_is_ignored() {
    let app = TestApp::spawn().await;

    let resp = app
        .htmx_post(
            "/auth/verify",
            &[
                ("email", USER_EMAIL),
                ("code", VALID_CODE),
                ("next", "https://evil.example/"),
            ],
        )
        .await;

    assert_eq!(header(&resp, "hx-redirect").as_deref(), Some("/"));
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::spawn().await;
    app.sign_in().await;
    assert_eq!(app.get("/orders").await.status(), 200);

    let resp = app.post_form("/auth/logout", &[]).await;

    assert_eq!(resp.status(), 303);
    assert_eq!(header(&resp, "location").as_deref(), Some("/"));
    assert_eq!(app.get("/orders").await.status(), 303);
}
