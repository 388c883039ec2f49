//! End-to-end tests for the Guoyan Go storefront.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p guoyan-integration-tests
//! ```
//!
//! Nothing external is needed. Every test starts two servers on ephemeral
//! ports inside its own runtime:
//!
//! - a fake backend ([`BackendState`]) answering the auth, table and
//!   function endpoints the storefront calls, and recording what it was sent
//! - the real storefront router, configured to talk to the fake
//!
//! [`TestApp`] drives the storefront with a cookie-keeping `reqwest` client,
//! so session state (cart, checkout, sign-in) carries across requests the way
//! it does in a browser.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use guoyan_core::ExchangeRates;
use guoyan_storefront::build_router;
use guoyan_storefront::config::{RateSource, StorefrontConfig, SupabaseConfig};
use guoyan_storefront::state::AppState;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

// =============================================================================
// Fixtures
// =============================================================================

pub const USER_ID: &str = "0b7e5a3c-9f21-4d6a-8c44-2e1f0a9b7c31";
pub const USER_EMAIL: &str = "wang@example.com";
pub const ACCESS_TOKEN: &str = "test-access-token";
pub const VALID_CODE: &str = "123456";

pub const PRODUCT_A: &str = "6f1c8a52-3f0e-4c8e-9d1a-1b2c3d4e5f60";
pub const PRODUCT_B: &str = "a2d4c6e8-1b3d-4f5a-8c7e-9f0a1b2c3d4e";
pub const ADDRESS_ID: &str = "5c9e1f3a-7b2d-4e6f-9a8c-0d1e2f3a4b5c";
pub const PENDING_ORDER_ID: &str = "d3e4f5a6-b7c8-4d9e-8f0a-1b2c3d4e5f6a";
pub const PAID_ORDER_ID: &str = "e4f5a6b7-c8d9-4e0f-9a1b-2c3d4e5f6a7b";

pub const ALIPAY_URL: &str = "https://openapi.alipay.com/gateway.do?order=abc123";
pub const WECHAT_CODE_URL: &str = "weixin://wxpay/bizpayurl?pr=abc123";

fn product(id: &str, name: &str, price: f64, original: Option<f64>) -> Value {
    json!({
        "id": id,
        "name": name,
        "image_url": format!("https://cdn.example.com/{id}.jpg"),
        "price": price,
        "original_price": original,
        "rating": 4.5,
        "brand": "中华",
        "in_stock": true,
    })
}

fn address(id: &str, is_default: bool) -> Value {
    json!({
        "id": id,
        "user_id": USER_ID,
        "full_name": "王小明",
        "phone": "+1 416 555 0100",
        "address_line_1": "100 King St W",
        "address_line_2": null,
        "city": "Toronto",
        "province": "Ontario",
        "postal_code": "M5X 1A9",
        "country": "Canada",
        "is_default": is_default,
    })
}

fn order(id: &str, status: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "created_at": created_at,
        "status": status,
        "total_amount": 30.0,
        "total_amount_in_cny": 213.0,
        "total_amount_in_cad": null,
        "rate": 7.1,
        "rate_usd_cad": null,
        "payment_method": "alipay",
        "tracking_no": null,
        "shipping_address": {
            "id": ADDRESS_ID,
            "full_name": "王小明",
            "phone": "+1 416 555 0100",
            "address_line_1": "100 King St W",
            "address_line_2": null,
            "city": "Toronto",
            "province": "Ontario",
            "postal_code": "M5X 1A9",
            "country": "Canada",
        },
        "order_items": [{
            "id": "f5a6b7c8-d9e0-4f1a-8b2c-3d4e5f6a7b8c",
            "quantity": 2,
            "price_each": 15.0,
            "total_price": 30.0,
            "product": { "id": PRODUCT_A, "name": "中华（软）", "image_url": "" },
        }],
    })
}

// =============================================================================
// Fake backend
// =============================================================================

/// A payment function invocation seen by the fake backend.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub body: Value,
}

/// Everything the fake backend serves and records.
#[derive(Debug, Default)]
pub struct BackendState {
    pub products: Vec<Value>,
    pub addresses: Vec<Value>,
    pub orders: Vec<Value>,
    /// Canned `(status, body)` per function name; unlisted functions answer
    /// `200 {}`.
    pub function_responses: HashMap<String, (u16, Value)>,
    /// How long every function call takes to answer.
    pub function_delay: Option<Duration>,
    /// `(usd_cny, usd_cad)` row of the rate table; `None` answers 503.
    pub rates: Option<(f64, f64)>,
    pub calls: Vec<FunctionCall>,
    pub otp_requests: Vec<String>,
}

impl BackendState {
    /// Two products, one default address, a pending and a paid order, and
    /// working Alipay and WeChat Pay functions.
    #[must_use]
    pub fn seeded() -> Self {
        let mut function_responses = HashMap::new();
        function_responses.insert("alipay-qr".to_string(), (200, json!({ "url": ALIPAY_URL })));
        function_responses.insert(
            "wechatpay-qr".to_string(),
            (200, json!({ "code_url": WECHAT_CODE_URL })),
        );
        function_responses.insert(
            "generate_order".to_string(),
            (200, json!({ "order_id": PENDING_ORDER_ID })),
        );

        Self {
            products: vec![
                product(PRODUCT_A, "中华（软）", 15.0, None),
                product(PRODUCT_B, "中华（硬）", 20.0, Some(25.0)),
            ],
            addresses: vec![address(ADDRESS_ID, true)],
            orders: vec![
                order(PENDING_ORDER_ID, "pending", "2025-03-02T10:00:00Z"),
                order(PAID_ORDER_ID, "paid", "2025-03-01T09:00:00Z"),
            ],
            function_responses,
            rates: Some((7.1, 1.38)),
            ..Self::default()
        }
    }
}

type Shared = Arc<Mutex<BackendState>>;

fn lock(state: &Shared) -> MutexGuard<'_, BackendState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// `id=eq.<value>` filter from a table query.
fn eq_filter<'a>(params: &'a HashMap<String, String>, column: &str) -> Option<&'a str> {
    params.get(column).and_then(|v| v.strip_prefix("eq."))
}

fn filter_rows(rows: &[Value], params: &HashMap<String, String>) -> Vec<Value> {
    rows.iter()
        .filter(|row| eq_filter(params, "id").is_none_or(|id| row["id"] == id))
        .cloned()
        .collect()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {ACCESS_TOKEN}"))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "JWT expired" }))).into_response()
}

async fn products(State(state): State<Shared>, Query(params): Query<HashMap<String, String>>) -> Json<Vec<Value>> {
    Json(filter_rows(&lock(&state).products, &params))
}

async fn related(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Vec<Value>> {
    let state = lock(&state);
    Json(
        state
            .products
            .iter()
            .filter(|p| p["brand"] == body["p_brand"])
            .cloned()
            .collect(),
    )
}

async fn currency_rate(State(state): State<Shared>) -> Response {
    match lock(&state).rates {
        Some((usd_cny, usd_cad)) => {
            Json(json!([{ "usd_cny": usd_cny, "usd_cad": usd_cad }])).into_response()
        }
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn list_addresses(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(filter_rows(&lock(&state).addresses, &params)).into_response()
}

async fn create_address(State(state): State<Shared>, headers: HeaderMap, Json(mut body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    body["id"] = json!(uuid::Uuid::new_v4().to_string());
    lock(&state).addresses.push(body.clone());
    (StatusCode::CREATED, Json(json!([body]))).into_response()
}

async fn patch_address(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let id = eq_filter(&params, "id").unwrap_or_default().to_string();
    let mut state = lock(&state);
    for row in state.addresses.iter_mut().filter(|row| row["id"] == id.as_str()) {
        if let (Some(row), Some(patch)) = (row.as_object_mut(), body.as_object()) {
            for (key, value) in patch {
                row.insert(key.clone(), value.clone());
            }
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn delete_address(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let id = eq_filter(&params, "id").unwrap_or_default().to_string();
    lock(&state).addresses.retain(|row| row["id"] != id.as_str());
    StatusCode::NO_CONTENT.into_response()
}

async fn orders(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(filter_rows(&lock(&state).orders, &params)).into_response()
}

async fn otp(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let email = body["email"].as_str().unwrap_or_default().to_string();
    lock(&state).otp_requests.push(email);
    Json(json!({}))
}

async fn verify(Json(body): Json<Value>) -> Response {
    if body["token"] != VALID_CODE {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "msg": "Token has expired or is invalid" })),
        )
            .into_response();
    }
    Json(json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh",
        "user": { "id": USER_ID, "email": body["email"] },
    }))
    .into_response()
}

async fn user(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "id": USER_ID,
        "email": USER_EMAIL,
        "created_at": "2025-01-15T08:00:00Z",
        "last_sign_in_at": "2025-03-02T09:30:00Z",
    }))
    .into_response()
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health() -> Json<Value> {
    Json(json!({ "name": "GoTrue" }))
}

async fn function(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let (status, body, delay) = {
        let mut state = lock(&state);
        state.calls.push(FunctionCall {
            name: name.clone(),
            body,
        });
        let (status, body) = state
            .function_responses
            .get(&name)
            .cloned()
            .unwrap_or((200, json!({})));
        (status, body, state.function_delay)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn backend_router(state: Shared) -> Router {
    Router::new()
        .route("/rest/v1/products", get(products))
        .route("/rest/v1/rpc/get_related_products", post(related))
        .route("/rest/v1/currency_rate", get(currency_rate))
        .route(
            "/rest/v1/shipping_addresses",
            get(list_addresses)
                .post(create_address)
                .patch(patch_address)
                .delete(delete_address),
        )
        .route("/rest/v1/orders", get(orders))
        .route("/auth/v1/otp", post(otp))
        .route("/auth/v1/verify", post(verify))
        .route("/auth/v1/user", get(user))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/health", get(health))
        .route("/functions/v1/{name}", post(function))
        .with_state(state)
}

// =============================================================================
// Test application
// =============================================================================

/// A running storefront wired to a fake backend.
pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub backend: Shared,
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("server error");
    });
    addr
}

impl TestApp {
    /// Start with [`BackendState::seeded`].
    pub async fn spawn() -> Self {
        Self::spawn_with(BackendState::seeded()).await
    }

    /// Start with the given backend contents.
    pub async fn spawn_with(state: BackendState) -> Self {
        let backend: Shared = Arc::new(Mutex::new(state));
        let backend_addr = serve(backend_router(Arc::clone(&backend))).await;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{addr}");

        let config = StorefrontConfig {
            host: addr.ip(),
            port: addr.port(),
            base_url: base_url.clone(),
            supabase: SupabaseConfig {
                url: Url::parse(&format!("http://{backend_addr}")).expect("backend url"),
                anon_key: SecretString::from("eyJhbGciOiJIUzI1NiJ9.eyJyb2xlIjoiYW5vbiJ9.Q7mKx2"),
            },
            rate_source: RateSource::Database,
            default_rates: ExchangeRates::default(),
            checkout_min_units: 2,
            rate_limit_otp: false,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        };
        let app = build_router(AppState::new(config));
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .expect("storefront error");
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("http client");

        Self {
            base_url,
            client,
            backend,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("GET")
    }

    /// GET as HTMX would issue it from `current` (a path on this site).
    pub async fn htmx_get(&self, path: &str, current: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("HX-Request", "true")
            .header("HX-Current-URL", self.url(current))
            .send()
            .await
            .expect("HTMX GET")
    }

    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .expect("POST")
    }

    pub async fn htmx_post(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("HX-Request", "true")
            .form(form)
            .send()
            .await
            .expect("HTMX POST")
    }

    /// Sign in as [`USER_EMAIL`] through the e-mail code flow.
    pub async fn sign_in(&self) {
        let resp = self.htmx_post("/auth/otp", &[("email", USER_EMAIL)]).await;
        assert_eq!(resp.status(), 200);
        let resp = self
            .htmx_post(
                "/auth/verify",
                &[("email", USER_EMAIL), ("code", VALID_CODE), ("next", "/")],
            )
            .await;
        assert_eq!(header(&resp, "hx-redirect").as_deref(), Some("/"));
    }

    pub async fn add_to_cart(&self, product_id: &str, quantity: u32) -> reqwest::Response {
        let quantity = quantity.to_string();
        self.htmx_post(
            "/cart/add",
            &[("product_id", product_id), ("quantity", &quantity)],
        )
        .await
    }

    /// Unit count from the navigation badge endpoint.
    pub async fn cart_count(&self) -> u32 {
        self.get("/cart/count")
            .await
            .text()
            .await
            .expect("body")
            .trim()
            .parse()
            .expect("numeric cart count")
    }

    #[must_use]
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        lock(&self.backend).calls.clone()
    }

    /// Make `function` answer with `status` and `body` from now on.
    pub fn respond_to(&self, function: &str, status: u16, body: Value) {
        lock(&self.backend)
            .function_responses
            .insert(function.to_string(), (status, body));
    }

    /// Make every function call take `delay` to answer.
    pub fn delay_functions(&self, delay: Duration) {
        lock(&self.backend).function_delay = Some(delay);
    }

    /// Serve these rates from now on, or fail the rate table with `None`.
    pub fn set_rates(&self, rates: Option<(f64, f64)>) {
        lock(&self.backend).rates = rates;
    }

    #[must_use]
    pub fn backend(&self) -> MutexGuard<'_, BackendState> {
        lock(&self.backend)
    }
}

/// A response header as a string.
#[must_use]
pub fn header(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The parsed `HX-Trigger` header.
#[must_use]
pub fn hx_trigger(resp: &reqwest::Response) -> Option<Value> {
    header(resp, "hx-trigger").and_then(|raw| serde_json::from_str(&raw).ok())
}
