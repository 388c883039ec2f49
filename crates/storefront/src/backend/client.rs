//! Hosted backend client implementation.
//!
//! Uses `reqwest` 0.13 for HTTP. Catalog reads are cached for 5 minutes;
//! users and exchange rates for an hour.

use std::sync::Arc;
use std::time::Duration;

use guoyan_core::address::{NewShippingAddress, ShippingAddress};
use guoyan_core::catalog::Product;
use guoyan_core::order::Order;
use guoyan_core::payment::{PaymentFunction, PaymentRequest, PaymentResponse};
use guoyan_core::{AddressId, Email, ExchangeRates, OrderId, ProductId, UserId};
use moka::future::Cache;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::cache::{CacheKey, CacheValue};
use super::types::{
    ApiErrorBody, AuthSession, AuthUser, CurrencyRateRow, LiveRatesResponse, OtpRequest,
    OwnedAddress, VerifyRequest,
};
use super::{BackendError, PaymentFunctions};
use crate::config::SupabaseConfig;

/// Columns selected for the order history, with the shipping address, the
/// order lines and each line's product embedded.
const ORDER_SELECT: &str = "id,created_at,status,total_amount,total_amount_in_cny,\
total_amount_in_cad,rate,rate_usd_cad,payment_method,tracking_no,\
shipping_address:shipping_addresses(id,full_name,address_line_1,address_line_2,phone,province,city,postal_code,country),\
order_items(id,quantity,price_each,total_price,product:products(id,name,image_url))";

// =============================================================================
// SupabaseClient
// =============================================================================

/// Client for the hosted backend.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    client: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    catalog_cache: Cache<CacheKey, CacheValue>,
    session_cache: Cache<CacheKey, CacheValue>,
}

impl SupabaseClient {
    /// Create a new backend client.
    #[must_use]
    pub fn new(config: &SupabaseConfig) -> Self {
        let catalog_cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        let session_cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(3600)) // 1 hour
            .build();

        Self {
            inner: Arc::new(SupabaseClientInner {
                client: reqwest::Client::new(),
                base_url: config.url.clone(),
                anon_key: config.anon_key.clone(),
                catalog_cache,
                session_cache,
            }),
        }
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.inner.base_url.clone();
        url.set_path(path);
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        url
    }

    /// Build a request carrying the anon key, authorized as `access_token`
    /// when given and as the anonymous role otherwise.
    fn request(&self, method: Method, url: Url, access_token: Option<&str>) -> RequestBuilder {
        let anon_key = self.inner.anon_key.expose_secret();
        self.inner
            .client
            .request(method, url)
            .header("apikey", anon_key)
            .bearer_auth(access_token.unwrap_or(anon_key))
    }

    /// Send a request and check the status, returning the body text.
    async fn send_raw(&self, builder: RequestBuilder) -> Result<String, BackendError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized);
        }

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(ApiErrorBody::into_message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }

    /// Send a request and parse the JSON body.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let body = self.send_raw(builder).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Send a request whose response body is irrelevant.
    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), BackendError> {
        self.send_raw(builder).await.map(|_| ())
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// E-mail a one-time sign-in code (and magic link) to `email`, creating
    /// the account on first use.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the auth API rejects the request.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn send_otp(&self, email: &Email, redirect_to: Option<&str>) -> Result<(), BackendError> {
        let params: Vec<(&str, &str)> = redirect_to.map(|r| ("redirect_to", r)).into_iter().collect();
        let url = self.endpoint("/auth/v1/otp", &params);
        let body = OtpRequest {
            email: email.as_str(),
            create_user: true,
        };
        self.send_empty(self.request(Method::POST, url, None).json(&body))
            .await
    }

    /// Exchange an e-mailed code for a session.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Api` for a wrong or expired code.
    #[instrument(skip(self, token), fields(email = %email))]
    pub async fn verify_otp(&self, email: &Email, token: &str) -> Result<AuthSession, BackendError> {
        let url = self.endpoint("/auth/v1/verify", &[]);
        let body = VerifyRequest {
            kind: "email",
            email: email.as_str(),
            token: token.trim(),
        };
        let session: AuthSession = self
            .send(self.request(Method::POST, url, None).json(&body))
            .await?;
        debug!(user_id = %session.user.id, "OTP verified");
        Ok(session)
    }

    /// Look up the user an access token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` for an expired or revoked token.
    #[instrument(skip(self, access_token))]
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let key = CacheKey::User(access_token.to_string());
        if let Some(CacheValue::User(user)) = self.inner.session_cache.get(&key).await {
            debug!("Cache hit for user");
            return Ok(user);
        }

        let url = self.endpoint("/auth/v1/user", &[]);
        let user: AuthUser = self
            .send(self.request(Method::GET, url, Some(access_token)))
            .await?;

        self.inner
            .session_cache
            .insert(key, CacheValue::User(user.clone()))
            .await;
        Ok(user)
    }

    /// Revoke the session behind `access_token`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the auth API rejects the request.
    #[instrument(skip(self, access_token))]
    pub async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        self.inner
            .session_cache
            .invalidate(&CacheKey::User(access_token.to_string()))
            .await;
        let url = self.endpoint("/auth/v1/logout", &[]);
        self.send_empty(self.request(Method::POST, url, Some(access_token)))
            .await
    }

    /// Auth API liveness, used by the readiness check.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend is unreachable or unhealthy.
    pub async fn health(&self) -> Result<(), BackendError> {
        let url = self.endpoint("/auth/v1/health", &[]);
        self.send_empty(self.request(Method::GET, url, None)).await
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// All products in backend order.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        if let Some(CacheValue::Products(products)) =
            self.inner.catalog_cache.get(&CacheKey::Products).await
        {
            debug!("Cache hit for product list");
            return Ok(products);
        }

        let url = self.endpoint("/rest/v1/products", &[("select", "*")]);
        let products: Vec<Product> = self.send(self.request(Method::GET, url, None)).await?;

        self.inner
            .catalog_cache
            .insert(CacheKey::Products, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    /// One product by ID.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if there is no such product.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, BackendError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.inner.catalog_cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let filter = format!("eq.{id}");
        let url = self.endpoint("/rest/v1/products", &[("select", "*"), ("id", &filter)]);
        let rows: Vec<Product> = self.send(self.request(Method::GET, url, None)).await?;
        let product = rows
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))?;

        self.inner
            .catalog_cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Products of the same brand, via the `get_related_products` function.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip(self))]
    pub async fn related_products(&self, brand: &str) -> Result<Vec<Product>, BackendError> {
        let key = CacheKey::Related(brand.to_string());
        if let Some(CacheValue::Products(products)) = self.inner.catalog_cache.get(&key).await {
            return Ok(products);
        }

        let url = self.endpoint("/rest/v1/rpc/get_related_products", &[]);
        let body = serde_json::json!({ "p_brand": brand });
        let products: Vec<Product> = self
            .send(self.request(Method::POST, url, None).json(&body))
            .await?;

        self.inner
            .catalog_cache
            .insert(key, CacheValue::Products(products.clone()))
            .await;
        Ok(products)
    }

    // =========================================================================
    // Shipping addresses
    // =========================================================================

    /// The customer's addresses, defaults first.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip(self, access_token))]
    pub async fn list_addresses(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> Result<Vec<ShippingAddress>, BackendError> {
        let owner = format!("eq.{user_id}");
        let url = self.endpoint(
            "/rest/v1/shipping_addresses",
            &[("select", "*"), ("user_id", &owner), ("order", "is_default.desc")],
        );
        self.send(self.request(Method::GET, url, Some(access_token)))
            .await
    }

    /// One of the customer's addresses.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the address does not exist or
    /// belongs to someone else.
    #[instrument(skip(self, access_token))]
    pub async fn get_address(
        &self,
        access_token: &str,
        user_id: UserId,
        id: AddressId,
    ) -> Result<ShippingAddress, BackendError> {
        let owner = format!("eq.{user_id}");
        let filter = format!("eq.{id}");
        let url = self.endpoint(
            "/rest/v1/shipping_addresses",
            &[("select", "*"), ("user_id", &owner), ("id", &filter)],
        );
        let rows: Vec<ShippingAddress> = self
            .send(self.request(Method::GET, url, Some(access_token)))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("address {id}")))
    }

    /// Store a new address for the customer.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the insert fails.
    #[instrument(skip(self, access_token, address))]
    pub async fn create_address(
        &self,
        access_token: &str,
        user_id: UserId,
        address: &NewShippingAddress,
    ) -> Result<ShippingAddress, BackendError> {
        let url = self.endpoint("/rest/v1/shipping_addresses", &[]);
        let body = OwnedAddress { address, user_id };
        let rows: Vec<ShippingAddress> = self
            .send(
                self.request(Method::POST, url, Some(access_token))
                    .header("Prefer", "return=representation")
                    .json(&body),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("insert returned no row".to_string()))
    }

    /// Overwrite an address.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the update fails.
    #[instrument(skip(self, access_token, address))]
    pub async fn update_address(
        &self,
        access_token: &str,
        id: AddressId,
        address: &NewShippingAddress,
    ) -> Result<(), BackendError> {
        self.patch_address(access_token, id, address).await
    }

    /// Mark an address as the default. Only `is_default` is written.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the update fails.
    #[instrument(skip(self, access_token))]
    pub async fn set_default_address(
        &self,
        access_token: &str,
        id: AddressId,
    ) -> Result<(), BackendError> {
        let body = serde_json::json!({ "is_default": true });
        self.patch_address(access_token, id, &body).await
    }

    async fn patch_address<T: Serialize + Sync>(
        &self,
        access_token: &str,
        id: AddressId,
        body: &T,
    ) -> Result<(), BackendError> {
        let filter = format!("eq.{id}");
        let url = self.endpoint("/rest/v1/shipping_addresses", &[("id", &filter)]);
        self.send_empty(
            self.request(Method::PATCH, url, Some(access_token))
                .header("Prefer", "return=minimal")
                .json(body),
        )
        .await
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the delete fails.
    #[instrument(skip(self, access_token))]
    pub async fn delete_address(&self, access_token: &str, id: AddressId) -> Result<(), BackendError> {
        let filter = format!("eq.{id}");
        let url = self.endpoint("/rest/v1/shipping_addresses", &[("id", &filter)]);
        self.send_empty(self.request(Method::DELETE, url, Some(access_token)))
            .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// The customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails.
    #[instrument(skip(self, access_token))]
    pub async fn list_orders(
        &self,
        access_token: &str,
        user_id: UserId,
    ) -> Result<Vec<Order>, BackendError> {
        let owner = format!("eq.{user_id}");
        let url = self.endpoint(
            "/rest/v1/orders",
            &[
                ("select", ORDER_SELECT),
                ("user_id", &owner),
                ("order", "created_at.desc"),
            ],
        );
        self.send(self.request(Method::GET, url, Some(access_token)))
            .await
    }

    /// One of the customer's orders.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the order does not exist or
    /// belongs to someone else.
    #[instrument(skip(self, access_token))]
    pub async fn get_order(
        &self,
        access_token: &str,
        user_id: UserId,
        id: OrderId,
    ) -> Result<Order, BackendError> {
        let owner = format!("eq.{user_id}");
        let filter = format!("eq.{id}");
        let url = self.endpoint(
            "/rest/v1/orders",
            &[("select", ORDER_SELECT), ("user_id", &owner), ("id", &filter)],
        );
        let rows: Vec<Order> = self
            .send(self.request(Method::GET, url, Some(access_token)))
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("order {id}")))
    }

    // =========================================================================
    // Exchange rates
    // =========================================================================

    /// Rates from the first row of the `currency_rate` table.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the table is empty and
    /// `BackendError::InvalidResponse` for non-positive rates.
    #[instrument(skip(self))]
    pub async fn currency_rates(&self) -> Result<ExchangeRates, BackendError> {
        if let Some(CacheValue::Rates(rates)) = self.inner.session_cache.get(&CacheKey::Rates).await {
            return Ok(rates);
        }

        let url = self.endpoint(
            "/rest/v1/currency_rate",
            &[("select", "usd_cny,usd_cad"), ("limit", "1")],
        );
        let rows: Vec<CurrencyRateRow> = self.send(self.request(Method::GET, url, None)).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("currency_rate row".to_string()))?;
        let rates = ExchangeRates::new(row.usd_cny, row.usd_cad)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        self.inner
            .session_cache
            .insert(CacheKey::Rates, CacheValue::Rates(rates))
            .await;
        Ok(rates)
    }

    /// Rates from a third-party USD rate API.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the API is unreachable or returns
    /// unusable rates.
    #[instrument(skip(self), fields(api = %api_url))]
    pub async fn live_rates(&self, api_url: &Url) -> Result<ExchangeRates, BackendError> {
        if let Some(CacheValue::Rates(rates)) = self.inner.session_cache.get(&CacheKey::Rates).await {
            return Ok(rates);
        }

        let response: LiveRatesResponse = self
            .send(self.inner.client.get(api_url.clone()))
            .await?;
        let rates = ExchangeRates::new(response.rates.cny, response.rates.cad)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        self.inner
            .session_cache
            .insert(CacheKey::Rates, CacheValue::Rates(rates))
            .await;
        Ok(rates)
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Invoke an edge function as the customer.
    ///
    /// # Errors
    ///
    /// Any non-2xx answer is returned as `BackendError::Api`.
    #[instrument(skip(self, body, access_token), fields(function = %function))]
    pub async fn invoke<B, T>(
        &self,
        function: PaymentFunction,
        body: &B,
        access_token: &str,
    ) -> Result<T, BackendError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(&format!("/functions/v1/{}", function.name()), &[]);
        self.send(self.request(Method::POST, url, Some(access_token)).json(body))
            .await
    }
}

impl PaymentFunctions for SupabaseClient {
    async fn invoke_payment(
        &self,
        request: &PaymentRequest,
        access_token: &str,
    ) -> Result<PaymentResponse, BackendError> {
        self.invoke(request.function(), request, access_token).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient::new(&SupabaseConfig {
            url: Url::parse("https://abc.supabase.co").unwrap(),
            anon_key: SecretString::from("anon"),
        })
    }

    #[test]
    fn test_endpoint_without_params_has_no_query() {
        let url = client().endpoint("/functions/v1/alipay-qr", &[]);
        assert_eq!(url.as_str(), "https://abc.supabase.co/functions/v1/alipay-qr");
    }

    #[test]
    fn test_endpoint_encodes_filters() {
        let id = AddressId::new_v4();
        let filter = format!("eq.{id}");
        let url = client().endpoint(
            "/rest/v1/shipping_addresses",
            &[("id", &filter), ("order", "is_default.desc")],
        );
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), filter),
                ("order".to_string(), "is_default.desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_order_select_embeds_items_and_address() {
        assert!(ORDER_SELECT.contains("order_items("));
        assert!(ORDER_SELECT.contains("shipping_address:shipping_addresses("));
        assert!(!ORDER_SELECT.contains(' '));
    }
}
