//! Stock backend API client.
//!
//! `StockBackend` is the seam the working-list code talks to; `ApiClient`
//! implements it over HTTP with a bearer token. Responses are parsed into
//! the records of `product` at this boundary.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::ApiError;
use crate::policy::StockOperation;
use crate::product::{Product, ProductPage, ScanHit};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// One stock change sent for one submitted line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockMutation {
    pub product_id: i64,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    pub notes: String,
}

#[async_trait]
pub trait StockBackend: Send + Sync {
    async fn search_products(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ProductPage, ApiError>;

    async fn get_product(&self, id: i64) -> Result<Product, ApiError>;

    /// Resolve a barcode. `Ok(None)` means the backend knows no such code.
    async fn scan_product(&self, code: &str) -> Result<Option<ScanHit>, ApiError>;

    async fn apply_stock(
        &self,
        operation: StockOperation,
        mutation: &StockMutation,
    ) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the API base URL:
/// - ensure a scheme is present (https, or http for localhost / LAN IPs)
/// - strip trailing slashes
pub fn normalize_api_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        let local = url.starts_with("localhost")
            || url.starts_with("127.0.0.1")
            || url.starts_with("10.")
            || url.starts_with("192.168.");
        url = if local {
            format!("http://{url}")
        } else {
            format!("https://{url}")
        };
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn transport_error(base: &str, err: &reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::Timeout(base.to_string());
    }
    if err.is_connect() {
        return ApiError::Unreachable(base.to_string());
    }
    if err.is_builder() {
        return ApiError::Network(format!("Invalid API URL: {base}"));
    }
    ApiError::Network(err.to_string())
}

/// Pull a human message out of an error body (`detail`, `error`, `message`).
fn error_message(body: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(body).ok()?;
    crate::value_str(&json, &["detail", "error", "message"])
}

fn status_error(status: StatusCode, body: &str) -> ApiError {
    let message = error_message(body);
    match status.as_u16() {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden(message.unwrap_or_else(|| "permission denied".into())),
        404 => ApiError::NotFound(message.unwrap_or_else(|| "resource not found".into())),
        s => ApiError::Status {
            status: s,
            message: message.unwrap_or_else(|| {
                if s >= 500 {
                    "Stock server error".to_string()
                } else {
                    "Unexpected response from stock server".to_string()
                }
            }),
        },
    }
}

fn operation_path(operation: StockOperation, product_id: i64) -> String {
    let action = match operation {
        StockOperation::Reception => "add_stock",
        StockOperation::InventoryAdjustment => "adjust_stock",
        StockOperation::Loss | StockOperation::Sale => "remove_stock",
    };
    format!("/products/{product_id}/{action}/")
}

fn operation_context(operation: StockOperation) -> &'static str {
    match operation {
        StockOperation::Reception => "reception",
        StockOperation::InventoryAdjustment => "inventory",
        StockOperation::Loss => "loss",
        StockOperation::Sale => "sale",
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct ApiClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<Zeroizing<String>>>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: normalize_api_url(base_url),
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&self, token: Option<&str>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = token.map(|t| Zeroizing::new(t.to_string()));
    }

    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .map(|t| t.is_some())
            .unwrap_or(false)
    }

    /// Perform an authenticated request and return the JSON body
    /// (`Value::Null` for empty responses).
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("Accept", "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        let bearer = self
            .token
            .read()
            .ok()
            .and_then(|t| t.as_ref().map(|s| format!("Bearer {}", s.as_str())));
        if let Some(auth) = bearer {
            req = req.header("Authorization", auth);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| transport_error(&self.base_url, &e))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            warn!(path, error = %e, "failed to read api response body");
            transport_error(&self.base_url, &e)
        })?;
        debug!(method = %method, path, status = status.as_u16(), "api request");

        if !status.is_success() {
            let err = status_error(status, &text);
            if err.is_auth_failure() {
                warn!(path, "api rejected session token");
            }
            return Err(err);
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl StockBackend for ApiClient {
    async fn search_products(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ProductPage, ApiError> {
        let params = [
            ("search", query.to_string()),
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        let body = self
            .request(Method::GET, "/products/", &params, None)
            .await?;
        Ok(ProductPage::from_value(&body, page, page_size))
    }

    async fn get_product(&self, id: i64) -> Result<Product, ApiError> {
        let body = self
            .request(Method::GET, &format!("/products/{id}/"), &[], None)
            .await?;
        Product::from_value(&body)
            .ok_or_else(|| ApiError::InvalidResponse(format!("product {id} without id")))
    }

    async fn scan_product(&self, code: &str) -> Result<Option<ScanHit>, ApiError> {
        let body = serde_json::json!({ "code": code });
        match self
            .request(Method::POST, "/products/scan/", &[], Some(body))
            .await
        {
            Ok(resp) => Ok(ScanHit::from_value(&resp)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn apply_stock(
        &self,
        operation: StockOperation,
        mutation: &StockMutation,
    ) -> Result<(), ApiError> {
        let mut body = serde_json::to_value(mutation)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        if let Value::Object(ref mut map) = body {
            map.insert(
                "context".into(),
                Value::String(operation_context(operation).into()),
            );
        }
        self.request(
            Method::POST,
            &operation_path(operation, mutation.product_id),
            &[],
            Some(body),
        )
        .await?;
        info!(
            product_id = mutation.product_id,
            quantity = mutation.quantity,
            context = operation_context(operation),
            "stock mutation applied"
        );
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
