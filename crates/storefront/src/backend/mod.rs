//! REST backend client for carts and shipping rates.
//!
//! # Architecture
//!
//! - The backend is the source of truth for cart contents and prices; checkout
//!   re-reads the cart on every pricing request instead of trusting the client
//! - Shipping rates come from the backend's carrier aggregator, keyed by
//!   destination postal code and cart
//! - Payloads are normalized in [`types`] before anything else sees them
//!
//! The [`CartService`] and [`ShippingRateService`] traits are the seams the
//! checkout service is generic over, so tests can substitute in-memory fakes.

pub mod types;

use std::future::Future;
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use thiserror::Error;
use tienda_core::{CartId, CartLine, CurrencyCode, Destination, ShippingQuote};
use tracing::{debug, instrument};
use url::Url;

use crate::config::BackendConfig;
use types::{CartPayload, ErrorPayload, RatesPayload, RatesRequest, normalize_cart, normalize_quotes};

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The backend answered 2xx but reported failure.
    #[error("{0}")]
    Rejected(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl BackendError {
    /// Message suitable for showing the customer, passed through verbatim
    /// from the backend where it supplied one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } | Self::Rejected(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Source of cart contents.
pub trait CartService: Send + Sync {
    /// Current lines of a cart, normalized.
    fn cart_lines(
        &self,
        cart_id: CartId,
    ) -> impl Future<Output = Result<Vec<CartLine>, BackendError>> + Send;
}

/// Source of dynamic shipping quotes.
pub trait ShippingRateService: Send + Sync {
    /// Quotes for shipping `cart_id` to `destination`. An empty list is a
    /// successful answer.
    fn shipping_rates(
        &self,
        destination: &Destination,
        cart_id: CartId,
    ) -> impl Future<Output = Result<Vec<ShippingQuote>, BackendError>> + Send;
}

/// REST backend client.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Url,
    currency: CurrencyCode,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// Quotes priced in anything other than `currency` are discarded.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &BackendConfig, currency: CurrencyCode) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| BackendError::Parse(format!("Invalid API token format: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                base_url: config.base_url.clone(),
                currency,
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| BackendError::Parse(format!("Invalid endpoint {path}: {e}")))
    }

    /// Fetch and normalize a cart.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` for unknown carts, or any transport,
    /// status, or parse failure.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: CartId) -> Result<Vec<CartLine>, BackendError> {
        let url = self.endpoint(&format!("carts/{cart_id}"))?;
        let response = self.inner.client.get(url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(format!("cart {cart_id}")));
        }
        let payload: CartPayload = read_json(response).await?;
        let lines = normalize_cart(cart_id, payload);
        debug!(lines = lines.len(), "Fetched cart");
        Ok(lines)
    }

    /// Request shipping quotes from the carrier aggregator.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Rejected` with the backend's own message when it
    /// reports failure, or any transport, status, or parse failure.
    #[instrument(skip(self, destination), fields(postal_code = %destination.postal_code))]
    pub async fn get_shipping_rates(
        &self,
        destination: &Destination,
        cart_id: CartId,
    ) -> Result<Vec<ShippingQuote>, BackendError> {
        let url = self.endpoint("shipping/rates")?;
        let response = self
            .inner
            .client
            .post(url)
            .json(&RatesRequest::new(destination, cart_id))
            .send()
            .await?;

        let payload: RatesPayload = read_json(response).await?;
        if !payload.success {
            return Err(BackendError::Rejected(payload.message.unwrap_or_else(|| {
                "Shipping rates are unavailable for this address".to_string()
            })));
        }

        let received = payload.quotes.len();
        let quotes = normalize_quotes(payload.quotes, self.inner.currency);
        debug!(received, usable = quotes.len(), "Fetched shipping rates");
        Ok(quotes)
    }
}

impl CartService for BackendClient {
    async fn cart_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, BackendError> {
        self.get_cart(cart_id).await
    }
}

impl ShippingRateService for BackendClient {
    async fn shipping_rates(
        &self,
        destination: &Destination,
        cart_id: CartId,
    ) -> Result<Vec<ShippingQuote>, BackendError> {
        self.get_shipping_rates(destination, cart_id).await
    }
}

/// Check the status and decode a JSON body, keeping the backend's error
/// message when it sends one.
async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        tracing::error!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Backend returned non-success status"
        );
        let message = serde_json::from_str::<ErrorPayload>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| body.chars().take(200).collect());
        return Err(BackendError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %body.chars().take(500).collect::<String>(),
            "Failed to parse backend response"
        );
        BackendError::Parse(e.to_string())
    })
}
