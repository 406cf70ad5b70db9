//! Payment provider client.
//!
//! Creates payment intents for the checkout grand total. Amounts are sent in
//! integral minor units (cents); the client confirms the intent on its side
//! using the returned client secret.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tienda_core::{CartId, Price, PriceError};
use tracing::{info, instrument};
use url::Url;
use uuid::Uuid;

use crate::config::PaymentsConfig;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Errors that can occur when creating payments.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The amount cannot be charged.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<PriceError> for PaymentError {
    fn from(err: PriceError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

/// A created payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    /// Amount in minor units, as charged.
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

/// Payment provider client.
#[derive(Clone)]
pub struct PaymentClient {
    inner: Arc<PaymentClientInner>,
}

struct PaymentClientInner {
    client: reqwest::Client,
    intents_url: Url,
}

impl PaymentClient {
    /// Create a new payment client.
    ///
    /// # Errors
    ///
    /// Returns error if the secret key is not a valid header value, the base
    /// URL cannot be joined, or the HTTP client fails to build.
    pub fn new(config: &PaymentsConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| PaymentError::Parse(format!("Invalid secret key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        let intents_url = config
            .api_base
            .join("v1/payment_intents")
            .map_err(|e| PaymentError::Parse(format!("Invalid payments base URL: {e}")))?;

        Ok(Self {
            inner: Arc::new(PaymentClientInner {
                client,
                intents_url,
            }),
        })
    }

    /// Create a payment intent for `amount`, tagged with the cart.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidAmount` for zero, negative, or
    /// out-of-range amounts before contacting the provider, or the provider's
    /// error otherwise.
    #[instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn create_payment_intent(
        &self,
        amount: &Price,
        cart_id: CartId,
    ) -> Result<PaymentIntent, PaymentError> {
        let minor_units = amount.minor_units()?;
        if minor_units == 0 {
            return Err(PaymentError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }

        let amount_param = minor_units.to_string();
        let currency = amount.currency_code.code().to_ascii_lowercase();
        let cart_param = cart_id.to_string();
        let params = [
            ("amount", amount_param.as_str()),
            ("currency", currency.as_str()),
            ("automatic_payment_methods[enabled]", "true"),
            ("metadata[cart_id]", cart_param.as_str()),
        ];

        let response = self
            .inner
            .client
            .post(self.inner.intents_url.clone())
            .header(IDEMPOTENCY_HEADER, idempotency_key(cart_id, minor_units, &currency))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Payment provider returned non-success status"
            );
            let message = serde_json::from_str::<ProviderErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let intent: PaymentIntent =
            serde_json::from_str(&body).map_err(|e| PaymentError::Parse(e.to_string()))?;
        info!(intent_id = %intent.id, minor_units, "Created payment intent");
        Ok(intent)
    }
}

/// Stable key per cart, amount, and currency, so a resubmitted payment
/// returns the intent already created instead of a second one.
fn idempotency_key(cart_id: CartId, minor_units: i64, currency: &str) -> String {
    let name = format!("tienda:payment_intent:{cart_id}:{minor_units}:{currency}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
