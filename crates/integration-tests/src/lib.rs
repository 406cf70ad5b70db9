//! Integration tests for the Tienda checkout API.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tienda-integration-tests
//! ```
//!
//! No external services are needed: the REST backend and the payment
//! provider are both stood in for by one `wiremock` server, and the checkout
//! API is served on an ephemeral local port.
//!
//! # Test Categories
//!
//! - `pricing_scenarios` - Totals arithmetic through the public core API
//! - `shipping_quotes` - Quote fetch retry behavior over real HTTP
//! - `checkout_flow` - End-to-end checkout against the running API

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use secrecy::SecretString;
use tienda_core::PricingConfig;
use tienda_storefront::config::{BackendConfig, PaymentsConfig, StorefrontConfig};
use tienda_storefront::routes;
use tienda_storefront::services::QuoteRetryPolicy;
use tienda_storefront::state::AppState;
use tokio::task::JoinHandle;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Retry delay used by tests; short enough to keep the suite fast, long
/// enough to measure.
pub const TEST_RETRY_DELAY: Duration = Duration::from_millis(200);

/// A running checkout API wired to a mock backend and payment provider.
pub struct TestContext {
    pub client: reqwest::Client,
    pub storefront_url: String,
    pub mock: MockServer,
    server: JoinHandle<()>,
}

impl TestContext {
    /// Start with default pricing and [`TEST_RETRY_DELAY`].
    pub async fn new() -> Self {
        Self::with_pricing(PricingConfig::default()).await
    }

    /// Start with the given pricing configuration.
    pub async fn with_pricing(pricing: PricingConfig) -> Self {
        let mock = MockServer::start().await;
        let config = test_config(&mock, pricing);
        let app = routes::router(AppState::new(&config).expect("Failed to build state"));

        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server error");
        });

        Self {
            client: reqwest::Client::new(),
            storefront_url: format!("http://{addr}"),
            mock,
            server,
        }
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.storefront_url)
    }

    /// Serve `items` as the contents of cart `cart_id`.
    pub async fn mount_cart(&self, cart_id: i64, items: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/backend/carts/{cart_id}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": items })),
            )
            .mount(&self.mock)
            .await;
    }

    /// `PUT` JSON and decode the JSON response.
    pub async fn put(&self, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let response = self
            .client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Request failed");
        decode(response).await
    }

    /// `GET` and decode the JSON response.
    pub async fn get(&self, path: &str) -> (u16, serde_json::Value) {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed");
        decode(response).await
    }

    /// `POST` without a body and decode the JSON response.
    pub async fn post(&self, path: &str) -> (u16, serde_json::Value) {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .expect("Request failed");
        decode(response).await
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn decode(response: reqwest::Response) -> (u16, serde_json::Value) {
    let status = response.status().as_u16();
    let body = response.json().await.expect("Response was not JSON");
    (status, body)
}

/// Storefront configuration pointing both upstreams at `mock`.
///
/// The backend lives under `/backend/`, the payment provider at the root.
#[must_use]
pub fn test_config(mock: &MockServer, pricing: PricingConfig) -> StorefrontConfig {
    StorefrontConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        backend: backend_config(mock),
        payments: PaymentsConfig {
            api_base: Url::parse(&format!("{}/", mock.uri())).expect("Invalid mock URL"),
            secret_key: SecretString::from("sk_test_4eC39HqLyjWDarjtT1zdp7dc"),
        },
        pricing,
        quotes: QuoteRetryPolicy {
            retry_delay: TEST_RETRY_DELAY,
            attempt_timeout: Duration::from_secs(5),
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
        json_logs: false,
    }
}

/// Backend configuration for the `/backend/` prefix of `mock`.
#[must_use]
pub fn backend_config(mock: &MockServer) -> BackendConfig {
    BackendConfig {
        base_url: Url::parse(&format!("{}/backend/", mock.uri())).expect("Invalid mock URL"),
        api_token: None,
        timeout: Duration::from_secs(5),
    }
}

/// A checkout form with every required field filled in.
#[must_use]
pub fn complete_form(postal_code: &str) -> serde_json::Value {
    serde_json::json!({
        "full_name": "Ana López",
        "email": "ana@example.com",
        "phone": "5512345678",
        "street": "Av. Reforma 222",
        "interior_number": "4B",
        "neighborhood": "Juárez",
        "city": "Ciudad de México",
        "state": "CDMX",
        "postal_code": postal_code
    })
}
