//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::{BackendClient, BackendError};
use crate::config::StorefrontConfig;
use crate::payments::{PaymentClient, PaymentError};
use crate::services::CheckoutService;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// checkout sessions and the payment client.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    checkout: CheckoutService<BackendClient>,
    payments: PaymentClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP client cannot be built from the
    /// configuration.
    pub fn new(config: &StorefrontConfig) -> Result<Self, StateError> {
        let backend = BackendClient::new(&config.backend, config.pricing.currency())?;
        let payments = PaymentClient::new(&config.payments)?;
        let checkout = CheckoutService::new(backend, config.pricing.clone(), config.quotes);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                checkout,
                payments,
            }),
        })
    }

    /// Get a reference to the checkout session service.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutService<BackendClient> {
        &self.inner.checkout
    }

    /// Get a reference to the payment provider client.
    #[must_use]
    pub fn payments(&self) -> &PaymentClient {
        &self.inner.payments
    }
}
