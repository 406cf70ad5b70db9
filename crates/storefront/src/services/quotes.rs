//! Shipping-quote fetching with a single courtesy retry.
//!
//! Carrier aggregation upstream is sometimes slow to warm up and answers the
//! first request with an empty list. The fetcher therefore makes at most two
//! attempts:
//!
//! ```text
//! idle -> fetching(1) -> [empty -> waiting(retry_delay) -> fetching(2)] -> settled
//! ```
//!
//! Errors are never retried; they settle immediately with the collaborator's
//! message. Each attempt is bounded by `attempt_timeout`.

use std::time::Duration;

use thiserror::Error;
use tienda_core::{CartId, Destination, ShippingQuote};
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, ShippingRateService};

/// Delay between the first (empty) attempt and the second.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

/// Upper bound on a single attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors from a quote fetch.
#[derive(Debug, Error)]
pub enum ShippingError {
    /// The shipping-rate service failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// An attempt exceeded the per-attempt timeout.
    #[error("Shipping quote request timed out after {0:?}")]
    Timeout(Duration),

    /// The destination cannot be quoted.
    #[error("Invalid postal code: {0:?}")]
    InvalidDestination(String),
}

impl ShippingError {
    /// Human-readable message for the customer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Timing of the two-attempt fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteRetryPolicy {
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for QuoteRetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Fetches shipping quotes from a [`ShippingRateService`].
#[derive(Debug, Clone)]
pub struct QuoteFetcher<S> {
    service: S,
    policy: QuoteRetryPolicy,
}

impl<S: ShippingRateService> QuoteFetcher<S> {
    #[must_use]
    pub const fn new(service: S, policy: QuoteRetryPolicy) -> Self {
        Self { service, policy }
    }

    #[must_use]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Fetch quotes, retrying exactly once if the first answer is empty.
    ///
    /// The result of the second attempt is returned as-is, even if it is
    /// still empty.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::InvalidDestination` before any network call
    /// for malformed postal codes, `ShippingError::Timeout` if an attempt
    /// exceeds the timeout, or the backend's error otherwise.
    #[instrument(skip(self, destination), fields(postal_code = %destination.postal_code))]
    pub async fn fetch(
        &self,
        destination: &Destination,
        cart_id: CartId,
    ) -> Result<Vec<ShippingQuote>, ShippingError> {
        if !destination.is_valid() {
            return Err(ShippingError::InvalidDestination(
                destination.postal_code.clone(),
            ));
        }

        let quotes = self.attempt(1, destination, cart_id).await?;
        if !quotes.is_empty() {
            return Ok(quotes);
        }

        info!(
            delay_ms = u64::try_from(self.policy.retry_delay.as_millis()).unwrap_or(u64::MAX),
            "No shipping quotes on first attempt, retrying"
        );
        tokio::time::sleep(self.policy.retry_delay).await;

        let quotes = self.attempt(2, destination, cart_id).await?;
        if quotes.is_empty() {
            warn!("No shipping quotes after retry");
        }
        Ok(quotes)
    }

    async fn attempt(
        &self,
        attempt: u8,
        destination: &Destination,
        cart_id: CartId,
    ) -> Result<Vec<ShippingQuote>, ShippingError> {
        debug!(attempt, "Requesting shipping quotes");
        let result = tokio::time::timeout(
            self.policy.attempt_timeout,
            self.service.shipping_rates(destination, cart_id),
        )
        .await
        .map_err(|_| ShippingError::Timeout(self.policy.attempt_timeout))?;

        match result {
            Ok(quotes) => {
                debug!(attempt, count = quotes.len(), "Shipping quotes received");
                Ok(quotes)
            }
            Err(err) => {
                warn!(attempt, error = %err, "Shipping quote request failed");
                Err(err.into())
            }
        }
    }
}
