//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`;
//! error bodies are JSON of the form `{"error": "..."}`.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tienda_core::{Blocker, PricingError};

use crate::backend::BackendError;
use crate::payments::PaymentError;
use crate::services::CheckoutError;

/// Application-level error type for the checkout API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend operation failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Payment provider operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Requested shipping option is not on offer.
    #[error("Shipping option is not available: {0}")]
    UnknownShippingOption(String),

    /// Checkout has outstanding blockers.
    #[error("Checkout is not ready for payment")]
    NotPayable(Vec<Blocker>),

    /// Cart amounts could not be totalled.
    #[error("Cart cannot be priced: {0}")]
    Pricing(#[from] PricingError),

    /// Malformed path or body.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Backend(err) => Self::Backend(err),
            CheckoutError::UnknownShippingOption(option) => Self::UnknownShippingOption(option),
            CheckoutError::NotPayable(blockers) => Self::NotPayable(blockers),
            CheckoutError::Pricing(err) => Self::Pricing(err),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    blockers: Vec<Blocker>,
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Backend(BackendError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Backend(_) => StatusCode::BAD_GATEWAY,
            Self::Payment(PaymentError::InvalidAmount(_)) | Self::Pricing(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::UnknownShippingOption(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotPayable(_) => StatusCode::CONFLICT,
        }
    }

    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Pricing(_)
                | Self::Payment(
                    PaymentError::Http(_) | PaymentError::Api { .. } | PaymentError::Parse(_)
                )
                | Self::Backend(
                    BackendError::Http(_) | BackendError::Api { .. } | BackendError::Parse(_)
                )
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let error = match &self {
            Self::Backend(BackendError::NotFound(what)) => format!("Not found: {what}"),
            Self::Backend(_) => "Backend service error".to_string(),
            Self::Payment(PaymentError::Api { message, .. }) => message.clone(),
            Self::Payment(PaymentError::InvalidAmount(reason)) => reason.clone(),
            Self::Payment(_) => "Payment service error".to_string(),
            _ => self.to_string(),
        };
        let blockers = match self {
            Self::NotPayable(blockers) => blockers,
            _ => Vec::new(),
        };

        (status, Json(ErrorBody { error, blockers })).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for checkout actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Payment intent created", Some(&[("cart_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::BadRequest("invalid cart id".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid cart id");

        let err = AppError::Pricing(PricingError::Overflow("subtotal"));
        assert_eq!(err.to_string(), "Cart cannot be priced: subtotal is out of range");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::Backend(BackendError::NotFound("cart 1".to_string()))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Backend(BackendError::Rejected("no".to_string()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::UnknownShippingOption("overnight".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::NotPayable(vec![Blocker::EmptyCart])),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Payment(PaymentError::InvalidAmount("0".to_string()))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::Pricing(PricingError::Overflow("grand total"))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::BadRequest("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_not_payable_lists_blockers() {
        let response =
            AppError::NotPayable(vec![Blocker::EmptyCart, Blocker::ShippingUnresolved])
                .into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "Checkout is not ready for payment");
        assert_eq!(body["blockers"][0]["reason"], "empty_cart");
        assert_eq!(body["blockers"][1]["reason"], "shipping_unresolved");
    }

    #[tokio::test]
    async fn test_backend_details_hidden() {
        let err = AppError::Backend(BackendError::Parse("expected `items` at line 1".to_string()));
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"], "Backend service error");
        assert!(body.get("blockers").is_none());
    }
}
