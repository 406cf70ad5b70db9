//! Checkout API routes.
//!
//! JSON endpoints behind the checkout page. Every response carries the full
//! [`CheckoutView`] so the client never prices anything itself.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tienda_core::{CartId, CheckoutForm, ShippingChoice};
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::routes::extract::{ApiJson, ApiPath};
use crate::services::CheckoutView;
use crate::state::AppState;

/// Request to choose (or clear) the shipping option.
#[derive(Debug, Deserialize)]
pub struct ShippingRequest {
    pub choice: Option<ShippingChoice>,
}

/// Request to toggle shipping insurance.
#[derive(Debug, Deserialize)]
pub struct InsuranceRequest {
    pub enabled: bool,
}

/// Response from creating a payment.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_intent_id: String,
    pub client_secret: String,
    /// Amount charged, in minor units.
    pub amount: i64,
    pub currency: String,
    pub grand_total_display: String,
}

/// Current checkout state and totals.
///
/// GET /api/checkout/{cart_id}
///
/// # Errors
///
/// Returns `AppError` if the cart cannot be read.
pub async fn show(
    State(state): State<AppState>,
    ApiPath(cart_id): ApiPath<CartId>,
) -> Result<Json<CheckoutView>> {
    Ok(Json(state.checkout().view(cart_id).await?))
}

/// Replace the checkout form.
///
/// PUT /api/checkout/{cart_id}/form
///
/// Completing the required fields fetches shipping quotes before responding;
/// clearing one drops them.
///
/// # Errors
///
/// Returns `AppError` if the cart cannot be read.
pub async fn update_form(
    State(state): State<AppState>,
    ApiPath(cart_id): ApiPath<CartId>,
    ApiJson(form): ApiJson<CheckoutForm>,
) -> Result<Json<CheckoutView>> {
    Ok(Json(state.checkout().update_form(cart_id, form).await?))
}

/// Fetch shipping quotes again for the current address.
///
/// POST /api/checkout/{cart_id}/quotes
///
/// # Errors
///
/// Returns `AppError` if the cart cannot be read.
pub async fn refresh_quotes(
    State(state): State<AppState>,
    ApiPath(cart_id): ApiPath<CartId>,
) -> Result<Json<CheckoutView>> {
    Ok(Json(state.checkout().refresh_quotes(cart_id).await?))
}

/// Choose a shipping option.
///
/// PUT /api/checkout/{cart_id}/shipping
///
/// # Errors
///
/// Returns `AppError` if the option is not on offer or the cart cannot be
/// read.
pub async fn choose_shipping(
    State(state): State<AppState>,
    ApiPath(cart_id): ApiPath<CartId>,
    ApiJson(request): ApiJson<ShippingRequest>,
) -> Result<Json<CheckoutView>> {
    Ok(Json(
        state
            .checkout()
            .choose_shipping(cart_id, request.choice)
            .await?,
    ))
}

/// Toggle shipping insurance.
///
/// PUT /api/checkout/{cart_id}/insurance
///
/// # Errors
///
/// Returns `AppError` if the cart cannot be read.
pub async fn set_insurance(
    State(state): State<AppState>,
    ApiPath(cart_id): ApiPath<CartId>,
    ApiJson(request): ApiJson<InsuranceRequest>,
) -> Result<Json<CheckoutView>> {
    Ok(Json(
        state
            .checkout()
            .set_insurance(cart_id, request.enabled)
            .await?,
    ))
}

/// Create a payment intent for the grand total.
///
/// POST /api/checkout/{cart_id}/payment
///
/// # Errors
///
/// Returns `AppError::NotPayable` with the outstanding blockers, or the
/// payment provider's error.
#[instrument(skip(state))]
pub async fn create_payment(
    State(state): State<AppState>,
    ApiPath(cart_id): ApiPath<CartId>,
) -> Result<Json<PaymentResponse>> {
    let view = state.checkout().payable(cart_id).await?;
    let total = view.totals.grand_total_price();

    let intent = state
        .payments()
        .create_payment_intent(&total, cart_id)
        .await?;

    let cart = cart_id.to_string();
    add_breadcrumb(
        "checkout",
        "Payment intent created",
        Some(&[("cart_id", cart.as_str()), ("intent_id", intent.id.as_str())]),
    );

    Ok(Json(PaymentResponse {
        payment_intent_id: intent.id,
        client_secret: intent.client_secret,
        amount: intent.amount,
        currency: intent.currency,
        grand_total_display: view.grand_total_display,
    }))
}
