//! HTTP route handlers for the checkout API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                             - Health check
//!
//! # Checkout (JSON)
//! GET  /api/checkout/{cart_id}             - Current view: quotes, totals, readiness
//! PUT  /api/checkout/{cart_id}/form        - Replace form (may fetch or clear quotes)
//! POST /api/checkout/{cart_id}/quotes      - Fetch quotes again
//! PUT  /api/checkout/{cart_id}/shipping    - Choose a quote or static method
//! PUT  /api/checkout/{cart_id}/insurance   - Toggle insurance
//! POST /api/checkout/{cart_id}/payment     - Create a payment intent
//! ```

pub mod checkout;
pub mod extract;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the checkout API router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/{cart_id}", get(checkout::show))
        .route("/{cart_id}/form", put(checkout::update_form))
        .route("/{cart_id}/quotes", post(checkout::refresh_quotes))
        .route("/{cart_id}/shipping", put(checkout::choose_shipping))
        .route("/{cart_id}/insurance", put(checkout::set_insurance))
        .route("/{cart_id}/payment", post(checkout::create_payment))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new().nest("/api/checkout", checkout_routes())
}

/// Build the full application router: health check, API routes, CORS, and
/// request tracing.
///
/// Sentry layers are added by the binary, outermost.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
