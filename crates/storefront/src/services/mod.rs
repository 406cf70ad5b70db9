//! Business logic services for the checkout API.
//!
//! - `quotes` - Shipping-quote fetching with a single retry on empty results
//! - `checkout` - Per-cart checkout sessions, pricing, and readiness

pub mod checkout;
pub mod quotes;

pub use checkout::{CheckoutError, CheckoutService, CheckoutView};
pub use quotes::{QuoteFetcher, QuoteRetryPolicy, ShippingError};
