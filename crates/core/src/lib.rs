//! Tienda Core - Checkout types and pricing.
//!
//! This crate provides the pieces of checkout that need no I/O:
//! - [`types`] - Newtype IDs, prices, and currency codes
//! - [`cart`] - Cart lines as read by checkout
//! - [`shipping`] - Shipping quotes, static fallback methods, and choices
//! - [`pricing`] - Subtotal, tax, insurance, shipping, and grand-total formulas
//! - [`checkout`] - Checkout form state and the automatic quote trigger
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no database
//! access, no HTTP clients, no clocks. The `storefront` crate wires these into
//! network calls and HTTP handlers.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod pricing;
pub mod shipping;
pub mod types;

pub use cart::{CartLine, CartLineError};
pub use checkout::{Blocker, CheckoutForm, CheckoutState, QuoteRequest, QuoteState};
pub use pricing::{CheckoutTotals, PricingConfig, PricingConfigError, PricingError};
pub use shipping::{Destination, ShippingChoice, ShippingQuote, ShippingSelection, StaticShippingMethod};
pub use types::*;
