//! Core types for Tienda.
//!
//! This module provides type-safe wrappers for common checkout concepts.

pub mod id;
pub mod price;

pub use id::*;
pub use price::{CurrencyCode, Price, PriceError};
