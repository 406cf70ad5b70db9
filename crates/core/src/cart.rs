//! Cart line items as seen by checkout.
//!
//! Lines are owned by the backend cart service; checkout only reads them.
//! Backend payloads are normalized into [`CartLine`] at the ingestion boundary
//! (see the storefront `backend` module), so everything here can assume a
//! single fixed shape.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ProductId, SizeId, VariantId, price::round_minor};

/// Reasons a cart line fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartLineError {
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("price cannot be negative: {0}")]
    NegativePrice(Decimal),
    #[error("discount percent must be between 0 and 100, got {0}")]
    DiscountOutOfRange(Decimal),
    #[error("line total out of range: {price} x {quantity}")]
    TotalOutOfRange { price: Decimal, quantity: u32 },
}

/// One product/variant/size/quantity entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub size_id: Option<SizeId>,
    pub quantity: u32,
    /// Unit price before any discount.
    pub unit_price: Decimal,
    /// Unit price after discount. This is what the customer pays.
    pub final_unit_price: Decimal,
    /// Discount applied to `unit_price`, in percent.
    pub discount_percent: Option<Decimal>,
}

impl CartLine {
    /// Build a validated line.
    ///
    /// # Errors
    ///
    /// Returns `CartLineError` if the quantity is zero, a price is negative,
    /// the discount is outside `0..=100`, or the line total does not fit in a
    /// `Decimal`.
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        unit_price: Decimal,
        final_unit_price: Decimal,
    ) -> Result<Self, CartLineError> {
        let line = Self {
            product_id,
            variant_id: None,
            size_id: None,
            quantity,
            unit_price,
            final_unit_price,
            discount_percent: None,
        };
        line.validate()?;
        Ok(line)
    }

    /// Set the variant and size.
    #[must_use]
    pub const fn with_variant(mut self, variant_id: VariantId, size_id: Option<SizeId>) -> Self {
        self.variant_id = Some(variant_id);
        self.size_id = size_id;
        self
    }

    /// Set the discount percent that produced `final_unit_price`.
    #[must_use]
    pub const fn with_discount(mut self, percent: Decimal) -> Self {
        self.discount_percent = Some(percent);
        self
    }

    /// Check the line's invariants.
    ///
    /// # Errors
    ///
    /// See [`CartLine::new`].
    pub fn validate(&self) -> Result<(), CartLineError> {
        if self.quantity == 0 {
            return Err(CartLineError::ZeroQuantity);
        }
        for price in [self.unit_price, self.final_unit_price] {
            if price.is_sign_negative() && !price.is_zero() {
                return Err(CartLineError::NegativePrice(price));
            }
        }
        if let Some(percent) = self.discount_percent {
            if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
                return Err(CartLineError::DiscountOutOfRange(percent));
            }
        }
        if self.line_total().is_none() {
            return Err(CartLineError::TotalOutOfRange {
                price: self.final_unit_price,
                quantity: self.quantity,
            });
        }
        Ok(())
    }

    /// `final_unit_price × quantity`, or `None` on overflow.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        self.final_unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Apply a percentage discount to a unit price, rounded to the minor unit.
///
/// # Errors
///
/// Returns `CartLineError::DiscountOutOfRange` for percentages outside `0..=100`.
pub fn discounted_price(unit_price: Decimal, percent: Decimal) -> Result<Decimal, CartLineError> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(CartLineError::DiscountOutOfRange(percent));
    }
    let factor = (Decimal::ONE_HUNDRED - percent) / Decimal::ONE_HUNDRED;
    Ok(round_minor(unit_price * factor))
}
