//! Checkout pricing engine.
//!
//! Pure functions that turn a cart snapshot, a shipping selection, and the
//! insurance toggle into [`CheckoutTotals`]. Totals are derived values: they
//! are recomputed whenever an input changes and never stored.
//!
//! All arithmetic is `Decimal`. Percentage-derived amounts (tax, insurance)
//! are rounded to the minor unit when computed, so the components always add
//! up to the grand total exactly.
//!
//! # Example
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use tienda_core::pricing::{PricingConfig, CheckoutTotals};
//! use tienda_core::shipping::{ShippingSelection, StaticShippingMethod};
//! use tienda_core::{CartLine, ProductId};
//!
//! let config = PricingConfig::default();
//! let lines = vec![
//!     CartLine::new(ProductId::new(1), 2, Decimal::new(50000, 2), Decimal::new(50000, 2)).unwrap(),
//! ];
//! let selection = ShippingSelection::Static(StaticShippingMethod::new("standard", Decimal::new(12000, 2)));
//! let totals = CheckoutTotals::compute(&lines, &selection, true, &config).unwrap();
//!
//! // 1000.00 is above the free-shipping threshold, so standard shipping is waived
//! assert_eq!(totals.shipping_cost(), Decimal::ZERO);
//! assert_eq!(totals.grand_total(), Decimal::new(126_000, 2));
//! ```

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::cart::CartLine;
use crate::shipping::{ShippingSelection, StaticShippingMethod};
use crate::types::{CurrencyCode, Price, price::round_minor};

/// Default tax rate (16%).
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(16, 0, 0, false, 2);
/// Default insurance rate (10%).
pub const DEFAULT_INSURANCE_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);
/// Default free-shipping threshold (500 currency units).
pub const DEFAULT_FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

/// Invalid pricing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingConfigError {
    #[error("{name} must be between 0 and 1, got {value}")]
    RateOutOfRange { name: &'static str, value: Decimal },
    #[error("free shipping threshold cannot be negative: {0}")]
    NegativeThreshold(Decimal),
    #[error("static shipping method {0:?} has a negative price")]
    NegativeMethodPrice(String),
    #[error("duplicate static shipping method {0:?}")]
    DuplicateMethod(String),
}

/// Immutable pricing parameters, passed explicitly to every computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    currency: CurrencyCode,
    tax_rate: Decimal,
    insurance_rate: Decimal,
    free_shipping_threshold: Decimal,
    static_methods: Vec<StaticShippingMethod>,
}

impl PricingConfig {
    /// Build a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `PricingConfigError` if a rate is outside `0..=1`, the
    /// threshold or a method price is negative, or method ids repeat.
    pub fn new(
        currency: CurrencyCode,
        tax_rate: Decimal,
        insurance_rate: Decimal,
        free_shipping_threshold: Decimal,
        static_methods: Vec<StaticShippingMethod>,
    ) -> Result<Self, PricingConfigError> {
        check_rate("tax rate", tax_rate)?;
        check_rate("insurance rate", insurance_rate)?;
        if free_shipping_threshold < Decimal::ZERO {
            return Err(PricingConfigError::NegativeThreshold(free_shipping_threshold));
        }
        for (i, method) in static_methods.iter().enumerate() {
            if method.price < Decimal::ZERO {
                return Err(PricingConfigError::NegativeMethodPrice(method.id.clone()));
            }
            if static_methods.iter().skip(i + 1).any(|m| m.id == method.id) {
                return Err(PricingConfigError::DuplicateMethod(method.id.clone()));
            }
        }

        Ok(Self {
            currency,
            tax_rate,
            insurance_rate,
            free_shipping_threshold,
            static_methods,
        })
    }

    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    #[must_use]
    pub const fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    #[must_use]
    pub const fn insurance_rate(&self) -> Decimal {
        self.insurance_rate
    }

    #[must_use]
    pub const fn free_shipping_threshold(&self) -> Decimal {
        self.free_shipping_threshold
    }

    #[must_use]
    pub fn static_methods(&self) -> &[StaticShippingMethod] {
        &self.static_methods
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyCode::MXN,
            tax_rate: DEFAULT_TAX_RATE,
            insurance_rate: DEFAULT_INSURANCE_RATE,
            free_shipping_threshold: DEFAULT_FREE_SHIPPING_THRESHOLD,
            static_methods: vec![
                StaticShippingMethod::new("standard", Decimal::new(12000, 2)),
                StaticShippingMethod::new("express", Decimal::new(25000, 2)),
            ],
        }
    }
}

fn check_rate(name: &'static str, value: Decimal) -> Result<(), PricingConfigError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(PricingConfigError::RateOutOfRange { name, value });
    }
    Ok(())
}

/// Arithmetic failure while pricing a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("{0} is out of range")]
    Overflow(&'static str),
}

/// Shipping amount plus whether it is backed by an actual selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShippingCost {
    pub amount: Decimal,
    /// `false` when nothing is selected; the amount is then 0 and must not be
    /// charged.
    pub resolved: bool,
}

// =============================================================================
// Formulas
// =============================================================================

/// Sum of `final_unit_price × quantity` over all lines.
///
/// # Errors
///
/// Returns `PricingError::Overflow` if a line total or the sum does not fit.
pub fn compute_subtotal(lines: &[CartLine]) -> Result<Decimal, PricingError> {
    lines.iter().try_fold(Decimal::ZERO, |sum, line| {
        line.line_total()
            .and_then(|total| sum.checked_add(total))
            .ok_or(PricingError::Overflow("subtotal"))
    })
}

/// `subtotal × tax_rate`, rounded to the minor unit.
///
/// # Errors
///
/// Returns `PricingError::Overflow` if the product does not fit.
pub fn compute_tax(subtotal: Decimal, tax_rate: Decimal) -> Result<Decimal, PricingError> {
    subtotal
        .checked_mul(tax_rate)
        .map(round_minor)
        .ok_or(PricingError::Overflow("tax"))
}

/// `subtotal × insurance_rate` when enabled, otherwise 0.
///
/// # Errors
///
/// Returns `PricingError::Overflow` if the product does not fit.
pub fn compute_insurance(
    subtotal: Decimal,
    enabled: bool,
    insurance_rate: Decimal,
) -> Result<Decimal, PricingError> {
    if !enabled {
        return Ok(Decimal::ZERO);
    }
    subtotal
        .checked_mul(insurance_rate)
        .map(round_minor)
        .ok_or(PricingError::Overflow("insurance"))
}

/// Shipping cost for the current selection.
///
/// Dynamic quotes are charged verbatim. Static methods are free at or above
/// `free_shipping_threshold`. An unresolved selection costs 0 but is flagged.
#[must_use]
pub fn compute_shipping(
    subtotal: Decimal,
    selection: &ShippingSelection,
    free_shipping_threshold: Decimal,
) -> ShippingCost {
    match selection {
        ShippingSelection::Unselected => ShippingCost {
            amount: Decimal::ZERO,
            resolved: false,
        },
        ShippingSelection::Dynamic(quote) => ShippingCost {
            amount: quote.price,
            resolved: true,
        },
        ShippingSelection::Static(method) => ShippingCost {
            amount: if subtotal >= free_shipping_threshold {
                Decimal::ZERO
            } else {
                method.price
            },
            resolved: true,
        },
    }
}

/// # Errors
///
/// Returns `PricingError::Overflow` if the sum does not fit.
pub fn compute_grand_total(
    subtotal: Decimal,
    shipping: Decimal,
    tax: Decimal,
    insurance: Decimal,
) -> Result<Decimal, PricingError> {
    [shipping, tax, insurance]
        .into_iter()
        .try_fold(subtotal, Decimal::checked_add)
        .ok_or(PricingError::Overflow("grand total"))
}

// =============================================================================
// CheckoutTotals
// =============================================================================

/// Derived checkout amounts in the cart's base currency.
///
/// Only [`CheckoutTotals::compute`] constructs this type, so
/// `grand_total == subtotal + shipping_cost + tax_amount + insurance_amount`
/// holds for every value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutTotals {
    currency: CurrencyCode,
    subtotal: Decimal,
    shipping_cost: Decimal,
    tax_amount: Decimal,
    insurance_amount: Decimal,
    grand_total: Decimal,
    shipping_resolved: bool,
}

impl CheckoutTotals {
    /// Price a checkout.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::Overflow` if any amount does not fit in a
    /// `Decimal`.
    pub fn compute(
        lines: &[CartLine],
        selection: &ShippingSelection,
        insurance_enabled: bool,
        config: &PricingConfig,
    ) -> Result<Self, PricingError> {
        let subtotal = compute_subtotal(lines)?;
        let shipping = compute_shipping(subtotal, selection, config.free_shipping_threshold);
        let tax_amount = compute_tax(subtotal, config.tax_rate)?;
        let insurance_amount =
            compute_insurance(subtotal, insurance_enabled, config.insurance_rate)?;

        Ok(Self {
            currency: config.currency,
            subtotal,
            shipping_cost: shipping.amount,
            tax_amount,
            insurance_amount,
            grand_total: compute_grand_total(
                subtotal,
                shipping.amount,
                tax_amount,
                insurance_amount,
            )?,
            shipping_resolved: shipping.resolved,
        })
    }

    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    #[must_use]
    pub const fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    #[must_use]
    pub const fn shipping_cost(&self) -> Decimal {
        self.shipping_cost
    }

    #[must_use]
    pub const fn tax_amount(&self) -> Decimal {
        self.tax_amount
    }

    #[must_use]
    pub const fn insurance_amount(&self) -> Decimal {
        self.insurance_amount
    }

    #[must_use]
    pub const fn grand_total(&self) -> Decimal {
        self.grand_total
    }

    /// Whether a shipping option backs `shipping_cost`.
    #[must_use]
    pub const fn shipping_resolved(&self) -> bool {
        self.shipping_resolved
    }

    /// The grand total as a [`Price`], ready for minor-unit conversion.
    #[must_use]
    pub const fn grand_total_price(&self) -> Price {
        Price::new(self.grand_total, self.currency)
    }
}
