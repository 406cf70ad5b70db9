//! Shipping quotes, static fallback methods, and the customer's choice.
//!
//! Two kinds of shipping option exist:
//!
//! - **Dynamic quotes** come from the carrier-aggregation service for a
//!   specific destination and cart.
//! - **Static methods** are configured flat-rate fallbacks, offered only when
//!   no dynamic quote is available.
//!
//! Dynamic quotes always take precedence: a static choice is honored only
//! while the quote list is empty.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::CurrencyCode;

/// A priced shipping offer for a specific destination and cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub carrier: String,
    pub service: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub estimated_days: Option<u32>,
}

impl ShippingQuote {
    /// Whether this quote is the one identified by `carrier`/`service`.
    #[must_use]
    pub fn matches(&self, carrier: &str, service: &str) -> bool {
        self.carrier.eq_ignore_ascii_case(carrier) && self.service.eq_ignore_ascii_case(service)
    }
}

/// A configured flat-rate shipping method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticShippingMethod {
    pub id: String,
    pub price: Decimal,
}

impl StaticShippingMethod {
    #[must_use]
    pub fn new(id: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            price,
        }
    }
}

/// Where the order ships to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country_code: String,
}

fn default_country() -> String {
    "MX".to_string()
}

impl Destination {
    #[must_use]
    pub fn new(postal_code: impl Into<String>) -> Self {
        Self {
            postal_code: postal_code.into().trim().to_string(),
            country_code: default_country(),
        }
    }

    /// Postal codes must be non-empty ASCII alphanumerics (spaces and dashes allowed).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let code = self.postal_code.trim();
        !code.is_empty()
            && code.len() <= 12
            && code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
    }
}

/// What the customer picked, as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShippingChoice {
    Quote { carrier: String, service: String },
    Static { method: String },
}

/// A choice resolved against what is currently on offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShippingSelection {
    /// Nothing selected, or the selection no longer matches an offer.
    Unselected,
    Dynamic(ShippingQuote),
    Static(StaticShippingMethod),
}

impl ShippingSelection {
    /// Resolve a client choice against the offered quotes and static methods.
    ///
    /// A static choice resolves only when `quotes` is empty. A quote choice
    /// that is not among `quotes` (e.g. the quotes were refreshed) resolves to
    /// `Unselected`.
    #[must_use]
    pub fn resolve(
        choice: Option<&ShippingChoice>,
        quotes: &[ShippingQuote],
        static_methods: &[StaticShippingMethod],
    ) -> Self {
        match choice {
            None => Self::Unselected,
            Some(ShippingChoice::Quote { carrier, service }) => quotes
                .iter()
                .find(|q| q.matches(carrier, service))
                .map_or(Self::Unselected, |q| Self::Dynamic(q.clone())),
            Some(ShippingChoice::Static { method }) => {
                if !quotes.is_empty() {
                    return Self::Unselected;
                }
                static_methods
                    .iter()
                    .find(|m| m.id == *method)
                    .map_or(Self::Unselected, |m| Self::Static(m.clone()))
            }
        }
    }

    #[must_use]
    pub const fn is_selected(&self) -> bool {
        !matches!(self, Self::Unselected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(carrier: &str, price: Decimal) -> ShippingQuote {
        ShippingQuote {
            carrier: carrier.to_string(),
            service: "ground".to_string(),
            price,
            currency: CurrencyCode::MXN,
            estimated_days: Some(3),
        }
    }

    fn statics() -> Vec<StaticShippingMethod> {
        vec![StaticShippingMethod::new("standard", dec!(120.00))]
    }

    #[test]
    fn test_resolve_dynamic_quote() {
        let quotes = vec![quote("dhl", dec!(85.50)), quote("fedex", dec!(99))];
        let choice = ShippingChoice::Quote {
            carrier: "DHL".to_string(),
            service: "ground".to_string(),
        };
        let selection = ShippingSelection::resolve(Some(&choice), &quotes, &statics());
        assert_eq!(selection, ShippingSelection::Dynamic(quote("dhl", dec!(85.50))));
    }

    #[test]
    fn test_resolve_stale_quote_is_unselected() {
        let choice = ShippingChoice::Quote {
            carrier: "estafeta".to_string(),
            service: "ground".to_string(),
        };
        let quotes = vec![quote("dhl", dec!(85.50))];
        let selection = ShippingSelection::resolve(Some(&choice), &quotes, &statics());
        assert_eq!(selection, ShippingSelection::Unselected);
    }

    #[test]
    fn test_resolve_static_only_without_quotes() {
        let choice = ShippingChoice::Static {
            method: "standard".to_string(),
        };
        let selection = ShippingSelection::resolve(Some(&choice), &[], &statics());
        assert!(matches!(selection, ShippingSelection::Static(_)));

        let quotes = vec![quote("dhl", dec!(85.50))];
        let selection = ShippingSelection::resolve(Some(&choice), &quotes, &statics());
        assert_eq!(selection, ShippingSelection::Unselected);
    }

    #[test]
    fn test_resolve_unknown_static_method() {
        let choice = ShippingChoice::Static {
            method: "drone".to_string(),
        };
        let selection = ShippingSelection::resolve(Some(&choice), &[], &statics());
        assert!(!selection.is_selected());
    }

    #[test]
    fn test_choice_wire_format() {
        let json = r#"{"kind":"quote","carrier":"dhl","service":"express"}"#;
        let choice: ShippingChoice = serde_json::from_str(json).unwrap_or(ShippingChoice::Static {
            method: String::new(),
        });
        assert_eq!(
            choice,
            ShippingChoice::Quote {
                carrier: "dhl".to_string(),
                service: "express".to_string(),
            }
        );
    }

    #[test]
    fn test_destination_validation() {
        assert!(Destination::new("06600").is_valid());
        assert!(Destination::new(" 06600 ").is_valid());
        assert!(!Destination::new("").is_valid());
        assert!(!Destination::new("06600; drop").is_valid());
    }
}
