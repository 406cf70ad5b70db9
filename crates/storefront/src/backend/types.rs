//! Raw backend payloads and their normalization.
//!
//! The backend has grown several names for the same field over time
//! (`precio` vs `price`, `paqueteria` vs `carrier`, ...). Everything is
//! deserialized through the permissive types here and converted once into the
//! fixed `tienda_core` types; nothing past this module sees the raw shapes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tienda_core::cart::discounted_price;
use tienda_core::types::price::round_minor;
use tienda_core::{
    CartId, CartLine, CurrencyCode, Destination, ProductId, ShippingQuote, SizeId, VariantId,
};
use tracing::warn;

// =============================================================================
// Carts
// =============================================================================

/// `GET /carts/{id}` response body.
#[derive(Debug, Deserialize)]
pub struct CartPayload {
    #[serde(default, alias = "lineas", alias = "lines")]
    pub items: Vec<RawCartItem>,
}

/// One cart item as the backend sends it.
#[derive(Debug, Deserialize)]
pub struct RawCartItem {
    #[serde(default, alias = "producto_id", alias = "productId")]
    pub product_id: Option<i64>,
    #[serde(default, alias = "variante_id", alias = "variantId")]
    pub variant_id: Option<i64>,
    #[serde(default, alias = "talla_id", alias = "sizeId")]
    pub size_id: Option<i64>,
    #[serde(default, alias = "cantidad", alias = "qty")]
    pub quantity: Option<i64>,
    #[serde(default, alias = "price", alias = "precio", alias = "precio_unitario", alias = "unitPrice")]
    pub unit_price: Option<Decimal>,
    #[serde(default, alias = "precio_final", alias = "final_price", alias = "finalPrice")]
    pub final_unit_price: Option<Decimal>,
    #[serde(default, alias = "descuento", alias = "discount", alias = "discountPercent")]
    pub discount_percent: Option<Decimal>,
}

impl RawCartItem {
    /// Convert into a validated [`CartLine`].
    ///
    /// A missing final price is derived from the unit price and discount; a
    /// missing unit price falls back to the final price.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the item cannot be priced.
    pub fn into_line(self) -> Result<CartLine, String> {
        let product_id = self.product_id.ok_or("missing product id")?;
        let quantity = self
            .quantity
            .and_then(|q| u32::try_from(q).ok())
            .filter(|q| *q > 0)
            .ok_or_else(|| format!("invalid quantity {:?}", self.quantity))?;

        let (unit_price, final_unit_price) = match (
            self.unit_price,
            self.final_unit_price,
            self.discount_percent,
        ) {
            (Some(unit), Some(final_price), _) => (unit, final_price),
            (Some(unit), None, Some(percent)) => {
                (unit, discounted_price(unit, percent).map_err(|e| e.to_string())?)
            }
            (Some(unit), None, None) => (unit, unit),
            (None, Some(final_price), _) => (final_price, final_price),
            (None, None, _) => return Err("missing price".to_string()),
        };

        let mut line = CartLine::new(
            ProductId::new(product_id),
            quantity,
            round_minor(unit_price),
            round_minor(final_unit_price),
        )
        .map_err(|e| e.to_string())?;
        if let Some(variant_id) = self.variant_id {
            line = line.with_variant(VariantId::new(variant_id), self.size_id.map(SizeId::new));
        }
        if let Some(percent) = self.discount_percent.filter(|p| !p.is_zero()) {
            line = line.with_discount(percent);
            line.validate().map_err(|e| e.to_string())?;
        }
        Ok(line)
    }
}

/// Normalize a cart payload, dropping items that cannot be priced.
#[must_use]
pub fn normalize_cart(cart_id: CartId, payload: CartPayload) -> Vec<CartLine> {
    payload
        .items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match item.into_line() {
            Ok(line) => Some(line),
            Err(reason) => {
                warn!(%cart_id, index, %reason, "Skipping malformed cart item");
                None
            }
        })
        .collect()
}

// =============================================================================
// Shipping rates
// =============================================================================

/// `POST /shipping/rates` request body.
#[derive(Debug, Serialize)]
pub struct RatesRequest<'a> {
    pub postal_code: &'a str,
    pub country_code: &'a str,
    pub cart_id: CartId,
}

impl<'a> RatesRequest<'a> {
    #[must_use]
    pub fn new(destination: &'a Destination, cart_id: CartId) -> Self {
        Self {
            postal_code: &destination.postal_code,
            country_code: &destination.country_code,
            cart_id,
        }
    }
}

/// `POST /shipping/rates` response body.
#[derive(Debug, Deserialize)]
pub struct RatesPayload {
    #[serde(default = "default_success", alias = "ok", alias = "exito")]
    pub success: bool,
    #[serde(default, alias = "rates", alias = "tarifas", alias = "cotizaciones")]
    pub quotes: Vec<RawQuote>,
    #[serde(default, alias = "error", alias = "mensaje")]
    pub message: Option<String>,
}

const fn default_success() -> bool {
    true
}

/// One quote as the carrier aggregator sends it.
#[derive(Debug, Deserialize)]
pub struct RawQuote {
    #[serde(default, alias = "paqueteria", alias = "carrier_name", alias = "provider")]
    pub carrier: Option<String>,
    #[serde(default, alias = "servicio", alias = "service_name", alias = "service_level")]
    pub service: Option<String>,
    #[serde(default, alias = "precio", alias = "total_price", alias = "costo")]
    pub price: Option<Decimal>,
    #[serde(default, alias = "moneda", alias = "currency_code")]
    pub currency: Option<String>,
    #[serde(default, alias = "dias_estimados", alias = "days", alias = "delivery_days")]
    pub estimated_days: Option<i64>,
}

impl RawQuote {
    /// Convert into a [`ShippingQuote`] priced in `expected` currency.
    ///
    /// # Errors
    ///
    /// Returns a reason when the quote has no carrier, no usable price, or is
    /// priced in a different currency.
    pub fn into_quote(self, expected: CurrencyCode) -> Result<ShippingQuote, String> {
        let carrier = self
            .carrier
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or("missing carrier")?;
        let price = self.price.ok_or("missing price")?;
        if price.is_sign_negative() && !price.is_zero() {
            return Err(format!("negative price {price}"));
        }
        let currency = match self.currency.as_deref() {
            None | Some("") => expected,
            Some(code) => code.parse::<CurrencyCode>().map_err(|e| e.to_string())?,
        };
        if currency != expected {
            return Err(format!(
                "priced in {}, expected {}",
                currency.code(),
                expected.code()
            ));
        }

        Ok(ShippingQuote {
            carrier,
            service: self
                .service
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "standard".to_string()),
            price: round_minor(price),
            currency,
            estimated_days: self.estimated_days.and_then(|d| u32::try_from(d).ok()),
        })
    }
}

/// Normalize quotes, dropping entries that would corrupt totals.
#[must_use]
pub fn normalize_quotes(quotes: Vec<RawQuote>, expected: CurrencyCode) -> Vec<ShippingQuote> {
    quotes
        .into_iter()
        .enumerate()
        .filter_map(|(index, raw)| match raw.into_quote(expected) {
            Ok(quote) => Some(quote),
            Err(reason) => {
                warn!(index, %reason, "Skipping unusable shipping quote");
                None
            }
        })
        .collect()
}

/// Error body shape used by the backend for non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ErrorPayload {
    #[serde(alias = "error", alias = "mensaje", alias = "detail")]
    pub message: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(json: &str) -> RawCartItem {
        serde_json::from_str(json).unwrap()
    }

    fn raw_quote(json: &str) -> RawQuote {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_cart_item_spanish_fields() {
        let line = item(
            r#"{"producto_id": 9, "variante_id": 3, "talla_id": 2, "cantidad": 2,
                "precio": "250.00", "precio_final": "200.00", "descuento": 20}"#,
        )
        .into_line()
        .unwrap();
        assert_eq!(line.product_id, ProductId::new(9));
        assert_eq!(line.variant_id, Some(VariantId::new(3)));
        assert_eq!(line.size_id, Some(SizeId::new(2)));
        assert_eq!(line.final_unit_price, dec!(200.00));
        assert_eq!(line.discount_percent, Some(dec!(20)));
    }

    #[test]
    fn test_cart_item_derives_final_price_from_discount() {
        let line = item(r#"{"product_id": 1, "quantity": 1, "unit_price": 100, "discount": 15}"#)
            .into_line()
            .unwrap();
        assert_eq!(line.final_unit_price, dec!(85.00));
    }

    #[test]
    fn test_cart_item_numeric_prices() {
        let line = item(r#"{"product_id": 1, "quantity": 3, "final_price": 19.9}"#)
            .into_line()
            .unwrap();
        assert_eq!(line.unit_price, dec!(19.90));
        assert_eq!(line.line_total(), Some(dec!(59.70)));
    }

    #[test]
    fn test_cart_item_rejects_bad_input() {
        assert!(item(r#"{"product_id": 1, "quantity": 0, "price": 10}"#).into_line().is_err());
        assert!(item(r#"{"product_id": 1, "quantity": 1}"#).into_line().is_err());
        assert!(item(r#"{"quantity": 1, "price": 10}"#).into_line().is_err());
        assert!(item(r#"{"product_id": 1, "quantity": 1, "price": null}"#).into_line().is_err());
    }

    #[test]
    fn test_cart_item_rejects_overflowing_line_total() {
        let err = item(
            r#"{"product_id": 1, "quantity": 100000, "price": "79228162514264337593543950.00"}"#,
        )
        .into_line()
        .unwrap_err();
        assert!(err.starts_with("line total out of range"));
    }

    #[test]
    fn test_normalize_cart_skips_malformed() {
        let payload: CartPayload = serde_json::from_str(
            r#"{"items": [
                {"product_id": 1, "quantity": 1, "price": "10.00"},
                {"product_id": 2, "quantity": -1, "price": "10.00"}
            ]}"#,
        )
        .unwrap();
        let lines = normalize_cart(CartId::new(5), payload);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_quote_spanish_fields() {
        let quote = raw_quote(
            r#"{"paqueteria": "Estafeta", "servicio": "Terrestre", "precio": 85.5,
                "moneda": "MXN", "dias_estimados": 4}"#,
        )
        .into_quote(CurrencyCode::MXN)
        .unwrap();
        assert_eq!(quote.carrier, "Estafeta");
        assert_eq!(quote.service, "Terrestre");
        assert_eq!(quote.price, dec!(85.50));
        assert_eq!(quote.estimated_days, Some(4));
    }

    #[test]
    fn test_quote_null_price_skipped() {
        let quotes = vec![
            raw_quote(r#"{"carrier": "dhl", "service": "express", "price": null}"#),
            raw_quote(r#"{"carrier": "fedex", "service": "ground", "price": "99.00"}"#),
            raw_quote(r#"{"carrier": "ups", "price": "-5"}"#),
        ];
        let normalized = normalize_quotes(quotes, CurrencyCode::MXN);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized.first().unwrap().carrier, "fedex");
    }

    #[test]
    fn test_quote_foreign_currency_skipped() {
        let result = raw_quote(r#"{"carrier": "dhl", "price": 10, "currency": "USD"}"#)
            .into_quote(CurrencyCode::MXN);
        assert!(result.unwrap_err().contains("USD"));
    }

    #[test]
    fn test_rates_payload_defaults() {
        let payload: RatesPayload = serde_json::from_str(r#"{"tarifas": []}"#).unwrap();
        assert!(payload.success);
        assert!(payload.quotes.is_empty());

        let payload: RatesPayload =
            serde_json::from_str(r#"{"success": false, "mensaje": "CP inválido"}"#).unwrap();
        assert!(!payload.success);
        assert_eq!(payload.message.as_deref(), Some("CP inválido"));
    }
}
