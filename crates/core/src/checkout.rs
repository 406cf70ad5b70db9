//! Checkout form state and the automatic shipping-quote trigger.
//!
//! The storefront fetches shipping quotes on its own once the customer has
//! filled in every required field. [`CheckoutState`] is the I/O-free state
//! machine behind that behavior:
//!
//! ```text
//! NotRequested --form complete--> Fetching(gen) --settle(gen)--> Ready | Failed
//!      ^                               |                           |
//!      +-------- form incomplete ------+---------------------------+
//! ```
//!
//! Every fetch is stamped with a generation number. Clearing the form or
//! starting a newer fetch bumps the generation, so a late result from an older
//! fetch is discarded instead of being applied to a different address.
//!
//! The quotes from the last successful fetch stay on offer while a refresh
//! for the same destination is in flight or has failed, so an existing
//! shipping choice keeps its price. They are dropped when the destination
//! changes or the form becomes incomplete.

use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::pricing::{CheckoutTotals, PricingConfig, PricingError};
use crate::shipping::{Destination, ShippingChoice, ShippingQuote, ShippingSelection};

/// Customer details collected on the checkout page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub street: String,
    pub interior_number: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub delivery_notes: String,
}

impl CheckoutForm {
    /// Required fields, by name, in display order.
    fn required(&self) -> [(&'static str, &str); 7] {
        [
            ("full_name", self.full_name.as_str()),
            ("email", self.email.as_str()),
            ("phone", self.phone.as_str()),
            ("street", self.street.as_str()),
            ("city", self.city.as_str()),
            ("state", self.state.as_str()),
            ("postal_code", self.postal_code.as_str()),
        ]
    }

    /// Whether every required field is non-blank.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.required()
            .iter()
            .all(|(_, value)| !value.trim().is_empty())
    }

    /// Names of required fields that are still blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.required()
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect()
    }

    #[must_use]
    pub fn destination(&self) -> Destination {
        Destination::new(self.postal_code.as_str())
    }
}

/// Where the shipping quotes for this checkout stand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuoteState {
    #[default]
    NotRequested,
    Fetching,
    Ready { quotes: Vec<ShippingQuote> },
    Failed { message: String },
}

impl QuoteState {
    /// Quotes currently on offer (empty unless `Ready`).
    #[must_use]
    pub fn quotes(&self) -> &[ShippingQuote] {
        match self {
            Self::Ready { quotes } => quotes,
            _ => &[],
        }
    }
}

/// A fetch the caller must perform, stamped with the generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub generation: u64,
    pub destination: Destination,
}

/// Why a checkout cannot be paid yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Blocker {
    EmptyCart,
    IncompleteForm { missing: Vec<&'static str> },
    ShippingUnresolved,
}

/// Per-checkout state: form, quotes, shipping choice, and insurance toggle.
#[derive(Debug, Clone, Default)]
pub struct CheckoutState {
    form: CheckoutForm,
    quotes: QuoteState,
    choice: Option<ShippingChoice>,
    insurance_enabled: bool,
    generation: u64,
    /// Destination of the most recent fetch while the form stayed complete.
    requested_for: Option<Destination>,
    /// Quotes from the last successful fetch for `requested_for`.
    offered: Vec<ShippingQuote>,
}

impl CheckoutState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn form(&self) -> &CheckoutForm {
        &self.form
    }

    #[must_use]
    pub const fn quotes(&self) -> &QuoteState {
        &self.quotes
    }

    /// Quotes a shipping choice resolves against: the last successful fetch
    /// for the current destination, even if a later refresh failed.
    #[must_use]
    pub fn offered_quotes(&self) -> &[ShippingQuote] {
        &self.offered
    }

    #[must_use]
    pub const fn choice(&self) -> Option<&ShippingChoice> {
        self.choice.as_ref()
    }

    #[must_use]
    pub const fn insurance_enabled(&self) -> bool {
        self.insurance_enabled
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the form and re-evaluate the "form complete" predicate.
    ///
    /// Returns a [`QuoteRequest`] when the form has just become complete, or
    /// when it is still complete but now points at a different destination.
    /// When the form becomes incomplete, held quotes are dropped and any
    /// in-flight fetch is invalidated.
    pub fn update_form(&mut self, form: CheckoutForm) -> Option<QuoteRequest> {
        self.form = form;

        if !self.form.is_complete() {
            if self.requested_for.take().is_some() || self.quotes != QuoteState::NotRequested {
                self.generation += 1;
                self.quotes = QuoteState::NotRequested;
            }
            self.offered.clear();
            return None;
        }

        if self.requested_for.as_ref() == Some(&self.form.destination()) {
            return None;
        }
        self.request_quotes()
    }

    /// Start a new fetch for the current destination, superseding any fetch
    /// still in flight. Used for the automatic trigger and for explicit
    /// retries after a failure.
    ///
    /// Returns `None` while the form is incomplete.
    pub fn request_quotes(&mut self) -> Option<QuoteRequest> {
        if !self.form.is_complete() {
            return None;
        }
        let destination = self.form.destination();
        if self.requested_for.as_ref() != Some(&destination) {
            self.offered.clear();
        }
        self.generation += 1;
        self.requested_for = Some(destination.clone());
        self.quotes = QuoteState::Fetching;
        Some(QuoteRequest {
            generation: self.generation,
            destination,
        })
    }

    /// Apply the outcome of a fetch.
    ///
    /// A failure leaves the previously offered quotes in place.
    ///
    /// Returns `false` (and changes nothing) if the request has been
    /// superseded since it was issued.
    pub fn settle(
        &mut self,
        request: &QuoteRequest,
        outcome: Result<Vec<ShippingQuote>, String>,
    ) -> bool {
        if request.generation != self.generation {
            return false;
        }
        self.quotes = match outcome {
            Ok(quotes) => {
                self.offered.clone_from(&quotes);
                QuoteState::Ready { quotes }
            }
            Err(message) => QuoteState::Failed { message },
        };
        true
    }

    pub fn choose_shipping(&mut self, choice: Option<ShippingChoice>) {
        self.choice = choice;
    }

    pub const fn set_insurance(&mut self, enabled: bool) {
        self.insurance_enabled = enabled;
    }

    /// Resolve the current choice against what is on offer.
    #[must_use]
    pub fn selection(&self, config: &PricingConfig) -> ShippingSelection {
        ShippingSelection::resolve(
            self.choice.as_ref(),
            &self.offered,
            config.static_methods(),
        )
    }

    /// Price the checkout against the given cart snapshot.
    ///
    /// # Errors
    ///
    /// Returns `PricingError` if an amount overflows.
    pub fn totals(
        &self,
        lines: &[CartLine],
        config: &PricingConfig,
    ) -> Result<CheckoutTotals, PricingError> {
        CheckoutTotals::compute(
            lines,
            &self.selection(config),
            self.insurance_enabled,
            config,
        )
    }

    /// Everything standing between this checkout and payment.
    #[must_use]
    pub fn blockers(&self, lines: &[CartLine], totals: &CheckoutTotals) -> Vec<Blocker> {
        let mut blockers = Vec::new();
        if lines.is_empty() {
            blockers.push(Blocker::EmptyCart);
        }
        if !self.form.is_complete() {
            blockers.push(Blocker::IncompleteForm {
                missing: self.form.missing_fields(),
            });
        }
        if !totals.shipping_resolved() {
            blockers.push(Blocker::ShippingUnresolved);
        }
        blockers
    }
}
