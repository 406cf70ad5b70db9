//! Checkout sessions.
//!
//! One [`CheckoutState`] per cart, kept in memory for 30 minutes of
//! inactivity. Each session sits behind a `tokio` mutex that is only held for
//! synchronous state updates; cart reads and quote fetches happen with the
//! lock released, and their results are applied under the lock afterwards.
//! A fetch that has been superseded while it was in flight is discarded by
//! [`CheckoutState::settle`].

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use thiserror::Error;
use tienda_core::{
    Blocker, CartId, CartLine, CheckoutForm, CheckoutState, CheckoutTotals, PricingConfig,
    PricingError, QuoteRequest, QuoteState, ShippingChoice, ShippingQuote, ShippingSelection,
    StaticShippingMethod,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::backend::{BackendError, CartService, ShippingRateService};
use crate::error::add_breadcrumb;
use crate::services::quotes::{QuoteFetcher, QuoteRetryPolicy};

/// Idle lifetime of a checkout session.
const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Upper bound on concurrently open checkouts.
const MAX_SESSIONS: u64 = 10_000;

/// Errors from checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Reading the cart failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The requested shipping option is not on offer.
    #[error("Shipping option is not available: {0}")]
    UnknownShippingOption(String),

    /// The checkout cannot be paid yet.
    #[error("Checkout is not ready for payment")]
    NotPayable(Vec<Blocker>),

    /// Cart amounts overflowed while pricing.
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Everything the checkout page renders, computed from a fresh cart read.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutView {
    pub cart_id: CartId,
    pub lines: Vec<CartLine>,
    pub form: CheckoutForm,
    pub quotes: QuoteState,
    /// Quotes a choice can name; kept from the last successful fetch when a
    /// refresh fails.
    pub offered_quotes: Vec<ShippingQuote>,
    /// Fallback methods; only offered while there are no dynamic quotes.
    pub static_methods: Vec<StaticShippingMethod>,
    pub choice: Option<ShippingChoice>,
    pub insurance_enabled: bool,
    pub totals: CheckoutTotals,
    pub grand_total_display: String,
    pub payable: bool,
    pub blockers: Vec<Blocker>,
}

type Session = Arc<Mutex<CheckoutState>>;

/// Checkout sessions over a cart source and a shipping-rate source.
pub struct CheckoutService<B> {
    inner: Arc<CheckoutServiceInner<B>>,
}

struct CheckoutServiceInner<B> {
    fetcher: QuoteFetcher<B>,
    pricing: PricingConfig,
    sessions: Cache<CartId, Session>,
}

impl<B> Clone for CheckoutService<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> CheckoutService<B>
where
    B: CartService + ShippingRateService,
{
    #[must_use]
    pub fn new(backend: B, pricing: PricingConfig, retry: QuoteRetryPolicy) -> Self {
        let sessions = Cache::builder()
            .max_capacity(MAX_SESSIONS)
            .time_to_idle(SESSION_IDLE_TTL)
            .build();

        Self {
            inner: Arc::new(CheckoutServiceInner {
                fetcher: QuoteFetcher::new(backend, retry),
                pricing,
                sessions,
            }),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        self.inner.fetcher.service()
    }

    #[must_use]
    pub fn pricing(&self) -> &PricingConfig {
        &self.inner.pricing
    }

    async fn session(&self, cart_id: CartId) -> Session {
        self.inner
            .sessions
            .get_with(cart_id, async { Arc::new(Mutex::new(CheckoutState::new())) })
            .await
    }

    /// Current checkout view.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Backend` if the cart cannot be read, or
    /// `CheckoutError::Pricing` if its amounts overflow.
    #[instrument(skip(self))]
    pub async fn view(&self, cart_id: CartId) -> Result<CheckoutView, CheckoutError> {
        let lines = self.backend().cart_lines(cart_id).await?;
        let session = self.session(cart_id).await;
        let state = session.lock().await;
        self.build_view(cart_id, lines, &state)
    }

    /// Replace the checkout form, fetching quotes if the form has just become
    /// complete or now points somewhere else.
    ///
    /// Quote failures do not fail the update; they are recorded in the quote
    /// state with the backend's message.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Backend` if the cart cannot be read.
    #[instrument(skip(self, form))]
    pub async fn update_form(
        &self,
        cart_id: CartId,
        form: CheckoutForm,
    ) -> Result<CheckoutView, CheckoutError> {
        let session = self.session(cart_id).await;
        let request = session.lock().await.update_form(form);
        if let Some(request) = request {
            self.fetch_and_settle(cart_id, &session, request).await;
        }
        self.view(cart_id).await
    }

    /// Fetch quotes again for the current destination, e.g. after a failure.
    ///
    /// Does nothing while the form is incomplete.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Backend` if the cart cannot be read.
    #[instrument(skip(self))]
    pub async fn refresh_quotes(&self, cart_id: CartId) -> Result<CheckoutView, CheckoutError> {
        let session = self.session(cart_id).await;
        let request = session.lock().await.request_quotes();
        if let Some(request) = request {
            self.fetch_and_settle(cart_id, &session, request).await;
        }
        self.view(cart_id).await
    }

    /// Choose a shipping option, or clear the choice with `None`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::UnknownShippingOption` if the option is not
    /// currently on offer, or `CheckoutError::Backend` if the cart cannot be
    /// read.
    #[instrument(skip(self))]
    pub async fn choose_shipping(
        &self,
        cart_id: CartId,
        choice: Option<ShippingChoice>,
    ) -> Result<CheckoutView, CheckoutError> {
        let session = self.session(cart_id).await;
        {
            let mut state = session.lock().await;
            if let Some(choice) = &choice {
                let selection = ShippingSelection::resolve(
                    Some(choice),
                    state.offered_quotes(),
                    self.inner.pricing.static_methods(),
                );
                if !selection.is_selected() {
                    return Err(CheckoutError::UnknownShippingOption(describe(choice)));
                }
            }
            state.choose_shipping(choice);
        }
        self.view(cart_id).await
    }

    /// Toggle shipping insurance.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Backend` if the cart cannot be read.
    #[instrument(skip(self))]
    pub async fn set_insurance(
        &self,
        cart_id: CartId,
        enabled: bool,
    ) -> Result<CheckoutView, CheckoutError> {
        self.session(cart_id).await.lock().await.set_insurance(enabled);
        self.view(cart_id).await
    }

    /// The checkout view, provided nothing blocks payment.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotPayable` with the outstanding blockers, or
    /// `CheckoutError::Backend` if the cart cannot be read.
    #[instrument(skip(self))]
    pub async fn payable(&self, cart_id: CartId) -> Result<CheckoutView, CheckoutError> {
        let view = self.view(cart_id).await?;
        if view.payable {
            Ok(view)
        } else {
            Err(CheckoutError::NotPayable(view.blockers))
        }
    }

    async fn fetch_and_settle(&self, cart_id: CartId, session: &Session, request: QuoteRequest) {
        let outcome = self
            .inner
            .fetcher
            .fetch(&request.destination, cart_id)
            .await
            .map_err(|e| e.user_message());

        let quote_count = outcome.as_ref().map_or(0, Vec::len);
        let failed = outcome.is_err();
        if session.lock().await.settle(&request, outcome) {
            info!(
                %cart_id,
                generation = request.generation,
                quote_count,
                failed,
                "Shipping quotes settled"
            );
            let cart = cart_id.to_string();
            add_breadcrumb(
                "checkout",
                "Shipping quotes settled",
                Some(&[
                    ("cart_id", cart.as_str()),
                    ("postal_code", request.destination.postal_code.as_str()),
                ]),
            );
        } else {
            debug!(
                %cart_id,
                generation = request.generation,
                "Discarding superseded shipping quotes"
            );
        }
    }

    fn build_view(
        &self,
        cart_id: CartId,
        lines: Vec<CartLine>,
        state: &CheckoutState,
    ) -> Result<CheckoutView, CheckoutError> {
        let pricing = &self.inner.pricing;
        let totals = state.totals(&lines, pricing)?;
        let blockers = state.blockers(&lines, &totals);
        let static_methods = if state.offered_quotes().is_empty() {
            pricing.static_methods().to_vec()
        } else {
            Vec::new()
        };

        Ok(CheckoutView {
            cart_id,
            form: state.form().clone(),
            quotes: state.quotes().clone(),
            offered_quotes: state.offered_quotes().to_vec(),
            static_methods,
            choice: state.choice().cloned(),
            insurance_enabled: state.insurance_enabled(),
            grand_total_display: totals.grand_total_price().display(),
            payable: blockers.is_empty(),
            blockers,
            totals,
            lines,
        })
    }
}

fn describe(choice: &ShippingChoice) -> String {
    match choice {
        ShippingChoice::Quote { carrier, service } => format!("{carrier} {service}"),
        ShippingChoice::Static { method } => method.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tienda_core::{CurrencyCode, Destination, ProductId, ShippingQuote};
    use tokio::sync::Notify;

    /// In-memory cart and rate source.
    #[derive(Default)]
    struct FakeBackend {
        lines: Vec<CartLine>,
        rates: StdMutex<VecDeque<Result<Vec<ShippingQuote>, BackendError>>>,
        rate_calls: AtomicUsize,
        /// Postal code whose quote request hangs for a minute.
        slow_postal_code: Option<&'static str>,
        slow_started: Notify,
    }

    impl FakeBackend {
        fn with_lines(lines: Vec<CartLine>) -> Self {
            Self {
                lines,
                ..Self::default()
            }
        }

        fn push_rates(&self, result: Result<Vec<ShippingQuote>, BackendError>) {
            self.rates.lock().unwrap().push_back(result);
        }

        fn rate_calls(&self) -> usize {
            self.rate_calls.load(Ordering::SeqCst)
        }
    }

    impl CartService for FakeBackend {
        async fn cart_lines(&self, _cart_id: CartId) -> Result<Vec<CartLine>, BackendError> {
            Ok(self.lines.clone())
        }
    }

    impl ShippingRateService for FakeBackend {
        async fn shipping_rates(
            &self,
            destination: &Destination,
            _cart_id: CartId,
        ) -> Result<Vec<ShippingQuote>, BackendError> {
            self.rate_calls.fetch_add(1, Ordering::SeqCst);
            if self.slow_postal_code == Some(destination.postal_code.as_str()) {
                self.slow_started.notify_one();
                tokio::time::sleep(Duration::from_secs(60)).await;
                return Ok(vec![quote("slow", dec!(1.00))]);
            }
            self.rates
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn quote(carrier: &str, price: Decimal) -> ShippingQuote {
        ShippingQuote {
            carrier: carrier.to_string(),
            service: "express".to_string(),
            price,
            currency: CurrencyCode::MXN,
            estimated_days: Some(2),
        }
    }

    fn form(postal_code: &str) -> CheckoutForm {
        CheckoutForm {
            full_name: "Ana López".to_string(),
            email: "ana@example.com".to_string(),
            phone: "5512345678".to_string(),
            street: "Av. Reforma 222".to_string(),
            city: "Ciudad de México".to_string(),
            state: "CDMX".to_string(),
            postal_code: postal_code.to_string(),
            ..CheckoutForm::default()
        }
    }

    fn small_cart() -> Vec<CartLine> {
        vec![CartLine::new(ProductId::new(1), 2, dec!(150.00), dec!(120.00)).unwrap()]
    }

    fn service(backend: FakeBackend) -> CheckoutService<FakeBackend> {
        CheckoutService::new(backend, PricingConfig::default(), QuoteRetryPolicy::default())
    }

    const CART: CartId = CartId::new(42);

    #[tokio::test]
    async fn test_fresh_checkout_is_blocked() {
        let service = service(FakeBackend::with_lines(small_cart()));
        let view = service.view(CART).await.unwrap();

        assert_eq!(view.quotes, QuoteState::NotRequested);
        assert!(!view.payable);
        assert_eq!(view.static_methods.len(), 2);
        assert_eq!(view.totals.subtotal(), dec!(240.00));
        assert_eq!(service.backend().rate_calls(), 0);
    }

    #[tokio::test]
    async fn test_completing_form_fetches_quotes() {
        let backend = FakeBackend::with_lines(small_cart());
        backend.push_rates(Ok(vec![quote("dhl", dec!(85.50))]));
        let service = service(backend);

        let view = service.update_form(CART, form("06600")).await.unwrap();
        assert_eq!(view.quotes.quotes().len(), 1);
        assert!(view.static_methods.is_empty());
        assert_eq!(view.blockers, vec![Blocker::ShippingUnresolved]);

        let view = service
            .choose_shipping(
                CART,
                Some(ShippingChoice::Quote {
                    carrier: "DHL".to_string(),
                    service: "Express".to_string(),
                }),
            )
            .await
            .unwrap();
        assert!(view.payable);
        // 240 + 85.50 + 38.40
        assert_eq!(view.totals.grand_total(), dec!(363.90));
        assert_eq!(view.grand_total_display, "$363.90");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_quotes_retried_once() {
        let backend = FakeBackend::with_lines(small_cart());
        backend.push_rates(Ok(Vec::new()));
        backend.push_rates(Ok(vec![quote("fedex", dec!(99.00))]));
        let service = service(backend);

        let view = service.update_form(CART, form("06600")).await.unwrap();
        assert_eq!(service.backend().rate_calls(), 2);
        assert_eq!(view.quotes.quotes().first().unwrap().carrier, "fedex");
    }

    #[tokio::test]
    async fn test_quote_failure_recorded_verbatim() {
        let backend = FakeBackend::with_lines(small_cart());
        backend.push_rates(Err(BackendError::Rejected("Sin cobertura".to_string())));
        let service = service(backend);

        let view = service.update_form(CART, form("99999")).await.unwrap();
        assert_eq!(
            view.quotes,
            QuoteState::Failed {
                message: "Sin cobertura".to_string()
            }
        );
        assert_eq!(service.backend().rate_calls(), 1);

        // Static fallback is offered and payable
        let view = service
            .choose_shipping(
                CART,
                Some(ShippingChoice::Static {
                    method: "standard".to_string(),
                }),
            )
            .await
            .unwrap();
        assert!(view.payable);
        assert_eq!(view.totals.shipping_cost(), dec!(120.00));
    }

    #[tokio::test]
    async fn test_refresh_after_failure() {
        let backend = FakeBackend::with_lines(small_cart());
        backend.push_rates(Err(BackendError::Rejected("Timeout".to_string())));
        backend.push_rates(Ok(vec![quote("dhl", dec!(85.50))]));
        let service = service(backend);

        service.update_form(CART, form("06600")).await.unwrap();
        let view = service.refresh_quotes(CART).await.unwrap();
        assert_eq!(view.quotes.quotes().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_chosen_quote() {
        let backend = FakeBackend::with_lines(small_cart());
        backend.push_rates(Ok(vec![quote("dhl", dec!(85.50))]));
        backend.push_rates(Err(BackendError::Rejected("Servicio no disponible".to_string())));
        let service = service(backend);

        service.update_form(CART, form("06600")).await.unwrap();
        service
            .choose_shipping(
                CART,
                Some(ShippingChoice::Quote {
                    carrier: "dhl".to_string(),
                    service: "express".to_string(),
                }),
            )
            .await
            .unwrap();

        let view = service.refresh_quotes(CART).await.unwrap();
        assert_eq!(
            view.quotes,
            QuoteState::Failed {
                message: "Servicio no disponible".to_string()
            }
        );
        assert_eq!(view.offered_quotes.len(), 1);
        assert!(view.static_methods.is_empty());
        assert_eq!(view.totals.shipping_cost(), dec!(85.50));
        assert!(view.payable);
    }

    #[tokio::test]
    async fn test_overflowing_cart_is_a_pricing_error() {
        let mut line = small_cart().remove(0);
        line.final_unit_price = Decimal::MAX;
        let service = service(FakeBackend::with_lines(vec![line]));

        let err = service.view(CART).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Pricing(_)));
    }

    #[tokio::test]
    async fn test_clearing_field_drops_quotes() {
        let backend = FakeBackend::with_lines(small_cart());
        backend.push_rates(Ok(vec![quote("dhl", dec!(85.50))]));
        let service = service(backend);

        service.update_form(CART, form("06600")).await.unwrap();
        let mut incomplete = form("06600");
        incomplete.phone.clear();
        let view = service.update_form(CART, incomplete).await.unwrap();

        assert_eq!(view.quotes, QuoteState::NotRequested);
        assert!(view.blockers.contains(&Blocker::IncompleteForm {
            missing: vec!["phone"]
        }));
    }

    #[tokio::test]
    async fn test_unknown_shipping_option_rejected() {
        let service = service(FakeBackend::with_lines(small_cart()));
        let err = service
            .choose_shipping(
                CART,
                Some(ShippingChoice::Static {
                    method: "overnight".to_string(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::UnknownShippingOption(m) if m == "overnight"));
    }

    #[tokio::test]
    async fn test_insurance_toggle() {
        let service = service(FakeBackend::with_lines(small_cart()));
        let view = service.set_insurance(CART, true).await.unwrap();
        assert_eq!(view.totals.insurance_amount(), dec!(24.00));
        let view = service.set_insurance(CART, false).await.unwrap();
        assert_eq!(view.totals.insurance_amount(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_payable_reports_blockers() {
        let service = service(FakeBackend::default());
        let err = service.payable(CART).await.unwrap_err();
        let CheckoutError::NotPayable(blockers) = err else {
            panic!("expected NotPayable");
        };
        assert_eq!(blockers.first(), Some(&Blocker::EmptyCart));
    }

    #[tokio::test]
    async fn test_sessions_are_per_cart() {
        let service = service(FakeBackend::with_lines(small_cart()));
        service.set_insurance(CartId::new(1), true).await.unwrap();
        let other = service.view(CartId::new(2)).await.unwrap();
        assert!(!other.insurance_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_fetch_is_discarded() {
        let backend = FakeBackend {
            lines: small_cart(),
            slow_postal_code: Some("06600"),
            ..FakeBackend::default()
        };
        backend.push_rates(Ok(vec![quote("estafeta", dec!(70.00))]));
        let service = service(backend);

        let slow = tokio::spawn({
            let service = service.clone();
            async move { service.update_form(CART, form("06600")).await }
        });
        service.backend().slow_started.notified().await;

        let view = service.update_form(CART, form("64000")).await.unwrap();
        assert_eq!(view.quotes.quotes().first().unwrap().carrier, "estafeta");

        let late = slow.await.unwrap().unwrap();
        assert_eq!(late.quotes.quotes().first().unwrap().carrier, "estafeta");
    }
}
