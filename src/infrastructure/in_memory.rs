use crate::domain::address::{Address, AddressType, CustomerSnapshot};
use crate::domain::cart::{CartState, CartTotals, ShippingRate};
use crate::domain::checkout::{PaymentRequest, PaymentResult};
use crate::domain::observer::ValidationErrors;
use crate::domain::payload::{CheckoutDraft, CheckoutPayload, CheckoutResponse, CustomerPayload};
use crate::domain::ports::{
    NoticeOptions, NoticeSink, PaymentProcessor, SnapshotStore, StoreApi, Subscriber,
    Subscription, ValidationStore,
};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct StoreState {
    customer: CustomerSnapshot,
    checkout: CheckoutDraft,
    cart: Option<CartState>,
}

/// A snapshot store held in memory that notifies subscribers after every mutation.
///
/// The mutation helpers stand in for form inputs; the sync engine itself only
/// uses the [`SnapshotStore`] methods.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    state: RwLock<StoreState>,
    subscribers: Arc<Mutex<BTreeMap<u64, Subscriber>>>,
    next_subscriber: AtomicU64,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with hydrated data.
    pub fn with_data(customer: CustomerSnapshot, checkout: CheckoutDraft) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.write();
            state.customer = customer;
            state.checkout = checkout;
        }
        store
    }

    pub fn set_address_field(&self, kind: AddressType, field: &str, value: &str) {
        self.mutate(|state| state.customer.address_mut(kind).set(field, value));
    }

    pub fn set_order_notes(&self, notes: &str) {
        self.mutate(|state| state.checkout.order_notes = notes.to_string());
    }

    pub fn set_payment_method(&self, method: &str) {
        self.mutate(|state| state.checkout.payment_method = method.to_string());
    }

    pub fn set_additional_field(&self, key: &str, value: &str) {
        self.mutate(|state| {
            state
                .checkout
                .additional_fields
                .insert(key.to_string(), value.to_string());
        });
    }

    pub fn set_has_session(&self, has_session: bool) {
        self.mutate(|state| state.checkout.has_session = has_session);
    }

    pub fn set_express_payment_started(&self, started: bool) {
        self.mutate(|state| state.checkout.express_payment_started = started);
    }

    pub fn cart(&self) -> Option<CartState> {
        self.state.read().cart.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn mutate(&self, f: impl FnOnce(&mut StoreState)) {
        f(&mut self.state.write());
        self.notify();
    }

    fn notify(&self) {
        // Callbacks may read the store, so they run without any lock held.
        let subscribers: Vec<Subscriber> = self.subscribers.lock().values().cloned().collect();
        for subscriber in subscribers {
            subscriber();
        }
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn customer(&self) -> CustomerSnapshot {
        self.state.read().customer.clone()
    }

    fn checkout_draft(&self) -> CheckoutDraft {
        self.state.read().checkout.clone()
    }

    fn set_address(&self, kind: AddressType, address: Address) {
        self.mutate(|state| *state.customer.address_mut(kind) = address);
    }

    fn receive_cart(&self, cart: CartState) {
        self.mutate(|state| state.cart = Some(cart));
    }

    fn subscribe(&self, subscriber: Subscriber) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, subscriber);
        let subscribers = Arc::clone(&self.subscribers);
        Subscription::new(move || {
            subscribers.lock().remove(&id);
        })
    }
}

/// Field validation errors held in memory.
#[derive(Default)]
pub struct InMemoryValidationStore {
    errors: Mutex<ValidationErrors>,
}

impl InMemoryValidationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> ValidationErrors {
        self.errors.lock().clone()
    }
}

impl ValidationStore for InMemoryValidationStore {
    fn validation_error(&self, key: &str) -> Option<String> {
        self.errors.lock().get(key).cloned()
    }

    fn set_validation_errors(&self, errors: ValidationErrors) {
        self.errors.lock().extend(errors);
    }

    fn clear_validation_errors(&self, keys: &[String]) {
        let mut errors = self.errors.lock();
        for key in keys {
            errors.remove(key);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub id: Option<String>,
    pub context: String,
}

/// Keeps every error notice that is currently shown.
#[derive(Default)]
pub struct NoticeLog {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .map(|notice| notice.message.clone())
            .collect()
    }
}

impl NoticeSink for NoticeLog {
    fn create_error_notice(&self, message: &str, options: NoticeOptions) {
        let mut notices = self.notices.lock();
        // A notice with an id replaces the previous one with the same id.
        if let Some(id) = &options.id {
            notices.retain(|notice| notice.id.as_ref() != Some(id));
        }
        notices.push(Notice {
            message: message.to_string(),
            id: options.id,
            context: options.context,
        });
    }

    fn clear_error_notices(&self, context: &str) {
        self.notices.lock().retain(|notice| notice.context != context);
    }
}

/// A request as received by [`ScriptedStoreApi`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "endpoint")]
pub enum RecordedRequest {
    #[serde(rename = "PUT /cart/update-customer")]
    Customer {
        body: CustomerPayload,
        shipping_rates_changed: bool,
    },
    #[serde(rename = "PUT /checkout")]
    Checkout { body: CheckoutPayload },
}

#[derive(Default)]
struct ServerState {
    customer: CustomerSnapshot,
    checkout: CheckoutPayload,
    requests: Vec<RecordedRequest>,
    failures: u32,
    next_order_id: u64,
}

/// An in-memory stand-in for the store REST API.
///
/// Persists partial updates, quotes a flat shipping rate per destination
/// country, and can be told to fail or to respond slowly.
pub struct ScriptedStoreApi {
    state: Mutex<ServerState>,
    latency: Mutex<Duration>,
    subtotal: Decimal,
    active: AtomicUsize,
    peak_concurrency: AtomicUsize,
}

impl Default for ScriptedStoreApi {
    fn default() -> Self {
        Self {
            state: Mutex::new(ServerState {
                next_order_id: 1001,
                ..Default::default()
            }),
            latency: Mutex::new(Duration::ZERO),
            subtotal: dec!(20.00),
            active: AtomicUsize::new(0),
            peak_concurrency: AtomicUsize::new(0),
        }
    }
}

impl ScriptedStoreApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` requests fail with a transport error.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().failures += count;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn customer_requests(&self) -> Vec<(CustomerPayload, bool)> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::Customer {
                    body,
                    shipping_rates_changed,
                } => Some((body, shipping_rates_changed)),
                RecordedRequest::Checkout { .. } => None,
            })
            .collect()
    }

    pub fn checkout_requests(&self) -> Vec<CheckoutPayload> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::Checkout { body } => Some(body),
                RecordedRequest::Customer { .. } => None,
            })
            .collect()
    }

    /// The customer data as persisted on the server.
    pub fn persisted_customer(&self) -> CustomerSnapshot {
        self.state.lock().customer.clone()
    }

    /// Highest number of requests that were ever being served at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_concurrency.load(Ordering::SeqCst)
    }

    async fn respond(&self, request: RecordedRequest) -> Result<()> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_concurrency.fetch_max(active, Ordering::SeqCst);
        let _serving = ServingGuard(&self.active);

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        // An aborted request is dropped during the sleep and never recorded.
        let mut state = self.state.lock();
        state.requests.push(request);
        if state.failures > 0 {
            state.failures -= 1;
            return Err(SyncError::Transport("Unable to reach the store".to_string()));
        }
        Ok(())
    }

    fn cart_for(&self, customer: &CustomerSnapshot) -> CartState {
        let price = match customer.shipping.get("country") {
            "" => None,
            "US" => Some(dec!(5.00)),
            _ => Some(dec!(15.00)),
        };
        let shipping_rates: Vec<ShippingRate> = price
            .into_iter()
            .map(|price| ShippingRate {
                rate_id: "flat_rate:1".to_string(),
                name: "Flat rate".to_string(),
                price,
                selected: true,
            })
            .collect();
        let shipping = price.unwrap_or(Decimal::ZERO);
        let tax = (self.subtotal * dec!(0.10)).round_dp(2);

        CartState {
            items_count: 2,
            needs_shipping: true,
            shipping_rates,
            totals: CartTotals {
                subtotal: self.subtotal,
                shipping,
                tax,
                total: self.subtotal + shipping + tax,
            },
        }
    }
}

struct ServingGuard<'a>(&'a AtomicUsize);

impl Drop for ServingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn merge_address(target: &mut Address, update: &Address) {
    for (field, value) in update.fields() {
        target.set(field, value);
    }
}

#[async_trait]
impl StoreApi for ScriptedStoreApi {
    async fn update_customer(&self, payload: &CustomerPayload) -> Result<CartState> {
        self.respond(RecordedRequest::Customer {
            body: payload.clone(),
            shipping_rates_changed: payload.shipping_rates_changed,
        })
        .await?;

        let customer = {
            let mut state = self.state.lock();
            if let Some(billing) = &payload.billing_address {
                merge_address(&mut state.customer.billing, billing);
            }
            if let Some(shipping) = &payload.shipping_address {
                merge_address(&mut state.customer.shipping, shipping);
            }
            state.customer.clone()
        };
        Ok(self.cart_for(&customer))
    }

    async fn update_checkout(&self, payload: &CheckoutPayload) -> Result<CheckoutResponse> {
        self.respond(RecordedRequest::Checkout {
            body: payload.clone(),
        })
        .await?;

        let (order_id, customer) = {
            let mut state = self.state.lock();
            if let Some(fields) = &payload.additional_fields {
                state
                    .checkout
                    .additional_fields
                    .get_or_insert_with(BTreeMap::new)
                    .extend(fields.clone());
            }
            if let Some(notes) = &payload.order_notes {
                state.checkout.order_notes = Some(notes.clone());
            }
            if let Some(method) = &payload.payment_method {
                state.checkout.payment_method = Some(method.clone());
            }
            (state.next_order_id, state.customer.clone())
        };
        Ok(CheckoutResponse {
            order_id: Some(order_id),
            cart: Some(self.cart_for(&customer)),
        })
    }
}

/// A payment collaborator that replays queued results, succeeding by default.
#[derive(Default)]
pub struct ScriptedPaymentProcessor {
    results: Mutex<VecDeque<Result<PaymentResult>>>,
    requests: Mutex<Vec<PaymentRequest>>,
}

impl ScriptedPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, result: Result<PaymentResult>) {
        self.results.lock().push_back(result);
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedPaymentProcessor {
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentResult> {
        self.requests.lock().push(request.clone());
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(PaymentResult::success()))
    }
}
