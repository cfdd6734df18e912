use super::bookkeeping::{FlightGuard, PushOutcome, SyncBookkeeping};
use super::debouncer::Debouncer;
use crate::domain::address::{Address, AddressType, CustomerSnapshot};
use crate::domain::dirty::{DirtySet, DirtySets, track_customer_changes};
use crate::domain::payload::{CustomerPayload, shipping_rates_changed};
use crate::domain::ports::{
    CART_NOTICE_CONTEXT, NoticeOptions, NoticeSinkRef, SnapshotStoreRef, StoreApiRef,
    Subscription, ValidationStoreRef,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

type CustomerBookkeeping = SyncBookkeeping<CustomerSnapshot, DirtySets>;
type CustomerFlight<'a> = FlightGuard<'a, CustomerSnapshot, DirtySets>;

struct Inner {
    store: SnapshotStoreRef,
    api: StoreApiRef,
    validation: ValidationStoreRef,
    notices: NoticeSinkRef,
    debouncer: Debouncer,
    state: Mutex<CustomerBookkeeping>,
    subscription: Mutex<Option<Subscription>>,
}

/// The payload of one push and the dirty fields it carries.
struct PlannedPush {
    payload: CustomerPayload,
    sent: Vec<(AddressType, DirtySet)>,
}

/// Keeps the customer's billing and shipping addresses in sync with the cart.
///
/// Store changes are debounced; each reconcile pass sends only the dirty,
/// currently valid fields and clears them once the server confirms the update.
#[derive(Clone)]
pub struct CustomerSync {
    inner: Arc<Inner>,
}

impl CustomerSync {
    pub fn new(
        store: SnapshotStoreRef,
        api: StoreApiRef,
        validation: ValidationStoreRef,
        notices: NoticeSinkRef,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                api,
                validation,
                notices,
                debouncer: Debouncer::new(debounce),
                state: Mutex::new(CustomerBookkeeping::new()),
                subscription: Mutex::new(None),
            }),
        }
    }

    /// Captures the hydrated snapshot as baseline and starts listening for changes.
    pub async fn start(&self) {
        self.reconcile().await;
        let weak = Arc::downgrade(&self.inner);
        let subscription = self.inner.store.subscribe(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                CustomerSync { inner }.schedule();
            }
        }));
        if let Some(previous) = self.inner.subscription.lock().replace(subscription) {
            previous.unsubscribe();
        }
    }

    /// Cancels any pending push and stops listening. Unsynced edits stay dirty.
    pub fn stop(&self) {
        self.inner.debouncer.cancel();
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }

    /// Forgets all bookkeeping; the next reconcile captures a new baseline.
    pub fn reset(&self) {
        self.inner.debouncer.cancel();
        self.inner.state.lock().reset();
    }

    /// Schedules a debounced reconcile.
    pub fn schedule(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                CustomerSync { inner }.reconcile().await;
            }
        });
    }

    /// Pushes any pending change right away, e.g. when a field loses focus.
    pub async fn on_field_blur(&self) {
        self.inner.debouncer.flush().await;
    }

    pub fn dirty_sets(&self) -> DirtySets {
        self.inner.state.lock().dirty.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    pub fn is_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Runs one reconcile pass against the latest snapshot.
    pub async fn reconcile(&self) -> PushOutcome {
        let Some(flight) = FlightGuard::acquire(&self.inner.state) else {
            debug!("Customer update already in flight; skipping");
            return PushOutcome::Skipped;
        };
        let snapshot = self.inner.store.customer();
        let mut corrections: Vec<(AddressType, Address)> = Vec::new();

        let planned = {
            let mut state = self.inner.state.lock();
            if !state.initialized {
                debug!("Captured customer baseline");
                state.init(snapshot);
                return PushOutcome::Initialized;
            }

            let previous = state.last_seen.take().unwrap_or_default();
            let mut current = snapshot;
            for (kind, change) in track_customer_changes(&previous, &current) {
                if let Some(corrected) = change.corrected {
                    *current.address_mut(kind) = corrected.clone();
                    corrections.push((kind, corrected));
                }
                state.dirty.mark(kind, change.dirty);
            }

            let planned = self.plan_push(&current, &state.dirty);
            state.last_seen = Some(current);
            planned
        };

        // Dependent fields were reset in the local copy; mirror that in the store.
        for (kind, address) in corrections {
            self.inner.store.set_address(kind, address);
        }

        let Some(planned) = planned else {
            return PushOutcome::Clean;
        };
        self.send(planned, flight).await
    }

    fn plan_push(&self, current: &CustomerSnapshot, dirty: &DirtySets) -> Option<PlannedPush> {
        let mut payload = CustomerPayload::default();
        let mut sent = Vec::new();

        for kind in AddressType::ALL {
            let dirty_fields = dirty.get(kind);
            if dirty_fields.is_empty() {
                continue;
            }
            let mut address = current.address(kind).clone();
            let mut fields = DirtySet::new();
            for field in dirty_fields {
                if self
                    .inner
                    .validation
                    .has_validation_error(&kind.validation_key(field))
                {
                    // Held back until the error is fixed; stays dirty.
                    address.remove(field);
                } else {
                    fields.insert(field.clone());
                }
            }
            if fields.is_empty() {
                continue;
            }
            if kind == AddressType::Shipping {
                payload.shipping_rates_changed = shipping_rates_changed(&fields);
            }
            payload.set_address(kind, address);
            sent.push((kind, fields));
        }

        (!payload.is_empty()).then_some(PlannedPush { payload, sent })
    }

    async fn send(&self, planned: PlannedPush, flight: CustomerFlight<'_>) -> PushOutcome {
        let PlannedPush { payload, sent } = planned;
        info!(
            billing = payload.billing_address.is_some(),
            shipping = payload.shipping_address.is_some(),
            shipping_rates_changed = payload.shipping_rates_changed,
            "Pushing customer address changes"
        );

        let outcome = match self.inner.api.update_customer(&payload).await {
            Ok(cart) => {
                self.inner.store.receive_cart(cart);
                let mut state = self.inner.state.lock();
                for (kind, fields) in &sent {
                    state.dirty.clear(*kind, fields);
                }
                drop(state);
                drop(flight);
                PushOutcome::Sent
            }
            Err(err) => {
                warn!(error = %err, "Customer update failed; changes kept for retry");
                drop(flight);
                self.inner.notices.create_error_notice(
                    &err.to_string(),
                    NoticeOptions::context(CART_NOTICE_CONTEXT).with_id("customer-update"),
                );
                PushOutcome::Failed
            }
        };

        // Edits that arrived while the request was out still need a push.
        let changed_meanwhile = {
            let state = self.inner.state.lock();
            state.last_seen.as_ref() != Some(&self.inner.store.customer())
        };
        if changed_meanwhile {
            self.schedule();
        }
        outcome
    }
}
