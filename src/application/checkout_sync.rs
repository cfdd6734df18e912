use super::bookkeeping::{FlightGuard, PushOutcome, SyncBookkeeping};
use super::debouncer::Debouncer;
use crate::domain::dirty::{DirtySet, diff_fields};
use crate::domain::payload::{CheckoutDraft, CheckoutPayload};
use crate::domain::ports::{
    CHECKOUT_NOTICE_CONTEXT, NoticeOptions, NoticeSinkRef, SnapshotStoreRef, StoreApiRef,
    Subscription, ValidationStoreRef,
};
use crate::error::SyncError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Checkout fields awaiting confirmation from the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckoutDirty {
    pub additional_fields: DirtySet,
    pub order_notes: bool,
    pub payment_method: bool,
}

impl CheckoutDirty {
    pub fn is_empty(&self) -> bool {
        self.additional_fields.is_empty() && !self.order_notes && !self.payment_method
    }
}

type CheckoutBookkeeping = SyncBookkeeping<CheckoutDraft, CheckoutDirty>;
type CheckoutFlight<'a> = FlightGuard<'a, CheckoutDraft, CheckoutDirty>;

/// Publishes the abort token of the running PUT; withdrawn on drop.
struct AbortSlot<'a>(&'a Mutex<Option<CancellationToken>>);

impl<'a> AbortSlot<'a> {
    fn register(slot: &'a Mutex<Option<CancellationToken>>, token: CancellationToken) -> Self {
        *slot.lock() = Some(token);
        Self(slot)
    }
}

impl Drop for AbortSlot<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

struct Inner {
    store: SnapshotStoreRef,
    api: StoreApiRef,
    validation: ValidationStoreRef,
    notices: NoticeSinkRef,
    debouncer: Debouncer,
    state: Mutex<CheckoutBookkeeping>,
    abort: Mutex<Option<CancellationToken>>,
    order_id: Mutex<Option<u64>>,
    subscription: Mutex<Option<Subscription>>,
}

/// Keeps order notes, the chosen payment method and additional checkout
/// fields in sync with the server's checkout record.
#[derive(Clone)]
pub struct CheckoutSync {
    inner: Arc<Inner>,
}

impl CheckoutSync {
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
                state: Mutex::new(CheckoutBookkeeping::new()),
                abort: Mutex::new(None),
                order_id: Mutex::new(None),
                subscription: Mutex::new(None),
            }),
        }
    }

    pub async fn start(&self) {
        self.reconcile().await;
        let weak = Arc::downgrade(&self.inner);
        let subscription = self.inner.store.subscribe(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                CheckoutSync { inner }.schedule();
            }
        }));
        if let Some(previous) = self.inner.subscription.lock().replace(subscription) {
            previous.unsubscribe();
        }
    }

    pub fn stop(&self) {
        self.inner.debouncer.cancel();
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }

    pub fn reset(&self) {
        self.inner.debouncer.cancel();
        self.inner.state.lock().reset();
    }

    pub fn schedule(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                CheckoutSync { inner }.reconcile().await;
            }
        });
    }

    pub async fn on_field_blur(&self) {
        self.inner.debouncer.flush().await;
    }

    /// Aborts the checkout update currently in flight, if any.
    ///
    /// The aborted response is discarded and its fields stay dirty.
    pub fn abort_in_flight(&self) {
        if let Some(token) = self.inner.abort.lock().take() {
            info!("Aborting in-flight checkout update");
            token.cancel();
        }
    }

    pub fn dirty(&self) -> CheckoutDirty {
        self.inner.state.lock().dirty.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    /// Order id most recently reported by the server.
    pub fn order_id(&self) -> Option<u64> {
        *self.inner.order_id.lock()
    }

    pub async fn reconcile(&self) -> PushOutcome {
        let Some(flight) = FlightGuard::acquire(&self.inner.state) else {
            debug!("Checkout update already in flight; skipping");
            return PushOutcome::Skipped;
        };
        let draft = self.inner.store.checkout_draft();

        let payload = {
            let mut state = self.inner.state.lock();
            if !state.initialized {
                debug!("Captured checkout baseline");
                state.init(draft);
                return PushOutcome::Initialized;
            }
            if let Some(reason) = skip_reason(&draft) {
                debug!(reason, "Checkout update skipped");
                return PushOutcome::Skipped;
            }

            let previous = state.last_seen.take().unwrap_or_default();
            state
                .dirty
                .additional_fields
                .extend(diff_fields(&previous.additional_fields, &draft.additional_fields));
            state.dirty.order_notes |= previous.order_notes != draft.order_notes;
            state.dirty.payment_method |= previous.payment_method != draft.payment_method;

            let payload = self.build_payload(&draft, &state.dirty);
            state.last_seen = Some(draft);
            payload
        };

        let Some(payload) = payload else {
            return PushOutcome::Clean;
        };
        self.send(payload, flight).await
    }

    fn build_payload(
        &self,
        draft: &CheckoutDraft,
        dirty: &CheckoutDirty,
    ) -> Option<CheckoutPayload> {
        let additional_fields: BTreeMap<String, String> = dirty
            .additional_fields
            .iter()
            .filter(|key| !self.inner.validation.has_validation_error(key))
            .map(|key| {
                let value = draft.additional_fields.get(key).cloned().unwrap_or_default();
                (key.clone(), value)
            })
            .collect();

        let payload = CheckoutPayload {
            additional_fields: (!additional_fields.is_empty()).then_some(additional_fields),
            order_notes: dirty.order_notes.then(|| draft.order_notes.clone()),
            payment_method: dirty.payment_method.then(|| draft.payment_method.clone()),
        };
        (!payload.is_empty()).then_some(payload)
    }

    async fn send(&self, payload: CheckoutPayload, flight: CheckoutFlight<'_>) -> PushOutcome {
        let token = CancellationToken::new();
        let abort_slot = AbortSlot::register(&self.inner.abort, token.clone());
        info!(
            additional_fields = payload.additional_fields.as_ref().map_or(0, BTreeMap::len),
            order_notes = payload.order_notes.is_some(),
            payment_method = payload.payment_method.is_some(),
            "Pushing checkout changes"
        );

        let result = tokio::select! {
            _ = token.cancelled() => Err(SyncError::Aborted),
            result = self.inner.api.update_checkout(&payload) => result,
        };
        drop(abort_slot);

        match result {
            Ok(response) => {
                if let Some(cart) = response.cart {
                    self.inner.store.receive_cart(cart);
                }
                if response.order_id.is_some() {
                    *self.inner.order_id.lock() = response.order_id;
                }
                {
                    let mut state = self.inner.state.lock();
                    if let Some(fields) = &payload.additional_fields {
                        state
                            .dirty
                            .additional_fields
                            .retain(|key| !fields.contains_key(key));
                    }
                    if payload.order_notes.is_some() {
                        state.dirty.order_notes = false;
                    }
                    if payload.payment_method.is_some() {
                        state.dirty.payment_method = false;
                    }
                }
                drop(flight);
                self.reschedule_if_changed();
                PushOutcome::Sent
            }
            Err(SyncError::Aborted) => {
                drop(flight);
                PushOutcome::Aborted
            }
            Err(err) => {
                warn!(error = %err, "Checkout update failed; changes kept for retry");
                drop(flight);
                self.inner.notices.create_error_notice(
                    &err.to_string(),
                    NoticeOptions::context(CHECKOUT_NOTICE_CONTEXT).with_id("checkout-update"),
                );
                self.reschedule_if_changed();
                PushOutcome::Failed
            }
        }
    }

    fn reschedule_if_changed(&self) {
        let changed = {
            let state = self.inner.state.lock();
            state.last_seen.as_ref() != Some(&self.inner.store.checkout_draft())
        };
        if changed {
            self.schedule();
        }
    }
}

fn skip_reason(draft: &CheckoutDraft) -> Option<&'static str> {
    if !draft.has_session {
        Some("no session")
    } else if draft.express_payment_started {
        Some("express payment in progress")
    } else if draft.payment_method.is_empty() {
        Some("no active payment method")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{SnapshotStore, ValidationStore};
    use crate::infrastructure::in_memory::{
        InMemorySnapshotStore, InMemoryValidationStore, NoticeLog, ScriptedStoreApi,
    };

    struct Harness {
        store: Arc<InMemorySnapshotStore>,
        api: Arc<ScriptedStoreApi>,
        validation: Arc<InMemoryValidationStore>,
        notices: Arc<NoticeLog>,
        sync: CheckoutSync,
    }

    async fn harness() -> Harness {
        let draft = CheckoutDraft {
            has_session: true,
            payment_method: "card".to_string(),
            ..Default::default()
        };
        let store = Arc::new(InMemorySnapshotStore::with_data(Default::default(), draft));
        let api = Arc::new(ScriptedStoreApi::new());
        let validation = Arc::new(InMemoryValidationStore::new());
        let notices = Arc::new(NoticeLog::new());
        let sync = CheckoutSync::new(
            store.clone(),
            api.clone(),
            validation.clone(),
            notices.clone(),
            Duration::from_millis(1500),
        );
        sync.start().await;
        Harness {
            store,
            api,
            validation,
            notices,
            sync,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_only_changed_fields() {
        let h = harness().await;
        h.store.set_order_notes("Ring twice");
        assert_eq!(h.sync.reconcile().await, PushOutcome::Sent);

        let requests = h.api.checkout_requests();
        assert_eq!(
            requests,
            vec![CheckoutPayload {
                order_notes: Some("Ring twice".to_string()),
                ..Default::default()
            }]
        );
        assert!(h.sync.dirty().is_empty());
        assert_eq!(h.sync.order_id(), Some(1001));
        assert!(h.store.cart().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errored_additional_field_is_excluded() {
        let h = harness().await;
        h.validation
            .set_validation_errors([("vat_number".to_string(), "Invalid".to_string())].into());
        h.store.set_additional_field("vat_number", "XX");
        h.store.set_additional_field("gift_message", "Enjoy");

        assert_eq!(h.sync.reconcile().await, PushOutcome::Sent);
        let sent = h.api.checkout_requests()[0]
            .additional_fields
            .clone()
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent["gift_message"], "Enjoy");
        assert!(h.sync.dirty().additional_fields.contains("vat_number"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gates_skip_without_consuming_changes() {
        let h = harness().await;
        h.store.set_has_session(false);
        h.store.set_order_notes("Later");
        assert_eq!(h.sync.reconcile().await, PushOutcome::Skipped);

        h.store.set_has_session(true);
        h.store.set_express_payment_started(true);
        assert_eq!(h.sync.reconcile().await, PushOutcome::Skipped);

        h.store.set_express_payment_started(false);
        h.store.set_payment_method("");
        assert_eq!(h.sync.reconcile().await, PushOutcome::Skipped);
        assert!(h.api.requests().is_empty());

        h.store.set_payment_method("card");
        assert_eq!(h.sync.reconcile().await, PushOutcome::Sent);
        let payload = &h.api.checkout_requests()[0];
        assert_eq!(payload.order_notes.as_deref(), Some("Later"));
        assert!(payload.payment_method.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_discards_response_and_keeps_dirty() {
        let h = harness().await;
        h.api.set_latency(Duration::from_secs(2));
        h.store.set_payment_method("paypal");

        let sync = h.sync.clone();
        let push = tokio::spawn(async move { sync.reconcile().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.sync.is_in_flight());

        h.sync.abort_in_flight();
        assert_eq!(push.await.unwrap(), PushOutcome::Aborted);
        assert!(!h.sync.is_in_flight());
        assert!(h.sync.dirty().payment_method);
        assert!(h.notices.notices().is_empty());
        assert!(h.store.cart().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_push_releases_in_flight_slot() {
        let h = harness().await;
        h.api.set_latency(Duration::from_secs(10));
        h.store.set_order_notes("Side gate");

        let timed_out = tokio::time::timeout(Duration::from_secs(1), h.sync.reconcile()).await;
        assert!(timed_out.is_err());
        assert!(!h.sync.is_in_flight());
        assert!(h.sync.dirty().order_notes);

        h.api.set_latency(Duration::ZERO);
        h.store.set_order_notes("Side gate, thanks");
        assert_eq!(h.sync.reconcile().await, PushOutcome::Sent);
        assert_eq!(
            h.api.checkout_requests()[0].order_notes.as_deref(),
            Some("Side gate, thanks")
        );
        assert!(h.sync.dirty().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_surfaces_notice() {
        let h = harness().await;
        h.api.fail_next(1);
        h.store.set_order_notes("Fragile");
        assert_eq!(h.sync.reconcile().await, PushOutcome::Failed);
        assert!(h.sync.dirty().order_notes);
        assert_eq!(h.notices.notices()[0].context, CHECKOUT_NOTICE_CONTEXT);
    }

    #[test]
    fn test_skip_reasons() {
        let mut draft = CheckoutDraft::default();
        assert_eq!(skip_reason(&draft), Some("no session"));
        draft.has_session = true;
        assert_eq!(skip_reason(&draft), Some("no active payment method"));
        draft.payment_method = "card".to_string();
        draft.express_payment_started = true;
        assert_eq!(skip_reason(&draft), Some("express payment in progress"));
        draft.express_payment_started = false;
        assert_eq!(skip_reason(&draft), None);
    }
}
