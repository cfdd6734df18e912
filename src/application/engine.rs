use super::checkout_sync::CheckoutSync;
use super::customer_sync::CustomerSync;
use super::observers::ObserverRegistry;
use super::submission::CheckoutProcessor;
use crate::config::SyncConfig;
use crate::domain::checkout::{CheckoutOutcome, CheckoutSession};
use crate::domain::ports::{
    NoticeSinkRef, PaymentProcessorRef, SnapshotStoreRef, StoreApiRef, ValidationStoreRef,
};
use crate::error::Result;
use std::sync::Arc;

/// The external collaborators the engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: SnapshotStoreRef,
    pub api: StoreApiRef,
    pub validation: ValidationStoreRef,
    pub notices: NoticeSinkRef,
    pub payment: PaymentProcessorRef,
}

/// The main entry point of the crate.
///
/// `CheckoutEngine` owns one push executor per synchronized resource and the
/// submission state machine, all sharing the same collaborators.
pub struct CheckoutEngine {
    customer: CustomerSync,
    checkout: CheckoutSync,
    observers: Arc<ObserverRegistry>,
    processor: CheckoutProcessor,
}

impl CheckoutEngine {
    /// Creates a new `CheckoutEngine`. Nothing is synced until [`start`](Self::start).
    pub fn new(collaborators: Collaborators, config: &SyncConfig) -> Self {
        let Collaborators {
            store,
            api,
            validation,
            notices,
            payment,
        } = collaborators;

        let customer = CustomerSync::new(
            store.clone(),
            api.clone(),
            validation.clone(),
            notices.clone(),
            config.customer_debounce(),
        );
        let checkout = CheckoutSync::new(
            store.clone(),
            api,
            validation.clone(),
            notices.clone(),
            config.checkout_debounce(),
        );
        let observers = Arc::new(ObserverRegistry::new());
        let processor = CheckoutProcessor::new(
            store,
            observers.clone(),
            payment,
            validation,
            notices,
            checkout.clone(),
            config.generic_error_message.clone(),
        );

        Self {
            customer,
            checkout,
            observers,
            processor,
        }
    }

    /// Captures the hydrated snapshots as baselines and starts listening for edits.
    pub async fn start(&self) {
        self.customer.start().await;
        self.checkout.start().await;
    }

    /// Cancels pending pushes and stops listening.
    pub fn stop(&self) {
        self.customer.stop();
        self.checkout.stop();
    }

    /// Pushes pending edits of both resources immediately.
    pub async fn flush(&self) {
        self.customer.on_field_blur().await;
        self.checkout.on_field_blur().await;
    }

    pub async fn submit(&self) -> Result<CheckoutOutcome> {
        self.processor.submit().await
    }

    pub fn customer(&self) -> &CustomerSync {
        &self.customer
    }

    pub fn checkout(&self) -> &CheckoutSync {
        &self.checkout
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn processor(&self) -> &CheckoutProcessor {
        &self.processor
    }

    pub fn session(&self) -> CheckoutSession {
        self.processor.session()
    }
}
