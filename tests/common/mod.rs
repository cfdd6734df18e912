#![allow(dead_code)]

use checkout_sync::application::engine::{CheckoutEngine, Collaborators};
use checkout_sync::config::SyncConfig;
use checkout_sync::domain::address::{Address, CustomerSnapshot};
use checkout_sync::domain::payload::CheckoutDraft;
use checkout_sync::infrastructure::in_memory::{
    InMemorySnapshotStore, InMemoryValidationStore, NoticeLog, ScriptedPaymentProcessor,
    ScriptedStoreApi,
};
use std::sync::Arc;
use std::time::Duration;

pub const WINDOW: Duration = Duration::from_millis(1500);

pub struct TestSession {
    pub engine: CheckoutEngine,
    pub store: Arc<InMemorySnapshotStore>,
    pub api: Arc<ScriptedStoreApi>,
    pub validation: Arc<InMemoryValidationStore>,
    pub notices: Arc<NoticeLog>,
    pub payment: Arc<ScriptedPaymentProcessor>,
}

pub fn us_address() -> Address {
    Address::new()
        .with("first_name", "Ada")
        .with("last_name", "Lovelace")
        .with("address_1", "1 Main St")
        .with("city", "New York")
        .with("state", "NY")
        .with("postcode", "10001")
        .with("country", "US")
        .with("phone", "555-0100")
}

pub fn checkout_draft() -> CheckoutDraft {
    CheckoutDraft {
        has_session: true,
        payment_method: "card".to_string(),
        ..Default::default()
    }
}

/// Builds an engine over in-memory collaborators and starts it.
pub async fn started_session() -> TestSession {
    let store = Arc::new(InMemorySnapshotStore::with_data(
        CustomerSnapshot {
            billing: us_address(),
            shipping: us_address(),
        },
        checkout_draft(),
    ));
    let api = Arc::new(ScriptedStoreApi::new());
    let validation = Arc::new(InMemoryValidationStore::new());
    let notices = Arc::new(NoticeLog::new());
    let payment = Arc::new(ScriptedPaymentProcessor::new());

    let engine = CheckoutEngine::new(
        Collaborators {
            store: store.clone(),
            api: api.clone(),
            validation: validation.clone(),
            notices: notices.clone(),
            payment: payment.clone(),
        },
        &SyncConfig::default(),
    );
    engine.start().await;

    TestSession {
        engine,
        store,
        api,
        validation,
        notices,
        payment,
    }
}

/// Lets the debounce window elapse (the test clock is paused).
pub async fn quiesce() {
    tokio::time::sleep(WINDOW + Duration::from_millis(100)).await;
}
