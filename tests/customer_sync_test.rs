mod common;

use checkout_sync::application::bookkeeping::PushOutcome;
use checkout_sync::domain::address::AddressType;
use checkout_sync::domain::dirty::DirtySet;
use checkout_sync::domain::ports::SnapshotStore;
use common::{WINDOW, quiesce, started_session, us_address};
use rand::Rng;
use rand::seq::SliceRandom;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_collapses_to_one_push() {
    let s = started_session().await;

    for city in ["B", "Bo", "Bos", "Boston"] {
        s.store.set_address_field(AddressType::Billing, "city", city);
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    assert!(s.api.requests().is_empty());

    quiesce().await;
    let requests = s.api.customer_requests();
    assert_eq!(requests.len(), 1);
    let billing = requests[0].0.billing_address.as_ref().unwrap();
    assert_eq!(billing.get("city"), "Boston");
}

#[tokio::test(start_paused = true)]
async fn test_random_bursts_push_final_values_only() {
    let fields = ["first_name", "last_name", "address_1", "city", "phone"];
    let mut rng = rand::thread_rng();
    let s = started_session().await;

    for _ in 0..40 {
        let field = *fields.choose(&mut rng).unwrap();
        let value: u32 = rng.gen_range(0..1000);
        let kind = if rng.gen_bool(0.5) {
            AddressType::Billing
        } else {
            AddressType::Shipping
        };
        s.store.set_address_field(kind, field, &value.to_string());
        tokio::time::sleep(Duration::from_millis(rng.gen_range(0..1400))).await;
    }
    quiesce().await;

    let requests = s.api.customer_requests();
    assert_eq!(requests.len(), 1);
    let (payload, shipping_rates_changed) = &requests[0];
    let current = s.store.customer();
    for kind in AddressType::ALL {
        if let Some(address) = payload.address(kind) {
            assert_eq!(address, current.address(kind));
        }
    }
    assert!(!shipping_rates_changed);
    assert!(s.engine.customer().dirty_sets().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_push_keeps_dirty_set_intact() {
    let s = started_session().await;
    s.api.fail_next(1);
    s.store.set_address_field(AddressType::Shipping, "city", "Chicago");
    s.store.set_address_field(AddressType::Billing, "phone", "555-0199");

    s.engine.customer().on_field_blur().await;
    let dirty = s.engine.customer().dirty_sets();
    assert_eq!(dirty.billing, DirtySet::from(["phone".to_string()]));
    assert_eq!(dirty.shipping, DirtySet::from(["city".to_string()]));
    assert_eq!(s.notices.messages().len(), 1);

    // Nothing is retried until the shopper edits again or blurs a field.
    quiesce().await;
    assert_eq!(s.api.customer_requests().len(), 1);

    s.store.set_address_field(AddressType::Billing, "first_name", "Grace");
    quiesce().await;
    let requests = s.api.customer_requests();
    assert_eq!(requests.len(), 2);
    let retried = &requests[1].0;
    assert_eq!(retried.billing_address.as_ref().unwrap().get("phone"), "555-0199");
    assert_eq!(retried.shipping_address.as_ref().unwrap().get("city"), "Chicago");
    assert!(s.engine.customer().dirty_sets().is_empty());
    assert_eq!(s.api.persisted_customer().shipping.get("city"), "Chicago");
}

#[tokio::test(start_paused = true)]
async fn test_country_change_resets_state_and_postcode() {
    let s = started_session().await;
    s.store.set_address_field(AddressType::Shipping, "country", "CA");
    quiesce().await;

    let requests = s.api.customer_requests();
    assert_eq!(requests.len(), 1);
    let (payload, shipping_rates_changed) = &requests[0];
    let shipping = payload.shipping_address.as_ref().unwrap();
    assert_eq!(shipping.get("country"), "CA");
    assert_eq!(shipping.get("state"), "");
    assert_eq!(shipping.get("postcode"), "");
    assert!(shipping_rates_changed);
    assert!(payload.billing_address.is_none());

    let live = s.store.customer().shipping;
    assert_eq!(live.get("state"), "");
    assert_eq!(live.get("postcode"), "");
    assert_eq!(s.store.cart().unwrap().totals.shipping.to_string(), "15.00");
}

#[tokio::test(start_paused = true)]
async fn test_no_concurrent_pushes_for_one_resource() {
    let s = started_session().await;
    s.api.set_latency(Duration::from_secs(1));
    s.store.set_address_field(AddressType::Billing, "city", "Seattle");

    let customer = s.engine.customer().clone();
    let first = tokio::spawn(async move { customer.reconcile().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(s.engine.customer().is_in_flight());

    s.store.set_address_field(AddressType::Billing, "city", "Portland");
    assert_eq!(s.engine.customer().reconcile().await, PushOutcome::Skipped);
    s.engine.customer().on_field_blur().await;

    assert_eq!(first.await.unwrap(), PushOutcome::Sent);
    assert_eq!(s.api.peak_concurrency(), 1);

    // The edit made during the flight is pushed afterwards.
    quiesce().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let requests = s.api.customer_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].0.billing_address.as_ref().unwrap().get("city"),
        "Portland"
    );
    assert_eq!(s.api.peak_concurrency(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_billing_postcode_change_payload() {
    let s = started_session().await;
    s.store
        .set_address_field(AddressType::Billing, "postcode", "10002");
    quiesce().await;

    let requests = s.api.customer_requests();
    assert_eq!(requests.len(), 1);
    let (payload, shipping_rates_changed) = &requests[0];
    let expected = us_address().with("postcode", "10002");
    assert_eq!(payload.billing_address.as_ref(), Some(&expected));
    assert!(payload.shipping_address.is_none());
    assert!(!shipping_rates_changed);

    let body = serde_json::to_value(payload).unwrap();
    assert_eq!(body.as_object().unwrap().len(), 1);
    assert_eq!(body["billing_address"]["postcode"], "10002");
}

#[tokio::test(start_paused = true)]
async fn test_both_addresses_in_one_payload() {
    let s = started_session().await;
    s.store.set_address_field(AddressType::Billing, "city", "Albany");
    tokio::time::sleep(WINDOW / 2).await;
    s.store.set_address_field(AddressType::Shipping, "postcode", "10003");
    quiesce().await;

    let requests = s.api.customer_requests();
    assert_eq!(requests.len(), 1);
    let (payload, shipping_rates_changed) = &requests[0];
    assert!(payload.billing_address.is_some());
    assert!(payload.shipping_address.is_some());
    assert!(shipping_rates_changed);
}

#[tokio::test(start_paused = true)]
async fn test_name_and_phone_do_not_flag_shipping_rates() {
    let s = started_session().await;
    s.store
        .set_address_field(AddressType::Shipping, "first_name", "Grace");
    s.store
        .set_address_field(AddressType::Shipping, "phone", "555-0111");
    quiesce().await;

    let requests = s.api.customer_requests();
    assert_eq!(requests.len(), 1);
    let (payload, shipping_rates_changed) = &requests[0];
    assert!(payload.shipping_address.is_some());
    assert!(!shipping_rates_changed);
}

#[tokio::test(start_paused = true)]
async fn test_blur_pushes_without_waiting() {
    let s = started_session().await;
    s.store.set_address_field(AddressType::Billing, "address_1", "2 Elm St");
    s.engine.customer().on_field_blur().await;
    assert_eq!(s.api.customer_requests().len(), 1);

    quiesce().await;
    assert_eq!(s.api.customer_requests().len(), 1);
}
