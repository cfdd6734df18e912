use super::address::{Address, AddressType, CustomerSnapshot};
use super::cart::CartState;
use super::checkout::{PaymentRequest, PaymentResult};
use super::observer::ValidationErrors;
use super::payload::{CheckoutDraft, CheckoutPayload, CheckoutResponse, CustomerPayload};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Notice context used for cart (customer address) sync failures.
pub const CART_NOTICE_CONTEXT: &str = "wc/cart";
/// Notice context used for checkout sync and submission failures.
pub const CHECKOUT_NOTICE_CONTEXT: &str = "wc/checkout";

pub type Subscriber = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`SnapshotStore::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    unsubscribe: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Box::new(unsubscribe),
        }
    }

    pub fn unsubscribe(self) {
        (self.unsubscribe)()
    }
}

/// Read access to the locally held checkout data, plus the narrow set of
/// mutations the sync engine is allowed to make.
pub trait SnapshotStore: Send + Sync {
    fn customer(&self) -> CustomerSnapshot;
    fn checkout_draft(&self) -> CheckoutDraft;
    fn set_address(&self, kind: AddressType, address: Address);
    fn receive_cart(&self, cart: CartState);
    fn subscribe(&self, subscriber: Subscriber) -> Subscription;
}

/// REST transport for the server-authoritative order record.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// `PUT /cart/update-customer`
    async fn update_customer(&self, payload: &CustomerPayload) -> Result<CartState>;
    /// `PUT /checkout`
    async fn update_checkout(&self, payload: &CheckoutPayload) -> Result<CheckoutResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NoticeOptions {
    pub id: Option<String>,
    pub context: String,
}

impl NoticeOptions {
    pub fn context(context: &str) -> Self {
        Self {
            id: None,
            context: context.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

pub trait NoticeSink: Send + Sync {
    fn create_error_notice(&self, message: &str, options: NoticeOptions);
    fn clear_error_notices(&self, context: &str);
}

pub trait ValidationStore: Send + Sync {
    fn validation_error(&self, key: &str) -> Option<String>;
    fn set_validation_errors(&self, errors: ValidationErrors);
    fn clear_validation_errors(&self, keys: &[String]);

    fn has_validation_error(&self, key: &str) -> bool {
        self.validation_error(key).is_some()
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn process(&self, request: &PaymentRequest) -> Result<PaymentResult>;
}

pub type SnapshotStoreRef = Arc<dyn SnapshotStore>;
pub type StoreApiRef = Arc<dyn StoreApi>;
pub type NoticeSinkRef = Arc<dyn NoticeSink>;
pub type ValidationStoreRef = Arc<dyn ValidationStore>;
pub type PaymentProcessorRef = Arc<dyn PaymentProcessor>;
