use super::address::{Address, AddressType, SHIPPING_RATE_FIELDS};
use super::cart::CartState;
use super::dirty::DirtySet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `PUT /cart/update-customer`.
///
/// Only address types with at least one sendable dirty field are present.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct CustomerPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,
    /// Sent out-of-band so the server knows whether shipping rates must be recomputed.
    #[serde(skip)]
    pub shipping_rates_changed: bool,
}

impl CustomerPayload {
    pub fn address(&self, kind: AddressType) -> Option<&Address> {
        match kind {
            AddressType::Billing => self.billing_address.as_ref(),
            AddressType::Shipping => self.shipping_address.as_ref(),
        }
    }

    pub fn set_address(&mut self, kind: AddressType, address: Address) {
        match kind {
            AddressType::Billing => self.billing_address = Some(address),
            AddressType::Shipping => self.shipping_address = Some(address),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.billing_address.is_none() && self.shipping_address.is_none()
    }
}

/// True iff any of the sent shipping fields may change the available rates.
pub fn shipping_rates_changed(shipping_fields: &DirtySet) -> bool {
    SHIPPING_RATE_FIELDS
        .iter()
        .any(|field| shipping_fields.contains(*field))
}

/// Local draft of the checkout resource.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct CheckoutDraft {
    /// Whether the shopper has a server session; without one the checkout cannot be updated.
    pub has_session: bool,
    pub express_payment_started: bool,
    pub payment_method: String,
    pub order_notes: String,
    pub additional_fields: BTreeMap<String, String>,
}

/// Body of `PUT /checkout`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct CheckoutPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_fields: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

impl CheckoutPayload {
    pub fn is_empty(&self) -> bool {
        self.additional_fields.is_none()
            && self.order_notes.is_none()
            && self.payment_method.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct CheckoutResponse {
    pub order_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart: Option<CartState>,
}
