use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A shipping option quoted by the server for the current destination.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ShippingRate {
    pub rate_id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Authoritative cart substate returned by the server after an update.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct CartState {
    pub items_count: u32,
    pub needs_shipping: bool,
    #[serde(default)]
    pub shipping_rates: Vec<ShippingRate>,
    pub totals: CartTotals,
}

impl CartState {
    pub fn selected_rate(&self) -> Option<&ShippingRate> {
        self.shipping_rates.iter().find(|rate| rate.selected)
    }
}
