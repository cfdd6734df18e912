use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fields whose change may invalidate previously computed shipping rates.
pub const SHIPPING_RATE_FIELDS: [&str; 3] = ["country", "state", "postcode"];

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Billing,
    Shipping,
}

impl AddressType {
    pub const ALL: [AddressType; 2] = [AddressType::Billing, AddressType::Shipping];

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::Billing => "billing",
            AddressType::Shipping => "shipping",
        }
    }

    /// Key under which the validation store tracks errors for `field`.
    pub fn validation_key(&self, field: &str) -> String {
        format!("{}_{}", self.as_str(), field)
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AddressType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "billing" => Ok(AddressType::Billing),
            "shipping" => Ok(AddressType::Shipping),
            other => Err(format!("unknown address type '{other}'")),
        }
    }
}

/// An ordered mapping of address field key to its string value.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
#[serde(transparent)]
pub struct Address(BTreeMap<String, String>);

impl Address {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `field`, treating a missing key as empty.
    pub fn get(&self, field: &str) -> &str {
        self.0.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Address {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The customer's billing and shipping addresses as currently held by the store.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
pub struct CustomerSnapshot {
    pub billing: Address,
    pub shipping: Address,
}

impl CustomerSnapshot {
    pub fn address(&self, kind: AddressType) -> &Address {
        match kind {
            AddressType::Billing => &self.billing,
            AddressType::Shipping => &self.shipping,
        }
    }

    pub fn address_mut(&mut self, kind: AddressType) -> &mut Address {
        match kind {
            AddressType::Billing => &mut self.billing,
            AddressType::Shipping => &mut self.shipping,
        }
    }
}
