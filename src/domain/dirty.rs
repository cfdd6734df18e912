//! Dirty-field tracking.
//!
//! Diffs successive snapshots into sets of changed field keys. A field stays
//! dirty until the server has confirmed it persisted.

use super::address::{Address, AddressType, CustomerSnapshot};
use std::collections::{BTreeMap, BTreeSet};

/// Address fields whose format depends on the selected country.
pub const COUNTRY_DEPENDENT_FIELDS: [&str; 2] = ["state", "postcode"];

pub type DirtySet = BTreeSet<String>;

/// Returns the keys whose value differs between `prev` and `next`.
///
/// A key present on only one side counts as changed unless its value on the
/// other side would read as empty anyway.
pub fn diff(prev: &Address, next: &Address) -> DirtySet {
    prev.keys()
        .chain(next.keys())
        .filter(|key| prev.get(key) != next.get(key))
        .map(str::to_string)
        .collect()
}

/// Flat-map variant of [`diff`], used for checkout additional fields.
pub fn diff_fields(
    prev: &BTreeMap<String, String>,
    next: &BTreeMap<String, String>,
) -> DirtySet {
    let value = |map: &BTreeMap<String, String>, key: &str| {
        map.get(key).map(String::as_str).unwrap_or("").to_string()
    };
    prev.keys()
        .chain(next.keys())
        .filter(|key| value(prev, key) != value(next, key))
        .cloned()
        .collect()
}

/// The outcome of comparing one address against its previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressChange {
    pub dirty: DirtySet,
    /// Set when dependent fields had to be cleared; must be written back to the store.
    pub corrected: Option<Address>,
}

/// Diffs an address and applies the country-dependent invalidation rule.
///
/// When `country` changes, `state` and `postcode` that were not edited in the
/// same diff are forced dirty and reset to the empty string.
pub fn track_address_changes(prev: &Address, next: &Address) -> AddressChange {
    let mut dirty = diff(prev, next);
    let mut corrected = next.clone();
    let mut needs_write = false;

    if dirty.contains("country") {
        for field in COUNTRY_DEPENDENT_FIELDS {
            if dirty.contains(field) {
                continue;
            }
            dirty.insert(field.to_string());
            if !corrected.get(field).is_empty() {
                corrected.set(field, "");
                needs_write = true;
            }
        }
    }

    AddressChange {
        dirty,
        corrected: needs_write.then_some(corrected),
    }
}

/// Fields awaiting confirmation from the server, per address type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirtySets {
    pub billing: DirtySet,
    pub shipping: DirtySet,
}

impl DirtySets {
    pub fn get(&self, kind: AddressType) -> &DirtySet {
        match kind {
            AddressType::Billing => &self.billing,
            AddressType::Shipping => &self.shipping,
        }
    }

    pub fn get_mut(&mut self, kind: AddressType) -> &mut DirtySet {
        match kind {
            AddressType::Billing => &mut self.billing,
            AddressType::Shipping => &mut self.shipping,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.billing.is_empty() && self.shipping.is_empty()
    }

    pub fn mark(&mut self, kind: AddressType, fields: impl IntoIterator<Item = String>) {
        self.get_mut(kind).extend(fields);
    }

    /// Clears only the given fields, leaving anything else dirty.
    pub fn clear(&mut self, kind: AddressType, fields: &DirtySet) {
        self.get_mut(kind).retain(|field| !fields.contains(field));
    }
}

/// Diffs both addresses of a snapshot, returning the changes per address type.
pub fn track_customer_changes(
    prev: &CustomerSnapshot,
    next: &CustomerSnapshot,
) -> [(AddressType, AddressChange); 2] {
    AddressType::ALL.map(|kind| {
        (
            kind,
            track_address_changes(prev.address(kind), next.address(kind)),
        )
    })
}
