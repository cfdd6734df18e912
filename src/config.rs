use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;
pub const DEFAULT_GENERIC_ERROR_MESSAGE: &str =
    "Something went wrong. Please contact us to get assistance.";

/// Tunables for the sync engine. Missing keys fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiescence window for customer address edits.
    pub customer_debounce_ms: u64,
    /// Quiescence window for checkout field edits.
    pub checkout_debounce_ms: u64,
    /// Shown when a failed checkout carries no message of its own.
    pub generic_error_message: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            customer_debounce_ms: DEFAULT_DEBOUNCE_MS,
            checkout_debounce_ms: DEFAULT_DEBOUNCE_MS,
            generic_error_message: DEFAULT_GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

impl SyncConfig {
    /// Reads a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn customer_debounce(&self) -> Duration {
        Duration::from_millis(self.customer_debounce_ms)
    }

    pub fn checkout_debounce(&self) -> Duration {
        Duration::from_millis(self.checkout_debounce_ms)
    }

    /// Uses the same window for both resources.
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.customer_debounce_ms = debounce_ms;
        self.checkout_debounce_ms = debounce_ms;
        self
    }
}
