use super::address::CustomerSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Phase of the checkout submission cycle.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    #[default]
    Idle,
    Validating,
    Processing,
    AfterProcessing,
    Complete,
}

impl CheckoutStatus {
    /// Whether a submission cycle is currently running.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            CheckoutStatus::Validating
                | CheckoutStatus::Processing
                | CheckoutStatus::AfterProcessing
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Pending,
    Failure,
    Error,
}

impl PaymentStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, PaymentStatus::Failure | PaymentStatus::Error)
    }
}

/// Result of a payment attempt as reported by the payment collaborator.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentResult {
    pub status: PaymentStatus,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

impl PaymentResult {
    pub fn success() -> Self {
        Self {
            status: PaymentStatus::Success,
            redirect_url: None,
            message: None,
            details: BTreeMap::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Failure,
            redirect_url: None,
            message: Some(message.into()),
            details: BTreeMap::new(),
        }
    }

    pub fn with_redirect(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }
}

/// What the payment collaborator is asked to process.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentRequest {
    pub order_id: Option<u64>,
    pub payment_method: String,
    pub customer: CustomerSnapshot,
}

/// State of the current checkout session.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct CheckoutSession {
    pub status: CheckoutStatus,
    pub order_id: Option<u64>,
    pub redirect_url: Option<String>,
    pub payment_result: Option<PaymentResult>,
    pub has_error: bool,
}

impl CheckoutSession {
    /// Starts a fresh cycle, keeping the order id assigned by the server.
    pub fn reset(&mut self) {
        *self = Self {
            order_id: self.order_id,
            ..Self::default()
        };
    }
}

/// How a submission cycle ended.
#[derive(Debug, PartialEq, Clone)]
pub enum CheckoutOutcome {
    Completed { redirect_url: Option<String> },
    /// `retryable == false` means the session reached COMPLETE with a failure.
    Failed { retryable: bool },
}
