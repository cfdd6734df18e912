use super::address::CustomerSnapshot;
use super::checkout::PaymentResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Field validation errors keyed by validation key (e.g. `billing_postcode`).
pub type ValidationErrors = BTreeMap<String, String>;

/// Lifecycle events observers can register for.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutEvent {
    Validation,
    AfterProcessingWithSuccess,
    AfterProcessingWithError,
}

impl fmt::Display for CheckoutEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckoutEvent::Validation => "checkout_validation",
            CheckoutEvent::AfterProcessingWithSuccess => "checkout_after_processing_with_success",
            CheckoutEvent::AfterProcessingWithError => "checkout_after_processing_with_error",
        };
        f.write_str(name)
    }
}

/// Data handed to every observer of an event.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct EventContext {
    pub order_id: Option<u64>,
    pub customer: CustomerSnapshot,
    pub payment_method: String,
    pub payment_result: Option<PaymentResult>,
}

/// What an observer reports back for a lifecycle event.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverResponse {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        redirect_url: Option<String>,
    },
    Fail {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation_errors: Option<ValidationErrors>,
        #[serde(default = "default_retryable")]
        retryable: bool,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation_errors: Option<ValidationErrors>,
    },
}

fn default_retryable() -> bool {
    true
}

impl ObserverResponse {
    pub fn success() -> Self {
        ObserverResponse::Success { redirect_url: None }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ObserverResponse::Fail {
            message: Some(message.into()),
            validation_errors: None,
            retryable: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ObserverResponse::Error {
            message: Some(message.into()),
            validation_errors: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ObserverResponse::Success { .. })
    }

    /// The message carried by a fail or error response, if non-empty.
    pub fn message(&self) -> Option<&str> {
        match self {
            ObserverResponse::Success { .. } => None,
            ObserverResponse::Fail { message, .. } | ObserverResponse::Error { message, .. } => {
                message.as_deref().filter(|m| !m.trim().is_empty())
            }
        }
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            ObserverResponse::Success { .. } => None,
            ObserverResponse::Fail {
                validation_errors, ..
            }
            | ObserverResponse::Error {
                validation_errors, ..
            } => validation_errors.as_ref(),
        }
    }

    /// Only a fail response explicitly marked non-retryable ends the cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            ObserverResponse::Fail { retryable, .. } => *retryable,
            _ => true,
        }
    }

    /// Adapts a loosely shaped response (as produced by older observers) into
    /// a tagged response. `None` means the observer had nothing to say.
    ///
    /// Recognised shapes: `null`, `true`/`false`, and objects with a `type` of
    /// `success`, `failure`/`fail` or `error` carrying optional `message`,
    /// `retry`, `validationErrors` and `redirectUrl` keys. An untyped object
    /// with a message is treated as an error.
    pub fn from_legacy(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(true) => Some(Self::success()),
            Value::Bool(false) => Some(ObserverResponse::Fail {
                message: None,
                validation_errors: None,
                retryable: true,
            }),
            Value::Object(map) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let validation_errors = map
                    .get("validationErrors")
                    .and_then(Value::as_object)
                    .map(|errors| {
                        errors
                            .iter()
                            .map(|(key, error)| (key.clone(), legacy_error_message(error)))
                            .collect::<ValidationErrors>()
                    });

                match map.get("type").and_then(Value::as_str) {
                    Some("success") => Some(ObserverResponse::Success {
                        redirect_url: map
                            .get("redirectUrl")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    }),
                    Some("failure") | Some("fail") => Some(ObserverResponse::Fail {
                        message,
                        validation_errors,
                        retryable: map.get("retry").and_then(Value::as_bool).unwrap_or(true),
                    }),
                    Some("error") => Some(ObserverResponse::Error {
                        message,
                        validation_errors,
                    }),
                    _ if message.is_some() => Some(ObserverResponse::Error {
                        message,
                        validation_errors,
                    }),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn legacy_error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_boolean_and_null() {
        assert_eq!(ObserverResponse::from_legacy(&Value::Null), None);
        assert_eq!(
            ObserverResponse::from_legacy(&json!(true)),
            Some(ObserverResponse::success())
        );
        assert!(matches!(
            ObserverResponse::from_legacy(&json!(false)),
            Some(ObserverResponse::Fail { .. })
        ));
    }

    #[test]
    fn test_legacy_failure_with_validation_errors() {
        let legacy = json!({
            "type": "failure",
            "message": "Card declined",
            "retry": false,
            "validationErrors": {
                "billing_postcode": {"message": "Invalid postcode"},
                "billing_phone": "Required"
            }
        });
        let response = ObserverResponse::from_legacy(&legacy).unwrap();
        assert_eq!(response.message(), Some("Card declined"));
        assert!(!response.is_retryable());
        let errors = response.validation_errors().unwrap();
        assert_eq!(errors["billing_postcode"], "Invalid postcode");
        assert_eq!(errors["billing_phone"], "Required");
    }

    #[test]
    fn test_legacy_untyped_object() {
        let response = ObserverResponse::from_legacy(&json!({"message": "Oops"})).unwrap();
        assert!(matches!(response, ObserverResponse::Error { .. }));
        assert_eq!(ObserverResponse::from_legacy(&json!({"foo": 1})), None);
    }

    #[test]
    fn test_blank_message_is_ignored() {
        let response = ObserverResponse::fail("   ");
        assert_eq!(response.message(), None);
    }

    #[test]
    fn test_error_is_always_retryable() {
        assert!(ObserverResponse::error("boom").is_retryable());
        assert!(ObserverResponse::fail("boom").is_retryable());
    }

    #[test]
    fn test_tagged_serialization() {
        let json = serde_json::to_value(ObserverResponse::success()).unwrap();
        assert_eq!(json, json!({"type": "success"}));

        let response: ObserverResponse =
            serde_json::from_value(json!({"type": "fail", "message": "no"})).unwrap();
        assert!(response.is_retryable());
    }
}
