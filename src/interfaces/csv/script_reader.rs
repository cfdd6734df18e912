use crate::domain::address::AddressType;
use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;

/// One raw row of a session script: `action, target, field, value`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptRow {
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// A shopper or server action replayed by the CLI.
#[derive(Debug, PartialEq, Clone)]
pub enum ScriptCommand {
    /// Type into an address field.
    Edit {
        address: AddressType,
        field: String,
        value: String,
    },
    /// Leave the current field, flushing pending pushes.
    Blur,
    Wait(Duration),
    /// Flag a validation error on a key such as `billing_postcode`.
    Invalid { key: String, message: String },
    Valid { key: String },
    /// Make the next `n` server requests fail.
    FailNext(u32),
    Notes(String),
    PaymentMethod(String),
    AdditionalField { key: String, value: String },
    Submit,
}

fn required(value: Option<String>, what: &str, action: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SyncError::Script(format!("'{action}' requires a {what}")))
}

impl TryFrom<ScriptRow> for ScriptCommand {
    type Error = SyncError;

    fn try_from(row: ScriptRow) -> Result<Self> {
        let ScriptRow {
            action,
            target,
            field,
            value,
        } = row;
        let value_or_empty = value.clone().unwrap_or_default();

        match action.as_str() {
            "edit" => Ok(ScriptCommand::Edit {
                address: required(target, "target address", &action)?
                    .parse()
                    .map_err(SyncError::Script)?,
                field: required(field, "field", &action)?,
                value: value_or_empty,
            }),
            "blur" => Ok(ScriptCommand::Blur),
            "wait" => {
                let millis = required(value, "value in milliseconds", &action)?
                    .parse::<u64>()
                    .map_err(|e| SyncError::Script(format!("invalid wait: {e}")))?;
                Ok(ScriptCommand::Wait(Duration::from_millis(millis)))
            }
            "invalid" => Ok(ScriptCommand::Invalid {
                key: required(target, "validation key", &action)?,
                message: value.unwrap_or_else(|| "Invalid value".to_string()),
            }),
            "valid" => Ok(ScriptCommand::Valid {
                key: required(target, "validation key", &action)?,
            }),
            "fail-next" => {
                let count = match value.filter(|v| !v.is_empty()) {
                    Some(count) => count
                        .parse::<u32>()
                        .map_err(|e| SyncError::Script(format!("invalid count: {e}")))?,
                    None => 1,
                };
                Ok(ScriptCommand::FailNext(count))
            }
            "notes" => Ok(ScriptCommand::Notes(value_or_empty)),
            "payment-method" => Ok(ScriptCommand::PaymentMethod(value_or_empty)),
            "field" => Ok(ScriptCommand::AdditionalField {
                key: required(field, "field", &action)?,
                value: value_or_empty,
            }),
            "submit" => Ok(ScriptCommand::Submit),
            other => Err(SyncError::Script(format!("unknown action '{other}'"))),
        }
    }
}

/// Reads session script commands from a CSV source.
///
/// Whitespace is trimmed and trailing empty columns may be omitted.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily yields commands; a malformed row yields an error and reading continues.
    pub fn commands(self) -> impl Iterator<Item = Result<ScriptCommand>> {
        self.reader.into_deserialize::<ScriptRow>().map(|row| {
            let row = row.map_err(SyncError::from)?;
            ScriptCommand::try_from(row)
        })
    }
}
