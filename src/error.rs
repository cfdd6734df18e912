use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Request aborted")]
    Aborted,
    #[error("A checkout submission is already in progress")]
    SubmissionInProgress,
    #[error("Payment error: {0}")]
    Payment(String),
    #[error("Observer error: {0}")]
    Observer(String),
    #[error("Script error: {0}")]
    Script(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
