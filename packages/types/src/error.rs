use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("Invalid bytes: {0}")]
    InvalidBytes(String),

    #[error("Unable to decode: {0}")]
    Decode(#[from] alloy_sol_types::Error),

    #[error("Unexpected return data: {0}")]
    ReturnData(String),

    #[error("ABI does not match the generated bindings: {0}")]
    AbiMismatch(String),

    #[error("Unable to parse ABI json: {0}")]
    AbiJson(#[from] serde_json::Error),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Log is missing {0}")]
    MissingLogMetadata(&'static str),
}
