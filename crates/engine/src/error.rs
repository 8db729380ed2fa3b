use dialog_paths::PathError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No trigger registered for id {id}")]
    TriggerNotRegistered { id: String },

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    #[error("Backend call {method} failed: {message}")]
    Transport {
        method: &'static str,
        message: String,
    },

    #[error("Backend call {method} timed out after {timeout_ms} ms")]
    BackendTimeout { method: &'static str, timeout_ms: u128 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
