use thiserror::Error;

pub type Result<T> = std::result::Result<T, PathError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Malformed scope {scope:?}: 'properties' is not followed by a property name")]
    MissingPropertyName { scope: String },

    #[error("Malformed scope {scope:?}: unexpected token {token:?}")]
    UnexpectedToken { scope: String, token: String },

    #[error("Invalid data path {path:?}: {token:?} is not an array index")]
    InvalidIndex { path: String, token: String },

    #[error("Invalid data path {path:?}: index {index} is out of bounds (length {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Invalid data path {path:?}: {segment:?} is neither an object nor an array")]
    NotAContainer { path: String, segment: String },
}
