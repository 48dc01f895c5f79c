use thiserror::Error;

/// Errors surfaced by the postings engine.
#[derive(Error, Debug)]
pub enum KomodoError {
    /// A required query element, term or filter field was not supplied.
    #[error("missing parameters: {0}")]
    MissingParameters(String),

    /// A parameter was supplied but is out of range (term counts, max results, ...).
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Term, document or collection is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing record store rejected or failed an operation.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The index is being torn down.
    #[error("index destroy in progress: {0}")]
    DestroyInProgress(String),
}

impl KomodoError {
    pub fn missing<S: Into<String>>(msg: S) -> Self {
        KomodoError::MissingParameters(msg.into())
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        KomodoError::InvalidParameters(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        KomodoError::NotFound(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        KomodoError::StorageFailure(msg.into())
    }
}

impl From<sled::Error> for KomodoError {
    fn from(err: sled::Error) -> Self {
        KomodoError::StorageFailure(err.to_string())
    }
}

impl From<bincode::Error> for KomodoError {
    fn from(err: bincode::Error) -> Self {
        KomodoError::StorageFailure(format!("record encoding: {err}"))
    }
}

impl From<serde_json::Error> for KomodoError {
    fn from(err: serde_json::Error) -> Self {
        KomodoError::StorageFailure(format!("document encoding: {err}"))
    }
}

impl From<std::io::Error> for KomodoError {
    fn from(err: std::io::Error) -> Self {
        KomodoError::StorageFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KomodoError>;
