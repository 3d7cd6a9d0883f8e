use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Canonical error surface for the corpus engine.
///
/// Only `StoreUnavailable` and `InvalidRegistration` are expected to reach
/// callers; duplicates and source failures are handled inside the production
/// manager and never abort a request.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate sentence: {text}")]
    DuplicateSentence { text: String },

    #[error("invalid source registration: {0}")]
    InvalidRegistration(String),
}

/// Failure produced inside one source adapter's stream. Always caught by the
/// production manager and treated as exhaustion of that stream.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SourceFailure {
    pub message: String,
}

impl SourceFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SourceFailure {
    fn from(value: std::io::Error) -> Self {
        Self::new(format!("io: {value}"))
    }
}
