use thiserror::Error;

pub type PulseResult<T> = Result<T, PulseError>;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchFailure),

    #[error("Chat delivery error: {0}")]
    Sink(#[from] SinkFailure),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for PulseError {
    fn from(err: config::ConfigError) -> Self {
        PulseError::Config(err.to_string())
    }
}

/// A row or dashboard fetch that did not produce data. Kept distinct from an
/// empty result so the affected section can be shown as unavailable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("backend returned status {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("query rejected before sending: {0}")]
    InvalidQuery(String),

    #[error("fetch cancelled before completion")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkFailure {
    #[error("chat endpoint returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("chat transport error: {0}")]
    Transport(String),

    #[error("could not encode message: {0}")]
    Encoding(String),
}
