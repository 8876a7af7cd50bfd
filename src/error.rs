//! Error types

use thiserror::Error;

/// Failure to produce audio for a source.
///
/// Neither variant is cached: the next request for the same source retries.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MediaError {
    /// The bytes could not be decoded as audio
    #[error("decode failed for {source_key}: {reason}")]
    Decode { source_key: String, reason: String },
    /// The bytes could not be obtained (network, HTTP status, nothing to fetch)
    #[error("fetch failed for {source_key}: {reason}")]
    Fetch { source_key: String, reason: String },
}

impl MediaError {
    pub(crate) fn decode(key: impl ToString, reason: impl ToString) -> Self {
        MediaError::Decode { source_key: key.to_string(), reason: reason.to_string() }
    }

    pub(crate) fn fetch(key: impl ToString, reason: impl ToString) -> Self {
        MediaError::Fetch { source_key: key.to_string(), reason: reason.to_string() }
    }

    /// The source this error is about
    pub fn source_key(&self) -> &str {
        match self {
            MediaError::Decode { source_key, .. } | MediaError::Fetch { source_key, .. } => source_key,
        }
    }
}

/// Engine level failures
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The host audio output cannot be opened (yet)
    #[error("audio output unavailable: {0}")]
    ContextUnavailable(String),
}

pub type MediaResult<T> = Result<T, MediaError>;
pub type EngineResult<T> = Result<T, EngineError>;
