//! Error types for the book ingestion engine

use thiserror::Error;

use crate::side::Side;

/// Book ingestion errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to parse decimal {text:?}: {reason}")]
    Parse { text: String, reason: String },

    #[error("Malformed level for {instrument} {side}: {raw} ({reason})")]
    MalformedLevel {
        instrument: String,
        side: String,
        raw: String,
        reason: String,
    },

    #[error("Unknown side token {token:?} for {instrument}")]
    UnknownSide { instrument: String, token: String },

    #[error("State store write failed: {0}")]
    StoreWrite(String),

    #[error("State store read failed: {0}")]
    StoreRead(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Feed error: {0}")]
    Feed(String),
}

impl IngestError {
    pub(crate) fn parse(text: &str, reason: impl Into<String>) -> Self {
        IngestError::Parse {
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(instrument: &str, side: Side, raw: &str, reason: impl ToString) -> Self {
        IngestError::MalformedLevel {
            instrument: instrument.to_string(),
            side: side.as_str().to_string(),
            raw: raw.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Per-entry errors skip one level or change; everything else fails the event.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::Parse { .. }
                | IngestError::MalformedLevel { .. }
                | IngestError::UnknownSide { .. }
        )
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Feed(err.to_string())
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Ipc(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for IngestError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        IngestError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
