//! Error types for Dagsync.
//!
//! All errors in Dagsync are represented by the `DagsyncError` enum.
//! Transport and correlator errors reject the single operation that hit them,
//! reducer errors are reported per event and never escape to unrelated callers.

use std::io::ErrorKind;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Dagsync operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum DagsyncError {
    /// The persistent connection could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// A frame was sent while the transport was not open.
    #[error("transport is not connected")]
    NotConnected,

    /// Pending work was invalidated by a transport teardown.
    #[error("connection closed")]
    ConnectionClosed,

    /// No reply arrived within the request deadline.
    #[error("request {0} timed out")]
    Timeout(String),

    /// A one-shot call returned a failure status or a malformed body.
    #[error("fetch failed (status: {status:?}): {message}")]
    Fetch {
        status: Option<u16>,
        message: String,
    },

    /// A push event failed structural validation.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON).
    #[error("{0}")]
    Convert(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),
}

impl DagsyncError {
    pub fn fetch(
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        DagsyncError::Fetch {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        DagsyncError::MalformedEvent(message.into())
    }
}

impl From<DagsyncError> for String {
    fn from(val: DagsyncError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for DagsyncError {
    fn from(error: std::io::Error) -> Self {
        DagsyncError::IoError(error.to_string())
    }
}

impl From<DagsyncError> for std::io::Error {
    fn from(val: DagsyncError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<serde_json::Error> for DagsyncError {
    fn from(error: serde_json::Error) -> Self {
        DagsyncError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for DagsyncError {
    fn from(error: toml::de::Error) -> Self {
        DagsyncError::Config(error.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DagsyncError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        DagsyncError::Connection(error.to_string())
    }
}
