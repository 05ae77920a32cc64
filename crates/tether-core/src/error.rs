// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the bridge.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for every bridge operation.
///
/// Each variant is terminal for the call it is delivered to. Nothing in the
/// core retries on its own.
#[derive(Debug, Error)]
pub enum BridgeError {
    // -- Inbound calls --
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("not found: {0}")]
    NotFound(String),

    // -- Native-initiated calls --
    #[error("script reported an error: {0}")]
    JsIssued(String),

    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    #[error("no reply within {} ms", .0.as_millis())]
    Timeout(Duration),

    // -- Lifecycle / arbitration --
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("superseded by a newer request")]
    Superseded,

    #[error("resource could not be presented: {0}")]
    Presentation(String),

    // -- Assembly / ambient --
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// The error delivered to everything still outstanding when a bridge is
    /// torn down.
    pub fn shutdown() -> Self {
        Self::Cancelled("bridge shut down".into())
    }

    /// Wire-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Argument(_) => ErrorKind::Argument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::JsIssued(_) => ErrorKind::JsIssued,
            Self::Evaluation(_) => ErrorKind::Evaluation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Superseded => ErrorKind::Superseded,
            Self::Presentation(_) => ErrorKind::Presentation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Serialization(_) => ErrorKind::Serialization,
        }
    }
}

/// Flat error classification shared with the scripted side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Argument,
    NotFound,
    JsIssued,
    Evaluation,
    Timeout,
    Cancelled,
    Superseded,
    Presentation,
    Configuration,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Argument => "ArgumentError",
            Self::NotFound => "NotFoundError",
            Self::JsIssued => "JsIssuedError",
            Self::Evaluation => "EvaluationError",
            Self::Timeout => "TimeoutError",
            Self::Cancelled => "Cancelled",
            Self::Superseded => "Superseded",
            Self::Presentation => "PresentationError",
            Self::Configuration => "ConfigurationError",
            Self::Serialization => "SerializationError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_reports_millis() {
        let err = BridgeError::Timeout(Duration::from_secs(9));
        assert_eq!(err.to_string(), "no reply within 9000 ms");
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn shutdown_is_a_cancellation() {
        let err = BridgeError::shutdown();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(err.to_string(), "cancelled: bridge shut down");
    }

    #[test]
    fn serde_errors_convert() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: BridgeError = parse.unwrap_err().into();
        assert_eq!(err.kind().as_str(), "SerializationError");
    }
}
