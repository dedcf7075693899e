// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the gateway library.
//!
//! This module provides the error hierarchy for the session manager: bus
//! communication, payload parsing, value validation, and the connection
//! outcomes reported by the controller.

use thiserror::Error;

use crate::types::RefusalReason;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Error occurred during bus communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while parsing a controller message.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The controller did not accept the connection.
    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),

    /// The gateway configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `connect` was called on a gateway that already started a session.
    #[error("gateway is already connected")]
    AlreadyConnected,

    /// The operation requires an established session.
    #[error("gateway is not connected")]
    NotConnected,

    /// The session was closed while the operation was pending.
    #[error("session closed")]
    Closed,
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u16,
        /// Maximum allowed value.
        max: u16,
        /// The actual value that was provided.
        actual: u16,
    },
}

/// Errors related to bus communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT request could not be queued.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the controller failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The TLS material could not be loaded.
    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// Errors related to parsing controller messages.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the message.
    #[error("missing field in message: {0}")]
    MissingField(String),

    /// Unexpected message format.
    #[error("unexpected message format: {0}")]
    UnexpectedFormat(String),
}

/// Outcome of a connection attempt that did not end in a usable session.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// The controller refused the connection for a known reason.
    #[error("connection refused: {0}")]
    Refused(RefusalReason),

    /// The controller answered with a return code outside the known set.
    #[error("unexpected connect return code {0}")]
    UnexpectedCode(u8),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_error_display() {
        let err = ValueError::OutOfRange {
            min: 0,
            max: 100,
            actual: 150,
        };
        assert_eq!(err.to_string(), "value 150 is out of range [0, 100]");
    }

    #[test]
    fn parse_error_display() {
        let err = ParseError::MissingField("Method".to_string());
        assert_eq!(err.to_string(), "missing field in message: Method");
    }

    #[test]
    fn connect_error_display() {
        let err = ConnectError::Refused(RefusalReason::BadCredentials);
        assert_eq!(
            err.to_string(),
            "connection refused: bad username or password"
        );
        assert_eq!(
            ConnectError::UnexpectedCode(9).to_string(),
            "unexpected connect return code 9"
        );
    }

    #[test]
    fn error_from_connect_error() {
        let err: Error = ConnectError::Refused(RefusalReason::NotAuthorized).into();
        assert!(matches!(
            err,
            Error::Connect(ConnectError::Refused(RefusalReason::NotAuthorized))
        ));
    }
}
