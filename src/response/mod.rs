// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsing of messages received from the controller.
//!
//! Every payload is a JSON object whose `Method` field names its intent.
//! Device-carrying methods nest descriptors under `Params[*].Devices[*]`.

mod descriptor;

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseError;

pub use descriptor::DeviceDescriptor;

/// The `Method` field of a controller message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// `systeminfo.publish`: controller metadata.
    SysinfoPublish,
    /// `systeminfo.published`: the controller announces that its
    /// configuration changed.
    SysinfoPublished,
    /// `devices.list`: the full device list.
    DevicesList,
    /// `devices.status`: property updates for some devices.
    DevicesStatus,
    /// `devices.changed`: descriptor changes for some devices.
    DevicesChanged,
    /// `devices.control`: outbound property writes.
    DevicesControl,
    /// Any other method.
    Other(String),
}

impl Method {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SysinfoPublish => "systeminfo.publish",
            Self::SysinfoPublished => "systeminfo.published",
            Self::DevicesList => "devices.list",
            Self::DevicesStatus => "devices.status",
            Self::DevicesChanged => "devices.changed",
            Self::DevicesControl => "devices.control",
            Self::Other(method) => method,
        }
    }
}

impl From<&str> for Method {
    fn from(method: &str) -> Self {
        match method {
            "systeminfo.publish" => Self::SysinfoPublish,
            "systeminfo.published" => Self::SysinfoPublished,
            "devices.list" => Self::DevicesList,
            "devices.status" => Self::DevicesStatus,
            "devices.changed" => Self::DevicesChanged,
            "devices.control" => Self::DevicesControl,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed controller message.
///
/// # Examples
///
/// ```
/// use nhc2_gateway::response::{Envelope, Method};
///
/// let payload = br#"{"Method":"devices.status","Params":[{"Devices":[{"Uuid":"d1"}]}]}"#;
/// let envelope = Envelope::parse(payload).unwrap();
///
/// assert_eq!(envelope.method(), &Method::DevicesStatus);
/// assert_eq!(envelope.devices().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Envelope {
    method: Method,
    body: Value,
}

impl Envelope {
    /// Parses a raw payload.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Json` if the payload is not JSON,
    /// `ParseError::UnexpectedFormat` if it is not an object, and
    /// `ParseError::MissingField` if it has no string `Method`.
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        let body: Value = serde_json::from_slice(payload)?;
        if !body.is_object() {
            return Err(ParseError::UnexpectedFormat(
                "payload is not a JSON object".to_string(),
            ));
        }
        let method = body
            .get("Method")
            .and_then(Value::as_str)
            .map(Method::from)
            .ok_or_else(|| ParseError::MissingField("Method".to_string()))?;
        Ok(Self { method, body })
    }

    /// Returns the message method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the full JSON body.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Consumes the envelope, returning the JSON body.
    #[must_use]
    pub fn into_body(self) -> Value {
        self.body
    }

    /// Extracts every device descriptor nested under `Params[*].Devices`.
    ///
    /// Descriptors that fail to deserialize are skipped.
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        let Some(params) = self.body.get("Params").and_then(Value::as_array) else {
            return Vec::new();
        };

        params
            .iter()
            .filter_map(|param| param.get("Devices").and_then(Value::as_array))
            .flatten()
            .filter_map(|raw| match DeviceDescriptor::deserialize(raw) {
                Ok(device) => Some(device),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed device descriptor");
                    None
                }
            })
            .collect()
    }
}
