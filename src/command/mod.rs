// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound requests published to the controller.
//!
//! | Request | Topic | Payload |
//! |---------|-------|---------|
//! | [`Request::SysinfoPublish`] | `{profile}/public/cmd` | `{"Method":"systeminfo.publish"}` |
//! | [`Request::DevicesList`] | `{profile}/cmd` | `{"Method":"devices.list"}` |
//! | [`Request::Control`] | `{profile}/cmd` | `devices.control` with one entry per device |
//!
//! # Examples
//!
//! ```
//! use nhc2_gateway::command::{ControlBatch, Request};
//!
//! let mut batch = ControlBatch::new();
//! batch.set("d1", "Brightness", 20.into());
//!
//! let payload = Request::Control(batch).to_payload();
//! assert_eq!(
//!     payload,
//!     r#"{"Method":"devices.control","Params":[{"Devices":[{"Properties":[{"Brightness":20}],"Uuid":"d1"}]}]}"#
//! );
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::response::Method;

/// Pending property writes, grouped per device.
///
/// Within a batch the last value set for a (device, property) pair wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlBatch {
    devices: BTreeMap<String, BTreeMap<String, Value>>,
}

impl ControlBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a property write, replacing any earlier value for the same key.
    pub fn set(&mut self, uuid: impl Into<String>, key: impl Into<String>, value: Value) {
        self.devices
            .entry(uuid.into())
            .or_default()
            .insert(key.into(), value);
    }

    /// Returns `true` if a write is pending for this device.
    #[must_use]
    pub fn contains_device(&self, uuid: &str) -> bool {
        self.devices.contains_key(uuid)
    }

    /// Returns the pending value for one property.
    #[must_use]
    pub fn get(&self, uuid: &str, key: &str) -> Option<&Value> {
        self.devices.get(uuid)?.get(key)
    }

    /// Number of distinct devices in the batch.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn to_params(&self) -> Value {
        let devices: Vec<Value> = self
            .devices
            .iter()
            .map(|(uuid, properties)| {
                let properties: Vec<Value> = properties
                    .iter()
                    .map(|(key, value)| {
                        let mut entry = Map::new();
                        entry.insert(key.clone(), value.clone());
                        Value::Object(entry)
                    })
                    .collect();
                json!({ "Uuid": uuid, "Properties": properties })
            })
            .collect();
        json!([{ "Devices": devices }])
    }
}

/// A request the session publishes to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Ask for controller metadata.
    SysinfoPublish,
    /// Ask for the full device list.
    DevicesList,
    /// Write device properties.
    Control(ControlBatch),
}

impl Request {
    /// Returns the method this request carries.
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::SysinfoPublish => Method::SysinfoPublish,
            Self::DevicesList => Method::DevicesList,
            Self::Control(_) => Method::DevicesControl,
        }
    }

    /// Serializes the request into its JSON payload.
    #[must_use]
    pub fn to_payload(&self) -> String {
        let method = self.method();
        match self {
            Self::SysinfoPublish | Self::DevicesList => {
                json!({ "Method": method.as_str() }).to_string()
            }
            Self::Control(batch) => {
                json!({ "Method": method.as_str(), "Params": batch.to_params() }).to_string()
            }
        }
    }
}
