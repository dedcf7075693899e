// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device descriptors as carried in `devices.*` messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::DeviceType;

/// One device record received from the controller.
///
/// Every field is optional on the wire: status events carry only the
/// identifier and the properties that changed, while a device list carries
/// the full record.
///
/// # Examples
///
/// ```
/// use nhc2_gateway::response::DeviceDescriptor;
/// use nhc2_gateway::types::DeviceType;
///
/// let json = r#"{
///     "Uuid": "d1",
///     "Type": "action",
///     "Model": "light",
///     "Online": "True",
///     "Properties": [{"Status": "On"}, {"Brightness": "40"}]
/// }"#;
/// let device: DeviceDescriptor = serde_json::from_str(json).unwrap();
///
/// assert_eq!(device.uuid.as_deref(), Some("d1"));
/// assert_eq!(device.device_type, DeviceType::Action);
/// assert_eq!(device.online, Some(true));
/// assert_eq!(device.properties["Status"], "On");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable device identifier.
    #[serde(rename = "Uuid", default)]
    pub uuid: Option<String>,

    /// Device type tag.
    #[serde(rename = "Type", default)]
    pub device_type: DeviceType,

    /// Model tag, used for classification.
    #[serde(rename = "Model", default)]
    pub model: Option<String>,

    /// Display name configured on the controller.
    #[serde(rename = "Name", default)]
    pub name: Option<String>,

    /// Reachability marker.
    #[serde(rename = "Online", default, deserialize_with = "deserialize_online")]
    pub online: Option<bool>,

    /// Property name to value.
    #[serde(
        rename = "Properties",
        default,
        deserialize_with = "deserialize_properties"
    )]
    pub properties: BTreeMap<String, Value>,
}

impl DeviceDescriptor {
    /// Creates the synthetic descriptor sent to listeners when the session
    /// is lost.
    #[must_use]
    pub fn offline(uuid: impl Into<String>) -> Self {
        Self {
            uuid: Some(uuid.into()),
            online: Some(false),
            ..Self::default()
        }
    }

    /// Returns the identifier when present and non-empty.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref().filter(|uuid| !uuid.is_empty())
    }

    /// Returns `true` if the device type takes part in classification.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.device_type.is_actionable()
    }

    /// Returns `true` if this is an offline marker.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.online == Some(false)
    }
}

/// Accepts `"True"`/`"False"` strings as well as JSON booleans.
fn deserialize_online<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(online)) => Some(online),
        Some(Value::String(text)) => match text.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Accepts both `[{"Status":"On"},{"Brightness":"40"}]` and
/// `{"Status":"On","Brightness":"40"}`.
fn deserialize_properties<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, Value>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Properties {
        List(Vec<BTreeMap<String, Value>>),
        Map(BTreeMap<String, Value>),
        Null(()),
    }

    Ok(match Properties::deserialize(deserializer)? {
        Properties::List(entries) => entries.into_iter().flatten().collect(),
        Properties::Map(map) => map,
        Properties::Null(()) => BTreeMap::new(),
    })
}
