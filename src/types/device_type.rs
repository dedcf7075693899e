// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device type tags reported by the controller.

use std::fmt;

use serde::{Deserialize, Deserializer};

/// The `Type` tag carried by a device descriptor.
///
/// Only the tagged variants are actionable; every other tag is kept verbatim
/// in [`DeviceType::Other`] and ignored by classification.
///
/// # Examples
///
/// ```
/// use nhc2_gateway::types::DeviceType;
///
/// assert_eq!(DeviceType::from("centralmeter"), DeviceType::CentralMeter);
/// assert!(DeviceType::from("action").is_actionable());
/// assert!(!DeviceType::from("gateway").is_actionable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    /// Regular controllable output.
    Action,
    /// Thermostat.
    Thermostat,
    /// Central energy meter.
    CentralMeter,
    /// Smart plug.
    SmartPlug,
    /// Virtual device.
    Virtual,
    /// Whole-home energy overview.
    EnergyHome,
    /// Any other tag, never classified.
    Other(String),
    /// The descriptor carried no type.
    #[default]
    Unknown,
}

impl DeviceType {
    /// Returns the wire representation of the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Action => "action",
            Self::Thermostat => "thermostat",
            Self::CentralMeter => "centralmeter",
            Self::SmartPlug => "smartplug",
            Self::Virtual => "virtual",
            Self::EnergyHome => "energyhome",
            Self::Other(tag) => tag,
            Self::Unknown => "",
        }
    }

    /// Returns `true` for the types that take part in classification.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Other(_) | Self::Unknown)
    }
}

impl From<&str> for DeviceType {
    fn from(tag: &str) -> Self {
        match tag {
            "action" => Self::Action,
            "thermostat" => Self::Thermostat,
            "centralmeter" => Self::CentralMeter,
            "smartplug" => Self::SmartPlug,
            "virtual" => Self::Virtual,
            "energyhome" => Self::EnergyHome,
            "" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from(tag.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_are_actionable() {
        for tag in [
            "action",
            "thermostat",
            "centralmeter",
            "smartplug",
            "virtual",
            "energyhome",
        ] {
            let ty = DeviceType::from(tag);
            assert!(ty.is_actionable(), "{tag} should be actionable");
            assert_eq!(ty.as_str(), tag);
        }
    }

    #[test]
    fn other_tags_are_preserved() {
        let ty: DeviceType = serde_json::from_str(r#""gateway""#).unwrap();
        assert_eq!(ty, DeviceType::Other("gateway".to_string()));
        assert!(!ty.is_actionable());
        assert_eq!(ty.to_string(), "gateway");
    }
}
