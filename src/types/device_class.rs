// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device classes known to the gateway.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// A group of device models that share one adapter implementation.
///
/// # Examples
///
/// ```
/// use nhc2_gateway::types::DeviceClass;
///
/// assert_eq!(DeviceClass::Light.as_str(), "light");
/// assert_eq!("cover".parse::<DeviceClass>().unwrap(), DeviceClass::Cover);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceClass {
    /// Fan driven by a plain on/off relay.
    SwitchedFan,
    /// Fan with speed control.
    Fan,
    /// Shutters, blinds, gates and garage doors.
    Cover,
    /// Switched outputs such as sockets.
    Switch,
    /// Switched and dimmable lights.
    Light,
    /// Room thermostats.
    Thermostat,
    /// Electricity clamps and central meters.
    EnergyMeter,
    /// Door stations and bell buttons.
    AccessControl,
    /// Controller-side actions (all off, moods, alarms).
    Button,
    /// Smart plugs with metering.
    SmartPlug,
    /// Virtual devices created on the controller.
    Virtual,
    /// Whole-home consumption overview.
    EnergyHome,
}

impl DeviceClass {
    /// All classes, in the order a device list is classified.
    pub const ALL: [Self; 12] = [
        Self::EnergyHome,
        Self::SwitchedFan,
        Self::Fan,
        Self::Switch,
        Self::Light,
        Self::Cover,
        Self::Thermostat,
        Self::EnergyMeter,
        Self::AccessControl,
        Self::Button,
        Self::SmartPlug,
        Self::Virtual,
    ];

    /// Returns the kebab-case name of the class.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SwitchedFan => "switched-fan",
            Self::Fan => "fan",
            Self::Cover => "cover",
            Self::Switch => "switch",
            Self::Light => "light",
            Self::Thermostat => "thermostat",
            Self::EnergyMeter => "energy-meter",
            Self::AccessControl => "access-control",
            Self::Button => "button",
            Self::SmartPlug => "smart-plug",
            Self::Virtual => "virtual",
            Self::EnergyHome => "energy-home",
        }
    }

    /// Returns the model tags that map to this class by default.
    #[must_use]
    pub const fn default_models(&self) -> &'static [&'static str] {
        match self {
            Self::SwitchedFan => &["switched-fan"],
            Self::Fan => &["fan"],
            Self::Cover => &[
                "rolldownshutter",
                "sunblind",
                "gate",
                "venetianblind",
                "garagedoor",
            ],
            Self::Switch => &["socket", "switched-generic"],
            Self::Light => &["light", "dimmer"],
            Self::Thermostat => &["thermostat", "hvacthermostat"],
            Self::EnergyMeter => &["electricity-clamp-centralmeter"],
            Self::AccessControl => &["accesscontrol", "bellbutton"],
            Self::Button => &[
                "generic",
                "alloff",
                "comfort",
                "simulation",
                "alarms",
                "condition",
            ],
            Self::SmartPlug => &["naso_smartplug"],
            Self::Virtual => &["virtual"],
            Self::EnergyHome => &["overallcomsumption"],
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnexpectedFormat(format!("unknown device class: {s}")))
    }
}
