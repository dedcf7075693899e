// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection refusal reasons reported in the MQTT CONNACK.

use std::fmt;

/// Why the controller refused a connection.
///
/// The numeric codes are the MQTT 3.1.1 CONNACK return codes 1 to 5.
///
/// # Examples
///
/// ```
/// use nhc2_gateway::types::RefusalReason;
///
/// assert_eq!(RefusalReason::from_code(4), Some(RefusalReason::BadCredentials));
/// assert_eq!(RefusalReason::BadCredentials.code(), 4);
/// assert_eq!(RefusalReason::from_code(0), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefusalReason {
    /// Unacceptable protocol version.
    BadProtocolVersion,
    /// Client identifier rejected.
    BadClientId,
    /// Server unavailable.
    ServerUnavailable,
    /// Bad username or password.
    BadCredentials,
    /// Not authorized.
    NotAuthorized,
}

impl RefusalReason {
    /// Maps a CONNACK return code to a refusal reason.
    ///
    /// Returns `None` for success (0) and for codes outside 1 to 5.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::BadProtocolVersion),
            2 => Some(Self::BadClientId),
            3 => Some(Self::ServerUnavailable),
            4 => Some(Self::BadCredentials),
            5 => Some(Self::NotAuthorized),
            _ => None,
        }
    }

    /// Returns the CONNACK return code for this reason.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::BadProtocolVersion => 1,
            Self::BadClientId => 2,
            Self::ServerUnavailable => 3,
            Self::BadCredentials => 4,
            Self::NotAuthorized => 5,
        }
    }

    /// Returns a human readable description.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::BadProtocolVersion => "incorrect protocol version",
            Self::BadClientId => "invalid client identifier",
            Self::ServerUnavailable => "server unavailable",
            Self::BadCredentials => "bad username or password",
            Self::NotAuthorized => "not authorised",
        }
    }
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for code in 1..=5 {
            let reason = RefusalReason::from_code(code).unwrap();
            assert_eq!(reason.code(), code);
        }
    }

    #[test]
    fn success_and_unknown_codes_are_not_refusals() {
        assert!(RefusalReason::from_code(0).is_none());
        assert!(RefusalReason::from_code(6).is_none());
        assert!(RefusalReason::from_code(255).is_none());
    }
}
