// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gateway configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::batcher::{DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_COMMANDS, DEFAULT_MAX_DEVICES};
use crate::device::ClassificationTable;
use crate::error::{Error, Result};
use crate::types::DeviceClass;

/// Default controller MQTT port.
pub const DEFAULT_PORT: u16 = 8884;

/// Connection and tuning parameters for a [`Gateway`](super::Gateway).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use nhc2_gateway::GatewayConfig;
/// use nhc2_gateway::types::DeviceClass;
///
/// let config = GatewayConfig::new("192.168.1.20", "hobby", "secret-token")
///     .with_ca_path("/etc/nhc2/ca.pem")
///     .with_switches_as_lights(true)
///     .with_flush_interval(Duration::from_millis(100))
///     .with_models(DeviceClass::Cover, ["rolldownshutter", "gate"]);
///
/// assert_eq!(config.port(), 8884);
/// assert_eq!(config.profile_id(), "hobby");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct GatewayConfig {
    address: String,
    port: u16,
    username: String,
    password: String,
    ca_path: Option<PathBuf>,
    switches_as_lights: bool,
    flush_interval: Duration,
    max_buffered_devices: usize,
    max_buffered_commands: usize,
    keep_alive: Duration,
    connection_timeout: Duration,
    reconnect_delay: Duration,
    model_overrides: BTreeMap<DeviceClass, Vec<String>>,
}

impl GatewayConfig {
    /// Creates a configuration with default tuning.
    ///
    /// The username doubles as the profile id that scopes every topic.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            ca_path: None,
            switches_as_lights: false,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_buffered_devices: DEFAULT_MAX_DEVICES,
            max_buffered_commands: DEFAULT_MAX_COMMANDS,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            model_overrides: BTreeMap::new(),
        }
    }

    /// Sets the controller port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enables TLS with the given PEM CA file.
    #[must_use]
    pub fn with_ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(path.into());
        self
    }

    /// Classifies switch models as lights.
    #[must_use]
    pub fn with_switches_as_lights(mut self, enabled: bool) -> Self {
        self.switches_as_lights = enabled;
        self
    }

    /// Sets the command flush period.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the admission limits of the command buffer.
    #[must_use]
    pub fn with_buffer_limits(mut self, max_devices: usize, max_commands: usize) -> Self {
        self.max_buffered_devices = max_devices;
        self.max_buffered_commands = max_commands;
        self
    }

    /// Sets the MQTT keep-alive interval.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets how long `connect` waits for the controller to answer.
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the pause after a transport error before polling again.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Replaces the model list of a device class.
    #[must_use]
    pub fn with_models<I, S>(mut self, class: DeviceClass, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model_overrides
            .insert(class, models.into_iter().map(Into::into).collect());
        self
    }

    /// Controller host.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Controller port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// MQTT username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// Profile id scoping every topic.
    #[must_use]
    pub fn profile_id(&self) -> &str {
        &self.username
    }

    /// PEM CA file, when TLS is enabled.
    #[must_use]
    pub fn ca_path(&self) -> Option<&std::path::Path> {
        self.ca_path.as_deref()
    }

    /// Command flush period.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Distinct-device admission limit.
    #[must_use]
    pub fn max_buffered_devices(&self) -> usize {
        self.max_buffered_devices
    }

    /// Total-command admission limit.
    #[must_use]
    pub fn max_buffered_commands(&self) -> usize {
        self.max_buffered_commands
    }

    /// MQTT keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// How long `connect` waits for the controller to answer.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Pause after a transport error.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Builds the classification table: defaults, then overrides, then the
    /// switch remap.
    #[must_use]
    pub fn classification_table(&self) -> ClassificationTable {
        self.model_overrides
            .iter()
            .fold(ClassificationTable::builder(), |builder, (class, models)| {
                builder.models(*class, models.iter().cloned())
            })
            .switches_as_lights(self.switches_as_lights)
            .build()
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an empty address or username, zero buffer
    /// limits, a zero flush interval, or a sub-second keep-alive.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(Error::Config("username must not be empty".to_string()));
        }
        if self.max_buffered_devices == 0 || self.max_buffered_commands == 0 {
            return Err(Error::Config("buffer limits must be positive".to_string()));
        }
        if self.flush_interval.is_zero() {
            return Err(Error::Config("flush interval must be positive".to_string()));
        }
        if !self.keep_alive.is_zero() && self.keep_alive < Duration::from_secs(1) {
            return Err(Error::Config(
                "keep-alive must be zero or at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ca_path", &self.ca_path)
            .field("switches_as_lights", &self.switches_as_lights)
            .field("flush_interval", &self.flush_interval)
            .field("max_buffered_devices", &self.max_buffered_devices)
            .field("max_buffered_commands", &self.max_buffered_commands)
            .field("keep_alive", &self.keep_alive)
            .field("connection_timeout", &self.connection_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("model_overrides", &self.model_overrides)
            .finish()
    }
}
