// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Public entry point: one controller session.
//!
//! A [`Gateway`] owns the MQTT client, the session state and the two
//! background tasks (event loop driver and command flusher). It connects
//! once; after [`Gateway::disconnect`] a new gateway must be built.

mod config;

use std::sync::Arc;

use rumqttc::{AsyncClient, EventLoop};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;

use crate::batcher::{CommandBatcher, CommandSink, run_flusher};
use crate::device::{Classifier, Device, DeviceRegistry};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::mqtt::{self, REQUEST_CAPACITY};
use crate::protocol::{MessageBus, RefusalCallback, Session, Topics};
use crate::state::{SystemInfo, SystemInfoStore};
use crate::types::DeviceClass;

pub use config::{DEFAULT_PORT, GatewayConfig};

enum State {
    Idle(EventLoop),
    Running {
        driver: JoinHandle<()>,
        flusher: JoinHandle<()>,
        shutdown: watch::Sender<bool>,
    },
    Closed,
}

/// Session manager for one Niko Home Control II controller.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use nhc2_gateway::{Gateway, GatewayConfig};
/// use nhc2_gateway::types::{DeviceClass, RefusalReason};
///
/// # async fn example() -> nhc2_gateway::Result<()> {
/// let config = GatewayConfig::new("192.168.1.20", "hobby", "secret-token")
///     .with_ca_path("/etc/nhc2/ca.pem");
/// let gateway = Gateway::new(config)?;
///
/// gateway.devices(DeviceClass::Light, |lights| {
///     for light in lights {
///         println!("{} ({})", light.name(), light.uuid());
///     }
/// });
///
/// gateway
///     .connect(Some(Arc::new(|reason: RefusalReason| eprintln!("refused: {reason}"))))
///     .await?;
///
/// if let Some(light) = gateway.devices_of(DeviceClass::Light).first() {
///     light.turn_on().await?;
/// }
///
/// gateway.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Gateway {
    config: GatewayConfig,
    client: AsyncClient,
    bus: Arc<dyn MessageBus>,
    session: Arc<Session>,
    registry: Arc<DeviceRegistry>,
    classifier: Arc<Classifier>,
    system_info: Arc<SystemInfoStore>,
    batcher: Arc<CommandBatcher>,
    state: Mutex<State>,
}

impl Gateway {
    /// Builds a gateway. Nothing is sent until [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid configuration and
    /// `Error::Protocol` if the CA file cannot be read.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let options = mqtt::build_options(&config)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let bus: Arc<dyn MessageBus> = Arc::new(client.clone());
        let topics = Topics::new(config.profile_id());
        let batcher = Arc::new(CommandBatcher::new(
            config.max_buffered_devices(),
            config.max_buffered_commands(),
        ));
        let sink = CommandSink::new(Arc::clone(&batcher), Arc::clone(&bus), topics.command());
        let registry = Arc::new(DeviceRegistry::new());
        let classifier = Arc::new(Classifier::new(
            config.classification_table(),
            Arc::clone(&registry),
            sink,
        ));
        let system_info = Arc::new(SystemInfoStore::new());
        let session = Arc::new(Session::new(
            Arc::clone(&bus),
            topics,
            Arc::clone(&registry),
            Arc::clone(&classifier),
            Arc::clone(&system_info),
        ));

        Ok(Self {
            config,
            client,
            bus,
            session,
            registry,
            classifier,
            system_info,
            batcher,
            state: Mutex::new(State::Idle(event_loop)),
        })
    }

    /// Connects to the controller and starts the session.
    ///
    /// Waits for the controller's answer to the connection request. When it
    /// refuses and `on_refused` is given, the callback receives the reason
    /// and this returns `Ok(())` without a session.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyConnected` on a second call
    /// - `Error::Connect` for a refusal without callback or an unknown code
    /// - `Error::Protocol(ProtocolError::Timeout)` if the controller does not
    ///   answer within the connection timeout
    pub async fn connect(&self, on_refused: Option<RefusalCallback>) -> Result<()> {
        let mut state = self.state.lock().await;
        let event_loop = match std::mem::replace(&mut *state, State::Closed) {
            State::Idle(event_loop) => event_loop,
            other => {
                *state = other;
                return Err(Error::AlreadyConnected);
            }
        };

        tracing::info!(
            address = %self.config.address(),
            port = self.config.port(),
            profile = %self.config.profile_id(),
            "Connecting to controller"
        );

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let driver = tokio::spawn(mqtt::drive(
            event_loop,
            Arc::clone(&self.session),
            on_refused,
            outcome_tx,
            self.config.reconnect_delay(),
        ));

        let timeout = self.config.connection_timeout();
        let outcome = match tokio::time::timeout(timeout, outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(
                "event loop stopped before the controller answered".to_string(),
            )
            .into()),
            Err(_) => {
                driver.abort();
                // Safe: timeout in practical use will never exceed u64::MAX milliseconds
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = timeout.as_millis() as u64;
                Err(ProtocolError::Timeout(timeout_ms).into())
            }
        };

        match outcome {
            Ok(None) => {
                let (shutdown, shutdown_rx) = watch::channel(false);
                let flusher = tokio::spawn(run_flusher(
                    Arc::clone(&self.batcher),
                    Arc::clone(&self.bus),
                    self.session.topics().command().to_string(),
                    self.config.flush_interval(),
                    shutdown_rx,
                ));
                *state = State::Running {
                    driver,
                    flusher,
                    shutdown,
                };
                Ok(())
            }
            Ok(Some(reason)) => {
                tracing::info!(reason = %reason, "Connection refused, session not started");
                self.batcher.close();
                Ok(())
            }
            Err(e) => {
                self.batcher.close();
                Err(e)
            }
        }
    }

    /// Ends the session.
    ///
    /// Stops the flusher and drops buffered writes, sends an MQTT DISCONNECT
    /// and notifies every device listener that it is offline. Calling it
    /// again after the session ended does nothing.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` if [`connect`](Self::connect) was never
    /// called.
    pub async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let (driver, flusher, shutdown) = match std::mem::replace(&mut *state, State::Closed) {
            State::Running {
                driver,
                flusher,
                shutdown,
            } => (driver, flusher, shutdown),
            State::Idle(event_loop) => {
                *state = State::Idle(event_loop);
                return Err(Error::NotConnected);
            }
            State::Closed => return Ok(()),
        };

        self.batcher.close();
        // The flusher also stops if the sender is dropped
        let _ = shutdown.send(true);
        if let Err(e) = flusher.await {
            tracing::warn!(error = %e, "Command flusher ended abnormally");
        }

        let timeout = self.config.connection_timeout();
        match tokio::time::timeout(timeout, self.client.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to queue MQTT disconnect"),
            Err(_) => tracing::warn!("MQTT request queue stayed full, dropping the connection"),
        }
        let abort = driver.abort_handle();
        if tokio::time::timeout(timeout, driver).await.is_err() {
            tracing::warn!("MQTT event loop did not stop in time");
            abort.abort();
        }

        self.session.on_disconnected();
        tracing::info!(profile = %self.config.profile_id(), "Disconnected from controller");
        Ok(())
    }

    /// Registers the system info callback.
    ///
    /// It runs right away if the controller already answered, and after
    /// every later answer. A new registration replaces the previous one.
    pub fn system_info<F>(&self, callback: F)
    where
        F: Fn(&SystemInfo) + Send + Sync + 'static,
    {
        self.system_info.subscribe(Arc::new(callback));
    }

    /// Registers the device list callback of a class.
    ///
    /// It runs right away if the class already has devices, and after every
    /// device list that leaves the class non-empty. A new registration for
    /// the same class replaces the previous one.
    pub fn devices<F>(&self, class: DeviceClass, callback: F)
    where
        F: Fn(&[Device]) + Send + Sync + 'static,
    {
        self.classifier.subscribe(class, Arc::new(callback));
    }

    /// Looks up a classified device.
    #[must_use]
    pub fn device(&self, uuid: &str) -> Option<Device> {
        self.registry.device(uuid)
    }

    /// Current devices of a class.
    #[must_use]
    pub fn devices_of(&self, class: DeviceClass) -> Vec<Device> {
        self.classifier.devices_of(class)
    }

    /// Last system info received, if any.
    #[must_use]
    pub fn current_system_info(&self) -> Option<SystemInfo> {
        self.system_info.current()
    }

    /// Returns `true` while the controller connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Profile id scoping every topic.
    #[must_use]
    pub fn profile_id(&self) -> &str {
        self.config.profile_id()
    }

    /// The configuration this gateway was built with.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.batcher.close();
        if let State::Running {
            driver, flusher, ..
        } = self.state.get_mut()
        {
            flusher.abort();
            driver.abort();
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
