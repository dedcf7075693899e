// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! rumqttc transport for the controller session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, TlsConfiguration, Transport,
};
use tokio::sync::oneshot;

use super::{MessageBus, RefusalCallback, Session};
use crate::error::{Error, ProtocolError};
use crate::gateway::GatewayConfig;
use crate::types::RefusalReason;

/// Capacity of the client request queue.
pub(crate) const REQUEST_CAPACITY: usize = 64;

/// First connection outcome reported by [`drive`].
///
/// `Ok(None)` means connected, `Ok(Some(reason))` means refused and handed to
/// the refusal callback.
pub(crate) type ConnectOutcome = crate::error::Result<Option<RefusalReason>>;

#[async_trait]
impl MessageBus for AsyncClient {
    fn subscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(ProtocolError::Mqtt)
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.try_unsubscribe(topic).map_err(ProtocolError::Mqtt)
    }

    fn publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError> {
        tracing::debug!(topic = %topic, payload = %payload, "Publishing MQTT message");
        self.try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(ProtocolError::Mqtt)
    }

    async fn publish_queued(&self, topic: &str, payload: String) -> Result<(), ProtocolError> {
        tracing::debug!(topic = %topic, payload = %payload, "Publishing MQTT message");
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(ProtocolError::Mqtt)
    }
}

/// Builds the client options for a gateway.
///
/// Every session gets a fresh random client id and a clean session. When a
/// CA file is configured the connection uses TLS with that CA as the only
/// trust anchor.
///
/// # Errors
///
/// Returns `ProtocolError::Tls` if the CA file cannot be read.
pub(crate) fn build_options(config: &GatewayConfig) -> Result<MqttOptions, ProtocolError> {
    let client_id = format!("nhc2_{}", uuid::Uuid::new_v4().simple());

    let mut options = MqttOptions::new(client_id, config.address(), config.port());
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);
    options.set_credentials(config.username(), config.password());

    if let Some(path) = config.ca_path() {
        let ca = std::fs::read(path)
            .map_err(|e| ProtocolError::Tls(format!("{}: {e}", path.display())))?;
        options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));
    }

    Ok(options)
}

/// Maps a CONNACK return code to its numeric value.
pub(crate) fn return_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

/// Drives the event loop until the session ends.
///
/// The first CONNACK outcome is sent on `first_outcome`; a refusal or an
/// unexpected return code at that point stops the loop. Later refusals are
/// reported and retried like any other transport error: offline
/// notifications fan out and the loop polls again after `reconnect_delay`,
/// letting rumqttc reconnect. The loop also stops once our own DISCONNECT
/// went out.
pub(crate) async fn drive(
    mut event_loop: EventLoop,
    session: Arc<Session>,
    on_refused: Option<RefusalCallback>,
    first_outcome: oneshot::Sender<ConnectOutcome>,
    reconnect_delay: Duration,
) {
    let mut first_outcome = Some(first_outcome);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                let code = return_code(connack.code);
                if !connack_outcome(&session, code, on_refused.as_ref(), &mut first_outcome) {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                session.handle_message(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::trace!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("Controller closed the connection");
                session.on_disconnected();
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                if !connack_outcome(
                    &session,
                    return_code(code),
                    on_refused.as_ref(),
                    &mut first_outcome,
                ) {
                    break;
                }
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "MQTT event loop error");
                session.on_disconnected();
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        }

        // Every event frees a slot in the request queue
        session.retry_pending();
    }

    tracing::debug!(profile = %session.topics().profile_id(), "MQTT event loop stopped");
}

/// Applies a CONNACK code. Returns `false` when the loop must stop.
///
/// Only the answer to the first connection attempt can stop the loop.
fn connack_outcome(
    session: &Session,
    code: u8,
    on_refused: Option<&RefusalCallback>,
    first_outcome: &mut Option<oneshot::Sender<ConnectOutcome>>,
) -> bool {
    let outcome = session.on_connack(code, on_refused);
    if let Some(tx) = first_outcome.take() {
        let keep_running = matches!(outcome, Ok(None));
        // The receiver is gone once connect() timed out
        let _ = tx.send(outcome.map_err(Error::from));
        return keep_running;
    }
    if let Err(e) = outcome {
        tracing::warn!(code, error = %e, "Reconnect rejected, retrying");
    }
    true
}
