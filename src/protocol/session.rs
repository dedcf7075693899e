// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session handshake, inbound dispatch and disconnect fan-out.
//!
//! The session does not own a connection. The bus driver calls
//! [`Session::on_connack`] for every CONNACK, [`Session::handle_message`] for
//! every inbound publish and [`Session::on_disconnected`] when the connection
//! is lost. All three run on the driver task.
//!
//! Requests the bus rejects (its queue is full right after a reconnect, for
//! instance) are kept in order and retried by [`Session::retry_pending`].

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{MessageBus, Topic, Topics};
use crate::command::Request;
use crate::device::{Classifier, DeviceRegistry, StateListener};
use crate::error::{ConnectError, ProtocolError};
use crate::response::{DeviceDescriptor, Envelope, Method};
use crate::state::SystemInfoStore;
use crate::types::RefusalReason;

/// Callback invoked when the controller refuses the connection.
pub type RefusalCallback = Arc<dyn Fn(RefusalReason) + Send + Sync>;

#[derive(Debug)]
enum Outbound {
    Subscribe(String),
    Unsubscribe(String),
    Publish { topic: String, payload: String },
}

impl Outbound {
    fn topic(&self) -> &str {
        match self {
            Self::Subscribe(topic) | Self::Unsubscribe(topic) | Self::Publish { topic, .. } => {
                topic
            }
        }
    }
}

/// Protocol state shared between the bus driver and the facade.
pub struct Session {
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    registry: Arc<DeviceRegistry>,
    classifier: Arc<Classifier>,
    system_info: Arc<SystemInfoStore>,
    connected: AtomicBool,
    pending: Mutex<VecDeque<Outbound>>,
}

impl Session {
    /// Creates a session over `bus`.
    #[must_use]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        topics: Topics,
        registry: Arc<DeviceRegistry>,
        classifier: Arc<Classifier>,
        system_info: Arc<SystemInfoStore>,
    ) -> Self {
        Self {
            bus,
            topics,
            registry,
            classifier,
            system_info,
            connected: AtomicBool::new(false),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// The topic layout of this session.
    #[must_use]
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Returns `true` between a successful CONNACK and the next disconnect.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Handles a CONNACK return code.
    ///
    /// On success, subscribes to the four session topics and requests the
    /// system info and the device list. A refusal is handed to `on_refused`
    /// when one is given and reported as `Ok(Some(reason))`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectError::Refused` for a refusal without a callback, and
    /// `ConnectError::UnexpectedCode` for a code outside 0 to 5.
    pub fn on_connack(
        &self,
        code: u8,
        on_refused: Option<&RefusalCallback>,
    ) -> Result<Option<RefusalReason>, ConnectError> {
        if code == 0 {
            tracing::info!(profile = %self.topics.profile_id(), "Connected to controller");
            self.connected.store(true, Ordering::Release);
            let stale = std::mem::take(&mut *self.pending.lock()).len();
            if stale > 0 {
                tracing::debug!(stale, "Dropped requests from the previous connection");
            }
            self.start_handshake();
            return Ok(None);
        }

        let Some(reason) = RefusalReason::from_code(code) else {
            tracing::warn!(code, "Unexpected connect return code");
            return Err(ConnectError::UnexpectedCode(code));
        };

        tracing::warn!(code, reason = %reason, "Controller refused connection");
        match on_refused {
            Some(callback) => {
                callback(reason);
                Ok(Some(reason))
            }
            None => Err(ConnectError::Refused(reason)),
        }
    }

    fn start_handshake(&self) {
        for topic in self.topics.subscriptions() {
            self.request(Outbound::Subscribe(topic.to_string()));
        }
        self.send(self.topics.public_command(), &Request::SysinfoPublish);
        self.send(self.topics.command(), &Request::DevicesList);
    }

    /// Retries the requests the bus rejected earlier, oldest first.
    ///
    /// Stops at the first request that still fails. Returns how many remain.
    pub fn retry_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        while let Some(outbound) = pending.front() {
            if let Err(e) = self.dispatch(outbound) {
                tracing::trace!(topic = %outbound.topic(), error = %e, "Bus request still rejected");
                break;
            }
            tracing::debug!(topic = %outbound.topic(), "Retried bus request");
            pending.pop_front();
        }
        pending.len()
    }

    /// Number of requests waiting for a retry.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Dispatches one inbound message.
    ///
    /// Messages on foreign topics, malformed payloads and unhandled methods
    /// are logged and dropped.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        let Some(kind) = self.topics.classify(topic) else {
            tracing::trace!(topic = %topic, "Ignoring message on unknown topic");
            return;
        };

        let envelope = match Envelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Dropping malformed message");
                return;
            }
        };

        let method = envelope.method().clone();
        tracing::debug!(topic = %topic, method = %method, "Dispatching message");

        match (kind, method) {
            (Topic::PublicResponse, Method::SysinfoPublish) => {
                self.system_info.update(envelope.into_body());
            }
            (Topic::Response, Method::DevicesList) => {
                self.request(Outbound::Unsubscribe(self.topics.response().to_string()));
                self.classifier.process_device_list(envelope.devices());
            }
            (Topic::SystemEvent, Method::SysinfoPublished) => {
                self.request(Outbound::Subscribe(self.topics.response().to_string()));
                self.send(self.topics.command(), &Request::DevicesList);
            }
            (Topic::Event, Method::DevicesStatus | Method::DevicesChanged) => {
                for descriptor in envelope.devices() {
                    self.deliver(&descriptor);
                }
            }
            (_, method) => {
                tracing::trace!(topic = %topic, method = %method, "Ignoring message");
            }
        }
    }

    /// Notifies every registered listener that the session is gone.
    ///
    /// Only the first call after a successful connect fans out; the rest are
    /// no-ops. Returns `true` if the fan-out ran.
    pub fn on_disconnected(&self) -> bool {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return false;
        }
        tracing::warn!(profile = %self.topics.profile_id(), "Connection to controller lost");

        for (uuid, listener) in self.registry.listeners() {
            match listener {
                Some(listener) => notify(&uuid, &*listener, &DeviceDescriptor::offline(&uuid)),
                None => tracing::info!(device = %uuid, "No listener to notify of disconnect"),
            }
        }
        true
    }

    fn deliver(&self, descriptor: &DeviceDescriptor) {
        let Some(uuid) = descriptor.uuid() else {
            tracing::debug!("Ignoring status without device identifier");
            return;
        };
        match self.registry.listener(uuid) {
            Some(listener) => notify(uuid, &*listener, descriptor),
            None => tracing::debug!(device = %uuid, "No listener for device update"),
        }
    }

    fn send(&self, topic: &str, request: &Request) {
        self.request(Outbound::Publish {
            topic: topic.to_string(),
            payload: request.to_payload(),
        });
    }

    /// Hands a request to the bus, or queues it behind earlier rejected ones.
    fn request(&self, outbound: Outbound) {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            match self.dispatch(&outbound) {
                Ok(()) => return,
                Err(e) => tracing::warn!(
                    topic = %outbound.topic(),
                    error = %e,
                    "Bus request rejected, will retry"
                ),
            }
        }
        pending.push_back(outbound);
    }

    fn dispatch(&self, outbound: &Outbound) -> Result<(), ProtocolError> {
        match outbound {
            Outbound::Subscribe(topic) => self.bus.subscribe(topic),
            Outbound::Unsubscribe(topic) => self.bus.unsubscribe(topic),
            Outbound::Publish { topic, payload } => self.bus.publish(topic, payload.clone()),
        }
    }
}

/// Delivers a descriptor, containing listener errors and panics.
fn notify(uuid: &str, listener: &dyn StateListener, descriptor: &DeviceDescriptor) {
    match catch_unwind(AssertUnwindSafe(|| listener.on_state_change(descriptor))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(device = %uuid, error = %e, "Listener failed"),
        Err(_) => tracing::warn!(device = %uuid, "Listener panicked"),
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("topics", &self.topics)
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_requests())
            .field("devices", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ClassificationTable;
    use crate::device::tests::test_sink;
    use crate::error::{ParseError, Result};
    use crate::protocol::recording::{BusCall, RecordingBus};
    use crate::types::DeviceClass;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        session: Session,
        bus: Arc<RecordingBus>,
        registry: Arc<DeviceRegistry>,
        classifier: Arc<Classifier>,
        system_info: Arc<SystemInfoStore>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(RecordingBus::new());
        let registry = Arc::new(DeviceRegistry::new());
        let (sink, _, _) = test_sink();
        let classifier = Arc::new(Classifier::new(
            ClassificationTable::default(),
            Arc::clone(&registry),
            sink,
        ));
        let system_info = Arc::new(SystemInfoStore::new());
        let session = Session::new(
            Arc::clone(&bus) as Arc<dyn MessageBus>,
            Topics::new("p1"),
            Arc::clone(&registry),
            Arc::clone(&classifier),
            Arc::clone(&system_info),
        );
        Fixture {
            session,
            bus,
            registry,
            classifier,
            system_info,
        }
    }

    fn device_list() -> Vec<u8> {
        json!({
            "Method": "devices.list",
            "Params": [{"Devices": [
                {"Uuid": "l1", "Type": "action", "Model": "light", "Name": "Hall",
                 "Properties": [{"Status": "Off"}]},
                {"Uuid": "x1", "Type": "action", "Model": "toaster"},
                {"Uuid": "g1", "Type": "gateway", "Model": "gateway"}
            ]}]
        })
        .to_string()
        .into_bytes()
    }

    struct CountingListener(AtomicUsize);

    impl StateListener for CountingListener {
        fn on_state_change(&self, descriptor: &DeviceDescriptor) -> Result<()> {
            assert!(descriptor.is_offline());
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingListener;

    impl StateListener for FailingListener {
        fn on_state_change(&self, _descriptor: &DeviceDescriptor) -> Result<()> {
            Err(ParseError::UnexpectedFormat("rejected".to_string()).into())
        }
    }

    struct PanickingListener;

    impl StateListener for PanickingListener {
        fn on_state_change(&self, _descriptor: &DeviceDescriptor) -> Result<()> {
            panic!("listener bug");
        }
    }

    #[test]
    fn successful_connack_runs_handshake() {
        let f = fixture();
        assert_eq!(f.session.on_connack(0, None).unwrap(), None);
        assert!(f.session.is_connected());
        assert_eq!(f.bus.calls(), handshake_calls());
    }

    #[test]
    fn refusal_with_callback_reports_reason() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let callback: RefusalCallback = {
            let seen = Arc::clone(&seen);
            Arc::new(move |reason: RefusalReason| seen.lock().push(reason))
        };

        let outcome = f.session.on_connack(4, Some(&callback)).unwrap();

        assert_eq!(outcome, Some(RefusalReason::BadCredentials));
        assert_eq!(*seen.lock(), vec![RefusalReason::BadCredentials]);
        assert!(f.bus.calls().is_empty());
        assert!(!f.session.is_connected());
    }

    #[test]
    fn refusal_without_callback_is_an_error() {
        let f = fixture();
        assert_eq!(
            f.session.on_connack(5, None),
            Err(ConnectError::Refused(RefusalReason::NotAuthorized))
        );
        assert!(f.bus.calls().is_empty());
    }

    #[test]
    fn unknown_code_is_an_error() {
        let f = fixture();
        let callback: RefusalCallback = Arc::new(|_: RefusalReason| panic!("not a refusal"));
        assert_eq!(
            f.session.on_connack(42, Some(&callback)),
            Err(ConnectError::UnexpectedCode(42))
        );
        assert!(f.bus.calls().is_empty());
    }

    #[test]
    fn device_list_unsubscribes_and_classifies() {
        let f = fixture();
        f.session.handle_message("p1/rsp", &device_list());

        assert_eq!(f.bus.calls(), vec![BusCall::Unsubscribe("p1/rsp".to_string())]);
        assert_eq!(f.registry.len(), 2);
        let lights = f.classifier.devices_of(DeviceClass::Light);
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].name(), "Hall");
    }

    #[test]
    fn device_list_on_wrong_topic_is_ignored() {
        let f = fixture();
        f.session.handle_message("p1/evt", &device_list());
        f.session.handle_message("p2/rsp", &device_list());
        assert!(f.registry.is_empty());
        assert!(f.bus.calls().is_empty());
    }

    #[test]
    fn sysinfo_is_stored() {
        let f = fixture();
        let payload = json!({
            "Method": "systeminfo.publish",
            "Params": [{"SystemInfo": [{"SWversion": "2.14.0"}]}]
        })
        .to_string();

        f.session.handle_message("p1/public/rsp", payload.as_bytes());

        let info = f.system_info.current().unwrap();
        assert_eq!(info.sw_version(), Some("2.14.0"));
    }

    #[test]
    fn sysinfo_published_requests_fresh_list() {
        let f = fixture();
        f.session
            .handle_message("p1/sysevt", br#"{"Method":"systeminfo.published"}"#);

        assert_eq!(
            f.bus.calls(),
            vec![
                BusCall::Subscribe("p1/rsp".to_string()),
                BusCall::Publish {
                    topic: "p1/cmd".to_string(),
                    payload: r#"{"Method":"devices.list"}"#.to_string(),
                },
            ]
        );
    }

    #[test]
    fn status_event_reaches_adapter() {
        let f = fixture();
        f.session.handle_message("p1/rsp", &device_list());
        let light = f.registry.device("l1").unwrap();

        let status = json!({
            "Method": "devices.status",
            "Params": [{"Devices": [
                {"Uuid": "l1", "Properties": [{"Status": "On"}]},
                {"Uuid": "nobody", "Properties": [{"Status": "On"}]}
            ]}]
        })
        .to_string();
        f.session.handle_message("p1/evt", status.as_bytes());

        assert!(light.is_on());
        assert!(!f.registry.contains("nobody"));
    }

    #[test]
    fn failing_listeners_do_not_stop_delivery() {
        let f = fixture();
        for uuid in ["a", "b", "c"] {
            f.registry.ensure(uuid);
        }
        let counter = Arc::new(CountingListener(AtomicUsize::new(0)));
        f.registry.set_listener("a", Arc::new(PanickingListener));
        f.registry.set_listener("b", Arc::new(FailingListener));
        f.registry.set_listener("c", Arc::clone(&counter) as Arc<dyn StateListener>);

        f.session.on_connack(0, None).unwrap();
        assert!(f.session.on_disconnected());

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn offline_fan_out_runs_once_per_connection() {
        let f = fixture();
        let counter = Arc::new(CountingListener(AtomicUsize::new(0)));
        for uuid in ["a", "b", "c"] {
            f.registry.ensure(uuid);
        }
        f.registry.ensure("bare");
        for uuid in ["a", "b", "c"] {
            f.registry
                .set_listener(uuid, Arc::clone(&counter) as Arc<dyn StateListener>);
        }

        assert!(!f.session.on_disconnected());
        f.session.on_connack(0, None).unwrap();
        assert!(f.session.on_disconnected());
        assert!(!f.session.on_disconnected());
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);

        f.session.on_connack(0, None).unwrap();
        assert!(f.session.on_disconnected());
        assert_eq!(counter.0.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn offline_marks_adapters_offline() {
        let f = fixture();
        f.session.handle_message("p1/rsp", &device_list());
        f.session.on_connack(0, None).unwrap();
        f.session.on_disconnected();
        assert!(!f.registry.device("l1").unwrap().is_online());
    }

    fn handshake_calls() -> Vec<BusCall> {
        vec![
            BusCall::Subscribe("p1/rsp".to_string()),
            BusCall::Subscribe("p1/public/rsp".to_string()),
            BusCall::Subscribe("p1/evt".to_string()),
            BusCall::Subscribe("p1/sysevt".to_string()),
            BusCall::Publish {
                topic: "p1/public/cmd".to_string(),
                payload: r#"{"Method":"systeminfo.publish"}"#.to_string(),
            },
            BusCall::Publish {
                topic: "p1/cmd".to_string(),
                payload: r#"{"Method":"devices.list"}"#.to_string(),
            },
        ]
    }

    #[test]
    fn rejected_handshake_is_retried_in_order() {
        let f = fixture();
        f.bus.fill_queue(true);

        f.session.on_connack(0, None).unwrap();
        assert!(f.bus.calls().is_empty());
        assert_eq!(f.session.pending_requests(), 6);
        assert_eq!(f.session.retry_pending(), 6);

        f.bus.fill_queue(false);
        assert_eq!(f.session.retry_pending(), 0);
        assert_eq!(f.bus.calls(), handshake_calls());
    }

    #[test]
    fn requests_wait_behind_rejected_ones() {
        let f = fixture();
        f.bus.fill_queue(true);
        f.session.on_connack(0, None).unwrap();
        f.bus.fill_queue(false);

        // Arrives before the retry; must not overtake the handshake
        f.session
            .handle_message("p1/sysevt", br#"{"Method":"systeminfo.published"}"#);
        assert!(f.bus.calls().is_empty());

        f.session.retry_pending();
        let calls = f.bus.calls();
        assert_eq!(calls.len(), 8);
        assert_eq!(calls[..6], handshake_calls()[..]);
        assert_eq!(calls[6], BusCall::Subscribe("p1/rsp".to_string()));
    }

    #[test]
    fn reconnect_drops_stale_requests() {
        let f = fixture();
        f.bus.fill_queue(true);
        f.session.on_connack(0, None).unwrap();
        f.session.on_disconnected();
        f.bus.fill_queue(false);

        f.session.on_connack(0, None).unwrap();
        assert_eq!(f.session.pending_requests(), 0);
        assert_eq!(f.bus.calls(), handshake_calls());
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        let f = fixture();
        f.session.handle_message("p1/rsp", b"not json");
        f.session.handle_message("p1/rsp", br#"{"Params":[]}"#);
        f.session.handle_message("p1/rsp", b"[1,2,3]");
        assert!(f.bus.calls().is_empty());
        assert!(f.registry.is_empty());
    }
}
