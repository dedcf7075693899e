// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory bus that records every request, for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::MessageBus;
use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BusCall {
    Subscribe(String),
    Unsubscribe(String),
    Publish { topic: String, payload: String },
}

#[derive(Debug, Default)]
pub(crate) struct RecordingBus {
    calls: Mutex<Vec<BusCall>>,
    fail_publish: AtomicBool,
    queue_full: AtomicBool,
    stall_queued: AtomicBool,
}

impl RecordingBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<BusCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Makes the non-blocking requests fail as if the request queue were full.
    pub(crate) fn fill_queue(&self, full: bool) {
        self.queue_full.store(full, Ordering::SeqCst);
    }

    /// Makes `publish_queued` wait forever.
    pub(crate) fn stall_queued_publishes(&self, stall: bool) {
        self.stall_queued.store(stall, Ordering::SeqCst);
    }

    /// Payloads published on `topic`, parsed as JSON.
    pub(crate) fn published_on(&self, topic: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BusCall::Publish { topic: t, payload } if t == topic => {
                    serde_json::from_str(payload).ok()
                }
                _ => None,
            })
            .collect()
    }

    fn check_queue(&self) -> Result<(), ProtocolError> {
        if self.queue_full.load(Ordering::SeqCst) {
            return Err(ProtocolError::ConnectionFailed("request queue full".to_string()));
        }
        Ok(())
    }

    fn record_publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ProtocolError::ConnectionFailed("bus offline".to_string()));
        }
        self.calls.lock().push(BusCall::Publish {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    fn subscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.check_queue()?;
        self.calls.lock().push(BusCall::Subscribe(topic.to_string()));
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), ProtocolError> {
        self.check_queue()?;
        self.calls
            .lock()
            .push(BusCall::Unsubscribe(topic.to_string()));
        Ok(())
    }

    fn publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError> {
        self.check_queue()?;
        self.record_publish(topic, payload)
    }

    async fn publish_queued(&self, topic: &str, payload: String) -> Result<(), ProtocolError> {
        if self.stall_queued.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.record_publish(topic, payload)
    }
}
