// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Write-coalescing buffer for outbound device property writes.
//!
//! Producers call [`CommandBatcher::enqueue`]; a single background flusher
//! drains the buffer on a fixed period and publishes everything it found as
//! one `devices.control` message.
//!
//! # Admission control
//!
//! Two limits bound the buffer between flushes: the number of distinct
//! devices and the total number of writes. A producer that finds either limit
//! reached parks until the next flush empties the buffer. Parking is not an
//! error and has no timeout; it only ends early if the batcher is closed.
//!
//! ```text
//! enqueue(d1, Brightness, 10) ┐
//! enqueue(d1, Brightness, 20) ├─► buffer {d1: {Brightness: 20}}
//! enqueue(d2, Status, On)     ┘        │
//!                                      ▼ every flush interval
//!                     {profile}/cmd ◄─ devices.control [d1, d2]
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;

use crate::command::{ControlBatch, Request};
use crate::error::{Error, Result};
use crate::protocol::MessageBus;

/// Default period between two flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Default limit on distinct devices buffered between two flushes.
pub const DEFAULT_MAX_DEVICES: usize = 16;

/// Default limit on writes buffered between two flushes.
pub const DEFAULT_MAX_COMMANDS: usize = 32;

#[derive(Debug, Default)]
struct Buffer {
    batch: ControlBatch,
    commands: usize,
}

/// Concurrency-safe accumulator of pending property writes.
#[derive(Debug)]
pub struct CommandBatcher {
    buffer: Mutex<Buffer>,
    flushed: Notify,
    closed: AtomicBool,
    max_devices: usize,
    max_commands: usize,
}

impl CommandBatcher {
    /// Creates a batcher with the given admission limits.
    #[must_use]
    pub fn new(max_devices: usize, max_commands: usize) -> Self {
        Self {
            buffer: Mutex::new(Buffer::default()),
            flushed: Notify::new(),
            closed: AtomicBool::new(false),
            max_devices,
            max_commands,
        }
    }

    /// Adds a property write to the current batch.
    ///
    /// Waits while the buffer holds `max_devices` devices or `max_commands`
    /// writes, and retries after each flush.
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` if the batcher was closed before the write
    /// could be admitted.
    pub async fn enqueue(&self, uuid: &str, key: &str, value: Value) -> Result<()> {
        loop {
            let flushed = self.flushed.notified();
            tokio::pin!(flushed);
            flushed.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }

            {
                let mut buffer = self.buffer.lock();
                if buffer.batch.device_count() < self.max_devices
                    && buffer.commands < self.max_commands
                {
                    buffer.commands += 1;
                    buffer.batch.set(uuid, key, value);
                    return Ok(());
                }
            }

            tracing::trace!(device = %uuid, "Command buffer full, waiting for flush");
            flushed.await;
        }
    }

    /// Swaps the buffer for an empty one and wakes parked producers.
    ///
    /// Returns `None` if nothing was pending.
    pub fn take(&self) -> Option<ControlBatch> {
        let batch = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer).batch
        };
        self.flushed.notify_waiters();
        (!batch.is_empty()).then_some(batch)
    }

    /// Drains the buffer and publishes it on `topic` if it was not empty.
    ///
    /// Waits for room in the bus request queue. Publish failures are logged
    /// and the batch is dropped.
    ///
    /// Returns `true` if a message was handed to the bus.
    pub async fn flush(&self, bus: &dyn MessageBus, topic: &str) -> bool {
        let Some(batch) = self.take() else {
            return false;
        };

        let devices = batch.device_count();
        match bus
            .publish_queued(topic, Request::Control(batch).to_payload())
            .await
        {
            Ok(()) => {
                tracing::debug!(topic = %topic, devices, "Flushed device commands");
                true
            }
            Err(e) => {
                tracing::warn!(topic = %topic, devices, error = %e, "Failed to publish device commands");
                false
            }
        }
    }

    /// Closes the batcher: pending writes are dropped and parked producers
    /// return `Error::Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let dropped = std::mem::take(&mut *self.buffer.lock()).commands;
        if dropped > 0 {
            tracing::debug!(dropped, "Dropped unflushed device commands");
        }
        self.flushed.notify_waiters();
    }

    /// Returns `true` once [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of writes buffered since the last flush.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.buffer.lock().commands
    }

    /// Number of distinct devices buffered since the last flush.
    #[must_use]
    pub fn pending_devices(&self) -> usize {
        self.buffer.lock().batch.device_count()
    }
}

/// Runs the periodic flusher until `shutdown` turns `true` or its sender is
/// dropped.
///
/// Shutdown also interrupts a flush still waiting for the bus; that batch is
/// lost.
pub(crate) async fn run_flusher(
    batcher: Arc<CommandBatcher>,
    bus: Arc<dyn MessageBus>,
    topic: String,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(topic = %topic, period_ms = period.as_millis(), "Command flusher started");
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = async {
                ticker.tick().await;
                batcher.flush(bus.as_ref(), &topic).await
            } => {}
        }
    }
    tracing::debug!(topic = %topic, "Command flusher stopped");
}

/// Write capability handed to device adapters.
///
/// Cloning is cheap; every clone feeds the same batcher.
#[derive(Clone)]
pub struct CommandSink {
    batcher: Arc<CommandBatcher>,
    bus: Arc<dyn MessageBus>,
    topic: Arc<str>,
}

impl CommandSink {
    pub(crate) fn new(batcher: Arc<CommandBatcher>, bus: Arc<dyn MessageBus>, topic: &str) -> Self {
        Self {
            batcher,
            bus,
            topic: Arc::from(topic),
        }
    }

    /// Queues a write for the next flush.
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` if the session closed while waiting.
    pub async fn queue(&self, uuid: &str, key: &str, value: Value) -> Result<()> {
        self.batcher.enqueue(uuid, key, value).await
    }

    /// Publishes a single write immediately, bypassing the batch.
    ///
    /// Waits for room in the bus request queue.
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` after the session closed, or a protocol error
    /// if the bus rejects the request.
    pub async fn send_now(&self, uuid: &str, key: &str, value: Value) -> Result<()> {
        if self.batcher.is_closed() {
            return Err(Error::Closed);
        }
        let mut batch = ControlBatch::new();
        batch.set(uuid, key, value);
        self.bus
            .publish_queued(&self.topic, Request::Control(batch).to_payload())
            .await
            .map_err(Error::from)
    }
}

impl std::fmt::Debug for CommandSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSink")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
