// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus plumbing between the gateway and the controller.
//!
//! - [`Topics`]: the topic layout of one profile
//! - [`MessageBus`]: the publish/subscribe capability the session and the
//!   command batcher depend on
//! - `mqtt`: the rumqttc implementation and its event loop driver
//! - [`Session`]: handshake, inbound dispatch and disconnect fan-out

pub(crate) mod mqtt;
#[cfg(test)]
pub(crate) mod recording;
mod session;
mod topics;

pub use session::{RefusalCallback, Session};
pub use topics::{Topic, Topics};

use async_trait::async_trait;

use crate::error::ProtocolError;

/// Publish/subscribe operations on the controller bus.
///
/// All operations request "at least once" delivery. The synchronous ones
/// never block: they are called from inside the bus client's own delivery
/// task and fail when the client's request queue is full.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribes to a topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the request cannot be queued.
    fn subscribe(&self, topic: &str) -> Result<(), ProtocolError>;

    /// Unsubscribes from a topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the request cannot be queued.
    fn unsubscribe(&self, topic: &str) -> Result<(), ProtocolError>;

    /// Publishes a payload on a topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the request cannot be queued.
    fn publish(&self, topic: &str, payload: String) -> Result<(), ProtocolError>;

    /// Publishes a payload, waiting for room in the request queue.
    ///
    /// Must not be awaited from the bus client's delivery task, which is the
    /// one draining the queue.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the client is gone.
    async fn publish_queued(&self, topic: &str, payload: String) -> Result<(), ProtocolError>;
}
