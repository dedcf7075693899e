// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device adapters, the device registry and the classifier.
//!
//! A [`Device`] is created once per identifier, the first time its model is
//! classified, and is then updated in place for the rest of the session.
//! Handles are cheap to clone and every clone observes the same state, so a
//! handle kept by an application stays valid across device-list
//! re-announcements.

mod classifier;
mod registry;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use crate::batcher::CommandSink;
use crate::error::{ParseError, Result};
use crate::response::DeviceDescriptor;
use crate::subscription::{CallbackRegistry, SubscriptionId};
use crate::types::{DeviceClass, DeviceType, Percentage};

pub use classifier::{ClassificationTable, ClassificationTableBuilder, Classifier, DevicesCallback};
pub use registry::{DeviceRegistry, RegistryEntry, StateListener};

/// Last-known attributes of a device.
#[derive(Debug, Clone)]
struct Attributes {
    device_type: DeviceType,
    model: String,
    name: String,
    online: bool,
    properties: BTreeMap<String, Value>,
    last_updated: DateTime<Utc>,
}

impl Attributes {
    fn from_descriptor(descriptor: &DeviceDescriptor) -> Self {
        Self {
            device_type: descriptor.device_type.clone(),
            model: descriptor.model.clone().unwrap_or_default(),
            name: descriptor.name.clone().unwrap_or_default(),
            online: descriptor.online.unwrap_or(true),
            properties: descriptor.properties.clone(),
            last_updated: Utc::now(),
        }
    }

    fn merge(&mut self, descriptor: &DeviceDescriptor) {
        if descriptor.device_type != DeviceType::Unknown {
            self.device_type = descriptor.device_type.clone();
        }
        if let Some(model) = &descriptor.model {
            self.model.clone_from(model);
        }
        if let Some(name) = &descriptor.name {
            self.name.clone_from(name);
        }
        if let Some(online) = descriptor.online {
            self.online = online;
        }
        self.properties.extend(
            descriptor
                .properties
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        self.last_updated = Utc::now();
    }
}

struct DeviceInner {
    uuid: String,
    class: DeviceClass,
    attributes: RwLock<Attributes>,
    callbacks: CallbackRegistry<Device>,
    sink: CommandSink,
}

/// Handle to one classified device.
///
/// # Examples
///
/// ```no_run
/// use nhc2_gateway::types::Percentage;
///
/// # async fn example(light: nhc2_gateway::Device) -> nhc2_gateway::Result<()> {
/// light.on_change(|light| {
///     println!("{} brightness {:?}", light.name(), light.brightness());
/// });
///
/// light.turn_on().await?;
/// light.set_brightness(Percentage::new(40)?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    pub(crate) fn new(
        uuid: impl Into<String>,
        class: DeviceClass,
        descriptor: &DeviceDescriptor,
        sink: CommandSink,
    ) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                uuid: uuid.into(),
                class,
                attributes: RwLock::new(Attributes::from_descriptor(descriptor)),
                callbacks: CallbackRegistry::new(),
                sink,
            }),
        }
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Stable identifier of the device.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.inner.uuid
    }

    /// Class the device was classified into.
    #[must_use]
    pub fn class(&self) -> DeviceClass {
        self.inner.class
    }

    /// Type tag last reported by the controller.
    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        self.inner.attributes.read().device_type.clone()
    }

    /// Model tag last reported by the controller.
    #[must_use]
    pub fn model(&self) -> String {
        self.inner.attributes.read().model.clone()
    }

    /// Display name configured on the controller.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.attributes.read().name.clone()
    }

    /// Whether the controller considers the device reachable.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.attributes.read().online
    }

    /// Last-known value of one property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<Value> {
        self.inner.attributes.read().properties.get(key).cloned()
    }

    /// Snapshot of all last-known properties.
    #[must_use]
    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.inner.attributes.read().properties.clone()
    }

    /// When the attributes were last refreshed.
    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.inner.attributes.read().last_updated
    }

    /// `true` when the `Status` property reads `On`.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.property("Status")
            .as_ref()
            .and_then(Value::as_str)
            .is_some_and(|status| status.eq_ignore_ascii_case("on"))
    }

    /// The `Brightness` property as a percentage.
    #[must_use]
    pub fn brightness(&self) -> Option<Percentage> {
        self.percentage_property("Brightness")
    }

    /// The `Position` property as a percentage.
    #[must_use]
    pub fn position(&self) -> Option<Percentage> {
        self.percentage_property("Position")
    }

    fn percentage_property(&self, key: &str) -> Option<Percentage> {
        let value = self.property(key)?;
        let number = match &value {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        u8::try_from(number).ok().map(Percentage::clamped)
    }

    /// Returns `true` if both handles refer to the same adapter.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Merges a descriptor into the attributes and notifies `on_change`
    /// callbacks.
    ///
    /// Properties are merged key by key; name, model, type and online state
    /// are replaced only when the descriptor carries them.
    pub fn update_from_descriptor(&self, descriptor: &DeviceDescriptor) {
        self.inner.attributes.write().merge(descriptor);
        self.inner.callbacks.dispatch(self);
    }

    /// Registers a callback invoked after every applied update.
    pub fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Device) + Send + Sync + 'static,
    {
        self.inner.callbacks.subscribe(callback)
    }

    /// Removes an `on_change` callback.
    ///
    /// Returns `true` if the callback was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.callbacks.unsubscribe(id)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Queues a property write for the next batched flush.
    ///
    /// Waits while the command buffer is full.
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` if the session closed before the write was
    /// accepted.
    pub async fn set_property(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.inner
            .sink
            .queue(&self.inner.uuid, key, value.into())
            .await
    }

    /// Sets `Status` to `On`.
    ///
    /// # Errors
    ///
    /// See [`set_property`](Self::set_property).
    pub async fn turn_on(&self) -> Result<()> {
        self.set_property("Status", "On").await
    }

    /// Sets `Status` to `Off`.
    ///
    /// # Errors
    ///
    /// See [`set_property`](Self::set_property).
    pub async fn turn_off(&self) -> Result<()> {
        self.set_property("Status", "Off").await
    }

    /// Sets `Brightness`.
    ///
    /// # Errors
    ///
    /// See [`set_property`](Self::set_property).
    pub async fn set_brightness(&self, brightness: Percentage) -> Result<()> {
        self.set_property("Brightness", brightness.value().to_string())
            .await
    }

    /// Sets `Position`.
    ///
    /// # Errors
    ///
    /// See [`set_property`](Self::set_property).
    pub async fn set_position(&self, position: Percentage) -> Result<()> {
        self.set_property("Position", position.value().to_string())
            .await
    }

    /// Triggers the device right away, bypassing the batch.
    ///
    /// Used by buttons and virtual devices whose action must not be merged
    /// with a later write.
    ///
    /// # Errors
    ///
    /// Returns `Error::Closed` after the session closed, or a protocol error
    /// if the bus rejects the request.
    pub async fn trigger(&self) -> Result<()> {
        self.inner
            .sink
            .send_now(&self.inner.uuid, "BasicState", Value::from("Triggered"))
            .await
    }
}

impl StateListener for Device {
    fn on_state_change(&self, descriptor: &DeviceDescriptor) -> Result<()> {
        if let Some(uuid) = descriptor.uuid()
            && uuid != self.inner.uuid
        {
            return Err(ParseError::UnexpectedFormat(format!(
                "descriptor for {uuid} delivered to {}",
                self.inner.uuid
            ))
            .into());
        }
        self.update_from_descriptor(descriptor);
        Ok(())
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attributes = self.inner.attributes.read();
        f.debug_struct("Device")
            .field("uuid", &self.inner.uuid)
            .field("class", &self.inner.class)
            .field("model", &attributes.model)
            .field("name", &attributes.name)
            .field("online", &attributes.online)
            .finish_non_exhaustive()
    }
}
