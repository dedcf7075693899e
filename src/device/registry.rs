// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry of known device identifiers.
//!
//! An entry is created the first time an identifier shows up in a device
//! list and is never removed during the session. It holds the adapter, once
//! one has been constructed, and the listener that inbound status messages
//! for that identifier are delivered to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Device;
use crate::error::Result;
use crate::response::DeviceDescriptor;

/// Receives state updates for one device identifier.
///
/// The gateway delivers `devices.status` / `devices.changed` descriptors and
/// the synthetic offline marker through this interface. An `Err` or a panic
/// is logged and does not affect delivery to other devices.
pub trait StateListener: Send + Sync {
    /// Handles one descriptor addressed to this listener's device.
    ///
    /// # Errors
    ///
    /// Implementations return an error if the descriptor cannot be applied.
    fn on_state_change(&self, descriptor: &DeviceDescriptor) -> Result<()>;
}

/// One registry slot.
#[derive(Default, Clone)]
pub struct RegistryEntry {
    device: Option<Device>,
    listener: Option<Arc<dyn StateListener>>,
}

impl RegistryEntry {
    /// The adapter, once constructed.
    #[must_use]
    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    /// The listener for inbound updates.
    #[must_use]
    pub fn listener(&self) -> Option<&Arc<dyn StateListener>> {
        self.listener.as_ref()
    }

    /// Replaces the listener.
    pub fn set_listener(&mut self, listener: Arc<dyn StateListener>) {
        self.listener = Some(listener);
    }

    /// Stores a freshly constructed adapter and makes it the listener.
    pub(crate) fn attach(&mut self, device: Device) {
        self.listener = Some(Arc::new(device.clone()));
        self.device = Some(device);
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("device", &self.device)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

/// Map from device identifier to [`RegistryEntry`].
///
/// Written only from inbound dispatch, read from any thread.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty entry for `uuid` unless one exists.
    ///
    /// Returns `true` if an entry was created.
    pub fn ensure(&self, uuid: &str) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(uuid) {
            return false;
        }
        entries.insert(uuid.to_string(), RegistryEntry::default());
        true
    }

    /// Runs `f` on the entry for `uuid`, creating it if needed.
    pub fn with_entry<R>(&self, uuid: &str, f: impl FnOnce(&mut RegistryEntry) -> R) -> R {
        let mut entries = self.entries.write();
        f(entries.entry(uuid.to_string()).or_default())
    }

    /// Sets the listener of an existing entry.
    ///
    /// Returns `false` if `uuid` is unknown.
    pub fn set_listener(&self, uuid: &str, listener: Arc<dyn StateListener>) -> bool {
        match self.entries.write().get_mut(uuid) {
            Some(entry) => {
                entry.set_listener(listener);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if an entry exists for `uuid`.
    #[must_use]
    pub fn contains(&self, uuid: &str) -> bool {
        self.entries.read().contains_key(uuid)
    }

    /// Returns the adapter for `uuid`, if constructed.
    #[must_use]
    pub fn device(&self, uuid: &str) -> Option<Device> {
        self.entries.read().get(uuid)?.device.clone()
    }

    /// Returns the listener for `uuid`, if any.
    #[must_use]
    pub fn listener(&self, uuid: &str) -> Option<Arc<dyn StateListener>> {
        self.entries.read().get(uuid)?.listener.clone()
    }

    /// Snapshot of every identifier with its listener.
    #[must_use]
    pub fn listeners(&self) -> Vec<(String, Option<Arc<dyn StateListener>>)> {
        self.entries
            .read()
            .iter()
            .map(|(uuid, entry)| (uuid.clone(), entry.listener.clone()))
            .collect()
    }

    /// Number of known identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if no identifier is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::test_sink;
    use crate::types::DeviceClass;

    struct Noop;

    impl StateListener for Noop {
        fn on_state_change(&self, _descriptor: &DeviceDescriptor) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn ensure_is_idempotent() {
        let registry = DeviceRegistry::new();
        assert!(registry.ensure("d1"));
        assert!(!registry.ensure("d1"));
        assert_eq!(registry.len(), 1);
        assert!(registry.listener("d1").is_none());
        assert!(registry.device("d1").is_none());
    }

    #[test]
    fn attach_sets_device_and_listener() {
        let registry = DeviceRegistry::new();
        let (sink, _, _) = test_sink();
        let device = Device::new("d1", DeviceClass::Switch, &DeviceDescriptor::default(), sink);

        registry.with_entry("d1", |entry| entry.attach(device.clone()));

        assert!(registry.device("d1").unwrap().ptr_eq(&device));
        assert!(registry.listener("d1").is_some());
    }

    #[test]
    fn set_listener_requires_entry() {
        let registry = DeviceRegistry::new();
        assert!(!registry.set_listener("d1", Arc::new(Noop)));
        registry.ensure("d1");
        assert!(registry.set_listener("d1", Arc::new(Noop)));
        assert!(registry.listener("d1").is_some());
    }

    #[test]
    fn listeners_snapshot_includes_empty_entries() {
        let registry = DeviceRegistry::new();
        registry.ensure("a");
        registry.ensure("b");
        registry.set_listener("b", Arc::new(Noop));

        let mut snapshot: Vec<_> = registry
            .listeners()
            .into_iter()
            .map(|(uuid, listener)| (uuid, listener.is_some()))
            .collect();
        snapshot.sort();
        assert_eq!(
            snapshot,
            vec![("a".to_string(), false), ("b".to_string(), true)]
        );
    }
}
