// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Classification of device descriptors into device classes.
//!
//! Processing a device list is idempotent: the first pass constructs one
//! adapter per classified identifier, later passes refresh those adapters in
//! place. Class callbacks always receive the cumulative list for the class.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Device, DeviceRegistry};
use crate::batcher::CommandSink;
use crate::response::DeviceDescriptor;
use crate::types::DeviceClass;

/// Callback receiving the current device list of one class.
pub type DevicesCallback = Arc<dyn Fn(&[Device]) + Send + Sync>;

/// Immutable mapping from model tag to device class.
///
/// A model belongs to at most one class.
///
/// # Examples
///
/// ```
/// use nhc2_gateway::device::ClassificationTable;
/// use nhc2_gateway::types::DeviceClass;
///
/// let table = ClassificationTable::builder()
///     .switches_as_lights(true)
///     .build();
///
/// assert_eq!(table.class_of("socket"), Some(DeviceClass::Light));
/// assert!(table.models(DeviceClass::Switch).is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ClassificationTable {
    models: BTreeMap<DeviceClass, Vec<String>>,
    index: HashMap<String, DeviceClass>,
}

impl ClassificationTable {
    /// Creates a builder seeded with the default model lists.
    #[must_use]
    pub fn builder() -> ClassificationTableBuilder {
        ClassificationTableBuilder::default()
    }

    /// Returns the class a model belongs to.
    #[must_use]
    pub fn class_of(&self, model: &str) -> Option<DeviceClass> {
        self.index.get(model).copied()
    }

    /// Returns the models of a class.
    #[must_use]
    pub fn models(&self, class: DeviceClass) -> &[String] {
        self.models.get(&class).map_or(&[], Vec::as_slice)
    }
}

impl Default for ClassificationTable {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ClassificationTable`].
#[derive(Debug, Clone)]
pub struct ClassificationTableBuilder {
    models: BTreeMap<DeviceClass, Vec<String>>,
    switches_as_lights: bool,
}

impl Default for ClassificationTableBuilder {
    fn default() -> Self {
        let models = DeviceClass::ALL
            .into_iter()
            .map(|class| {
                let models = class
                    .default_models()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                (class, models)
            })
            .collect();
        Self {
            models,
            switches_as_lights: false,
        }
    }
}

impl ClassificationTableBuilder {
    /// Replaces the model list of `class`.
    ///
    /// The given models are removed from every other class.
    #[must_use]
    pub fn models<I, S>(mut self, class: DeviceClass, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut models: Vec<String> = models.into_iter().map(Into::into).collect();
        models.dedup();
        for (other, list) in &mut self.models {
            if *other != class {
                list.retain(|model| !models.contains(model));
            }
        }
        self.models.insert(class, models);
        self
    }

    /// Classifies every switch model as a light.
    #[must_use]
    pub fn switches_as_lights(mut self, enabled: bool) -> Self {
        self.switches_as_lights = enabled;
        self
    }

    /// Builds the table.
    #[must_use]
    pub fn build(mut self) -> ClassificationTable {
        if self.switches_as_lights {
            let switches = self
                .models
                .insert(DeviceClass::Switch, Vec::new())
                .unwrap_or_default();
            let lights = self.models.entry(DeviceClass::Light).or_default();
            for model in switches {
                if !lights.contains(&model) {
                    lights.push(model);
                }
            }
        }

        let index = self
            .models
            .iter()
            .flat_map(|(class, models)| models.iter().map(|model| (model.clone(), *class)))
            .collect();

        ClassificationTable {
            models: self.models,
            index,
        }
    }
}

/// Turns device lists into per-class adapter lists.
pub struct Classifier {
    table: ClassificationTable,
    registry: Arc<DeviceRegistry>,
    sink: CommandSink,
    devices: RwLock<HashMap<DeviceClass, Vec<Device>>>,
    callbacks: RwLock<HashMap<DeviceClass, DevicesCallback>>,
}

impl Classifier {
    /// Creates a classifier writing into `registry`.
    #[must_use]
    pub fn new(table: ClassificationTable, registry: Arc<DeviceRegistry>, sink: CommandSink) -> Self {
        Self {
            table,
            registry,
            sink,
            devices: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(HashMap::new()),
        }
    }

    /// The classification table in use.
    #[must_use]
    pub fn table(&self) -> &ClassificationTable {
        &self.table
    }

    /// Processes a full device list.
    ///
    /// Non-actionable descriptors are ignored. Every actionable identifier
    /// gets a registry entry, then each class is initialized in
    /// [`DeviceClass::ALL`] order.
    pub fn process_device_list(&self, descriptors: Vec<DeviceDescriptor>) {
        let actionable: Vec<DeviceDescriptor> = descriptors
            .into_iter()
            .filter(|descriptor| {
                if !descriptor.is_actionable() {
                    return false;
                }
                if descriptor.uuid().is_none() {
                    tracing::warn!(model = ?descriptor.model, "Ignoring device without identifier");
                    return false;
                }
                true
            })
            .collect();

        let created = actionable
            .iter()
            .filter_map(DeviceDescriptor::uuid)
            .filter(|uuid| self.registry.ensure(uuid))
            .count();
        tracing::debug!(
            actionable = actionable.len(),
            new = created,
            "Processing device list"
        );

        for class in DeviceClass::ALL {
            self.initialize_devices(class, &actionable);
        }
    }

    /// Builds or refreshes the adapters of one class.
    pub fn initialize_devices(&self, class: DeviceClass, descriptors: &[DeviceDescriptor]) {
        for descriptor in descriptors {
            let Some(model) = descriptor.model.as_deref() else {
                continue;
            };
            if self.table.class_of(model) != Some(class) {
                continue;
            }
            let Some(uuid) = descriptor.uuid() else {
                continue;
            };

            let existing = self.registry.with_entry(uuid, |entry| {
                if let Some(device) = entry.device() {
                    return Some(device.clone());
                }
                let device = Device::new(uuid, class, descriptor, self.sink.clone());
                entry.attach(device.clone());
                self.devices
                    .write()
                    .entry(class)
                    .or_default()
                    .push(device);
                None
            });

            match existing {
                Some(device) => device.update_from_descriptor(descriptor),
                None => tracing::debug!(device = %uuid, class = %class, model, "Created device"),
            }
        }

        let callback = self.callbacks.read().get(&class).cloned();
        if let Some(callback) = callback {
            let devices = self.devices_of(class);
            if !devices.is_empty() {
                callback(&devices);
            }
        }
    }

    /// Registers the callback for a class, replacing any earlier one.
    ///
    /// The callback runs right away if the class already has devices, and
    /// again after every device list that leaves the class non-empty.
    pub fn subscribe(&self, class: DeviceClass, callback: DevicesCallback) {
        self.callbacks
            .write()
            .insert(class, Arc::clone(&callback));

        let devices = self.devices_of(class);
        if !devices.is_empty() {
            callback(&devices);
        }
    }

    /// Current adapters of a class.
    #[must_use]
    pub fn devices_of(&self, class: DeviceClass) -> Vec<Device> {
        self.devices.read().get(&class).cloned().unwrap_or_default()
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("table", &self.table)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::test_sink;
    use parking_lot::Mutex;
    use serde_json::json;

    fn descriptor(uuid: &str, ty: &str, model: &str) -> DeviceDescriptor {
        serde_json::from_value(json!({
            "Uuid": uuid,
            "Type": ty,
            "Model": model,
            "Properties": [{"Status": "Off"}]
        }))
        .unwrap()
    }

    fn classifier(table: ClassificationTable) -> (Classifier, Arc<DeviceRegistry>) {
        let registry = Arc::new(DeviceRegistry::new());
        let (sink, _, _) = test_sink();
        (Classifier::new(table, Arc::clone(&registry), sink), registry)
    }

    fn recorder() -> (DevicesCallback, Arc<Mutex<Vec<Vec<String>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let callback: DevicesCallback = Arc::new(move |devices: &[Device]| {
            sink.lock()
                .push(devices.iter().map(|d| d.uuid().to_string()).collect());
        });
        (callback, calls)
    }

    #[test]
    fn default_table_maps_models() {
        let table = ClassificationTable::default();
        assert_eq!(table.class_of("dimmer"), Some(DeviceClass::Light));
        assert_eq!(table.class_of("socket"), Some(DeviceClass::Switch));
        assert_eq!(table.class_of("gate"), Some(DeviceClass::Cover));
        assert_eq!(table.class_of("toaster"), None);
    }

    #[test]
    fn override_moves_model_between_classes() {
        let table = ClassificationTable::builder()
            .models(DeviceClass::Fan, ["fan", "socket"])
            .build();
        assert_eq!(table.class_of("socket"), Some(DeviceClass::Fan));
        assert_eq!(table.models(DeviceClass::Switch), ["switched-generic"]);
    }

    #[test]
    fn switches_as_lights_applies_after_overrides() {
        let table = ClassificationTable::builder()
            .models(DeviceClass::Switch, ["relay"])
            .switches_as_lights(true)
            .build();
        assert_eq!(table.class_of("relay"), Some(DeviceClass::Light));
        assert_eq!(table.class_of("light"), Some(DeviceClass::Light));
        assert!(table.models(DeviceClass::Switch).is_empty());
    }

    #[test]
    fn light_descriptor_creates_light_adapter() {
        let table = ClassificationTable::builder()
            .models(DeviceClass::Light, ["light-model-X"])
            .build();
        let (classifier, registry) = classifier(table);
        let (callback, calls) = recorder();
        classifier.subscribe(DeviceClass::Light, callback);

        classifier.process_device_list(vec![descriptor("d1", "action", "light-model-X")]);

        assert!(registry.contains("d1"));
        let lights = classifier.devices_of(DeviceClass::Light);
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].class(), DeviceClass::Light);
        assert!(registry.device("d1").unwrap().ptr_eq(&lights[0]));
        assert!(registry.listener("d1").is_some());
        assert_eq!(*calls.lock(), vec![vec!["d1".to_string()]]);
    }

    #[test]
    fn reprocessing_is_idempotent() {
        let (classifier, registry) = classifier(ClassificationTable::default());
        let list = vec![
            descriptor("l1", "action", "light"),
            descriptor("s1", "action", "socket"),
            descriptor("c1", "action", "rolldownshutter"),
        ];

        classifier.process_device_list(list.clone());
        let first: Vec<Device> = DeviceClass::ALL
            .into_iter()
            .flat_map(|class| classifier.devices_of(class))
            .collect();

        let mut refreshed = list;
        refreshed[0] = descriptor("l1", "action", "light");
        refreshed[0]
            .properties
            .insert("Status".to_string(), json!("On"));
        classifier.process_device_list(refreshed);

        let second: Vec<Device> = DeviceClass::ALL
            .into_iter()
            .flat_map(|class| classifier.devices_of(class))
            .collect();

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        for (a, b) in first.iter().zip(&second) {
            assert!(a.ptr_eq(b));
        }
        assert!(registry.device("l1").unwrap().is_on());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn callbacks_receive_cumulative_list() {
        let (classifier, _) = classifier(ClassificationTable::default());
        let (callback, calls) = recorder();
        classifier.subscribe(DeviceClass::Light, callback);

        classifier.process_device_list(vec![descriptor("l1", "action", "light")]);
        classifier.process_device_list(vec![descriptor("l2", "action", "dimmer")]);

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], vec!["l1".to_string(), "l2".to_string()]);
    }

    #[test]
    fn unknown_model_creates_nothing() {
        let (classifier, registry) = classifier(ClassificationTable::default());
        let mut notified = Vec::new();
        for class in DeviceClass::ALL {
            let (callback, calls) = recorder();
            classifier.subscribe(class, callback);
            notified.push(calls);
        }

        classifier.process_device_list(vec![descriptor("x1", "action", "toaster")]);

        assert!(registry.contains("x1"));
        assert!(registry.device("x1").is_none());
        assert!(registry.listener("x1").is_none());
        for class in DeviceClass::ALL {
            assert!(classifier.devices_of(class).is_empty());
        }
        assert!(notified.iter().all(|calls| calls.lock().is_empty()));
    }

    #[test]
    fn non_actionable_types_are_not_registered() {
        let (classifier, registry) = classifier(ClassificationTable::default());
        classifier.process_device_list(vec![
            descriptor("g1", "gateway", "light"),
            descriptor("t1", "thermostat", "thermostat"),
            descriptor("m1", "centralmeter", "electricity-clamp-centralmeter"),
        ]);

        assert!(!registry.contains("g1"));
        assert_eq!(registry.len(), 2);
        assert_eq!(classifier.devices_of(DeviceClass::Thermostat).len(), 1);
        assert_eq!(classifier.devices_of(DeviceClass::EnergyMeter).len(), 1);
    }

    #[test]
    fn subscribe_replays_existing_devices() {
        let (classifier, _) = classifier(ClassificationTable::default());
        classifier.process_device_list(vec![descriptor("f1", "action", "fan")]);

        let (callback, calls) = recorder();
        classifier.subscribe(DeviceClass::Fan, callback);
        assert_eq!(*calls.lock(), vec![vec!["f1".to_string()]]);

        let (callback, calls) = recorder();
        classifier.subscribe(DeviceClass::Cover, callback);
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn descriptor_without_uuid_is_skipped() {
        let (classifier, registry) = classifier(ClassificationTable::default());
        let mut anonymous = descriptor("", "action", "light");
        anonymous.uuid = None;
        classifier.process_device_list(vec![anonymous]);
        assert!(registry.is_empty());
        assert!(classifier.devices_of(DeviceClass::Light).is_empty());
    }
}
