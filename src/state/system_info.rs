// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Last-received controller metadata.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

/// Callback receiving system info updates.
pub type SystemInfoCallback = Arc<dyn Fn(&SystemInfo) + Send + Sync>;

/// Controller metadata as received in a `systeminfo.publish` response.
///
/// The payload is kept as-is; accessors pick out the commonly used fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    body: Value,
    received_at: DateTime<Utc>,
}

impl SystemInfo {
    /// Wraps a received payload.
    #[must_use]
    pub fn new(body: Value) -> Self {
        Self {
            body,
            received_at: Utc::now(),
        }
    }

    /// The full payload.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.body
    }

    /// The first `SystemInfo` record of the payload.
    #[must_use]
    pub fn record(&self) -> Option<&Value> {
        self.body
            .get("Params")?
            .as_array()?
            .iter()
            .find_map(|param| param.get("SystemInfo")?.as_array()?.first())
    }

    /// Controller software version.
    #[must_use]
    pub fn sw_version(&self) -> Option<&str> {
        self.record()?.get("SWversion")?.as_str()
    }

    /// Time the payload was received.
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// Holds the current [`SystemInfo`] and its callback.
#[derive(Default)]
pub struct SystemInfoStore {
    current: RwLock<Option<SystemInfo>>,
    callback: RwLock<Option<SystemInfoCallback>>,
}

impl SystemInfoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored value and notifies the callback.
    pub fn update(&self, body: Value) {
        let info = SystemInfo::new(body);
        *self.current.write() = Some(info.clone());

        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(&info);
        }
    }

    /// Registers the callback, replacing any earlier one.
    ///
    /// The callback runs right away if a value is already known.
    pub fn subscribe(&self, callback: SystemInfoCallback) {
        *self.callback.write() = Some(Arc::clone(&callback));

        let current = self.current();
        if let Some(info) = current {
            callback(&info);
        }
    }

    /// The latest value, if any was received.
    #[must_use]
    pub fn current(&self) -> Option<SystemInfo> {
        self.current.read().clone()
    }
}

impl std::fmt::Debug for SystemInfoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemInfoStore")
            .field("current", &*self.current.read())
            .field("has_callback", &self.callback.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn payload(version: &str) -> Value {
        json!({
            "Method": "systeminfo.publish",
            "Params": [{"SystemInfo": [{"SWversion": version, "Language": "NL"}]}]
        })
    }

    fn recorder() -> (SystemInfoCallback, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: SystemInfoCallback = Arc::new(move |info: &SystemInfo| {
            sink.lock()
                .push(info.sw_version().unwrap_or_default().to_string());
        });
        (callback, seen)
    }

    #[test]
    fn accessors_read_first_record() {
        let info = SystemInfo::new(payload("2.14.0"));
        assert_eq!(info.sw_version(), Some("2.14.0"));
        assert_eq!(info.record().unwrap()["Language"], "NL");
        assert_eq!(info.raw()["Method"], "systeminfo.publish");
    }

    #[test]
    fn missing_record_yields_none() {
        let info = SystemInfo::new(json!({"Method": "systeminfo.publish"}));
        assert!(info.record().is_none());
        assert!(info.sw_version().is_none());
    }

    #[test]
    fn late_subscriber_gets_current_value() {
        let store = SystemInfoStore::new();
        store.update(payload("1.0"));

        let (callback, seen) = recorder();
        store.subscribe(callback);
        store.update(payload("1.1"));

        assert_eq!(*seen.lock(), vec!["1.0".to_string(), "1.1".to_string()]);
    }

    #[test]
    fn early_subscriber_waits_for_first_value() {
        let store = SystemInfoStore::new();
        let (callback, seen) = recorder();
        store.subscribe(callback);
        assert!(seen.lock().is_empty());

        store.update(payload("3.0"));
        assert_eq!(*seen.lock(), vec!["3.0".to_string()]);
        assert_eq!(store.current().unwrap().sw_version(), Some("3.0"));
    }

    #[test]
    fn update_overwrites_wholesale() {
        let store = SystemInfoStore::new();
        store.update(payload("1.0"));
        store.update(json!({"Method": "systeminfo.publish", "Params": []}));
        assert!(store.current().unwrap().sw_version().is_none());
    }
}
