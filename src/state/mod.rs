// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller-level state.
//!
//! The controller answers a `systeminfo.publish` request with a metadata
//! blob (software versions, locale, time zone). [`SystemInfoStore`] keeps
//! the latest one and hands it to the registered callback.
//!
//! # Examples
//!
//! ```
//! use nhc2_gateway::state::SystemInfoStore;
//! use serde_json::json;
//!
//! let store = SystemInfoStore::new();
//! store.update(json!({
//!     "Method": "systeminfo.publish",
//!     "Params": [{"SystemInfo": [{"SWversion": "2.14.0"}]}]
//! }));
//!
//! let info = store.current().unwrap();
//! assert_eq!(info.sw_version(), Some("2.14.0"));
//! ```

mod system_info;

pub use system_info::{SystemInfo, SystemInfoCallback, SystemInfoStore};
