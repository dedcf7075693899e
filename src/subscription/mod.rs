// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback subscriptions.
//!
//! - [`SubscriptionId`]: returned on registration, used to unsubscribe
//! - [`CallbackRegistry`]: stores callbacks and dispatches values to them
//!
//! Device adapters use a registry for their `on_change` callbacks:
//!
//! ```no_run
//! # fn example(device: nhc2_gateway::Device) {
//! let id = device.on_change(|device| {
//!     println!("{} is now {:?}", device.uuid(), device.property("Status"));
//! });
//!
//! // Later
//! device.unsubscribe(id);
//! # }
//! ```

mod callback;

pub use callback::{CallbackRegistry, SubscriptionId};
