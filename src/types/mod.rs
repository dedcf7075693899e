// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the gateway.
//!
//! - [`DeviceClass`]: internal grouping of models under one adapter
//! - [`DeviceType`]: the controller's `Type` tag on a descriptor
//! - [`RefusalReason`]: why the controller refused a connection
//! - [`Percentage`]: a validated 0 to 100 value for brightness and position

mod device_class;
mod device_type;
mod percentage;
mod refusal;

pub use device_class::DeviceClass;
pub use device_type::DeviceType;
pub use percentage::Percentage;
pub use refusal::RefusalReason;
